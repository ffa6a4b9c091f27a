//! Logging setup, mirroring `flux::logging`: a `sloggers` terminal drain
//! configured from TOML via `serdeconv`.

pub use slog::{debug, error, o, trace, warn, Logger};
pub use slog::Discard;

use sloggers::{Config, LoggerConfig};

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "info"
destination = "stderr"
"#;

/// Builds the root logger from a TOML snippet in `sloggers`' config format.
/// Falls back to a sane terminal default when `config_toml` is `None`.
pub fn init(config_toml: Option<&str>) -> Logger {
    let toml = config_toml.unwrap_or(DEFAULT_CONFIG);
    let config: LoggerConfig =
        serdeconv::from_toml_str(toml).expect("invalid logging configuration");

    config.build_logger().expect("failed to build logger")
}

/// A logger that discards everything; used when the caller doesn't care to
/// wire up logging (e.g. in unit tests).
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
