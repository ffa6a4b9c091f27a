//! Server configuration, loaded from TOML the same way `flux::logging` loads
//! its `sloggers` config: via `serdeconv`, deserialized with `serde`.

use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the host event loop adapter (`net::endpoint::Endpoint`).
/// The protocol core itself (buffer, framing, state machine) takes no
/// configuration — it is pure and total over its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to, e.g. `"0.0.0.0:7687"`.
    pub bind_address: String,
    /// Documents the chunk size the running binary was built with
    /// (`net::buffer::CHUNK`). The buffer's chunk size is a compile-time
    /// constant — chunks are fixed-size arrays, not runtime-sized
    /// allocations — so this field is informational: it lets a deployed
    /// config be checked against the binary that will load it rather than
    /// actually resizing anything.
    pub buffer_chunk_size: usize,
    /// Seconds a freshly accepted connection has to complete the Bolt or
    /// WebSocket handshake before it is dropped.
    pub handshake_timeout_secs: u64,
    /// Seconds of inbound silence on a live connection before it is
    /// considered dead.
    pub ingress_timeout_secs: u64,
    /// Seconds of outbound silence before a keepalive is queued.
    pub keepalive_interval_secs: u64,
    /// How often the endpoint sweeps for timed-out connections.
    pub housekeeping_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "127.0.0.1:7687".to_owned(),
            buffer_chunk_size: crate::net::buffer::CHUNK,
            handshake_timeout_secs: 5,
            ingress_timeout_secs: 30,
            keepalive_interval_secs: 3,
            housekeeping_interval_secs: 3,
        }
    }
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn ingress_timeout(&self) -> Duration {
        Duration::from_secs(self.ingress_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }

    /// Parses a config from a TOML document, falling back to
    /// [`ServerConfig::default`] values for any field left unspecified.
    pub fn from_toml_str(toml: &str) -> Result<ServerConfig, serdeconv::Error> {
        serdeconv::from_toml_str(toml)
    }

    /// Whether `buffer_chunk_size` matches the chunk size this binary was
    /// actually built with. A mismatch means the config was written for a
    /// different build and should be rejected at startup rather than
    /// silently ignored.
    pub fn matches_compiled_chunk_size(&self) -> bool {
        self.buffer_chunk_size == crate::net::buffer::CHUNK
    }
}
