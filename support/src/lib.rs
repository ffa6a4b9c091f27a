//! Shared infrastructure used by the Bolt session layer: the error taxonomy,
//! logging setup and small encoding helpers that don't belong to the protocol
//! code itself.

pub mod encoding;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{BoltError, BoltResult, ErrorType, ErrorUtils};
