//! The Bolt protocol session layer: connection state machine, chunked
//! message framing with optional WebSocket transport, and the segmented I/O
//! buffer backing both.

pub mod config;
pub mod net;

pub use net::buffer::{Buffer, Cursor};
pub use net::client::ClientSession;
pub use net::endpoint::{EventLoop, NullEventLoop};
pub use net::state::{Pending, ProtocolViolation, RequestKind, ResponseKind, SessionState};
