//! Networking: the chunked buffer, Bolt chunk framing, the optional
//! WebSocket adapter, the session state machine and the per-connection
//! client session that ties them together.

pub mod buffer;
pub mod client;
pub mod endpoint;
pub mod frame;
pub mod packstream;
pub mod state;
pub mod websocket;
