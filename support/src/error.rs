use std::io;
use thiserror::Error;

pub type BoltResult<T> = Result<T, BoltError>;

/// Error taxonomy for the session layer.
///
/// `Wait` is not really an error: it means the operation could not make
/// progress without blocking (a short socket read, a buffer that doesn't yet
/// hold a full frame). Callers retry later instead of tearing the session
/// down. Everything else is `Fatal` and ends the session.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BoltError {
    #[error("operation would block")]
    Wait,
    #[error("fatal session error: {0}")]
    Fatal(#[source] ErrorType),
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ErrorType {
    #[error("invalid handshake magic")]
    BadMagic,
    #[error("no mutually supported bolt version")]
    VersionMismatch,
    #[error("malformed chunk framing")]
    Framing,
    #[error("websocket frame is malformed")]
    WebSocketFraming,
    #[error("message exceeds the maximum chunk payload size")]
    PayloadTooLarge,
    #[error("request/response pair is not a legal transition from the current state")]
    ProtocolViolation,
    #[error("buffer overrun")]
    BufferOverrun,
    #[error("io error: {0:?}")]
    Io(io::ErrorKind),
}

impl From<io::Error> for BoltError {
    #[inline]
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => BoltError::Wait,
            kind => BoltError::Fatal(ErrorType::Io(kind)),
        }
    }
}

/// Convenience extension mirroring the teacher's `ErrorUtils`: distinguishes
/// "didn't make progress yet" from "actually failed".
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for BoltResult<T> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(BoltError::Wait))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_becomes_wait() {
        let io_err = io::Error::new(io::ErrorKind::WouldBlock, "would block");
        assert_eq!(BoltError::from(io_err), BoltError::Wait);
    }

    #[test]
    fn other_io_errors_are_fatal() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(
            BoltError::from(io_err),
            BoltError::Fatal(ErrorType::Io(io::ErrorKind::ConnectionReset))
        );
    }

    #[test]
    fn has_failed_classifies_results() {
        let ok: BoltResult<()> = Ok(());
        let wait: BoltResult<()> = Err(BoltError::Wait);
        let fatal: BoltResult<()> = Err(BoltError::Fatal(ErrorType::Framing));

        assert!(!ok.has_failed());
        assert!(!wait.has_failed());
        assert!(fatal.has_failed());
    }
}
