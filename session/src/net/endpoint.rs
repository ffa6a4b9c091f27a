//! The host event loop adapter. The protocol core (buffer, framing,
//! state machine, client session) is pure with respect to I/O readiness —
//! it only needs to know "can I write more right now" — so it talks to
//! whatever event loop the host runs through the small [`EventLoop`] trait.
//! [`MioEventLoop`] is the concrete adapter for a `mio` 0.6 reactor, in the
//! same register/reregister style as the teacher's own endpoint.

use mio::net::TcpStream;
use mio::{Poll, PollOpt, Ready, Token};
use std::io;

/// What a [`ClientSession`](crate::net::client::ClientSession) needs from
/// its host's event loop: the ability to ask for a writability
/// notification when a socket write would have blocked, and to drop that
/// interest again once the backlog has drained.
pub trait EventLoop {
    fn register_writable(&mut self);
    fn unregister_writable(&mut self);
}

/// A no-op adapter for tests and for transports that are always drained
/// synchronously (a pipe backed by an in-memory `Vec`, say).
pub struct NullEventLoop;

impl EventLoop for NullEventLoop {
    fn register_writable(&mut self) {}
    fn unregister_writable(&mut self) {}
}

/// Tracks whether a `mio` registration currently includes writable
/// interest, and flips it via `Poll::reregister` as [`EventLoop`] calls
/// come in. `readable` interest is always on; a Bolt connection is never
/// interested in *stopping* reading (a `RESET` can arrive at any time and
/// must be noticed immediately), only in adding/dropping write interest.
pub struct MioEventLoop<'a> {
    poll: &'a Poll,
    stream: &'a TcpStream,
    token: Token,
    writable: bool,
}

impl<'a> MioEventLoop<'a> {
    pub fn new(poll: &'a Poll, stream: &'a TcpStream, token: Token) -> io::Result<MioEventLoop<'a>> {
        poll.register(stream, token, Ready::readable(), PollOpt::edge())?;
        Ok(MioEventLoop {
            poll,
            stream,
            token,
            writable: false,
        })
    }

    fn reregister(&self) -> io::Result<()> {
        let mut interest = Ready::readable();
        if self.writable {
            interest |= Ready::writable();
        }
        self.poll.reregister(self.stream, self.token, interest, PollOpt::edge())
    }
}

impl<'a> EventLoop for MioEventLoop<'a> {
    fn register_writable(&mut self) {
        if !self.writable {
            self.writable = true;
            let _ = self.reregister();
        }
    }

    fn unregister_writable(&mut self) {
        if self.writable {
            self.writable = false;
            let _ = self.reregister();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_event_loop_accepts_any_call_sequence() {
        let mut event_loop = NullEventLoop;
        event_loop.register_writable();
        event_loop.register_writable();
        event_loop.unregister_writable();
        event_loop.unregister_writable();
    }
}
