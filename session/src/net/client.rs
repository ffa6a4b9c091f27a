//! Per-connection session: owns the socket, the three chunked buffers, and
//! drives the handshake, request decoding and reply encoding through the
//! framing and state-machine layers. This is the piece everything else in
//! this crate exists to support.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use bolt_support::logging::{debug, trace, warn, Logger};
use bolt_support::{BoltError, BoltResult, ErrorType};

use crate::net::buffer::{Buffer, Cursor};
use crate::net::endpoint::EventLoop;
use crate::net::frame::{self, FrameCursor};
use crate::net::packstream::{self, ReplyTag};
use crate::net::state::{transition, Pending, RequestKind, ResponseKind, SessionState};
use crate::net::websocket::{ws_handshake, ws_read_frame};

/// The magic 4 bytes that open every Bolt handshake, regardless of
/// transport, before any version proposals.
const HANDSHAKE_MAGIC: u32 = 0x6060_B017;
/// The only protocol version this session layer speaks. A real deployment
/// would offer several and pick the newest the client also offers; a
/// single supported version keeps this crate's scope to the framing and
/// state machine rather than a version compatibility matrix.
const SUPPORTED_MAJOR: u8 = 5;
const SUPPORTED_MINOR: u8 = 4;

/// A raw TCP Bolt connection opens with the 4-byte handshake magic; a
/// browser driver instead opens with an HTTP request line, which always
/// starts with an uppercase ASCII method name. Anything else is neither,
/// and gets rejected as a bad handshake rather than fed to the HTTP parser.
fn looks_like_http(first_four: [u8; 4]) -> bool {
    first_four[0].is_ascii_uppercase()
}

fn tag_to_request(tag: u8) -> Option<RequestKind> {
    use RequestKind::*;
    Some(match tag {
        0x01 => Hello,
        0x02 => Goodbye,
        0x0F => Reset,
        0x10 => Run,
        0x11 => Begin,
        0x12 => Commit,
        0x13 => Rollback,
        0x2F => Discard,
        0x3F => Pull,
        0x66 => Route,
        0x6A => Logon,
        0x6B => Logoff,
        _ => return None,
    })
}

/// A single Bolt connection: the negotiated transport and protocol
/// version, the session state machine, and the three buffers that back
/// reading requests, assembling de-chunked messages, and writing replies.
pub struct ClientSession<S> {
    socket: S,
    logger: Logger,

    state: SessionState,
    ws: bool,
    transport_decided: bool,
    handshake_done: bool,
    assembling: bool,

    /// Set once a decoded request has been handed to the worker pipeline,
    /// cleared once its reply has been written (`reply_for`). Guards
    /// against decoding a second request before the first has finished —
    /// Bolt is strictly request/reply per connection outside of `PULL`'s
    /// `RECORD` stream.
    processing: bool,

    /// Set by the request handler (from any thread) when a `RESET` needs
    /// to jump the reply queue; cleared by [`ClientSession::send`] once
    /// consumed. `AtomicBool` rather than a plain flag because a `RESET`
    /// can be requested concurrently with the connection's own thread
    /// processing a long-running result stream.
    reset: AtomicBool,

    /// Set by the host (from any thread, e.g. a server-wide shutdown
    /// sweep) when this connection should close once its queued replies
    /// drain, rather than mid-write. `AtomicBool` for the same
    /// cross-thread reason as `reset`.
    shutdown: AtomicBool,

    read_buf: Buffer,
    msg_buf: Buffer,
    write_buf: Buffer,
    /// Drain boundary: bytes from the start of `write_buf` up to here are a
    /// complete, ready-to-send byte stream.
    write: Cursor,
    /// The message currently being built in `write_buf`, past `write`.
    frame: FrameCursor,

    /// Unix timestamp the session was accepted at, for the host's
    /// handshake-timeout sweep.
    created_at: u64,
}

impl<S: Read + Write> ClientSession<S> {
    pub fn new(socket: S, logger: Logger) -> ClientSession<S> {
        let mut write_buf = Buffer::new();
        let frame = frame::reserve(&mut write_buf, false);
        trace!(logger, "client session created");
        ClientSession {
            socket,
            logger,
            state: SessionState::Negotiation,
            ws: false,
            transport_decided: false,
            handshake_done: false,
            assembling: false,
            processing: false,
            reset: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            read_buf: Buffer::new(),
            msg_buf: Buffer::new(),
            write_buf,
            write: Cursor::default(),
            frame,
            created_at: bolt_support::time::timestamp_secs(),
        }
    }

    /// Whether this connection has been sitting in [`SessionState::Negotiation`]
    /// or [`SessionState::Authentication`] longer than `timeout` since it was
    /// accepted. The host's housekeeping sweep calls this to decide which
    /// unauthenticated connections to drop; once the handshake completes the
    /// session is no longer a candidate regardless of age.
    pub fn handshake_expired(&self, timeout: std::time::Duration) -> bool {
        if self.handshake_done {
            return false;
        }
        let age = bolt_support::time::timestamp_secs().saturating_sub(self.created_at);
        age >= timeout.as_secs()
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_websocket(&self) -> bool {
        self.ws
    }

    /// Requests that the next reply be the `RESET` fast-path acknowledgement
    /// instead of whatever would normally be sent next. Safe to call from a
    /// different thread than the one driving this session's event loop.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::Release);
    }

    /// Whether a request has been decoded and handed off but its reply has
    /// not yet been written.
    #[inline]
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Asks this connection to close once its queued replies have drained,
    /// rather than abruptly. Safe to call from another thread (e.g. a
    /// server-wide shutdown sweep).
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether the host should tear this connection down now: either the
    /// state machine reached its terminal state, or a shutdown was
    /// requested and everything queued has finished draining.
    pub fn should_close(&self) -> bool {
        self.state == SessionState::Defunct
            || (self.shutdown.load(Ordering::Acquire) && self.write == Cursor::default())
    }

    /// Drives the handshake forward with whatever bytes are currently
    /// buffered. Returns `Ok(true)` once negotiation is complete and the
    /// session is ready to read its first request.
    pub fn poll_handshake(&mut self) -> BoltResult<bool> {
        if self.handshake_done {
            return Ok(true);
        }

        let healthy = self.read_buf.fill_from_socket(&mut self.socket)?;
        if !healthy && Buffer::diff(self.read_buf.write, Cursor::default()) == 0 {
            return Err(BoltError::Fatal(ErrorType::Io(std::io::ErrorKind::UnexpectedEof)));
        }

        if !self.transport_decided {
            if Buffer::diff(self.read_buf.write, Cursor::default()) < 4 {
                return Ok(false);
            }
            let mut probe = Cursor::default();
            let first_word = u32::from_be(self.read_buf.read_u32(&mut probe));

            if first_word == HANDSHAKE_MAGIC {
                self.transport_decided = true;
            } else if looks_like_http(first_word.to_be_bytes()) {
                if ws_handshake(&self.read_buf, &mut self.write_buf)? {
                    self.write_buf
                        .drain_to_socket(self.write_buf.write, &mut self.socket)?;
                    self.write_buf.reset();
                    self.read_buf.reset();
                    self.ws = true;
                    self.transport_decided = true;
                    self.frame = frame::reserve(&mut self.write_buf, true);
                    debug!(self.logger, "upgraded connection to websocket");
                    return Ok(false);
                } else {
                    return Ok(false);
                }
            } else {
                return Err(BoltError::Fatal(ErrorType::BadMagic));
            }
        }

        let payload_cursor = match self.handshake_payload_cursor()? {
            None => return Ok(false),
            Some(cursor) => cursor,
        };

        let mut r = payload_cursor;
        let magic = u32::from_be(self.read_buf.read_u32(&mut r));
        if magic != HANDSHAKE_MAGIC {
            return Err(BoltError::Fatal(ErrorType::BadMagic));
        }

        // Four 4-byte version proposals follow the magic, in the client's
        // preference order; the first one this server supports wins.
        let mut chosen = None;
        for _ in 0..4 {
            let raw = u32::from_be(self.read_buf.read_u32(&mut r));
            let major = (raw & 0xFF) as u8;
            let minor = ((raw >> 8) & 0xFF) as u8;
            if chosen.is_none() && major == SUPPORTED_MAJOR && minor <= SUPPORTED_MINOR {
                chosen = Some((major, minor));
            }
        }
        let (major, minor) = match chosen {
            Some(v) => v,
            None => return Err(BoltError::Fatal(ErrorType::VersionMismatch)),
        };

        self.send_version_response(major, minor)?;
        self.read_buf.reset();
        self.handshake_done = true;
        debug!(self.logger, "handshake complete"; "major" => major, "minor" => minor, "websocket" => self.ws);
        Ok(true)
    }

    /// Returns a cursor at which at least 20 bytes (the magic plus four
    /// version proposals) are known to be available, unwrapping one
    /// WebSocket frame if this is a websocket connection. `Ok(None)` means
    /// more bytes are needed.
    fn handshake_payload_cursor(&mut self) -> BoltResult<Option<Cursor>> {
        if !self.ws {
            return Ok(if Buffer::diff(self.read_buf.write, Cursor::default()) >= 20 {
                Some(Cursor::default())
            } else {
                None
            });
        }

        let mut cursor = Cursor::default();
        let header = match ws_read_frame(&self.read_buf, &mut cursor)? {
            None => return Ok(None),
            Some(h) => h,
        };
        if header.payload_len < 20 {
            return Err(BoltError::Fatal(ErrorType::WebSocketFraming));
        }
        if (Buffer::diff(self.read_buf.write, cursor) as usize) < header.payload_len as usize {
            return Ok(None);
        }
        self.read_buf.xor_mask(cursor, header.payload_len as usize, header.mask);
        Ok(Some(cursor))
    }

    /// Writes the 4-byte negotiated-version response directly to the
    /// socket. This reply is not part of the chunked message stream — it's
    /// a one-off exchange that predates it — so it bypasses `write_buf`
    /// entirely rather than disturbing the first real reply's reservation.
    fn send_version_response(&mut self, major: u8, minor: u8) -> BoltResult<()> {
        let response = ((minor as u32) << 8) | major as u32;
        let mut scratch = Buffer::new();
        let mut cursor = Cursor::default();
        if self.ws {
            crate::net::websocket::write_ws_header(&mut scratch, &mut cursor, 4);
        }
        scratch.write_u32(&mut cursor, u32::from_be(response));
        scratch.drain_to_socket(cursor, &mut self.socket)
    }

    /// Returns the next contiguous span of raw (post-websocket-unmasking)
    /// Bolt bytes available to the chunk parser: for a raw connection this
    /// is simply "everything buffered so far"; for websocket it's exactly
    /// one frame's payload, since a compliant driver never splits a chunk
    /// header across frames.
    fn next_span(&mut self) -> BoltResult<Option<(Cursor, Cursor)>> {
        if !self.ws {
            let available = Buffer::diff(self.read_buf.write, self.read_buf.read);
            if available == 0 {
                return Ok(None);
            }
            return Ok(Some((self.read_buf.read, self.read_buf.write)));
        }

        let mut cursor = self.read_buf.read;
        let header = match ws_read_frame(&self.read_buf, &mut cursor)? {
            None => return Ok(None),
            Some(h) => h,
        };
        let payload_len = header.payload_len as usize;
        if (Buffer::diff(self.read_buf.write, cursor) as usize) < payload_len {
            return Ok(None);
        }
        self.read_buf.xor_mask(cursor, payload_len, header.mask);
        let end = self.read_buf.advance(cursor, payload_len);
        self.read_buf.read = end;
        Ok(Some((cursor, end)))
    }

    /// Pulls complete Bolt chunks into `msg_buf` until the terminating
    /// zero-length chunk is seen. Returns `Ok(true)` once a full message is
    /// assembled.
    fn assemble_message(&mut self) -> BoltResult<bool> {
        loop {
            let (mut at, end) = match self.next_span()? {
                None => return Ok(false),
                Some(span) => span,
            };
            let fixed = self.ws;

            loop {
                let remaining = Buffer::diff(end, at) as usize;
                if remaining < 2 {
                    if fixed {
                        return Err(BoltError::Fatal(ErrorType::Framing));
                    }
                    self.read_buf.read = at;
                    return Ok(false);
                }

                let mut probe = at;
                let chunk_len = u16::from_be(self.read_buf.read_u16(&mut probe)) as usize;
                if chunk_len == 0 {
                    self.read_buf.read = probe;
                    return Ok(true);
                }

                if (Buffer::diff(end, probe) as usize) < chunk_len {
                    if fixed {
                        return Err(BoltError::Fatal(ErrorType::Framing));
                    }
                    self.read_buf.read = at;
                    return Ok(false);
                }

                let mut dst = self.msg_buf.write;
                self.read_buf.copy(&mut probe, &mut self.msg_buf, &mut dst, chunk_len);
                at = probe;
            }
        }
    }

    /// Attempts to read one complete request. Returns `Ok(None)` if more
    /// bytes are needed; the caller retries once the socket is readable
    /// again.
    pub fn try_read_request(&mut self) -> BoltResult<Option<RequestKind>> {
        if !self.assembling {
            self.msg_buf.reset();
            self.assembling = true;
        }

        let healthy = self.read_buf.fill_from_socket(&mut self.socket)?;
        if !healthy && Buffer::diff(self.read_buf.write, self.read_buf.read) == 0 {
            return Err(BoltError::Fatal(ErrorType::Io(std::io::ErrorKind::UnexpectedEof)));
        }

        if !self.assemble_message()? {
            return Ok(None);
        }
        self.assembling = false;

        let mut cursor = Cursor::default();
        let tag = packstream::read_structure_tag(&self.msg_buf, &mut cursor);
        let request = tag_to_request(tag).ok_or(BoltError::Fatal(ErrorType::Framing))?;
        trace!(self.logger, "request decoded"; "request" => format!("{:?}", request));
        self.processing = true;
        Ok(Some(request))
    }

    /// A cursor positioned right after the request's structure tag, where
    /// the query layer's own field decoder should continue reading.
    pub fn request_fields_cursor(&self) -> Cursor {
        self.msg_buf.index(2)
    }

    pub fn message_buffer(&self) -> &Buffer {
        &self.msg_buf
    }

    /// Writes a reply to `request`, advancing the state machine according
    /// to `response`. `write_fields` appends whatever fields the reply
    /// carries (a metadata map, result rows, ...) after the structure
    /// header this method writes itself.
    pub fn reply_for(
        &mut self,
        request: RequestKind,
        response: ResponseKind,
        write_fields: impl FnOnce(&mut Buffer, &mut Cursor),
    ) -> BoltResult<()> {
        let tag = match response {
            ResponseKind::Success => ReplyTag::Success,
            ResponseKind::Failure => ReplyTag::Failure,
            ResponseKind::Ignored => ReplyTag::Ignored,
            ResponseKind::Record => ReplyTag::Record,
        };
        let field_count = if response == ResponseKind::Ignored { 0 } else { 1 };

        let mut cursor = self.frame.body;
        packstream::write_structure_header(&mut self.write_buf, &mut cursor, tag, field_count);
        write_fields(&mut self.write_buf, &mut cursor);

        let (drain_to, next) = frame::end_message(&mut self.write_buf, self.frame, self.ws);
        self.write = drain_to;
        self.frame = next;

        self.state = transition(self.state, request, response).map_err(|violation| {
            warn!(self.logger, "protocol violation"; "detail" => format!("{}", violation));
            BoltError::Fatal(ErrorType::ProtocolViolation)
        })?;
        if response != ResponseKind::Record {
            self.processing = false;
        }
        Ok(())
    }

    /// Flushes everything buffered up to the drain boundary to the socket.
    /// On a would-block, registers writable interest with `event_loop` and
    /// returns `Ok(())`; the caller is expected to call this again once the
    /// socket is writable.
    pub fn finish_write(&mut self, event_loop: &mut dyn EventLoop) -> BoltResult<()> {
        match self.write_buf.drain_to_socket(self.write, &mut self.socket) {
            Ok(()) => {
                self.write_buf.reset();
                self.write = Cursor::default();
                self.frame = frame::reserve(&mut self.write_buf, self.ws);
                event_loop.unregister_writable();
                Ok(())
            }
            Err(BoltError::Wait) => {
                event_loop.register_writable();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Sends whatever is queued, taking the `RESET` fast path if one was
    /// requested: discards any unsent backlog (a result stream the client
    /// no longer wants) and answers the reset immediately, ahead of
    /// anything already in progress.
    pub fn send(&mut self, event_loop: &mut dyn EventLoop) -> BoltResult<()> {
        let pending = if self.reset.swap(false, Ordering::AcqRel) {
            // A request decoded but not yet replied to when the reset
            // landed has no reply of its own coming: it gets folded into
            // this one as IGNORED before the reset's own SUCCESS, same as
            // a reset arriving while already Failed.
            if self.processing && self.state != SessionState::Failed {
                self.state = SessionState::Interrupted;
            }
            match self.state {
                SessionState::Failed | SessionState::Interrupted => Pending::ResetAckAfterIgnored,
                _ => Pending::ResetAck,
            }
        } else {
            Pending::Normal
        };

        match pending {
            Pending::Normal => self.finish_write(event_loop),
            Pending::ResetAck => {
                self.frame = frame::begin_reset(&mut self.write_buf, self.ws);
                self.reply_for(RequestKind::Reset, ResponseKind::Success, |buf, cursor| {
                    packstream::write_tiny_map_header(buf, cursor, 0)
                })?;
                self.finish_write(event_loop)
            }
            Pending::ResetAckAfterIgnored => {
                self.frame = frame::begin_reset(&mut self.write_buf, self.ws);
                self.reply_for(RequestKind::Reset, ResponseKind::Ignored, |_, _| {})?;
                self.reply_for(RequestKind::Reset, ResponseKind::Success, |buf, cursor| {
                    packstream::write_tiny_map_header(buf, cursor, 0)
                })?;
                self.finish_write(event_loop)
            }
        }
    }
}
