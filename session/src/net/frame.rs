//! Bolt chunk framing: wraps a message's encoded fields in a `u16` length
//! header and a terminating zero-length chunk, optionally wrapped again in
//! a WebSocket binary frame.
//!
//! A message is built by writing its encoded reply directly into the
//! session's write buffer, then calling [`end_message`] once the fields are
//! complete. `end_message` doesn't know or care what was written — it only
//! needs the [`FrameCursor`] returned by the matching [`reserve`] call, so
//! it can measure how many bytes the body turned out to be and backfill the
//! length header accordingly.

use crate::net::buffer::{Buffer, Cursor, CHUNK};
use crate::net::websocket::write_ws_header;

/// Bytes needed for the length header once a message is complete: the Bolt
/// chunk length is always 2 bytes; a WebSocket frame header needs 2 bytes
/// for payloads up to 125 bytes, 4 for anything up to 65535. Since a single
/// Bolt chunk's payload never exceeds `u16::MAX`, 4 bytes is the most a
/// WebSocket header ever needs here — the 8-byte (127-code) extension never
/// comes up.
const CHUNK_LENGTH_LEN: usize = 2;
const WS_MAX_HEADER_LEN: usize = 4;

#[inline]
fn max_header_len(ws: bool) -> usize {
    CHUNK_LENGTH_LEN + if ws { WS_MAX_HEADER_LEN } else { 0 }
}

/// Cursors bracketing an in-progress message: `reserved` is where its
/// header will eventually be backfilled, `body` is where its encoded
/// fields actually start.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameCursor {
    pub reserved: Cursor,
    pub body: Cursor,
}

#[inline]
fn retreat(cursor: Cursor, n: usize) -> Cursor {
    let total = cursor.chunk * CHUNK + cursor.offset;
    let total = total.checked_sub(n).expect("retreat past start of buffer");
    Cursor {
        chunk: total / CHUNK,
        offset: total % CHUNK,
    }
}

/// Writes a zeroed placeholder of the worst-case header size at
/// `write_buf.write` and returns the cursors bracketing the message that
/// will be built after it.
pub fn reserve(write_buf: &mut Buffer, ws: bool) -> FrameCursor {
    let reserved = write_buf.write;
    let placeholder = [0u8; CHUNK_LENGTH_LEN + WS_MAX_HEADER_LEN];
    let mut cursor = reserved;
    write_buf.write(&mut cursor, &placeholder[..max_header_len(ws)]);
    FrameCursor { reserved, body: cursor }
}

/// Completes the message started by `frame`:
///
/// 1. measures the body (`write_buf.write - frame.body`),
/// 2. backfills the WebSocket header (if any) and the Bolt chunk length,
///    right-aligned so they end exactly at `frame.body`,
/// 3. appends the terminating zero-length chunk,
/// 4. reserves the header slot for the next message.
///
/// Returns the new drain boundary (everything from the start of the buffer
/// up to this cursor is now a complete, ready-to-send byte stream) and the
/// `FrameCursor` for the next message.
pub fn end_message(write_buf: &mut Buffer, frame: FrameCursor, ws: bool) -> (Cursor, FrameCursor) {
    let n = Buffer::diff(write_buf.write, frame.body) as usize;
    debug_assert!(n <= u16::MAX as usize, "a single chunk must fit in 16 bits");

    let header_len = CHUNK_LENGTH_LEN + if ws { super::websocket::ws_header_len(n) } else { 0 };
    let mut header_cursor = retreat(frame.body, header_len);
    if ws {
        write_ws_header(write_buf, &mut header_cursor, n);
    }
    write_buf.write_u16(&mut header_cursor, u16::from_be(n as u16));
    debug_assert_eq!(header_cursor, frame.body, "backfilled header must land exactly at the body");

    let mut terminator = write_buf.write;
    write_buf.write_u16(&mut terminator, 0);
    let drain_to = write_buf.write;

    let next = reserve(write_buf, ws);
    (drain_to, next)
}

/// Discards whatever is currently buffered (unsent `RECORD`s, a half-built
/// message) and starts fresh at the beginning of the write buffer. Used for
/// the `RESET` fast path, which must answer ahead of anything already
/// queued rather than waiting behind it.
pub fn begin_reset(write_buf: &mut Buffer, ws: bool) -> FrameCursor {
    write_buf.reset();
    reserve(write_buf, ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_plain_message() {
        let mut buf = Buffer::new();
        let frame = reserve(&mut buf, false);
        let mut body = frame.body;
        buf.write(&mut body, b"hello");

        let (drain_to, _next) = end_message(&mut buf, frame, false);

        let mut r = Cursor::default();
        let len = u16::from_be(buf.read_u16(&mut r));
        assert_eq!(len, 5);
        let mut payload = vec![0u8; 5];
        for b in payload.iter_mut() {
            *b = buf.read_u8(&mut r);
        }
        assert_eq!(payload, b"hello");
        let terminator = u16::from_be(buf.read_u16(&mut r));
        assert_eq!(terminator, 0);
        assert_eq!(r, drain_to);
    }

    #[test]
    fn websocket_wrapped_message_uses_extended_header_above_125_bytes() {
        let mut buf = Buffer::new();
        let frame = reserve(&mut buf, true);
        let mut body = frame.body;
        let payload = vec![0xABu8; 200];
        buf.write(&mut body, &payload);

        end_message(&mut buf, frame, true);

        let mut r = Cursor::default();
        let b0 = buf.read_u8(&mut r);
        let b1 = buf.read_u8(&mut r);
        assert_eq!(b0, 0x82);
        assert_eq!(b1, 126);
        let ws_len = u16::from_be(buf.read_u16(&mut r));
        assert_eq!(ws_len as usize, 202); // ws payload = bolt length(2) + body(200)
        let bolt_len = u16::from_be(buf.read_u16(&mut r));
        assert_eq!(bolt_len as usize, 200);
    }

    #[test]
    fn successive_messages_accumulate_before_a_flush() {
        let mut buf = Buffer::new();
        let mut frame = reserve(&mut buf, false);

        let mut body = frame.body;
        buf.write(&mut body, b"first");
        let (after_first, next) = end_message(&mut buf, frame, false);
        frame = next;

        let mut body = frame.body;
        buf.write(&mut body, b"second!");
        let (after_second, _next) = end_message(&mut buf, frame, false);

        assert!(Buffer::diff(after_second, after_first) > 0);
    }

    #[test]
    fn reset_discards_unsent_messages() {
        let mut buf = Buffer::new();
        let frame = reserve(&mut buf, false);
        let mut body = frame.body;
        buf.write(&mut body, &[0u8; 500]);
        let (_drain_to, _next) = end_message(&mut buf, frame, false);
        assert!(buf.write.chunk > 0 || buf.write.offset > 0);

        let fresh = begin_reset(&mut buf, false);
        assert_eq!(fresh.reserved, Cursor::default());
    }
}
