//! Optional WebSocket transport. A Bolt client may tunnel the exact same
//! chunked message stream through a WebSocket binary frame instead of a raw
//! TCP byte stream, so browsers can speak Bolt too. The caller decides
//! whether to engage this module at all by checking whether the first bytes
//! on the wire look like the Bolt handshake magic or an HTTP request line;
//! everything in here assumes that decision has already been made.

use crate::net::buffer::{Buffer, Cursor};
use bolt_support::encoding::websocket_accept;
use bolt_support::{BoltError, BoltResult, ErrorType};

/// `FIN=1, opcode=binary` — the only kind of frame this server ever sends
/// or accepts carrying Bolt payload.
const OPCODE_BINARY: u8 = 0x2;
const FIN_BINARY_FIRST_BYTE: u8 = 0x80 | OPCODE_BINARY;

fn framing_error() -> BoltError {
    BoltError::Fatal(ErrorType::WebSocketFraming)
}

/// Attempts to parse an HTTP Upgrade request out of `read_buf` and, if
/// complete and valid, writes the `101 Switching Protocols` response into
/// `write_buf`.
///
/// Returns `Ok(true)` once the response has been written, `Ok(false)` if
/// the request is not yet fully buffered, and `Err` if it's complete but
/// not a legal WebSocket upgrade.
///
/// The request is assumed to fit in the buffer's first chunk; a handshake
/// spanning more than [`crate::net::buffer::CHUNK`] bytes of headers is
/// treated as malformed rather than supported across a rollover, since
/// `httparse` needs one contiguous slice to parse.
pub fn ws_handshake(read_buf: &Buffer, write_buf: &mut Buffer) -> BoltResult<bool> {
    if read_buf.write.chunk > 0 {
        return Err(framing_error());
    }
    let data = read_buf
        .contiguous(Cursor::default(), read_buf.write.offset)
        .ok_or_else(framing_error)?;

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(data) {
        Ok(httparse::Status::Partial) => return Ok(false),
        Ok(httparse::Status::Complete(_)) => {}
        Err(_) => return Err(framing_error()),
    }

    let is_upgrade = request.headers.iter().any(|h| {
        h.name.eq_ignore_ascii_case("upgrade") && starts_with_ignore_case(h.value, b"websocket")
    });
    if !is_upgrade {
        return Err(framing_error());
    }

    let key = request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("sec-websocket-key"))
        .ok_or_else(framing_error)?;
    let key = std::str::from_utf8(key.value).map_err(|_| framing_error())?;
    let accept = websocket_accept(key);

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept
    );
    let mut cursor = Cursor::default();
    write_buf.write(&mut cursor, response.as_bytes());
    Ok(true)
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

/// A parsed RFC 6455 frame header: FIN bit, opcode, and the mask that must
/// be XORed over the payload that follows.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WsFrameHeader {
    pub fin: bool,
    pub opcode: u8,
    pub masked: bool,
    pub mask: [u8; 4],
    pub payload_len: u64,
}

/// Parses a client-to-server frame header at `cursor`, advancing it past
/// the header on success. Returns `Ok(None)` if fewer bytes than a full
/// header are buffered yet; the caller retries once more data arrives.
///
/// Client frames are always masked per RFC 6455 section 5.1; an unmasked
/// frame from a client is a framing violation.
pub fn ws_read_frame(buf: &Buffer, cursor: &mut Cursor) -> BoltResult<Option<WsFrameHeader>> {
    if Buffer::diff(buf.write, *cursor) < 2 {
        return Ok(None);
    }

    let mut probe = *cursor;
    let b0 = buf.read_u8(&mut probe);
    let b1 = buf.read_u8(&mut probe);
    let fin = b0 & 0x80 != 0;
    let opcode = b0 & 0x0F;
    let masked = b1 & 0x80 != 0;
    let len_code = b1 & 0x7F;

    // Fragmentation, control frames (ping/pong/close), and anything but a
    // single complete binary frame are out of scope: a Bolt-over-WebSocket
    // client always sends whole messages as FIN=1 binary frames.
    if !fin || opcode != OPCODE_BINARY {
        return Err(framing_error());
    }

    let extra = match len_code {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    let needed = 2 + extra + if masked { 4 } else { 0 };
    if (Buffer::diff(buf.write, *cursor) as usize) < needed {
        return Ok(None);
    }

    let payload_len = match len_code {
        126 => u16::from_be(buf.read_u16(&mut probe)) as u64,
        127 => u64::from_be(buf.read_u64(&mut probe)),
        n => n as u64,
    };

    if !masked {
        return Err(framing_error());
    }
    let mut mask = [0u8; 4];
    for slot in mask.iter_mut() {
        *slot = buf.read_u8(&mut probe);
    }

    *cursor = probe;
    Ok(Some(WsFrameHeader {
        fin,
        opcode,
        masked,
        mask,
        payload_len,
    }))
}

/// Unmasks `len` bytes of frame payload starting at `cursor`, in place.
#[inline]
pub fn ws_unmask(buf: &mut Buffer, cursor: Cursor, len: usize, mask: [u8; 4]) {
    buf.xor_mask(cursor, len, mask);
}

/// Number of header bytes a server->client frame carrying `payload_len`
/// bytes will need. Server frames are never masked (RFC 6455 section 5.1:
/// "a server MUST NOT mask any frames it sends to the client").
#[inline]
pub fn ws_header_len(payload_len: usize) -> usize {
    2 + match payload_len {
        0..=125 => 0,
        126..=0xFFFF => 2,
        _ => 8,
    }
}

/// Writes a binary-frame header for `payload_len` bytes of outbound payload
/// at `cursor`, advancing it past the header. The payload itself is written
/// separately by the caller, immediately after.
///
/// Always uses the full extended-length encoding called for by the
/// payload size — unlike a single-byte-length encoding that silently
/// corrupts any payload of 126 bytes or more, this never desyncs the frame
/// stream no matter how large a result set grows.
pub fn write_ws_header(buf: &mut Buffer, cursor: &mut Cursor, payload_len: usize) {
    buf.write_u8(cursor, FIN_BINARY_FIRST_BYTE);
    match payload_len {
        0..=125 => {
            buf.write_u8(cursor, payload_len as u8);
        }
        126..=0xFFFF => {
            buf.write_u8(cursor, 126);
            buf.write_u16(cursor, u16::from_be(payload_len as u16));
        }
        _ => {
            buf.write_u8(cursor, 127);
            buf.write_u64(cursor, u64::from_be(payload_len as u64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_request(key: &str) -> String {
        format!(
            "GET / HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {}\r\nSec-WebSocket-Version: 13\r\n\r\n",
            key
        )
    }

    #[test]
    fn handshake_writes_expected_accept_header() {
        let mut read_buf = Buffer::new();
        let mut cursor = Cursor::default();
        read_buf.write(&mut cursor, handshake_request("dGhlIHNhbXBsZSBub25jZQ==").as_bytes());

        let mut write_buf = Buffer::new();
        let ok = ws_handshake(&read_buf, &mut write_buf).unwrap();
        assert!(ok);

        let mut out = vec![0u8; write_buf.write.offset];
        let mut r = Cursor::default();
        for byte in out.iter_mut() {
            *byte = write_buf.read_u8(&mut r);
        }
        let response = String::from_utf8(out).unwrap();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols"));
        assert!(response.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[test]
    fn handshake_reports_incomplete_request() {
        let mut read_buf = Buffer::new();
        let mut cursor = Cursor::default();
        read_buf.write(&mut cursor, b"GET / HTTP/1.1\r\nHost: localhost\r\n");

        let mut write_buf = Buffer::new();
        let ok = ws_handshake(&read_buf, &mut write_buf).unwrap();
        assert!(!ok);
    }

    #[test]
    fn handshake_rejects_non_upgrade_request() {
        let mut read_buf = Buffer::new();
        let mut cursor = Cursor::default();
        read_buf.write(&mut cursor, b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");

        let mut write_buf = Buffer::new();
        assert!(ws_handshake(&read_buf, &mut write_buf).is_err());
    }

    #[test]
    fn read_frame_small_payload() {
        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        let mask = [0x11, 0x22, 0x33, 0x44];
        let payload = b"hello";
        buf.write_u8(&mut cursor, 0x82);
        buf.write_u8(&mut cursor, 0x80 | payload.len() as u8);
        for b in &mask {
            buf.write_u8(&mut cursor, *b);
        }
        let mut masked = payload.to_vec();
        for (i, b) in masked.iter_mut().enumerate() {
            *b ^= mask[i % 4];
        }
        buf.write(&mut cursor, &masked);

        let mut read_cursor = Cursor::default();
        let header = ws_read_frame(&buf, &mut read_cursor).unwrap().unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, OPCODE_BINARY);
        assert_eq!(header.payload_len, payload.len() as u64);
        assert_eq!(header.mask, mask);

        ws_unmask(&mut buf, read_cursor, payload.len(), header.mask);
        let mut out = vec![0u8; payload.len()];
        let mut r = read_cursor;
        for byte in out.iter_mut() {
            *byte = buf.read_u8(&mut r);
        }
        assert_eq!(out, payload);
    }

    #[test]
    fn read_frame_reports_incomplete_header() {
        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        buf.write_u8(&mut cursor, 0x82);
        buf.write_u8(&mut cursor, 0x80 | 126);
        // length bytes and mask not written yet.

        let mut read_cursor = Cursor::default();
        assert_eq!(ws_read_frame(&buf, &mut read_cursor).unwrap(), None);
    }

    #[test]
    fn read_frame_rejects_unmasked_client_frame() {
        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        buf.write_u8(&mut cursor, 0x82);
        buf.write_u8(&mut cursor, 5);
        buf.write(&mut cursor, b"hello");

        let mut read_cursor = Cursor::default();
        assert!(ws_read_frame(&buf, &mut read_cursor).is_err());
    }

    #[test]
    fn read_frame_rejects_non_binary_and_fragmented_frames() {
        let mut ping = Buffer::new();
        let mut cursor = Cursor::default();
        ping.write_u8(&mut cursor, 0x89); // FIN=1, opcode=ping
        ping.write_u8(&mut cursor, 0x80);
        ping.write(&mut cursor, &[0, 0, 0, 0]);
        let mut read_cursor = Cursor::default();
        assert!(ws_read_frame(&ping, &mut read_cursor).is_err());

        let mut fragment = Buffer::new();
        let mut cursor = Cursor::default();
        fragment.write_u8(&mut cursor, 0x02); // FIN=0, opcode=binary
        fragment.write_u8(&mut cursor, 0x80);
        fragment.write(&mut cursor, &[0, 0, 0, 0]);
        let mut read_cursor = Cursor::default();
        assert!(ws_read_frame(&fragment, &mut read_cursor).is_err());
    }

    #[test]
    fn write_header_uses_extended_length_above_125_bytes() {
        assert_eq!(ws_header_len(10), 2);
        assert_eq!(ws_header_len(126), 4);
        assert_eq!(ws_header_len(70_000), 10);

        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        write_ws_header(&mut buf, &mut cursor, 300);

        let mut r = Cursor::default();
        let b0 = buf.read_u8(&mut r);
        let b1 = buf.read_u8(&mut r);
        assert_eq!(b0, 0x82);
        assert_eq!(b1, 126);
        let len = u16::from_be(buf.read_u16(&mut r));
        assert_eq!(len, 300);
    }
}
