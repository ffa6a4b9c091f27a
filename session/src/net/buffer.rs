//! A dynamically grown sequence of fixed-size chunks with (chunk, offset)
//! read/write cursors. Bolt messages are unbounded in aggregate (many
//! `RECORD`s can be buffered ahead of a `SUCCESS`) but each wire chunk is
//! capped at 65535 bytes, so a chunked buffer amortizes allocation while
//! still letting a 16-bit length be backfilled into a known position once a
//! message is complete.
//!
//! Cursors hold no pointer back into the buffer — they're plain
//! (chunk-index, offset) pairs — because chunks may be reallocated as the
//! buffer grows and pointer stability across growth is not required.

use bolt_support::{BoltError, BoltResult};
use std::io::{self, Read, Write};

/// Size of a single chunk. Chosen as a convenient page-sized unit; unrelated
/// to the 65535-byte cap on a single Bolt wire chunk, which is enforced by
/// the framing layer, not the buffer.
pub const CHUNK: usize = 4096;

/// A cursor into a [`Buffer`]: a chunk index and an in-chunk byte offset.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct Cursor {
    pub chunk: usize,
    pub offset: usize,
}

impl Cursor {
    #[inline]
    fn absolute(self) -> usize {
        self.chunk * CHUNK + self.offset
    }
}

pub struct Buffer {
    chunks: Vec<Box<[u8; CHUNK]>>,
    /// Cursor marking how much of the buffer has been consumed by the
    /// reading side. Not advanced automatically by writes; callers that read
    /// sequentially from the start use this as their default read cursor.
    pub read: Cursor,
    /// Cursor marking the end of valid data: sockets fill up to here, and
    /// scalar/bulk writers default to starting here.
    pub write: Cursor,
}

/// Generates a matching `read_*`/`write_*` pair for a fixed-width scalar,
/// built on `read_into`/`write` and native-endian `from_ne_bytes`/`to_ne_bytes`.
macro_rules! scalar_rw {
    ($read_name:ident, $write_name:ident, $ty:ty, $size:expr) => {
        #[inline]
        pub fn $read_name(&self, cursor: &mut Cursor) -> $ty {
            let mut bytes = [0u8; $size];
            self.read_into(cursor, &mut bytes);
            <$ty>::from_ne_bytes(bytes)
        }

        #[inline]
        pub fn $write_name(&mut self, cursor: &mut Cursor, value: $ty) {
            self.write(cursor, &value.to_ne_bytes());
        }
    };
}

impl Buffer {
    /// A buffer with one chunk and both cursors at (0, 0).
    #[inline]
    pub fn new() -> Buffer {
        Buffer {
            chunks: vec![Box::new([0u8; CHUNK])],
            read: Cursor::default(),
            write: Cursor::default(),
        }
    }

    /// A cursor positioned `offset` bytes from the start of the buffer.
    ///
    /// Precondition: `offset < CHUNK * chunk_count`.
    #[inline]
    pub fn index(&self, offset: usize) -> Cursor {
        assert!(
            offset < CHUNK * self.chunks.len(),
            "offset {} out of range for {} chunks",
            offset,
            self.chunks.len()
        );
        Cursor {
            chunk: offset / CHUNK,
            offset: offset % CHUNK,
        }
    }

    /// `cursor` moved forward by `n` bytes, rolling over into later chunks
    /// as needed. Does not allocate; use together with [`Buffer::ensure_chunk`]
    /// on the write side.
    #[inline]
    pub fn advance(&self, cursor: Cursor, n: usize) -> Cursor {
        let total = cursor.absolute() + n;
        Cursor {
            chunk: total / CHUNK,
            offset: total % CHUNK,
        }
    }

    /// The distance `a - b` in bytes, as a 16-bit quantity (a single Bolt
    /// chunk payload never exceeds 65535 bytes, so this is the natural width
    /// for the framing layer's use of this function).
    ///
    /// Precondition: `a >= b`.
    #[inline]
    pub fn diff(a: Cursor, b: Cursor) -> u16 {
        let a_abs = a.absolute();
        let b_abs = b.absolute();
        assert!(a_abs >= b_abs, "diff precondition violated: {:?} < {:?}", a, b);
        (a_abs - b_abs) as u16
    }

    #[inline]
    fn ensure_chunk(&mut self, chunk: usize) {
        while self.chunks.len() <= chunk {
            self.chunks.push(Box::new([0u8; CHUNK]));
        }
    }

    /// Reads `out.len()` bytes starting at `cursor` and advances it.
    ///
    /// Precondition: at least `out.len()` bytes lie between `cursor` and
    /// `self.write`.
    fn read_into(&self, cursor: &mut Cursor, out: &mut [u8]) {
        debug_assert!(Self::diff(self.write, *cursor) as usize >= out.len());

        let mut written = 0;
        let mut at = *cursor;
        while written < out.len() {
            let available = CHUNK - at.offset;
            let take = available.min(out.len() - written);
            out[written..written + take]
                .copy_from_slice(&self.chunks[at.chunk][at.offset..at.offset + take]);
            written += take;
            at = self.advance(at, take);
        }
        *cursor = at;
    }

    /// Writes `data` starting at `cursor`, growing into new chunks on
    /// demand, and advances `cursor`.
    pub fn write(&mut self, cursor: &mut Cursor, data: &[u8]) {
        let mut written = 0;
        let mut at = *cursor;
        while written < data.len() {
            self.ensure_chunk(at.chunk);
            let available = CHUNK - at.offset;
            let take = available.min(data.len() - written);
            self.chunks[at.chunk][at.offset..at.offset + take]
                .copy_from_slice(&data[written..written + take]);
            written += take;
            at = self.advance(at, take);
        }
        *cursor = at;
        if at.absolute() > self.write.absolute() {
            self.write = at;
        }
    }

    /// Bulk copy of `n` bytes from `src` in `self` to `dst` in `other`,
    /// rolling both cursors and growing `other` on demand.
    pub fn copy(&self, src: &mut Cursor, other: &mut Buffer, dst: &mut Cursor, n: usize) {
        debug_assert!(Self::diff(self.write, *src) as usize >= n);

        let mut remaining = n;
        let mut at = *src;
        let mut to = *dst;
        while remaining > 0 {
            other.ensure_chunk(to.chunk);
            let src_available = CHUNK - at.offset;
            let dst_available = CHUNK - to.offset;
            let take = remaining.min(src_available).min(dst_available);

            let bytes = self.chunks[at.chunk][at.offset..at.offset + take].to_vec();
            other.chunks[to.chunk][to.offset..to.offset + take].copy_from_slice(&bytes);

            remaining -= take;
            at = self.advance(at, take);
            to = other.advance(to, take);
        }
        *src = at;
        *dst = to;
        if to.absolute() > other.write.absolute() {
            other.write = to;
        }
    }

    scalar_rw!(read_u8, write_u8, u8, 1);
    scalar_rw!(read_u16, write_u16, u16, 2);
    scalar_rw!(read_u32, write_u32, u32, 4);
    scalar_rw!(read_u64, write_u64, u64, 8);

    /// Non-blocking drain of `socket` into `self.write`. Returns `Ok(true)`
    /// while the peer is healthy (the socket would now block), `Ok(false)`
    /// on a clean EOF that arrived before any bytes were read this call, and
    /// `Err` on a genuine I/O error. Allocates a new chunk when the current
    /// one fills and keeps reading; stops when the socket would block.
    pub fn fill_from_socket<R: Read>(&mut self, socket: &mut R) -> BoltResult<bool> {
        let mut read_any = false;
        loop {
            self.ensure_chunk(self.write.chunk);
            let offset = self.write.offset;
            let result = socket.read(&mut self.chunks[self.write.chunk][offset..]);
            match result {
                Ok(0) => return Ok(read_any),
                Ok(n) => {
                    read_any = true;
                    self.write = self.advance(self.write, n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(BoltError::from(e)),
            }
        }
    }

    /// Writes all bytes from the start of the buffer up to `cursor` to
    /// `socket`, blocking until fully written or an error occurs.
    pub fn drain_to_socket<W: Write>(&self, cursor: Cursor, socket: &mut W) -> BoltResult<()> {
        for chunk in &self.chunks[..cursor.chunk] {
            socket.write_all(&chunk[..])?;
        }
        socket.write_all(&self.chunks[cursor.chunk][..cursor.offset])?;
        Ok(())
    }

    /// XORs `len` bytes starting at `cursor` with a repeating 4-byte mask,
    /// in place. Used to unmask WebSocket frame payloads before they are
    /// treated as plain Bolt bytes.
    pub fn xor_mask(&mut self, cursor: Cursor, len: usize, mask: [u8; 4]) {
        let mut at = cursor;
        let mut i = 0usize;
        while i < len {
            let available = CHUNK - at.offset;
            let take = available.min(len - i);
            let chunk = &mut self.chunks[at.chunk][at.offset..at.offset + take];
            for (j, byte) in chunk.iter_mut().enumerate() {
                *byte ^= mask[(i + j) % 4];
            }
            i += take;
            at = self.advance(at, take);
        }
    }

    /// Rewinds both cursors to the start, keeping the allocated chunks for
    /// reuse by the next message.
    #[inline]
    pub fn reset(&mut self) {
        self.read = Cursor::default();
        self.write = Cursor::default();
    }

    /// Releases every chunk and returns the buffer to its freshly
    /// allocated state. Ordinary `Drop` already frees this memory when a
    /// buffer goes out of scope; `clear` exists for sessions that want to
    /// give memory back immediately without dropping the buffer itself
    /// (e.g. a connection idling between requests for a long time).
    pub fn clear(&mut self) {
        self.chunks.truncate(1);
        self.chunks[0] = Box::new([0u8; CHUNK]);
        self.read = Cursor::default();
        self.write = Cursor::default();
    }

    /// A read-only view of the raw bytes in chunk `index`, for tests and
    /// diagnostics.
    #[cfg(test)]
    fn chunk(&self, index: usize) -> &[u8; CHUNK] {
        &self.chunks[index]
    }

    /// A contiguous slice of `len` bytes starting at `cursor`, or `None` if
    /// that range crosses a chunk boundary. Only the WebSocket handshake
    /// parser needs contiguous bytes (to hand to `httparse`); everything
    /// else in this crate reads through cursors and tolerates rollover.
    pub(crate) fn contiguous(&self, cursor: Cursor, len: usize) -> Option<&[u8]> {
        if cursor.offset + len > CHUNK {
            return None;
        }
        self.chunks
            .get(cursor.chunk)
            .map(|chunk| &chunk[cursor.offset..cursor.offset + len])
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}
