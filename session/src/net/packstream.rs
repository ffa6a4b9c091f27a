//! The sliver of PackStream this crate owns: writing the structure and map
//! markers that open a `SUCCESS`/`FAILURE`/`IGNORED`/`RECORD` reply. Field
//! values themselves (the driver-negotiated metadata map, query results,
//! and so on) are encoded by the query layer this crate hands off to;
//! framing only needs to emit the marker bytes that say "a structure with
//! one field follows" or "an empty map follows", and the tag byte
//! identifying an incoming request.

use crate::net::buffer::{Buffer, Cursor};

/// Tag bytes for the four reply structures this layer ever writes itself.
/// Field payloads for `Success`/`Failure`/`Record` are supplied by the
/// caller and appended after the marker.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReplyTag {
    Success = 0x70,
    Record = 0x71,
    Ignored = 0x7E,
    Failure = 0x7F,
}

/// Writes a PackStream structure header: `0xB0 | field_count` followed by
/// the tag byte. `field_count` must fit in 4 bits (PackStream structures
/// top out at 15 fields, and every Bolt reply has at most one).
pub fn write_structure_header(buf: &mut Buffer, cursor: &mut Cursor, tag: ReplyTag, field_count: u8) {
    debug_assert!(field_count <= 0x0F);
    buf.write_u8(cursor, 0xB0 | field_count);
    buf.write_u8(cursor, tag as u8);
}

/// Writes a PackStream map header for a map of `size` entries (0 to 15
/// entries, the common case for reply metadata; entries themselves are
/// written by the caller via the query layer's value encoder).
pub fn write_tiny_map_header(buf: &mut Buffer, cursor: &mut Cursor, size: u8) {
    debug_assert!(size <= 0x0F);
    buf.write_u8(cursor, 0xA0 | size);
}

/// Tag byte of an incoming request structure, read from `cursor` without
/// advancing the caller's view of the message past the structure marker —
/// `cursor` is advanced past both the marker and the tag, ready for the
/// query layer to decode whatever fields follow.
pub fn read_structure_tag(buf: &Buffer, cursor: &mut Cursor) -> u8 {
    let _marker = buf.read_u8(cursor);
    buf.read_u8(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_header_packs_field_count_into_the_marker() {
        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        let start = cursor;
        write_structure_header(&mut buf, &mut cursor, ReplyTag::Success, 1);
        assert_eq!(Buffer::diff(cursor, start), 2);

        let mut r = start;
        assert_eq!(buf.read_u8(&mut r), 0xB1);
        assert_eq!(buf.read_u8(&mut r), ReplyTag::Success as u8);
    }

    #[test]
    fn ignored_header_carries_zero_fields() {
        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        write_structure_header(&mut buf, &mut cursor, ReplyTag::Ignored, 0);

        let mut r = Cursor::default();
        assert_eq!(buf.read_u8(&mut r), 0xB0);
    }

    #[test]
    fn tiny_map_header_packs_size_into_the_marker() {
        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        write_tiny_map_header(&mut buf, &mut cursor, 3);

        let mut r = Cursor::default();
        assert_eq!(buf.read_u8(&mut r), 0xA3);
    }

    #[test]
    fn read_structure_tag_skips_the_marker_byte() {
        let mut buf = Buffer::new();
        let mut cursor = Cursor::default();
        write_structure_header(&mut buf, &mut cursor, ReplyTag::Record, 1);

        let mut r = Cursor::default();
        assert_eq!(read_structure_tag(&buf, &mut r), ReplyTag::Record as u8);
        assert_eq!(r, cursor);
    }
}
