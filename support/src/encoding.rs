//! Small encoding helpers shared by the session layer. Mirrors the
//! `crate::encoding::base64` module that `flux::session` pulls in.

pub mod base64 {
    use serde::{Deserializer, Serializer};

    #[inline]
    pub fn encode<T: AsRef<[u8]>>(input: T) -> String {
        base64::encode(input)
    }

    #[inline]
    pub fn decode<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, base64::DecodeError> {
        base64::decode(input)
    }

    /// `serde` adapter for fields stored as base64 strings on the wire.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    #[inline]
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        use serde::Deserialize;
        let s = <&str>::deserialize(deserializer)?;
        decode(s).map_err(serde::de::Error::custom)
    }
}

/// The GUID RFC 6455 mandates be appended to the client's `Sec-WebSocket-Key`
/// before hashing to produce `Sec-WebSocket-Accept`.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the `Sec-WebSocket-Accept` header value for a given
/// `Sec-WebSocket-Key` request header, per RFC 6455 section 1.3.
pub fn websocket_accept(client_key: &str) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();

    base64::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip() {
        let data = b"bolt session layer";
        let encoded = base64::encode(data);
        assert_eq!(base64::decode(&encoded).unwrap(), data);
    }

    #[test]
    fn websocket_accept_matches_rfc6455_example() {
        // The example key/accept pair from RFC 6455 section 1.3.
        let accept = websocket_accept("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }
}
