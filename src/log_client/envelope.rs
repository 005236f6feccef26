//! Framing that carries a record key and publish time inside an Iggy payload.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! ┌─────────┬─────────────┬───────────┬──────────────────┬───────────┐
//! │ version │ key_len u16 │ key bytes │ timestamp i64 µs │ value ... │
//! └─────────┴─────────────┴───────────┴──────────────────┴───────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Current envelope version byte.
pub const ENVELOPE_VERSION: u8 = 1;

/// Largest key the envelope can frame.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

const TIMESTAMP_LEN: usize = 8;

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub key: Bytes,
    pub timestamp: DateTime<Utc>,
    pub value: Bytes,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("key of {0} bytes exceeds the {MAX_KEY_LEN} byte limit")]
    KeyTooLong(usize),

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    #[error("envelope truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Frame `key`, `timestamp` and `value` into a single payload.
pub fn encode(key: &[u8], timestamp: DateTime<Utc>, value: &[u8]) -> Result<Bytes, EnvelopeError> {
    let key_len = u16::try_from(key.len()).map_err(|_| EnvelopeError::KeyTooLong(key.len()))?;

    let mut buf = BytesMut::with_capacity(1 + 2 + key.len() + TIMESTAMP_LEN + value.len());
    buf.put_u8(ENVELOPE_VERSION);
    buf.put_u16(key_len);
    buf.put_slice(key);
    buf.put_i64(timestamp.timestamp_micros());
    buf.put_slice(value);
    Ok(buf.freeze())
}

/// Split a payload back into key, timestamp and value.
///
/// Key and value share the input buffer; nothing is copied.
pub fn decode(frame: Bytes) -> Result<Envelope, EnvelopeError> {
    let mut buf = frame;

    ensure_remaining(&buf, 1)?;
    let version = buf.get_u8();
    if version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(version));
    }

    ensure_remaining(&buf, 2)?;
    let key_len = usize::from(buf.get_u16());

    ensure_remaining(&buf, key_len + TIMESTAMP_LEN)?;
    let key = buf.split_to(key_len);
    let micros = buf.get_i64();
    let timestamp = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or(EnvelopeError::InvalidTimestamp(micros))?;

    Ok(Envelope {
        key,
        timestamp,
        value: buf,
    })
}

fn ensure_remaining(buf: &Bytes, needed: usize) -> Result<(), EnvelopeError> {
    if buf.remaining() < needed {
        return Err(EnvelopeError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn at(micros: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(micros).unwrap()
    }

    #[test]
    fn test_decode_restores_key_timestamp_and_value() {
        let ts = at(1_705_314_600_123_456);
        let frame = encode(b"order-1", ts, b"{\"price\":1}").unwrap();

        let envelope = decode(frame).unwrap();
        assert_eq!(envelope.key.as_ref(), b"order-1");
        assert_eq!(envelope.timestamp, ts);
        assert_eq!(envelope.value.as_ref(), b"{\"price\":1}");
    }

    #[test]
    fn test_layout_is_version_length_key_timestamp_value() {
        let frame = encode(b"ab", at(1), b"v").unwrap();

        assert_eq!(
            frame.as_ref(),
            &[1, 0, 2, b'a', b'b', 0, 0, 0, 0, 0, 0, 0, 1, b'v']
        );
    }

    #[test]
    fn test_empty_key_and_value_are_allowed() {
        let envelope = decode(encode(b"", at(0), b"").unwrap()).unwrap();

        assert!(envelope.key.is_empty());
        assert!(envelope.value.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized_key() {
        let key = vec![b'k'; MAX_KEY_LEN + 1];

        assert_eq!(
            encode(&key, at(0), b"v"),
            Err(EnvelopeError::KeyTooLong(MAX_KEY_LEN + 1))
        );
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let result = decode(Bytes::from_static(&[9, 0, 0]));
        assert_eq!(result, Err(EnvelopeError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_decode_rejects_truncated_frames() {
        let frame = encode(b"order-1", at(5), b"value").unwrap();

        // Anything shorter than header + key + timestamp must fail cleanly.
        for len in 0..(1 + 2 + 7 + TIMESTAMP_LEN) {
            let result = decode(frame.slice(..len));
            assert!(
                matches!(result, Err(EnvelopeError::Truncated { .. })),
                "length {len} should be truncated, got {result:?}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_plain_json_payload() {
        assert!(decode(Bytes::from_static(b"{\"price\":1}")).is_err());
    }
}
