//! Wire encoding of order commands.
//!
//! Commands travel as JSON objects. Fields are matched by name, so producers
//! and consumers that agree on field names interoperate regardless of field
//! order. Decoding is pure and never panics on arbitrary input.

use bytes::Bytes;

use crate::error::CodecError;
use crate::models::OrderCommand;

/// Encode a command into its wire representation.
pub fn encode(command: &OrderCommand) -> Result<Bytes, CodecError> {
    serde_json::to_vec(command)
        .map(Bytes::from)
        .map_err(CodecError::Encoding)
}

/// Decode a command from its wire representation.
///
/// Fails on truncated input, wrong field types, missing fields, or input
/// that is not a JSON object at all.
pub fn decode(bytes: &[u8]) -> Result<OrderCommand, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decoding)
}
