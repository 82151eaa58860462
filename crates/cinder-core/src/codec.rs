//! Canonical binary encoding.
//!
//! One encoding for storage and wire: bincode with the standard
//! configuration, driven through serde so that every consensus type has a
//! single deterministic byte form. Two equal values always encode to equal
//! bytes, and `decode(encode(x)) == x`.
//!
//! Hashing does **not** go through this module; the hash-for-header and
//! hash-for-signing forms use explicit fixed byte layouts (see
//! [`types`](crate::types)) so digests stay independent of non-consensus
//! fields by construction.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Encode a value into its canonical byte form.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value from its canonical byte form.
///
/// Trailing bytes after the encoded value are rejected.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, consumed) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
    if consumed != bytes.len() {
        return Err(CodecError::Decode(format!(
            "trailing bytes: consumed {consumed} of {}",
            bytes.len()
        )));
    }
    Ok(value)
}
