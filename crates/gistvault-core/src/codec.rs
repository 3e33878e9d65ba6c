//! Base-58 text encoding.
//!
//! Nonces, ciphertexts, hashes, and keys are all persisted and shared as
//! base-58 (Bitcoin alphabet): no padding, no `/` or `+`, so the output is
//! safe in filenames and URL fragments.
//!
//! Whole files (settings, shards) are JSON, written tab-indented.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::CodecError;

/// Encode bytes as base-58.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode base-58 text.
///
/// # Errors
///
/// Returns [`CodecError::InvalidBase58`] if `text` contains characters
/// outside the alphabet.
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    bs58::decode(text)
        .into_vec()
        .map_err(|e| CodecError::InvalidBase58 {
            reason: e.to_string(),
        })
}

/// Decode base-58 text that must hold exactly `N` bytes.
///
/// # Errors
///
/// Returns [`CodecError::InvalidBase58`] for bad input and
/// [`CodecError::Length`] if the decoded length is not `N`.
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], CodecError> {
    let bytes = decode(text)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CodecError::Length {
        expected: N,
        actual,
    })
}

/// Serialize `value` as tab-indented JSON, the layout of every file the
/// vault writes.
///
/// # Errors
///
/// Returns the `serde_json` error if `value` cannot be serialized.
pub fn to_file_json<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
