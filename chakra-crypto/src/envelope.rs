//! Multipart envelope framing.
//!
//! An encrypted file is stored as a single byte stream:
//!
//! ```text
//! +----------------+----------------------------+---------------------------+
//! | len: u32 (BE)  | wrapped key record (JSON)  | nonce(24) || ciphertext   |
//! +----------------+----------------------------+---------------------------+
//! ```
//!
//! The length prefix is the exact byte length of the JSON record. There is no
//! checksum; a prefix that points past the end of the buffer is a corrupt
//! envelope.

use crate::error::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};

/// Width of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Secret-key ciphertext returned by the threshold network's encrypt call.
///
/// Opaque to this crate; only its JSON bytes are framed. Field order matches
/// the records already written by earlier clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyRecord {
    pub data_to_encrypt_hash: String,
    pub ciphertext: String,
}

impl WrappedKeyRecord {
    pub fn to_json_bytes(&self) -> CryptoResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("wrapped key record: {e}")))
    }
}

/// The two halves of a decoded envelope, borrowed from the input buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopeParts<'a> {
    pub wrapped_key_json: &'a [u8],
    pub encrypted_message: &'a [u8],
}

impl EnvelopeParts<'_> {
    /// Parses the wrapped key half as a [`WrappedKeyRecord`].
    pub fn wrapped_key(&self) -> CryptoResult<WrappedKeyRecord> {
        WrappedKeyRecord::from_json_bytes(self.wrapped_key_json)
    }
}

/// Writes `len(wrapped) || wrapped || encrypted`.
pub fn encode_envelope(wrapped_key_json: &[u8], encrypted_message: &[u8]) -> CryptoResult<Vec<u8>> {
    let len = u32::try_from(wrapped_key_json.len()).map_err(|_| {
        CryptoError::MalformedEnvelope(format!(
            "wrapped key record of {} bytes does not fit the length prefix",
            wrapped_key_json.len()
        ))
    })?;

    let mut out =
        Vec::with_capacity(LENGTH_PREFIX_SIZE + wrapped_key_json.len() + encrypted_message.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(wrapped_key_json);
    out.extend_from_slice(encrypted_message);
    Ok(out)
}

/// Splits an envelope back into its wrapped key record and encrypted message.
pub fn decode_envelope(bytes: &[u8]) -> CryptoResult<EnvelopeParts<'_>> {
    let (prefix, rest) = bytes
        .split_first_chunk::<LENGTH_PREFIX_SIZE>()
        .ok_or_else(|| {
            CryptoError::MalformedEnvelope(format!(
                "envelope of {} bytes is shorter than its length prefix",
                bytes.len()
            ))
        })?;

    let len = u32::from_be_bytes(*prefix) as usize;
    if len > rest.len() {
        return Err(CryptoError::MalformedEnvelope(format!(
            "length prefix {len} exceeds remaining {} bytes",
            rest.len()
        )));
    }

    let (wrapped_key_json, encrypted_message) = rest.split_at(len);
    Ok(EnvelopeParts {
        wrapped_key_json,
        encrypted_message,
    })
}

/// Frames a wrapped key record together with an encrypted file.
pub fn seal_envelope(record: &WrappedKeyRecord, encrypted_message: &[u8]) -> CryptoResult<Vec<u8>> {
    encode_envelope(&record.to_json_bytes()?, encrypted_message)
}
