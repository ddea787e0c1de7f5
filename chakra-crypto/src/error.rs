//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the file crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid base58 input: {0}")]
    Base58(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("content id error: {0}")]
    ContentId(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
