//! Policy and threshold network error types.

use crate::registry::PolicyVersion;
use chakra_crypto::CryptoError;
use thiserror::Error;

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors raised outside a running policy program.
///
/// A program that rejects a request does not error; it reports a
/// [`crate::PolicyFailure`] as its response.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unsupported policy version: {0}")]
    UnsupportedVersion(u32),

    #[error("no registered policy program has content id {0}")]
    UnknownProgram(String),

    #[error("policy {version} content id drifted: pinned {pinned}, computed {computed}")]
    PinMismatch {
        version: PolicyVersion,
        pinned: String,
        computed: String,
    },

    #[error("threshold network client is not connected")]
    NotConnected,

    #[error("threshold network error: {0}")]
    Network(String),

    #[error("session signatures rejected: {0}")]
    SessionSigs(String),

    #[error("access control conditions not satisfied")]
    ConditionsNotMet,

    #[error("invalid auth signature: {0}")]
    InvalidAuthSig(String),

    #[error("nonce registry error: {0}")]
    NonceRegistry(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
