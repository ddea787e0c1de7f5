//! Drive client error types.

use chakra_crypto::CryptoError;
use chakra_policy::PolicyError;
use thiserror::Error;

/// Result type for drive operations.
pub type DriveResult<T> = Result<T, DriveError>;

/// Broad class of a failure, for deciding what to show the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The user must prove wallet ownership again.
    Authentication,
    /// The proof was checked and refused, or the ciphertext did not open.
    AccessDenied,
    /// Input could not be parsed.
    Malformed,
    /// A remote collaborator failed or was unreachable.
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("wallet signature required: {0}")]
    SignInRequired(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("policy denied decryption: {message}")]
    PolicyDenied {
        message: String,
        error: Option<String>,
    },

    #[error("policy could not run to a decision: {message}")]
    PolicyUnavailable {
        message: String,
        error: Option<String>,
    },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("malformed sign-in message: {0}")]
    MalformedSiws(String),

    #[error("unsupported private version: {0}")]
    UnsupportedVersion(u32),

    #[error("session signatures unavailable after {attempts} attempts: {last_error}")]
    SessionSigs { attempts: u32, last_error: String },

    #[error("threshold network error: {0}")]
    Network(String),

    #[error("API request failed: {0}")]
    Api(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DriveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DriveError::AuthRequired
            | DriveError::AuthenticationFailed(_)
            | DriveError::SignInRequired(_) => FailureKind::Authentication,
            DriveError::Decryption(_) | DriveError::PolicyDenied { .. } => {
                FailureKind::AccessDenied
            }
            DriveError::MalformedEnvelope(_)
            | DriveError::MalformedSiws(_)
            | DriveError::UnsupportedVersion(_)
            | DriveError::Serialization(_)
            | DriveError::Crypto(_) => FailureKind::Malformed,
            DriveError::SessionSigs { .. }
            | DriveError::PolicyUnavailable { .. }
            | DriveError::Network(_)
            | DriveError::Api(_)
            | DriveError::NotFound(_)
            | DriveError::Http(_)
            | DriveError::Io(_)
            | DriveError::Config(_) => FailureKind::Infrastructure,
        }
    }

    /// "Please sign again" rather than "this file could not be decrypted".
    pub fn requires_signature(&self) -> bool {
        self.kind() == FailureKind::Authentication
    }

    pub fn is_access_denied(&self) -> bool {
        self.kind() == FailureKind::AccessDenied
    }
}

impl From<CryptoError> for DriveError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption(msg) => DriveError::Decryption(msg),
            CryptoError::MalformedEnvelope(msg) => DriveError::MalformedEnvelope(msg),
            CryptoError::Serialization(e) => DriveError::Serialization(e),
            other => DriveError::Crypto(other),
        }
    }
}

impl From<PolicyError> for DriveError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::UnsupportedVersion(v) => DriveError::UnsupportedVersion(v),
            PolicyError::Crypto(e) => e.into(),
            PolicyError::Serialization(e) => DriveError::Serialization(e),
            other => DriveError::Network(other.to_string()),
        }
    }
}
