//! Decryption policy programs.
//!
//! A policy program runs inside the threshold network's sandbox. It checks a
//! signed SIWS proof and, only if every check passes, asks the sandbox to
//! decrypt the wrapped key. Every step fails closed: the first failed check
//! ends the run with a [`PolicyFailure`] response and nothing is released.
//!
//! | step | check                                   | v0 | v1 | v2 |
//! |------|-----------------------------------------|----|----|----|
//! | 1    | nonce registered for `(nonce, address)` |    |    | x  |
//! | 2    | statement is the decryption sentinel    | x  | x  | x  |
//! | 3    | `issuedAt` within the last 24h          | x  | x  | x  |
//! | 4    | `expirationTime` check (see below)      | x  | x  | x  |
//! | 5    | canonical domain and uri                | x  | x  | x  |
//! | 6    | ed25519 signature over rebuilt message  | x  | x  | x  |
//! | 7    | `decryptAndCombine` with a Solana authSig | x | x | x  |
//!
//! Step 4 rejects a proof whose `expirationTime` is at or after the current
//! time. Deployed ciphertexts depend on this exact behavior, so it is kept.

mod steps;
mod v0;
mod v1;
mod v2;

pub use v0::SiwsPolicyV0;
pub use v1::SiwsPolicyV1;
pub use v2::SiwsPolicyV2;

use crate::conditions::SolRpcConditions;
use crate::error::PolicyResult;
use crate::registry::PolicyVersion;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters a program receives (`jsParams` on the wire).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyParams {
    /// JSON-encoded [`chakra_crypto::SiwsObject`].
    pub siws_object: String,
    pub sol_rpc_conditions: SolRpcConditions,
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
}

/// Wallet signature presented to the network's decrypt primitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    /// Hex-encoded ed25519 signature.
    pub sig: String,
    pub derived_via: String,
    pub signed_message: String,
    /// Base58 wallet address.
    pub address: String,
}

/// Arguments to the sandbox's `decryptAndCombine` primitive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptAndCombineRequest {
    pub access_control_conditions: SolRpcConditions,
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
    pub auth_sig: AuthSig,
    pub chain: String,
}

/// Why a program refused to release the key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureCause {
    /// The proof was checked and rejected.
    #[default]
    Denied,
    /// The submitted proof could not be read.
    Malformed,
    /// A collaborator the program depends on could not answer.
    Unavailable,
}

impl FailureCause {
    fn is_denied(&self) -> bool {
        *self == FailureCause::Denied
    }
}

/// Structured rejection reported by a program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFailure {
    /// Always `false`; kept on the wire so callers can sniff the response.
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Omitted for plain denials, which keeps those responses in the
    /// deployed `{success, message, error?}` shape.
    #[serde(default, skip_serializing_if = "FailureCause::is_denied")]
    pub cause: FailureCause,
}

impl PolicyFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: None,
            cause: FailureCause::Denied,
        }
    }

    pub fn with_error(message: impl Into<String>, error: impl ToString) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.to_string()),
            cause: FailureCause::Denied,
        }
    }

    pub fn with_cause(mut self, cause: FailureCause) -> Self {
        self.cause = cause;
        self
    }

    /// Recognizes a failure object in a program response.
    pub fn from_response(response: &str) -> Option<Self> {
        serde_json::from_str::<Self>(response)
            .ok()
            .filter(|f| !f.success)
    }
}

/// Terminal state of one program run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// Decrypted payload (the base64 secret key).
    Released(String),
    Denied(PolicyFailure),
}

impl PolicyOutcome {
    /// Response string the sandbox hands back to the caller.
    pub fn into_response(self) -> String {
        match self {
            PolicyOutcome::Released(plaintext) => plaintext,
            PolicyOutcome::Denied(failure) => serde_json::to_string(&failure)
                .unwrap_or_else(|_| r#"{"success":false,"message":"unserializable failure"}"#.into()),
        }
    }
}

/// Primitives the sandbox exposes to a running program.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Looks up `(hash, public_key)` in the server's nonce registry.
    async fn verify_nonce(&self, hash: &str, public_key: &str) -> PolicyResult<bool>;

    /// Evaluates the conditions and, if they hold, decrypts the ciphertext.
    async fn decrypt_and_combine(&self, request: DecryptAndCombineRequest) -> PolicyResult<String>;
}

/// One deployed program revision.
#[async_trait]
pub trait PolicyValidator: Send + Sync {
    fn version(&self) -> PolicyVersion;

    /// Runs every check in order and returns the released plaintext.
    async fn evaluate(
        &self,
        params: &PolicyParams,
        runtime: &dyn SandboxRuntime,
    ) -> Result<String, PolicyFailure>;
}

/// Runs a validator to a terminal outcome.
pub async fn run_policy(
    validator: &dyn PolicyValidator,
    params: &PolicyParams,
    runtime: &dyn SandboxRuntime,
) -> PolicyOutcome {
    match validator.evaluate(params, runtime).await {
        Ok(plaintext) => {
            debug!("policy {} released key", validator.version());
            PolicyOutcome::Released(plaintext)
        }
        Err(failure) => {
            debug!("policy {} denied: {}", validator.version(), failure.message);
            PolicyOutcome::Denied(failure)
        }
    }
}
