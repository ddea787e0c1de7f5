//! Threshold network interface.
//!
//! The network holds the key material that wraps per-file secret keys. It
//! encrypts freely, but only decrypts from inside a pinned policy program
//! whose access conditions hold. Callers authenticate to it with session
//! signatures minted by a capacity holder (the Chakra Drive server).

use crate::conditions::SolRpcConditions;
use crate::error::PolicyResult;
use crate::program::PolicyParams;
use async_trait::async_trait;
use chakra_crypto::WrappedKeyRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wildcard resource covering every access-control-condition decryption.
pub const ACC_DECRYPTION_RESOURCE: &str = "lit-accesscontrolcondition://*";
pub const ACC_DECRYPTION_ABILITY: &str = "access-control-condition-decryption";

/// Wildcard resource covering every program execution.
pub const ACTION_EXECUTION_RESOURCE: &str = "lit-litaction://*";
pub const ACTION_EXECUTION_ABILITY: &str = "lit-action-execution";

/// `derivedVia` tag on session signatures.
pub const SESSION_SIG_DERIVED_VIA: &str = "litSessionSignViaNacl";

/// One capability a session is allowed to exercise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAbilityRequest {
    pub resource: String,
    pub ability: String,
}

impl ResourceAbilityRequest {
    pub fn access_control_decryption() -> Self {
        Self {
            resource: ACC_DECRYPTION_RESOURCE.to_string(),
            ability: ACC_DECRYPTION_ABILITY.to_string(),
        }
    }

    pub fn action_execution() -> Self {
        Self {
            resource: ACTION_EXECUTION_RESOURCE.to_string(),
            ability: ACTION_EXECUTION_ABILITY.to_string(),
        }
    }

    /// The two capabilities needed to run a policy program that decrypts.
    pub fn decryption_set() -> Vec<Self> {
        vec![Self::access_control_decryption(), Self::action_execution()]
    }
}

/// Request for a fresh set of session signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSigRequest {
    /// Session key the signatures delegate to.
    pub public_key: String,
    pub expiration: DateTime<Utc>,
    pub resource_ability_requests: Vec<ResourceAbilityRequest>,
}

/// Signed capability grant for one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSig {
    pub sig: String,
    pub derived_via: String,
    /// JSON-encoded [`SessionCapability`].
    pub signed_message: String,
    pub address: String,
    pub algo: String,
}

/// Session signatures keyed by node URL.
pub type SessionSigsMap = BTreeMap<String, SessionSig>;

/// Payload a session signature commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCapability {
    pub session_key: String,
    pub node_url: String,
    pub issued_at: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub resource_ability_requests: Vec<ResourceAbilityRequest>,
}

impl SessionCapability {
    pub fn allows(&self, ability: &str) -> bool {
        self.resource_ability_requests
            .iter()
            .any(|r| r.ability == ability)
    }
}

/// Data to wrap under an access condition.
#[derive(Clone, Debug)]
pub struct EncryptRequest {
    pub data_to_encrypt: Vec<u8>,
    pub sol_rpc_conditions: SolRpcConditions,
}

/// A program submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteJsRequest {
    /// Program source text; identified by content id, never trusted by name.
    pub code: String,
    pub session_sigs: SessionSigsMap,
    pub js_params: PolicyParams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteJsResponse {
    pub success: bool,
    /// Released plaintext, or a JSON [`crate::PolicyFailure`].
    pub response: String,
}

/// Client view of the threshold network.
#[async_trait]
pub trait ThresholdNetwork: Send + Sync {
    /// Performs the handshake. Calling it again on a connected client is a no-op.
    async fn connect(&self) -> PolicyResult<()>;

    fn is_connected(&self) -> bool;

    /// Wraps `data_to_encrypt` so only a run satisfying the conditions can
    /// recover it.
    async fn encrypt(&self, request: EncryptRequest) -> PolicyResult<WrappedKeyRecord>;

    /// Runs a policy program with the given parameters.
    async fn execute_js(&self, request: ExecuteJsRequest) -> PolicyResult<ExecuteJsResponse>;
}

/// Server-side registry of issued bearer-token hashes.
#[async_trait]
pub trait NonceRegistry: Send + Sync {
    /// Whether `hash` was issued to `public_key` and is still retained.
    async fn verify_hash(&self, hash: &str, public_key: &str) -> PolicyResult<bool>;
}
