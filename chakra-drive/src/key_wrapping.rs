//! Wrapping per-file secret keys through the threshold network.
//!
//! The secret key is base64-encoded and encrypted by the network under a
//! condition naming the owner's wallet and one policy revision. Unwrapping
//! runs that revision's program with a signed decryption proof; the program
//! either releases the base64 key or answers with a failure object.

use crate::connection::SharedNetwork;
use crate::error::{DriveError, DriveResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use chakra_crypto::{FileKeyPair, SiwsObject, WrappedKeyRecord};
use chakra_policy::{
    conditions_to_decrypt, EncryptRequest, ExecuteJsRequest, FailureCause, PolicyFailure,
    PolicyParams, PolicyVersion, ProgramRegistry, SessionSigsMap,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct KeyWrappingClient {
    network: Arc<SharedNetwork>,
    registry: Arc<ProgramRegistry>,
}

impl KeyWrappingClient {
    pub fn new(network: Arc<SharedNetwork>, registry: Arc<ProgramRegistry>) -> Self {
        Self { network, registry }
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    /// Wraps `keypair`'s secret so only `owner` can recover it under `version`.
    pub async fn wrap_key(
        &self,
        keypair: &FileKeyPair,
        owner: &str,
        version: PolicyVersion,
    ) -> DriveResult<WrappedKeyRecord> {
        let conditions = conditions_to_decrypt(owner, version, &self.registry)?;
        let encoded = STANDARD.encode(keypair.secret_bytes());

        let network = self.network.get().await?;
        let record = network
            .encrypt(EncryptRequest {
                data_to_encrypt: encoded.into_bytes(),
                sol_rpc_conditions: conditions,
            })
            .await?;

        debug!("wrapped file key for {owner} under policy {version}");
        Ok(record)
    }

    /// Runs `version`'s policy program to recover the keypair behind `record`.
    pub async fn unwrap_key(
        &self,
        owner: &str,
        record: &WrappedKeyRecord,
        session_sigs: SessionSigsMap,
        siws_object: &SiwsObject,
        version: PolicyVersion,
    ) -> DriveResult<FileKeyPair> {
        let conditions = conditions_to_decrypt(owner, version, &self.registry)?;
        let request = ExecuteJsRequest {
            code: self.registry.source(version)?.to_string(),
            session_sigs,
            js_params: PolicyParams {
                siws_object: serde_json::to_string(siws_object)?,
                sol_rpc_conditions: conditions,
                ciphertext: record.ciphertext.clone(),
                data_to_encrypt_hash: record.data_to_encrypt_hash.clone(),
            },
        };

        let network = self.network.get().await?;
        let response = network.execute_js(request).await?;

        if let Some(failure) = PolicyFailure::from_response(&response.response) {
            warn!(
                "policy {version} refused to release key ({:?}): {}",
                failure.cause, failure.message
            );
            return Err(policy_failure_error(failure));
        }
        if !response.success {
            return Err(DriveError::Network("policy execution failed".into()));
        }

        let secret = STANDARD
            .decode(response.response.trim())
            .map_err(|e| DriveError::Decryption(format!("released key is not base64: {e}")))?;
        FileKeyPair::from_secret_slice(&secret).map_err(|e| DriveError::Decryption(e.to_string()))
    }
}

fn policy_failure_error(failure: PolicyFailure) -> DriveError {
    match failure.cause {
        FailureCause::Denied => DriveError::PolicyDenied {
            message: failure.message,
            error: failure.error,
        },
        FailureCause::Malformed => {
            DriveError::MalformedSiws(failure.error.unwrap_or(failure.message))
        }
        FailureCause::Unavailable => DriveError::PolicyUnavailable {
            message: failure.message,
            error: failure.error,
        },
    }
}
