//! Session signature acquisition.
//!
//! Minting can fail transiently (the capacity holder's chain RPC, node
//! availability), so acquisition retries on a fixed delay. This is the only
//! retried call in the download path.

use crate::api_client::DriveApiClient;
use crate::config::RetryPolicy;
use crate::error::{DriveError, DriveResult};
use async_trait::async_trait;
use chakra_policy::{
    LocalThresholdNetwork, ResourceAbilityRequest, SessionSigRequest, SessionSigsMap,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Something that can hand out session signatures for a wallet.
#[async_trait]
pub trait SessionSigSource: Send + Sync {
    async fn session_sigs(&self, public_key: &str) -> DriveResult<SessionSigsMap>;
}

#[async_trait]
impl SessionSigSource for DriveApiClient {
    async fn session_sigs(&self, public_key: &str) -> DriveResult<SessionSigsMap> {
        self.request_session_sigs(public_key).await
    }
}

/// Mints directly from an in-process network, as the server broker would.
pub struct LocalSessionBroker {
    network: Arc<LocalThresholdNetwork>,
    ttl: chrono::Duration,
}

impl LocalSessionBroker {
    pub fn new(network: Arc<LocalThresholdNetwork>, ttl: chrono::Duration) -> Self {
        Self { network, ttl }
    }
}

#[async_trait]
impl SessionSigSource for LocalSessionBroker {
    async fn session_sigs(&self, public_key: &str) -> DriveResult<SessionSigsMap> {
        let request = SessionSigRequest {
            public_key: public_key.to_string(),
            expiration: Utc::now() + self.ttl,
            resource_ability_requests: ResourceAbilityRequest::decryption_set(),
        };
        Ok(self.network.mint_session_sigs(&request)?)
    }
}

/// Requests session signatures, retrying with a fixed delay.
pub async fn acquire_session_sigs(
    source: &dyn SessionSigSource,
    public_key: &str,
    retry: RetryPolicy,
) -> DriveResult<SessionSigsMap> {
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=retry.max_attempts {
        match source.session_sigs(public_key).await {
            Ok(sigs) => {
                if attempt > 1 {
                    info!("session signatures acquired on attempt {attempt}");
                }
                return Ok(sigs);
            }
            Err(e) => {
                warn!(
                    "session signature attempt {attempt}/{} failed: {e}",
                    retry.max_attempts
                );
                last_error = e.to_string();
                if attempt < retry.max_attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }

    Err(DriveError::SessionSigs {
        attempts: retry.max_attempts,
        last_error,
    })
}
