//! Drive client configuration.

use crate::error::{DriveError, DriveResult};
use chakra_policy::constants::{CANONICAL_DOMAIN, CANONICAL_URI, SOLANA_MAINNET_CHAIN};
use chakra_policy::PolicyVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the drive client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Base URL for the Chakra Drive API (e.g., "https://drive.chakra.network").
    pub api_base_url: String,

    /// Domain written into sign-in messages.
    pub domain: String,

    /// URI written into sign-in messages.
    pub uri: String,

    pub chain_id: String,

    /// Policy revision new uploads are encrypted against.
    pub current_private_version: u32,

    /// How long a cached sign-in proof is reused (seconds).
    pub siws_freshness_secs: i64,

    /// Proofs issued before this instant (unix millis) are always re-signed.
    pub siws_cutoff_millis: i64,

    pub session_sig_max_attempts: u32,

    pub session_sig_retry_delay_ms: u64,

    /// Lifetime of minted session signatures (seconds).
    pub session_ttl_secs: i64,

    pub request_timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: CANONICAL_URI.to_string(),
            domain: CANONICAL_DOMAIN.to_string(),
            uri: CANONICAL_URI.to_string(),
            chain_id: SOLANA_MAINNET_CHAIN.to_string(),
            current_private_version: PolicyVersion::CURRENT.as_u32(),
            siws_freshness_secs: 60 * 60 * 24,
            siws_cutoff_millis: 1_729_280_711_000,
            session_sig_max_attempts: 5,
            session_sig_retry_delay_ms: 5_000,
            session_ttl_secs: 600,
            request_timeout_secs: 30,
        }
    }
}

/// Fixed-delay retry schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl DriveConfig {
    /// Default config talking to another API host.
    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            api_base_url: url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> DriveResult<()> {
        if self.api_base_url.is_empty() {
            return Err(DriveError::Config("api_base_url is empty".into()));
        }
        if self.session_sig_max_attempts == 0 {
            return Err(DriveError::Config(
                "session_sig_max_attempts must be at least 1".into(),
            ));
        }
        if self.siws_freshness_secs <= 0 {
            return Err(DriveError::Config(
                "siws_freshness_secs must be positive".into(),
            ));
        }
        if self.session_ttl_secs <= 0 {
            return Err(DriveError::Config("session_ttl_secs must be positive".into()));
        }
        self.siws_cutoff()?;
        self.current_version()?;
        Ok(())
    }

    pub fn session_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.session_sig_max_attempts,
            delay: Duration::from_millis(self.session_sig_retry_delay_ms),
        }
    }

    pub fn current_version(&self) -> DriveResult<PolicyVersion> {
        Ok(PolicyVersion::try_from(self.current_private_version)?)
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.siws_freshness_secs)
    }

    pub fn siws_cutoff(&self) -> DriveResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.siws_cutoff_millis).ok_or_else(|| {
            DriveError::Config(format!(
                "siws_cutoff_millis out of range: {}",
                self.siws_cutoff_millis
            ))
        })
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
