//! Registry of issued bearer-token hashes.
//!
//! The server records `(sha256(token), public_key)` at login. Revision 2 of
//! the decryption policy requires a proof's nonce to be such a hash, tying
//! every decryption to a live login. Records are pruned after a retention
//! period.

use crate::siws::token_hash;
use async_trait::async_trait;
use chakra_policy::{NonceRegistry, PolicyResult};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

/// Records older than this are pruned (two days).
pub const DEFAULT_RETENTION_SECS: i64 = 2 * 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq)]
struct HashRecord {
    hash: String,
    public_key: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct JwtHashRegistry {
    records: RwLock<Vec<HashRecord>>,
}

impl JwtHashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_retention() -> Duration {
        Duration::seconds(DEFAULT_RETENTION_SECS)
    }

    /// Records a freshly issued token and returns its hash.
    pub async fn record(&self, token: &str, public_key: &str) -> String {
        let hash = token_hash(token);
        self.record_hash(&hash, public_key, Utc::now()).await;
        hash
    }

    pub async fn record_hash(&self, hash: &str, public_key: &str, created_at: DateTime<Utc>) {
        self.records.write().await.push(HashRecord {
            hash: hash.to_string(),
            public_key: public_key.to_string(),
            created_at,
        });
    }

    pub async fn contains(&self, hash: &str, public_key: &str) -> bool {
        self.records
            .read()
            .await
            .iter()
            .any(|r| r.hash == hash && r.public_key == public_key)
    }

    /// Drops records created before `now - max_age`; returns how many.
    pub async fn prune_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - max_age;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.created_at >= cutoff);
        let removed = before - records.len();
        if removed > 0 {
            debug!("pruned {removed} token hashes older than {cutoff}");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl NonceRegistry for JwtHashRegistry {
    async fn verify_hash(&self, hash: &str, public_key: &str) -> PolicyResult<bool> {
        Ok(self.contains(hash, public_key).await)
    }
}
