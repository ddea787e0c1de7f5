//! Client-side cache of signed sign-in proofs.
//!
//! Entries are keyed by the hash of the bearer token they were signed under,
//! so switching accounts never reuses another account's proof.

use crate::error::{DriveError, DriveResult};
use async_trait::async_trait;
use chakra_crypto::StoredSiwsObject;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait SiwsCache: Send + Sync {
    async fn load(&self, key: &str) -> DriveResult<Option<StoredSiwsObject>>;

    async fn store(&self, key: &str, object: StoredSiwsObject) -> DriveResult<()>;
}

#[derive(Debug, Default)]
pub struct MemorySiwsCache {
    entries: RwLock<HashMap<String, StoredSiwsObject>>,
}

impl MemorySiwsCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiwsCache for MemorySiwsCache {
    async fn load(&self, key: &str) -> DriveResult<Option<StoredSiwsObject>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store(&self, key: &str, object: StoredSiwsObject) -> DriveResult<()> {
        self.entries.write().await.insert(key.to_string(), object);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileSiwsCache {
    dir: PathBuf,
}

impl FileSiwsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> DriveResult<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DriveError::Config(format!("invalid cache key: {key:?}")));
        }
        Ok(self.dir.join(format!("siws-{key}.json")))
    }
}

#[async_trait]
impl SiwsCache for FileSiwsCache {
    async fn load(&self, key: &str) -> DriveResult<Option<StoredSiwsObject>> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(object) => Ok(Some(object)),
            Err(e) => {
                // Treated as a miss; the next signature overwrites it.
                warn!("discarding unreadable sign-in cache {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &str, object: StoredSiwsObject) -> DriveResult<()> {
        let path = self.path_for(key)?;
        let dir = self.dir.clone();
        let bytes = serde_json::to_vec(&object)?;
        tokio::fs::create_dir_all(&dir).await?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> DriveResult<()> {
            // Each write gets its own temp file; the rename is the only shared step.
            let mut tmp = tempfile::Builder::new()
                .prefix(".siws-")
                .suffix(".tmp")
                .tempfile_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target).map_err(|e| DriveError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| DriveError::Io(std::io::Error::other(e)))??;

        debug!("cached sign-in proof at {}", path.display());
        Ok(())
    }
}
