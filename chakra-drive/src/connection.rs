//! Lazily connected, process-wide threshold network handle.

use crate::error::DriveResult;
use chakra_policy::ThresholdNetwork;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Connects the wrapped network on first use.
///
/// Concurrent first callers share a single in-flight connect; a failed
/// connect leaves the cell empty so the next caller tries again.
pub struct SharedNetwork {
    network: Arc<dyn ThresholdNetwork>,
    connected: OnceCell<()>,
}

impl SharedNetwork {
    pub fn new(network: Arc<dyn ThresholdNetwork>) -> Self {
        Self {
            network,
            connected: OnceCell::new(),
        }
    }

    /// Returns the connected network, connecting if needed.
    pub async fn get(&self) -> DriveResult<&dyn ThresholdNetwork> {
        self.connected
            .get_or_try_init(|| async {
                debug!("connecting to threshold network");
                self.network.connect().await
            })
            .await?;
        Ok(self.network.as_ref())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.initialized()
    }
}
