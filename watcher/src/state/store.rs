//! Persisted deployment state and the in-memory failure ledger
//!
//! Marker writes are best-effort: losing one only degrades
//! crash-recovery fidelity, so failures are logged and swallowed
//! rather than aborting the deployment in progress.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::fs;
use tracing::warn;

use crate::storage::layout::StorageLayout;

/// A deployment that was in flight when a previous process instance
/// last ran, outcome unknown to this instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub id: String,
    pub version: String,
}

/// Durable last-applied/pending markers plus the per-process
/// consecutive-failure counters.
pub struct StateStore {
    layout: StorageLayout,
    failures: Mutex<HashMap<String, u32>>,
}

impl StateStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Id of the most recently successfully applied deployment
    pub async fn last_deployed_id(&self) -> Option<String> {
        match fs::read_to_string(self.layout.last_deployed_file()).await {
            Ok(contents) => {
                let id = contents.trim().to_string();
                if id.is_empty() {
                    None
                } else {
                    Some(id)
                }
            }
            Err(_) => None,
        }
    }

    /// Record a verified success. Written only after the apply step
    /// (or startup recovery) has concluded the deployment landed.
    pub async fn set_last_deployed_id(&self, deployment_id: &str) {
        if let Err(e) = fs::write(self.layout.last_deployed_file(), deployment_id).await {
            warn!("Could not write deployment tracking file: {}", e);
        }
    }

    /// Write the pending marker before invoking the deploy script.
    ///
    /// If this process is restarted during the script run, the next
    /// instance uses the marker to report the outcome on our behalf.
    pub async fn set_pending(&self, deployment_id: &str, version: &str) {
        let contents = format!("{}:{}", deployment_id, version);
        if let Err(e) = fs::write(self.layout.pending_file(), contents).await {
            warn!("Could not write pending marker: {}", e);
        }
    }

    /// Read the pending marker, if any
    pub async fn pending(&self) -> Option<PendingDeployment> {
        let contents = fs::read_to_string(self.layout.pending_file()).await.ok()?;
        let (id, version) = contents.trim().split_once(':')?;
        if id.is_empty() {
            return None;
        }
        Some(PendingDeployment {
            id: id.to_string(),
            version: version.to_string(),
        })
    }

    /// Remove the pending marker
    pub async fn clear_pending(&self) {
        match fs::remove_file(self.layout.pending_file()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove pending marker: {}", e),
        }
    }

    /// Increment the consecutive-failure count for an id, returning
    /// the new count.
    pub fn record_failure(&self, deployment_id: &str) -> u32 {
        let mut failures = self.failures.lock().unwrap();
        let count = failures.entry(deployment_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Current failure count for an id (0 if never failed)
    pub fn failure_count(&self, deployment_id: &str) -> u32 {
        self.failures
            .lock()
            .unwrap()
            .get(deployment_id)
            .copied()
            .unwrap_or(0)
    }

    /// Forget the failure history for an id, called on success
    pub fn clear_failures(&self, deployment_id: &str) {
        self.failures.lock().unwrap().remove(deployment_id);
    }
}
