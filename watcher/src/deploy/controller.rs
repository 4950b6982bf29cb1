//! Deployment orchestration
//!
//! Drives one notification through the full pipeline: validate,
//! dedup, attempt cap, config check, lock, download, apply, report.
//! Failures inside an attempt never escalate past this module.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cloud::config::CloudConfig;
use crate::deploy::applier::Applier;
use crate::errors::WatcherError;
use crate::fetch::retriever::Retriever;
use crate::models::deployment::{DeploymentNotification, DeploymentStatus};
use crate::report::StatusSink;
use crate::state::lock::LockManager;
use crate::state::store::StateStore;
use crate::storage::layout::StorageLayout;

/// Consecutive failures after which a deployment id is skipped for the
/// rest of this process's lifetime.
pub const MAX_DEPLOY_ATTEMPTS: u32 = 3;

/// Controller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Overall timeout for one archive download
    pub download_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            download_timeout: Duration::from_secs(300),
        }
    }
}

/// Orchestrates deployment attempts for one cloud session
pub struct Controller {
    layout: StorageLayout,
    store: Arc<StateStore>,
    lock: LockManager,
    config: Arc<RwLock<Option<CloudConfig>>>,
    reporter: Arc<dyn StatusSink>,
    retriever: Retriever,
}

impl Controller {
    pub fn new(
        options: &Options,
        layout: StorageLayout,
        store: Arc<StateStore>,
        lock: LockManager,
        config: Arc<RwLock<Option<CloudConfig>>>,
        reporter: Arc<dyn StatusSink>,
    ) -> Result<Self, WatcherError> {
        Ok(Self {
            layout,
            store,
            lock,
            config,
            reporter,
            retriever: Retriever::new(options.download_timeout)?,
        })
    }

    /// Handle one deployment notification payload.
    ///
    /// Each precondition short-circuits without side effects: an
    /// invalid payload, an already-applied id, an exhausted attempt
    /// budget, an incomplete cloud config or a busy lock all end the
    /// attempt before anything is downloaded or reported.
    pub async fn handle_notification(&self, payload: &[u8]) {
        let notification: DeploymentNotification = match serde_json::from_slice(payload) {
            Ok(n) => n,
            Err(e) => {
                warn!("Invalid deployment payload: {}", e);
                return;
            }
        };

        if !notification.is_valid() {
            warn!("Deployment payload missing required fields (id, sha256, downloadUrl)");
            return;
        }

        info!(
            "Deployment available: id={} version={} file={} size={}",
            notification.id, notification.version, notification.filename, notification.size
        );

        if self.store.last_deployed_id().await.as_deref() == Some(notification.id.as_str()) {
            info!("Deployment {} already applied, skipping", notification.id);
            return;
        }

        let attempts = self.store.failure_count(&notification.id);
        if attempts >= MAX_DEPLOY_ATTEMPTS {
            info!(
                "Deployment {} has failed {} times, giving up",
                notification.id, attempts
            );
            return;
        }

        let config = { self.config.read().await.clone() };
        let config = match config {
            Some(c) if c.can_download() => c,
            _ => {
                warn!("Cloud config incomplete (missing URL or API key), cannot download");
                return;
            }
        };

        // Scoped: released on every exit path below, including panics
        // unwinding out of the apply step.
        let _guard = match self.lock.acquire() {
            Some(guard) => guard,
            None => {
                info!("Another deployment is in progress, skipping");
                return;
            }
        };

        self.run_deployment(&notification, &config).await;
    }

    async fn run_deployment(&self, notification: &DeploymentNotification, config: &CloudConfig) {
        let id = &notification.id;
        let version = &notification.version;
        let url = config.download_url(&notification.download_url_path);

        info!("Downloading from {}", url);
        self.reporter
            .report(id, DeploymentStatus::Downloading, version, None)
            .await;

        let artifact = self.layout.download_file(id);

        let progress = {
            let reporter = self.reporter.clone();
            let id = id.clone();
            let version = version.clone();
            move |pct: u8| {
                let reporter = reporter.clone();
                let id = id.clone();
                let version = version.clone();
                async move {
                    reporter
                        .report(&id, DeploymentStatus::Downloading, &version, Some(pct))
                        .await;
                }
            }
        };

        let fetched = self
            .retriever
            .fetch(
                &url,
                &config.api_key,
                &notification.sha256,
                notification.size,
                &artifact,
                progress,
            )
            .await;

        if let Err(e) = fetched {
            let attempts = self.store.record_failure(id);
            warn!(
                "Download or verification failed ({}), attempt {}/{}, aborting deployment",
                e, attempts, MAX_DEPLOY_ATTEMPTS
            );
            self.reporter
                .report(id, DeploymentStatus::Failed, version, None)
                .await;
            return;
        }

        self.reporter
            .report(id, DeploymentStatus::Downloaded, version, None)
            .await;

        // The deploy script commonly restarts this service; the marker
        // lets the successor instance report the outcome on our behalf.
        self.store.set_pending(id, version).await;

        self.reporter
            .report(id, DeploymentStatus::Deploying, version, None)
            .await;

        let applied = Applier::apply(&artifact, &self.layout.destination_root).await;

        match tokio::fs::remove_file(&artifact).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove downloaded archive: {}", e),
        }

        match applied {
            Ok(()) => {
                self.store.clear_failures(id);
                self.store.set_last_deployed_id(id).await;
                self.store.clear_pending().await;
                info!("Deployment {} (v{}) completed successfully", id, version);
                self.reporter
                    .report(id, DeploymentStatus::Completed, version, None)
                    .await;
            }
            Err(e) => {
                self.store.record_failure(id);
                self.store.clear_pending().await;
                warn!(
                    "Deployment {} (v{}) failed during deploy script execution: {}",
                    id, version, e
                );
                self.reporter
                    .report(id, DeploymentStatus::Failed, version, None)
                    .await;
            }
        }
    }
}
