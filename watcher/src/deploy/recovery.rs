//! Startup crash recovery
//!
//! The deploy script restarts the watcher service near the end of its
//! run, so the instance that started a deployment rarely lives to
//! report its outcome. The pending marker bridges that gap: a fresh
//! instance finding one assumes the script finished and reports
//! `completed` on the predecessor's behalf.
//!
//! This is optimistic. It cannot distinguish a finished script from
//! one that crashed midway before the OS restarted the service; that
//! limitation is accepted, not fixed here.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::models::deployment::DeploymentStatus;
use crate::report::StatusSink;
use crate::state::store::StateStore;

/// Finalize a deployment left pending by a previous process instance.
///
/// Waits `grace` for any still-running finalization side effects of
/// the script, then persists the id as last-deployed, clears the
/// marker and emits exactly one `completed` status.
pub async fn recover_pending(store: &StateStore, reporter: Arc<dyn StatusSink>, grace: Duration) {
    let pending = match store.pending().await {
        Some(p) => p,
        None => return,
    };

    info!(
        "Found pending deployment {} (v{}) from before restart",
        pending.id, pending.version
    );

    // Give the deploy script time to fully finish; its final steps run
    // after it has already restarted this service.
    tokio::time::sleep(grace).await;

    store.set_last_deployed_id(&pending.id).await;
    store.clear_pending().await;
    reporter
        .report(
            &pending.id,
            DeploymentStatus::Completed,
            &pending.version,
            None,
        )
        .await;

    info!(
        "Reported 'completed' for deployment {} (v{})",
        pending.id, pending.version
    );
}
