//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::app::options::AppOptions;
use crate::cloud::config::ConfigSource;
use crate::deploy::recovery::recover_pending;
use crate::errors::WatcherError;
use crate::report::{LogOnlySink, StatusSink};
use crate::state::lock::LockManager;
use crate::state::store::StateStore;
use crate::workers::cloud::CloudManager;
use crate::workers::local;

/// Run the deployment watcher until the shutdown signal resolves.
///
/// An unrecoverable failure in the local broker worker comes back as
/// an error; the caller's restart supervisor owns retries from there.
pub async fn run(
    options: AppOptions,
    source: Arc<dyn ConfigSource>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), WatcherError> {
    info!("Deployment watcher starting...");

    let store = Arc::new(StateStore::new(options.layout.clone()));
    let lock = LockManager::new(options.layout.lock_file());
    let config = Arc::new(RwLock::new(None));

    let cloud = Arc::new(CloudManager::new(
        options.cloud.clone(),
        options.layout.clone(),
        store.clone(),
        lock.clone(),
        config,
    ));

    // Step 1: local broker, for config-changed signals
    info!("Connecting to local MQTT broker...");
    let (shutdown_tx, _): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut local_shutdown_rx = shutdown_tx.subscribe();
    let mut local_handle = tokio::spawn(local::run(
        options.local_worker.clone(),
        cloud.clone(),
        source.clone(),
        Box::pin(async move {
            let _ = local_shutdown_rx.recv().await;
        }),
    ));

    // Step 2: initial cloud config read and connect
    info!("Reading cloud configuration...");
    cloud.refresh(source.as_ref()).await;

    // Step 3: finalize a deployment that was in flight when the
    // previous instance was restarted by its own deploy script
    let reporter: Arc<dyn StatusSink> = match cloud.reporter().await {
        Some(reporter) => reporter,
        None => Arc::new(LogOnlySink),
    };
    recover_pending(&store, reporter, options.recovery_grace).await;

    // Step 4: park until shutdown, or escalate if the worker dies
    info!("Deployment watcher running. Waiting for deployment notifications...");
    let result = tokio::select! {
        _ = shutdown_signal => {
            info!("Shutting down...");
            let _ = shutdown_tx.send(());
            let _ = (&mut local_handle).await;
            Ok(())
        }
        joined = &mut local_handle => match joined {
            Ok(Ok(())) => Err(WatcherError::Internal(
                "local MQTT worker exited unexpectedly".to_string(),
            )),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(WatcherError::Internal(format!(
                "local MQTT worker panicked: {e}"
            ))),
        },
    };

    cloud.disconnect().await;
    lock.release();

    if result.is_ok() {
        info!("Shutdown complete");
    }
    result
}
