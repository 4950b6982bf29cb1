//! Local broker worker
//!
//! Listens on the device-local broker for the zero-payload signal that
//! the cloud connection parameters changed, and triggers a config
//! refresh on the cloud session manager.
//!
//! The local broker is the watcher's lifeline: if it cannot be reached
//! at all, the worker gives up after a bounded number of consecutive
//! failures and the error escalates to the process-level restart
//! policy instead of looping silently forever.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::cloud::config::ConfigSource;
use crate::errors::WatcherError;
use crate::mqtt::client::{MqttAddress, MqttClient, MqttCredentials};
use crate::mqtt::topics;
use crate::workers::cloud::CloudManager;

/// Local worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Local broker address
    pub broker_address: MqttAddress,

    /// Local broker credentials
    pub credentials: MqttCredentials,

    /// Reconnect delay on failure
    pub reconnect_delay: Duration,

    /// Consecutive connection failures tolerated before the worker
    /// fails the whole run and hands control to the restart supervisor
    pub max_connect_failures: u32,
}

/// Run the local broker worker until the shutdown future resolves.
///
/// Client construction and subscription failures, and exhausting the
/// consecutive-failure budget, return an error; the caller restarts
/// the process rather than the worker.
pub async fn run(
    options: Options,
    cloud: Arc<CloudManager>,
    source: Arc<dyn ConfigSource>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> Result<(), WatcherError> {
    info!("Local MQTT worker starting...");

    let mut consecutive_failures: u32 = 0;

    loop {
        let mut client = MqttClient::new(
            &options.broker_address,
            &format!("deployment-watcher-local-{}", std::process::id()),
            Some(&options.credentials),
        )?;

        client.subscribe(topics::LOCAL_CONFIG_UPDATED).await?;

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Local MQTT worker shutting down...");
                    let _ = client.disconnect().await;
                    return Ok(());
                }
                polled = client.poll() => {
                    match polled {
                        Ok(Some(msg)) if msg.topic == topics::LOCAL_CONFIG_UPDATED => {
                            consecutive_failures = 0;
                            info!("Cloud config changed notification received, refreshing...");
                            cloud.refresh(source.as_ref()).await;
                        }
                        Ok(_) => {
                            consecutive_failures = 0;
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            if consecutive_failures >= options.max_connect_failures {
                                error!(
                                    "Local MQTT broker unreachable after {} attempts, giving up",
                                    consecutive_failures
                                );
                                return Err(WatcherError::MqttError(format!(
                                    "local broker unreachable after {consecutive_failures} attempts: {e}"
                                )));
                            }
                            warn!("Disconnected from local MQTT ({}), will reconnect...", e);
                            break;
                        }
                    }
                }
            }
        }

        tokio::select! {
            _ = &mut shutdown_signal => return Ok(()),
            _ = tokio::time::sleep(options.reconnect_delay) => {}
        }
    }
}
