//! Deployment status reporting
//!
//! Status emission must never block or abort a deployment: every
//! failure here is logged and swallowed.

use async_trait::async_trait;
use rumqttc::AsyncClient;
use tracing::{info, warn};

use crate::models::deployment::{DeploymentStatus, StatusEvent};
use crate::mqtt::client::publish_json;
use crate::mqtt::topics;

/// Sink for deployment status events
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
        version: &str,
        progress: Option<u8>,
    );
}

/// Publishes status events to the cloud broker at QoS 1
pub struct MqttReporter {
    client: AsyncClient,
}

impl MqttReporter {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusSink for MqttReporter {
    async fn report(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
        version: &str,
        progress: Option<u8>,
    ) {
        let event = StatusEvent::new(deployment_id, status, version, progress);
        match publish_json(&self.client, topics::CLOUD_DEPLOYMENT_STATUS, &event).await {
            Ok(()) => match progress {
                Some(pct) => info!(
                    "Reported status '{}' ({}%) for deployment {}",
                    status.as_str(),
                    pct,
                    deployment_id
                ),
                None => info!(
                    "Reported status '{}' for deployment {}",
                    status.as_str(),
                    deployment_id
                ),
            },
            Err(e) => {
                warn!("Failed to report status '{}' (non-fatal): {}", status.as_str(), e);
            }
        }
    }
}

/// Sink used when no cloud connection exists; statuses are only logged.
pub struct LogOnlySink;

#[async_trait]
impl StatusSink for LogOnlySink {
    async fn report(
        &self,
        deployment_id: &str,
        status: DeploymentStatus,
        version: &str,
        _progress: Option<u8>,
    ) {
        warn!(
            "Cannot report status '{}' for deployment {} (v{}) - cloud MQTT not connected",
            status.as_str(),
            deployment_id,
            version
        );
    }
}
