//! Cloud broker session management
//!
//! Owns the connection to the control-plane broker: builds it from the
//! current cloud config, subscribes to deployment notifications, and
//! tears it down / re-establishes it when the config-changed signal
//! arrives with different connection parameters.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::AsyncClient;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cloud::config::{CloudConfig, ConfigSource};
use crate::deploy::controller::{self, Controller};
use crate::mqtt::client::{MqttAddress, MqttClient, MqttCredentials};
use crate::mqtt::topics;
use crate::report::{MqttReporter, StatusSink};
use crate::state::lock::LockManager;
use crate::state::store::StateStore;
use crate::storage::layout::StorageLayout;

/// Cloud session options
#[derive(Debug, Clone)]
pub struct Options {
    /// Controller options for sessions created by this manager
    pub controller: controller::Options,

    /// Cloud broker port (TLS)
    pub broker_port: u16,

    /// Delay before re-polling after a connection error
    pub reconnect_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            controller: controller::Options::default(),
            broker_port: 8883,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

struct Session {
    client: AsyncClient,
    reporter: Arc<dyn StatusSink>,
    task: JoinHandle<()>,
}

/// Manages the (at most one) active cloud broker session
pub struct CloudManager {
    options: Options,
    layout: StorageLayout,
    store: Arc<StateStore>,
    lock: LockManager,
    config: Arc<RwLock<Option<CloudConfig>>>,
    session: Mutex<Option<Session>>,
}

impl CloudManager {
    pub fn new(
        options: Options,
        layout: StorageLayout,
        store: Arc<StateStore>,
        lock: LockManager,
        config: Arc<RwLock<Option<CloudConfig>>>,
    ) -> Self {
        Self {
            options,
            layout,
            store,
            lock,
            config,
            session: Mutex::new(None),
        }
    }

    /// Status sink of the active session, if connected
    pub async fn reporter(&self) -> Option<Arc<dyn StatusSink>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.reporter.clone())
    }

    /// Re-read the cloud config and reconnect if needed.
    pub async fn refresh(&self, source: &dyn ConfigSource) {
        let new_config = match source.read().await {
            Some(config) => config,
            None => {
                warn!("Could not read cloud config");
                return;
            }
        };

        let old_config = { self.config.read().await.clone() };
        *self.config.write().await = Some(new_config.clone());

        if !new_config.enabled {
            info!("Cloud is disabled, disconnecting from cloud MQTT");
            self.disconnect().await;
            return;
        }

        let changed = new_config.connection_changed(old_config.as_ref());
        let connected = self.session.lock().await.is_some();

        if changed || !connected {
            info!("Cloud config changed, reconnecting...");
            self.disconnect().await;
            if new_config.can_connect() {
                self.connect(&new_config).await;
            } else {
                warn!("Cloud config incomplete (missing URL or MQTT username), skipping connection");
            }
        } else {
            info!("Cloud config unchanged");
        }
    }

    async fn connect(&self, config: &CloudConfig) {
        let host = match config.mqtt_host() {
            Some(host) => host,
            None => {
                warn!("Cannot extract hostname from cloud URL: {}", config.base_url);
                return;
            }
        };

        let address = MqttAddress {
            host: host.clone(),
            port: self.options.broker_port,
            use_tls: true,
            ca_cert_path: None,
        };
        let credentials = MqttCredentials {
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
        };
        let client_id = format!("deployment-watcher-{}", chrono::Utc::now().timestamp());

        info!(
            "Connecting to cloud MQTT broker at mqtts://{}:{}",
            host, self.options.broker_port
        );

        let mut client = match MqttClient::new(&address, &client_id, Some(&credentials)) {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to create cloud MQTT client: {}", e);
                return;
            }
        };

        if let Err(e) = client.subscribe(topics::CLOUD_DEPLOYMENT_AVAILABLE).await {
            error!("Failed to subscribe to deployment topic: {}", e);
            return;
        }

        let handle = client.handle();
        let reporter: Arc<dyn StatusSink> = Arc::new(MqttReporter::new(handle.clone()));

        let controller = match Controller::new(
            &self.options.controller,
            self.layout.clone(),
            self.store.clone(),
            self.lock.clone(),
            self.config.clone(),
            reporter.clone(),
        ) {
            Ok(controller) => Arc::new(controller),
            Err(e) => {
                error!("Failed to create deployment controller: {}", e);
                return;
            }
        };

        let reconnect_delay = self.options.reconnect_delay;
        let resubscribe = handle.clone();
        let task = tokio::spawn(async move {
            loop {
                match client.poll().await {
                    Ok(Some(msg)) if msg.topic == topics::CLOUD_DEPLOYMENT_AVAILABLE => {
                        info!(
                            "Received message on {} ({} bytes)",
                            msg.topic,
                            msg.payload.len()
                        );
                        // Run the deployment off the event loop so
                        // progress publishes keep flushing during the
                        // download; the lock enforces single-flight.
                        let controller = controller.clone();
                        tokio::spawn(async move {
                            controller.handle_notification(&msg.payload).await;
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Cloud MQTT disconnected ({}), will reconnect...", e);
                        tokio::time::sleep(reconnect_delay).await;
                        // Sessions are not persistent; queue a fresh
                        // subscribe for the broker we reconnect to.
                        let _ = resubscribe
                            .subscribe(topics::CLOUD_DEPLOYMENT_AVAILABLE, rumqttc::QoS::AtLeastOnce)
                            .await;
                    }
                }
            }
        });

        *self.session.lock().await = Some(Session {
            client: handle,
            reporter,
            task,
        });
    }

    /// Tear down the active session, if any.
    pub async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            let _ = session.client.disconnect().await;
            session.task.abort();
        }
    }
}
