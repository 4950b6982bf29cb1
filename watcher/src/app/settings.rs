//! Environment-supplied settings
//!
//! The watcher is configured entirely from the environment; every
//! required value missing at startup is a fatal error, surfaced
//! before anything else runs.

use std::path::PathBuf;

use url::Url;

use crate::errors::WatcherError;
use crate::mqtt::client::{MqttAddress, MqttCredentials};

/// Validated startup settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Local broker address, from `MQTT_BROKER_URL`
    pub local_broker: MqttAddress,

    /// Local broker credentials, from `MQTT_USERNAME` / `MQTT_PASSWORD`
    pub local_credentials: MqttCredentials,

    /// Extraction target for release archives, from `DEPLOY_ROOT`
    /// (defaults to `$HOME`)
    pub destination_root: PathBuf,
}

impl Settings {
    /// Read and validate settings from the environment.
    pub fn from_env() -> Result<Self, WatcherError> {
        let broker_url = require_env("MQTT_BROKER_URL")?;
        let username = require_env("MQTT_USERNAME")?;
        let password = require_env("MQTT_PASSWORD")?;

        let url = Url::parse(&broker_url).map_err(|e| {
            WatcherError::ConfigError(format!("Invalid MQTT_BROKER_URL format: {e}"))
        })?;

        let use_tls = match url.scheme() {
            "mqtt" => false,
            "mqtts" => true,
            other => {
                return Err(WatcherError::ConfigError(format!(
                    "Invalid MQTT_BROKER_URL scheme: {other}"
                )))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| {
                WatcherError::ConfigError("MQTT_BROKER_URL is missing a host".to_string())
            })?
            .to_string();

        let port = url
            .port()
            .unwrap_or(if use_tls { 8883 } else { 1883 });

        let local_broker = MqttAddress {
            host,
            port,
            use_tls,
            ca_cert_path: std::env::var("MQTT_CA_CERT").ok(),
        };

        let destination_root = match std::env::var_os("DEPLOY_ROOT") {
            Some(root) => PathBuf::from(root),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| {
                    WatcherError::ConfigError(
                        "Neither DEPLOY_ROOT nor HOME is set".to_string(),
                    )
                })?,
        };

        Ok(Self {
            local_broker,
            local_credentials: MqttCredentials { username, password },
            destination_root,
        })
    }
}

fn require_env(name: &str) -> Result<String, WatcherError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(WatcherError::ConfigError(format!(
            "{name} environment variable must be set"
        ))),
    }
}
