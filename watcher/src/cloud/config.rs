//! Cloud connection configuration

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Control-plane connection parameters.
///
/// Rebuilt at every process start and refreshed when the local
/// config-changed signal arrives; never persisted by the watcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(rename = "cloud_enabled", default)]
    pub enabled: bool,

    #[serde(rename = "cloud_url", default)]
    pub base_url: String,

    #[serde(rename = "cloud_mqtt_username", default)]
    pub mqtt_username: String,

    #[serde(rename = "cloud_mqtt_password", default)]
    pub mqtt_password: String,

    #[serde(rename = "cloud_api_key", default)]
    pub api_key: String,
}

impl CloudConfig {
    /// Whether the broker connection must be torn down and
    /// re-established when moving from `other` to `self`.
    pub fn connection_changed(&self, other: Option<&CloudConfig>) -> bool {
        match other {
            None => true,
            Some(prev) => {
                self.base_url != prev.base_url
                    || self.mqtt_username != prev.mqtt_username
                    || self.mqtt_password != prev.mqtt_password
            }
        }
    }

    /// Enough to open the cloud broker connection
    pub fn can_connect(&self) -> bool {
        !self.base_url.is_empty() && !self.mqtt_username.is_empty()
    }

    /// Enough to download a release archive
    pub fn can_download(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }

    /// Hostname of the cloud broker, extracted from the base URL
    pub fn mqtt_host(&self) -> Option<String> {
        let url = Url::parse(&self.base_url).ok()?;
        url.host_str().map(|h| h.to_string())
    }

    /// Full download URL for a control-plane-relative path
    pub fn download_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// External collaborator supplying the cloud configuration.
///
/// Failures (collaborator unreachable, malformed response) yield
/// `None`; the caller keeps any previously read config in effect.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn read(&self) -> Option<CloudConfig>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, user: &str, pass: &str) -> CloudConfig {
        CloudConfig {
            enabled: true,
            base_url: url.to_string(),
            mqtt_username: user.to_string(),
            mqtt_password: pass.to_string(),
            api_key: "key".to_string(),
        }
    }

    #[test]
    fn test_connection_changed() {
        let a = config("https://cloud.example.com", "u", "p");
        assert!(a.connection_changed(None));
        assert!(!a.connection_changed(Some(&a.clone())));

        let b = config("https://other.example.com", "u", "p");
        assert!(b.connection_changed(Some(&a)));

        let c = config("https://cloud.example.com", "u", "p2");
        assert!(c.connection_changed(Some(&a)));

        // API key changes alone do not force a reconnect
        let mut d = a.clone();
        d.api_key = "other".to_string();
        assert!(!d.connection_changed(Some(&a)));
    }

    #[test]
    fn test_mqtt_host_and_download_url() {
        let cfg = config("https://cloud.example.com/", "u", "p");
        assert_eq!(cfg.mqtt_host().as_deref(), Some("cloud.example.com"));
        assert_eq!(
            cfg.download_url("/r/d1.zip"),
            "https://cloud.example.com/r/d1.zip"
        );
    }
}
