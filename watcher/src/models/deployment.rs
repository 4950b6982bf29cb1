//! Deployment models

use serde::{Deserialize, Serialize};

/// A deployment notification received from the control plane.
///
/// The wire format is a JSON object on the deployment-availability
/// topic. `id`, `sha256` and `downloadUrl` are required; a payload
/// missing any of them is rejected before any side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentNotification {
    /// Unique deployment ID
    #[serde(default)]
    pub id: String,

    /// Release version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Archive filename (informational)
    #[serde(default)]
    pub filename: String,

    /// Archive size in bytes (advisory; Content-Length is the fallback)
    #[serde(default)]
    pub size: u64,

    /// Expected SHA256 of the archive, lowercase hex
    #[serde(default)]
    pub sha256: String,

    /// Download path relative to the cloud base URL
    #[serde(rename = "downloadUrl", default)]
    pub download_url_path: String,

    /// Publication timestamp (informational)
    #[serde(default)]
    pub timestamp: String,
}

fn default_version() -> String {
    "unknown".to_string()
}

impl DeploymentNotification {
    /// Check the required fields are present.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.sha256.is_empty() && !self.download_url_path.is_empty()
    }
}

/// Lifecycle status of a deployment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Downloading,
    Downloaded,
    Deploying,
    Completed,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Downloading => "downloading",
            DeploymentStatus::Downloaded => "downloaded",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
        }
    }
}

/// Status event published back to the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "deploymentId")]
    pub deployment_id: String,

    pub status: DeploymentStatus,

    pub version: String,

    /// UTC, second precision, e.g. `2025-06-01T12:00:00Z`
    pub timestamp: String,

    /// Download percentage, present while `status` is `downloading`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl StatusEvent {
    pub fn new(
        deployment_id: &str,
        status: DeploymentStatus,
        version: &str,
        progress: Option<u8>,
    ) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            status,
            version: version.to_string(),
            timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_requires_id_sha_and_url() {
        let full: DeploymentNotification = serde_json::from_str(
            r#"{"id":"d1","version":"1.0.0","filename":"r.zip","size":10,
                "sha256":"abc","downloadUrl":"/r/d1.zip","timestamp":"t"}"#,
        )
        .unwrap();
        assert!(full.is_valid());

        for missing in ["id", "sha256", "downloadUrl"] {
            let mut value: serde_json::Value = serde_json::to_value(&full).unwrap();
            value.as_object_mut().unwrap().remove(missing);
            let parsed: DeploymentNotification = serde_json::from_value(value).unwrap();
            assert!(!parsed.is_valid(), "payload without {missing} must be invalid");
        }
    }

    #[test]
    fn test_notification_defaults() {
        let n: DeploymentNotification =
            serde_json::from_str(r#"{"id":"d1","sha256":"abc","downloadUrl":"/r/d1.zip"}"#)
                .unwrap();
        assert_eq!(n.version, "unknown");
        assert_eq!(n.size, 0);
    }

    #[test]
    fn test_status_event_serializes_progress_only_when_set() {
        let without = StatusEvent::new("d1", DeploymentStatus::Completed, "1.0", None);
        let json = serde_json::to_value(&without).unwrap();
        assert!(json.get("progress").is_none());
        assert_eq!(json["status"], "completed");
        assert_eq!(json["deploymentId"], "d1");

        let with = StatusEvent::new("d1", DeploymentStatus::Downloading, "1.0", Some(35));
        let json = serde_json::to_value(&with).unwrap();
        assert_eq!(json["progress"], 35);
    }
}
