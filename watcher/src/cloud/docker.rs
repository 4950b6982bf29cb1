//! Cloud config retrieval through the backend container
//!
//! The control-plane configuration lives in the backend's database
//! with the credential fields encrypted at rest. The backend container
//! owns the decryption key, so the watcher asks it to read and decrypt
//! the record rather than talking to the database directly.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::cloud::config::{CloudConfig, ConfigSource};

const NODE_SCRIPT: &str = r#"
    const { MongoClient } = require("mongodb");
    const crypto = require("crypto");
    async function main() {
        const client = await MongoClient.connect("mongodb://mongodb:27017");
        const config = await client.db("trailcurrent").collection("system_config").findOne({_id: "main"});
        await client.close();
        if (!config) { process.exit(1); }
        function dec(enc, iv) {
            if (!enc || !iv) return "";
            const key = Buffer.from(process.env.ENCRYPTION_KEY, "hex");
            const d = crypto.createDecipheriv("aes-256-cbc", key, Buffer.from(iv, "hex"));
            return d.update(enc, "hex", "utf8") + d.final("utf8");
        }
        console.log(JSON.stringify({
            cloud_enabled: config.cloud_enabled || false,
            cloud_url: config.cloud_url || "",
            cloud_mqtt_username: config.cloud_mqtt_username || "",
            cloud_mqtt_password: dec(config.cloud_mqtt_password_encrypted, config.cloud_mqtt_password_iv),
            cloud_api_key: dec(config.cloud_api_key_encrypted, config.cloud_api_key_iv)
        }));
    }
    main().catch(() => process.exit(1));
"#;

/// Reads the cloud configuration by exec-ing into the backend
/// container found via `docker compose`.
#[derive(Debug, Clone)]
pub struct DockerConfigSource {
    /// Working directory for `docker compose` (the compose project root)
    pub compose_dir: std::path::PathBuf,

    /// Timeout for each subprocess invocation
    pub timeout: Duration,
}

impl DockerConfigSource {
    pub fn new(compose_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            compose_dir: compose_dir.into(),
            timeout: Duration::from_secs(15),
        }
    }

    async fn backend_container(&self) -> Option<String> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("docker")
                .args(["compose", "ps", "-q", "backend"])
                .current_dir(&self.compose_dir)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(out)) if out.status.success() => {
                let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if id.is_empty() {
                    None
                } else {
                    Some(id)
                }
            }
            Ok(Ok(out)) => {
                warn!(
                    "docker compose ps failed (exit {:?}): {}",
                    out.status.code(),
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                None
            }
            Ok(Err(e)) => {
                warn!("Error finding backend container: {}", e);
                None
            }
            Err(_) => {
                warn!("Timed out finding backend container");
                None
            }
        }
    }
}

#[async_trait]
impl ConfigSource for DockerConfigSource {
    async fn read(&self) -> Option<CloudConfig> {
        let container = match self.backend_container().await {
            Some(id) => id,
            None => {
                warn!("Backend container not found, cannot read cloud config");
                return None;
            }
        };

        let output = tokio::time::timeout(
            self.timeout,
            Command::new("docker")
                .args(["exec", &container, "node", "-e", NODE_SCRIPT])
                .output(),
        )
        .await;

        match output {
            Ok(Ok(out)) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                match serde_json::from_str::<CloudConfig>(stdout.trim()) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        warn!("Failed to parse cloud config JSON: {}", e);
                        None
                    }
                }
            }
            Ok(Ok(out)) => {
                warn!(
                    "docker exec failed (exit {:?}): {}",
                    out.status.code(),
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                None
            }
            Ok(Err(e)) => {
                warn!("Error reading cloud config: {}", e);
                None
            }
            Err(_) => {
                warn!("Timed out reading cloud config");
                None
            }
        }
    }
}
