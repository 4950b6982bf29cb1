//! Application configuration options

use std::time::Duration;

use crate::app::settings::Settings;
use crate::storage::layout::StorageLayout;
use crate::workers::{cloud, local};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Filesystem layout (markers, lock, downloads, extraction root)
    pub layout: StorageLayout,

    /// Local broker worker options
    pub local_worker: local::Options,

    /// Cloud session manager options
    pub cloud: cloud::Options,

    /// Grace period before finalizing a pending deployment at startup
    pub recovery_grace: Duration,
}

impl AppOptions {
    /// Build options from validated environment settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            layout: StorageLayout::new(
                settings.destination_root.clone(),
                std::env::temp_dir(),
            ),
            local_worker: local::Options {
                broker_address: settings.local_broker.clone(),
                credentials: settings.local_credentials.clone(),
                reconnect_delay: Duration::from_secs(5),
                max_connect_failures: 10,
            },
            cloud: cloud::Options::default(),
            recovery_grace: Duration::from_secs(15),
        }
    }
}

/// Process-level restart policy applied by `main`
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Fixed delay between restarts of the main loop
    pub restart_delay: Duration,

    /// Restarts after which the process exits with failure status
    pub max_restarts: u32,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(30),
            max_restarts: 100,
        }
    }
}
