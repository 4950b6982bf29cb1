//! Storage layout configuration

use std::path::PathBuf;

/// Filesystem locations used by the watcher.
///
/// The destination root doubles as the extraction target for release
/// archives; the marker files live beside it so they survive reboots,
/// while the lock and download files sit in the system temp dir and
/// are expendable.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Root the release archive is extracted into (the deploy home)
    pub destination_root: PathBuf,

    /// Directory for lock and temporary download files
    pub scratch_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(destination_root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// File holding the id of the last successfully applied deployment
    pub fn last_deployed_file(&self) -> PathBuf {
        self.destination_root.join(".deployment-watcher-last")
    }

    /// Pending marker written before the deploy script is invoked
    pub fn pending_file(&self) -> PathBuf {
        self.destination_root.join(".deployment-watcher-pending")
    }

    /// Device-wide deployment lock file (owner PID as decimal text)
    pub fn lock_file(&self) -> PathBuf {
        self.scratch_dir.join("deployment-watcher.lock")
    }

    /// Temporary download path for a given deployment id
    pub fn download_file(&self, deployment_id: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("deployment-{}.zip", deployment_id))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home, std::env::temp_dir())
    }
}
