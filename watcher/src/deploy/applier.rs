//! Release archive extraction and deploy script execution

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::spawn_blocking;
use tracing::{error, info};

use crate::errors::WatcherError;

/// Subdirectories whose contents are wholly replaced by each release.
///
/// Extraction overlays files without deleting ones absent from the new
/// archive; stale entries here would trigger unnecessary MCU firmware
/// updates (firmware/) or wasted time loading removed container images
/// (images/), so they are removed before extracting.
const RELEASE_OWNED_DIRS: &[&str] = &["firmware", "images"];

/// Entry-point script expected inside every release archive
const DEPLOY_SCRIPT: &str = "deploy.sh";

/// Applies a downloaded release archive to the destination root.
pub struct Applier;

impl Applier {
    /// Extract `archive` into `destination_root` and run the release's
    /// deploy script. Succeeds iff the script exits 0.
    ///
    /// Never panics into the caller: extraction and process-launch
    /// failures come back as `WatcherError::ApplyError`.
    pub async fn apply(archive: &Path, destination_root: &Path) -> Result<(), WatcherError> {
        info!(
            "Extracting {} to {}...",
            archive.display(),
            destination_root.display()
        );

        pre_clean(destination_root).await;
        extract_archive(archive, destination_root).await?;
        info!("Extraction complete");

        let script = find_deploy_script(destination_root)
            .await
            .ok_or_else(|| {
                WatcherError::ApplyError(format!("{} not found after extraction", DEPLOY_SCRIPT))
            })?;

        run_deploy_script(&script).await
    }
}

async fn pre_clean(destination_root: &Path) {
    for stale_dir in RELEASE_OWNED_DIRS {
        let dirpath = destination_root.join(stale_dir);
        match tokio::fs::remove_dir_all(&dirpath).await {
            Ok(()) => {
                info!("Removed stale {}/ directory from previous deployment", stale_dir);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                error!("Could not remove stale {}/ directory: {}", stale_dir, e);
            }
        }
    }
}

async fn extract_archive(archive: &Path, destination_root: &Path) -> Result<(), WatcherError> {
    let archive = archive.to_owned();
    let dest = destination_root.to_owned();

    spawn_blocking(move || -> Result<(), WatcherError> {
        let file = std::fs::File::open(&archive)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| WatcherError::ApplyError(format!("Invalid release archive: {e}")))?;
        zip.extract(&dest)
            .map_err(|e| WatcherError::ApplyError(format!("Extraction failed: {e}")))?;
        Ok(())
    })
    .await
    .map_err(|e| WatcherError::ApplyError(format!("Extraction task failed: {e}")))?
}

/// Check the top-level path first, else scan one level of immediate
/// subdirectories for the same filename.
async fn find_deploy_script(destination_root: &Path) -> Option<PathBuf> {
    let top_level = destination_root.join(DEPLOY_SCRIPT);
    if tokio::fs::metadata(&top_level)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        return Some(top_level);
    }

    let mut entries = tokio::fs::read_dir(destination_root).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let candidate = entry.path().join(DEPLOY_SCRIPT);
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Some(candidate);
        }
    }
    None
}

async fn run_deploy_script(script: &Path) -> Result<(), WatcherError> {
    info!("Running {}...", script.display());

    make_executable(script).await?;

    let workdir = script
        .parent()
        .ok_or_else(|| WatcherError::ApplyError("Deploy script has no parent dir".to_string()))?;

    let mut child = Command::new("bash")
        .arg(script)
        .current_dir(workdir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| WatcherError::ApplyError(format!("Failed to start deploy script: {e}")))?;

    // Stream output line by line as it arrives; the script may run for
    // minutes and may restart this very process partway through.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("  [{}] {}", DEPLOY_SCRIPT, line);
            }
        }
    });
    let stderr_task = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("  [{}] {}", DEPLOY_SCRIPT, line);
            }
        }
    });

    let status = child
        .wait()
        .await
        .map_err(|e| WatcherError::ApplyError(format!("Error waiting for deploy script: {e}")))?;

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    info!("{} exited with code {:?}", DEPLOY_SCRIPT, status.code());

    if status.success() {
        Ok(())
    } else {
        Err(WatcherError::ApplyError(format!(
            "{} exited with code {:?}",
            DEPLOY_SCRIPT,
            status.code()
        )))
    }
}

async fn make_executable(script: &Path) -> Result<(), WatcherError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = tokio::fs::metadata(script).await?;
        let mut perms = meta.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(script, perms).await?;
    }
    Ok(())
}
