//! Filesystem-based deployment lock
//!
//! A single named lock file holding the owning process id as decimal
//! text. Validity is re-evaluated at acquire time against OS process
//! liveness, so a lock left behind by a crashed or restarted watcher
//! is reclaimed instead of wedging deployments forever.

use std::fs;
use std::path::PathBuf;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// Mutual exclusion for deployment attempts on this device
#[derive(Debug, Clone)]
pub struct LockManager {
    lock_file: PathBuf,
}

impl LockManager {
    pub fn new(lock_file: PathBuf) -> Self {
        Self { lock_file }
    }

    /// Try to take the deployment lock.
    ///
    /// Returns `None` if another live process holds it; the caller
    /// must skip the deployment, not queue. A record whose owner is
    /// dead, or whose content is not a PID, is treated as stale and
    /// discarded. The returned guard releases the lock when dropped.
    pub fn acquire(&self) -> Option<LockGuard> {
        if let Ok(contents) = fs::read_to_string(&self.lock_file) {
            match contents.trim().parse::<u32>() {
                Ok(pid) if process_alive(pid) => {
                    debug!("Deployment lock held by live process {}", pid);
                    return None;
                }
                Ok(pid) => {
                    info!("Reclaiming stale deployment lock (dead owner {})", pid);
                }
                Err(_) => {
                    info!("Reclaiming malformed deployment lock");
                }
            }
            let _ = fs::remove_file(&self.lock_file);
        }

        let pid = std::process::id();
        if let Err(e) = fs::write(&self.lock_file, pid.to_string()) {
            warn!("Could not write lock file: {}", e);
            return None;
        }

        Some(LockGuard {
            manager: self.clone(),
        })
    }

    /// Remove the lock record unconditionally, best-effort.
    pub fn release(&self) {
        match fs::remove_file(&self.lock_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove lock file: {}", e),
        }
    }
}

/// Scoped lock acquisition; releases on every exit path.
pub struct LockGuard {
    manager: LockManager,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.manager.release();
    }
}

fn process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    let target = Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    sys.process(target).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }
}
