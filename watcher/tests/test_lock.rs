//! Lock manager tests

use depwatch::state::lock::LockManager;
use tempfile::TempDir;

fn lock_in(dir: &TempDir) -> LockManager {
    LockManager::new(dir.path().join("deployment-watcher.lock"))
}

#[test]
fn test_acquire_writes_own_pid_and_releases_on_drop() {
    let dir = TempDir::new().unwrap();
    let manager = lock_in(&dir);
    let lock_file = dir.path().join("deployment-watcher.lock");

    let guard = manager.acquire().expect("lock should be free");
    let contents = std::fs::read_to_string(&lock_file).unwrap();
    assert_eq!(contents, std::process::id().to_string());

    drop(guard);
    assert!(!lock_file.exists());
}

#[test]
fn test_acquire_fails_while_live_owner_holds_lock() {
    let dir = TempDir::new().unwrap();
    let manager = lock_in(&dir);

    // Our own process is certainly alive
    let _guard = manager.acquire().expect("lock should be free");
    assert!(manager.acquire().is_none());
}

#[test]
fn test_stale_lock_from_dead_owner_is_reclaimed() {
    let dir = TempDir::new().unwrap();
    let manager = lock_in(&dir);
    let lock_file = dir.path().join("deployment-watcher.lock");

    // PIDs near u32::MAX do not exist on any real system
    std::fs::write(&lock_file, "4294967290").unwrap();

    let guard = manager.acquire().expect("stale lock should be reclaimed");
    let contents = std::fs::read_to_string(&lock_file).unwrap();
    assert_eq!(contents, std::process::id().to_string());
    drop(guard);
}

#[test]
fn test_malformed_lock_content_is_treated_as_stale() {
    let dir = TempDir::new().unwrap();
    let manager = lock_in(&dir);
    let lock_file = dir.path().join("deployment-watcher.lock");

    std::fs::write(&lock_file, "definitely-not-a-pid").unwrap();
    assert!(manager.acquire().is_some());
}

#[test]
fn test_release_is_unconditional_and_idempotent() {
    let dir = TempDir::new().unwrap();
    let manager = lock_in(&dir);
    let lock_file = dir.path().join("deployment-watcher.lock");

    std::fs::write(&lock_file, "12345").unwrap();
    manager.release();
    assert!(!lock_file.exists());

    // Releasing again must not error
    manager.release();
}
