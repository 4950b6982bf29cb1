//! State store tests

use depwatch::state::store::{PendingDeployment, StateStore};
use depwatch::storage::layout::StorageLayout;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> StateStore {
    StateStore::new(StorageLayout::new(dir.path(), dir.path()))
}

#[tokio::test]
async fn test_last_deployed_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    assert_eq!(store.last_deployed_id().await, None);

    store.set_last_deployed_id("d1").await;
    assert_eq!(store.last_deployed_id().await.as_deref(), Some("d1"));

    store.set_last_deployed_id("d2").await;
    assert_eq!(store.last_deployed_id().await.as_deref(), Some("d2"));
}

#[tokio::test]
async fn test_pending_marker_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    assert_eq!(store.pending().await, None);

    store.set_pending("d42", "1.3.0").await;
    assert_eq!(
        store.pending().await,
        Some(PendingDeployment {
            id: "d42".to_string(),
            version: "1.3.0".to_string(),
        })
    );

    store.clear_pending().await;
    assert_eq!(store.pending().await, None);

    // Clearing an absent marker is a no-op
    store.clear_pending().await;
}

#[tokio::test]
async fn test_pending_marker_version_may_contain_colons() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.set_pending("d1", "1.0:beta").await;
    let pending = store.pending().await.unwrap();
    assert_eq!(pending.id, "d1");
    assert_eq!(pending.version, "1.0:beta");
}

#[tokio::test]
async fn test_malformed_pending_marker_is_ignored() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let layout = StorageLayout::new(dir.path(), dir.path());
    std::fs::write(layout.pending_file(), "no-separator-here").unwrap();
    assert_eq!(store.pending().await, None);
}

#[test]
fn test_failure_ledger_counts_and_resets() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    assert_eq!(store.failure_count("d1"), 0);
    assert_eq!(store.record_failure("d1"), 1);
    assert_eq!(store.record_failure("d1"), 2);
    assert_eq!(store.failure_count("d1"), 2);

    // Other ids are tracked independently
    assert_eq!(store.failure_count("d2"), 0);
    assert_eq!(store.record_failure("d2"), 1);

    store.clear_failures("d1");
    assert_eq!(store.failure_count("d1"), 0);
    assert_eq!(store.failure_count("d2"), 1);
}
