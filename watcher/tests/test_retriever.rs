//! Download and verification tests against a local HTTP server

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tempfile::TempDir;

use depwatch::errors::FetchError;
use depwatch::fetch::retriever::Retriever;
use depwatch::utils::sha256_hash;

/// Serve `body` at /releases/bundle.zip on an ephemeral port.
async fn serve(body: Vec<u8>) -> SocketAddr {
    let app = Router::new().route(
        "/releases/bundle.zip",
        get(move || {
            let body = body.clone();
            async move { body }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn release_body() -> Vec<u8> {
    // Large enough for several chunks on the wire
    (0..64 * 1024u32).map(|i| (i % 251) as u8).collect()
}

fn retriever() -> Retriever {
    Retriever::new(Duration::from_secs(10)).unwrap()
}

#[tokio::test]
async fn test_fetch_verifies_and_reports_progress() {
    let body = release_body();
    let digest = sha256_hash(&body);
    let addr = serve(body.clone()).await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.zip");

    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_by_progress = seen.clone();

    let url = format!("http://{}/releases/bundle.zip", addr);
    retriever()
        .fetch(
            &url,
            "test-api-key",
            &digest,
            body.len() as u64,
            &dest,
            move |pct| {
                let seen = seen_by_progress.clone();
                async move {
                    seen.lock().unwrap().push(pct);
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    // The last crossing is within one threshold of the end
    assert!(*seen.last().unwrap() >= 96);
    assert!(seen.iter().all(|pct| *pct <= 100));
    // Strictly increasing, at least 5 points apart
    for pair in seen.windows(2) {
        assert!(pair[1] >= pair[0] + 5);
    }
}

#[tokio::test]
async fn test_fetch_accepts_uppercase_expected_digest() {
    let body = release_body();
    let digest = sha256_hash(&body).to_uppercase();
    let addr = serve(body.clone()).await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.zip");

    let url = format!("http://{}/releases/bundle.zip", addr);
    retriever()
        .fetch(&url, "k", &digest, body.len() as u64, &dest, |_| async {})
        .await
        .unwrap();
    assert!(dest.exists());
}

#[tokio::test]
async fn test_fetch_uses_content_length_when_size_unknown() {
    let body = release_body();
    let digest = sha256_hash(&body);
    let addr = serve(body).await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.zip");

    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_by_progress = seen.clone();

    let url = format!("http://{}/releases/bundle.zip", addr);
    retriever()
        .fetch(&url, "k", &digest, 0, &dest, move |pct| {
            let seen = seen_by_progress.clone();
            async move {
                seen.lock().unwrap().push(pct);
            }
        })
        .await
        .unwrap();

    assert!(*seen.lock().unwrap().last().unwrap() >= 96);
}

#[tokio::test]
async fn test_fetch_rejects_checksum_mismatch_and_removes_file() {
    let body = release_body();
    let addr = serve(body.clone()).await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.zip");

    let wrong = sha256_hash(b"some other payload");
    let url = format!("http://{}/releases/bundle.zip", addr);
    let result = retriever()
        .fetch(&url, "k", &wrong, body.len() as u64, &dest, |_| async {})
        .await;

    match result {
        Err(FetchError::ChecksumMismatch { expected, actual }) => {
            assert_eq!(expected, wrong);
            assert_eq!(actual, sha256_hash(&body));
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
    assert!(!dest.exists(), "partial download must be removed");
}

#[tokio::test]
async fn test_fetch_http_error_status_is_transport_error() {
    let addr = serve(release_body()).await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.zip");

    let url = format!("http://{}/releases/no-such-file.zip", addr);
    let result = retriever()
        .fetch(&url, "k", "deadbeef", 0, &dest, |_| async {})
        .await;

    assert!(matches!(result, Err(FetchError::Transport(_))));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_fetch_connection_refused_is_transport_error() {
    // Bind and immediately drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.zip");

    let url = format!("http://{}/releases/bundle.zip", addr);
    let result = retriever()
        .fetch(&url, "k", "deadbeef", 0, &dest, |_| async {})
        .await;

    assert!(matches!(result, Err(FetchError::Transport(_))));
    assert!(!dest.exists());
}
