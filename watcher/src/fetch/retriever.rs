//! Streaming artifact download with checksum verification

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{header, Client};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use crate::errors::{FetchError, WatcherError};
use crate::utils::hex;

/// Downloads release archives from the control plane.
///
/// The whole transfer is bounded by one overall timeout; a timeout
/// mid-stream is a transport failure, not retried.
pub struct Retriever {
    http: Client,
}

impl Retriever {
    pub fn new(timeout: Duration) -> Result<Self, WatcherError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Stream `url` to `dest`, hashing as bytes arrive.
    ///
    /// `known_size` of 0 means unknown; the Content-Length header is
    /// used instead when present. `progress` is invoked at most once
    /// per 5-percentage-point threshold crossed, clamped to 100. On
    /// any failure the partial file is removed before returning.
    pub async fn fetch<P, Fut>(
        &self,
        url: &str,
        api_key: &str,
        expected_sha256: &str,
        known_size: u64,
        dest: &Path,
        mut progress: P,
    ) -> Result<(), FetchError>
    where
        P: FnMut(u8) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        info!("Downloading deployment to {}...", dest.display());

        let result = self
            .fetch_inner(url, api_key, expected_sha256, known_size, dest, &mut progress)
            .await;

        if result.is_err() {
            remove_partial(dest).await;
        }
        result
    }

    async fn fetch_inner<P, Fut>(
        &self,
        url: &str,
        api_key: &str,
        expected_sha256: &str,
        known_size: u64,
        dest: &Path,
        progress: &mut P,
    ) -> Result<(), FetchError>
    where
        P: FnMut(u8) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Transport(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        // Size hint from the payload wins; fall back to Content-Length.
        let total_size = if known_size > 0 {
            known_size
        } else {
            response.content_length().unwrap_or(0)
        };

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_reported_pct: i64 = -1;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if total_size > 0 {
                let pct = (downloaded * 100 / total_size) as i64;
                if pct >= last_reported_pct + 5 {
                    last_reported_pct = pct;
                    progress(pct.min(100) as u8).await;
                }
            }
        }

        file.flush().await?;
        drop(file);

        let computed_hash = hex::encode(hasher.finalize());
        info!("Downloaded {} bytes, SHA256: {}", downloaded, computed_hash);

        let expected = expected_sha256.to_lowercase();
        if computed_hash != expected {
            error!(
                "Checksum mismatch! Expected: {}, got: {}",
                expected, computed_hash
            );
            error!(
                "  Expected size: {}, downloaded: {} bytes",
                total_size, downloaded
            );
            return Err(FetchError::ChecksumMismatch {
                expected,
                actual: computed_hash,
            });
        }

        info!("Checksum verified OK");
        Ok(())
    }
}

async fn remove_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!("Could not remove partial download {}: {}", dest.display(), e),
    }
}
