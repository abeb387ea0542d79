//! Root filesystem image download and artifact validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use warden_core::error::{WardenError, WardenResult};

/// Bytes inspected when sniffing for an HTML error page
const SNIFF_LEN: usize = 512;

/// Fetches a distribution image to a local path
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<u64>;
}

/// [`ImageDownloader`] backed by reqwest
#[derive(Clone)]
pub struct HttpImageDownloader {
    client: Client,
}

impl HttpImageDownloader {
    pub fn new() -> WardenResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> WardenResult<u64> {
        let mut response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| WardenError::download(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(WardenError::download(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.starts_with("text/html") {
            return Err(WardenError::download(format!(
                "{} returned an HTML page instead of an image",
                url
            )));
        }

        let partial = partial_path(dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| WardenError::download(format!("{}: {}", url, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, dest).await?;
        Ok(written)
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<u64> {
        info!(url, dest = %dest.display(), "Downloading distribution image");
        let result = tokio::select! {
            result = self.fetch(url, dest, timeout) => result,
            _ = cancel.cancelled() => Err(WardenError::cancelled(format!("download of {}", url))),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(partial_path(dest)).await;
        }
        let written = result?;
        debug!(bytes = written, "Download complete");
        Ok(written)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Check that a file on disk is a plausible image: larger than
/// `min_bytes`, not an HTML document, and matching `sha256` when given.
/// Returns the file size.
pub async fn validate_artifact(path: &Path, min_bytes: u64, sha256: Option<&str>) -> WardenResult<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| WardenError::validation(format!("{}: {}", path.display(), e)))?;
    let size = metadata.len();
    if size <= min_bytes {
        return Err(WardenError::validation(format!(
            "{} is {} bytes, expected more than {}; treating it as truncated",
            path.display(),
            size,
            min_bytes
        )));
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut head = vec![0u8; SNIFF_LEN];
    let read = file.read(&mut head).await?;
    if looks_like_html(&head[..read]) {
        return Err(WardenError::validation(format!(
            "{} is an HTML document, not an image",
            path.display()
        )));
    }

    if let Some(expected) = sha256 {
        let actual = sha256_file(path).await?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(WardenError::validation(format!(
                "{} has SHA-256 {}, expected {}",
                path.display(),
                actual,
                expected
            )));
        }
    }

    Ok(size)
}

fn looks_like_html(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head).trim_start().to_ascii_lowercase();
    text.starts_with("<!doctype html") || text.starts_with("<html") || text.starts_with("<?xml")
}

/// Hex SHA-256 of a file
pub async fn sha256_file(path: &Path) -> WardenResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
