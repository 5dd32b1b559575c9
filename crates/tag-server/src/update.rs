use std::{
    fs::{self, File},
    io::Read,
    path::Path,
    time::Duration,
};

use anyhow::{Result, anyhow};
use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use reqwest::Client;
use sha1::{Digest, Sha1};
use tracing::warn;

const MAX_DOWNLOAD_BYTES: u64 = 128 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of remote files for a refresh.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes>> {
        async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| anyhow!("Download failed: {e}"))?;

            if !response.status().is_success() {
                return Err(anyhow!("Download failed ({}): {}", response.status(), url));
            }

            if let Some(content_length) = response.content_length()
                && content_length > MAX_DOWNLOAD_BYTES
            {
                return Err(anyhow!(
                    "Download is too large ({content_length} bytes, max {MAX_DOWNLOAD_BYTES})."
                ));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| anyhow!("Failed to read response body: {e}"))?;

            if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
                return Err(anyhow!(
                    "Download is too large ({} bytes, max {MAX_DOWNLOAD_BYTES}).",
                    bytes.len()
                ));
            }

            Ok(bytes)
        }
        .boxed()
    }
}

/// Lowercase hex SHA-1 of a file, or `None` if it cannot be read.
pub fn file_sha1(path: &Path) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 8 * 1024];
    loop {
        let n = file.read(&mut buffer).ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Some(
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect(),
    )
}

/// Checksum file contents, trimmed and lowercased.
pub fn read_checksum(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

/// True when `sha1_file` holds the checksum of `data_file`.
pub fn check_data(sha1_file: &Path, data_file: &Path) -> bool {
    match (read_checksum(sha1_file), file_sha1(data_file)) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

pub fn delete_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("[Tags] Failed to delete {}: {e}", path.display()),
    }
}

pub async fn save(fetcher: &dyn Fetch, url: &str, dest: &Path) -> Result<()> {
    let bytes = fetcher.fetch(url).await?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(())
}
