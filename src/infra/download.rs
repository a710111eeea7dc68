//! HTTP download functionality
//!
//! Streams files to a `.part` sibling and renames them into place once
//! complete and verified, with retry and exponential backoff. URLs in errors
//! have credential query parameters masked.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{StatusCode, Url};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::defaults;
use crate::error::DownloadError;

/// Progress callback type for download progress reporting
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Maximum backoff between attempts
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Suffix of in-flight downloads
pub const PARTIAL_SUFFIX: &str = ".part";

/// Query parameters whose values never appear in errors or logs
const SECRET_PARAMS: &[&str] = &["token", "api_key", "apikey", "access_token"];

const REDACTED: &str = "***";

/// Download result containing file path and metadata
#[derive(Debug)]
pub struct DownloadResult {
    /// Path to the downloaded file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// SHA256 checksum of the downloaded content
    pub checksum: String,
}

/// Download manager for fetching files with retry
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds)
    base_delay_ms: u64,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new() -> Self {
        Self::with_config(defaults::MAX_DOWNLOAD_RETRIES, defaults::DOWNLOAD_RETRY_DELAY_MS)
    }

    /// Create a download manager with custom settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .user_agent(concat!("comfyboot/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            max_retries: max_retries.max(1),
            base_delay_ms,
        }
    }

    /// Get max retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Download a file with retry logic
    ///
    /// `header` is sent with every attempt. Authorization failures are not
    /// retried.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        header: Option<(&str, &str)>,
        progress: Option<ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        self.fetch(url, dest, header, None, progress).await
    }

    /// Download a file, refusing to move it into place unless its SHA256
    /// matches `expected_checksum`
    pub async fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        header: Option<(&str, &str)>,
        expected_checksum: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        self.fetch(url, dest, header, expected_checksum, progress).await
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        header: Option<(&str, &str)>,
        expected_checksum: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        let mut attempts = 0;
        let mut last_error = None;
        let mut delay_ms = self.base_delay_ms;

        while attempts < self.max_retries {
            attempts += 1;

            match self
                .download_once(url, dest, header, expected_checksum, progress.as_ref())
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) if e.is_fatal() => {
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Download attempt {attempts}/{} failed: {e}", self.max_retries);
                    last_error = Some(e);

                    if attempts < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(MAX_RETRY_DELAY_MS);
                    }
                }
            }
        }

        let _ = tokio::fs::remove_file(partial_path(dest)).await;

        Err(last_error.unwrap_or_else(|| DownloadError::MaxRetriesExceeded {
            url: redact_url(url),
            retries: self.max_retries,
        }))
    }

    /// Single download attempt without retry
    async fn download_once(
        &self,
        url: &str,
        dest: &Path,
        header: Option<(&str, &str)>,
        expected_checksum: Option<&str>,
        progress: Option<&ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        let mut request = self.client.get(url);
        if let Some((name, value)) = header {
            request = request.header(name, value);
        }
        let network_err = |e: reqwest::Error| DownloadError::NetworkError {
            url: redact_url(url),
            error: e.without_url().to_string(),
        };
        let response = request.send().await.map_err(network_err)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DownloadError::Unauthorized {
                url: redact_url(url),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(DownloadError::NetworkError {
                url: redact_url(url),
                error: format!("HTTP {status}"),
            });
        }

        let total_size = response.content_length().unwrap_or(0);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::IoError {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
        }

        let part = partial_path(dest);
        let io_err = |e: std::io::Error| DownloadError::IoError {
            path: part.clone(),
            error: e.to_string(),
        };
        let mut file = File::create(&part).await.map_err(io_err)?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(network_err)?;

            file.write_all(&chunk).await.map_err(io_err)?;

            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if let Some(cb) = progress {
                cb(downloaded, total_size);
            }
        }

        file.flush().await.map_err(io_err)?;
        drop(file);

        let checksum = hex::encode(hasher.finalize());
        if let Some(expected) = expected_checksum {
            if !checksum.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(DownloadError::ChecksumFailed {
                    file: dest.display().to_string(),
                });
            }
        }

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| DownloadError::IoError {
                path: dest.to_path_buf(),
                error: e.to_string(),
            })?;

        Ok(DownloadResult {
            path: dest.to_path_buf(),
            size: downloaded,
            checksum,
        })
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// In-flight path for `dest`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// `url` with the values of credential query parameters masked
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let is_secret = |key: &str| SECRET_PARAMS.contains(&key.to_ascii_lowercase().as_str());
    if !parsed.query_pairs().any(|(k, _)| is_secret(&k)) {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let value = if is_secret(&k) { REDACTED.to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

/// Progress reporter for a download labelled `label`
///
/// Draws a bar on a terminal; otherwise logs every 10%.
pub fn progress_reporter(label: &str) -> ProgressCallback {
    if std::io::stderr().is_terminal() {
        let bar = create_download_bar(label);
        return Box::new(move |done, total| {
            if total > 0 && bar.length() != Some(total) {
                bar.set_length(total);
            }
            bar.set_position(done);
            if total > 0 && done >= total {
                bar.finish_and_clear();
            }
        });
    }

    let label = label.to_string();
    let last_step = AtomicU64::new(0);
    Box::new(move |done, total| {
        if total == 0 {
            return;
        }
        let percent = done.saturating_mul(100) / total;
        let step = percent / 10;
        if step > last_step.load(Ordering::Relaxed) {
            last_step.store(step, Ordering::Relaxed);
            tracing::info!("{label}: {percent}% ({done}/{total} bytes)");
        }
    })
}

fn create_download_bar(label: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|s| s.progress_chars("█▓▒░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}
