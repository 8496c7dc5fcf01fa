//! Asset fetcher
//!
//! Streams a URL into `<dest>.download` and renames it over `dest` only after
//! the whole body arrived, so a half-written executable never sits at the
//! final path.

use crate::core::progress::{Progress, ReportThrottle, DEFAULT_REPORT_INTERVAL};
use crate::error::ChandlError;
use crate::platform::client::HttpClient;
use crate::utils::filename::{remove_if_exists, replace_file, with_suffix, DOWNLOAD_SUFFIX};
use futures_util::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Fetcher configuration
#[derive(Clone)]
pub struct FetcherConfig {
    /// Write buffer size in bytes
    pub chunk_size: usize,
    /// Minimum spacing between progress reports
    pub report_interval: Duration,
    /// Progress callback
    pub progress_callback: Option<Arc<dyn Fn(Progress) + Send + Sync>>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024, // 1MB
            report_interval: DEFAULT_REPORT_INTERVAL,
            progress_callback: None,
        }
    }
}

/// Downloads single files atomically
#[derive(Clone)]
pub struct AssetFetcher {
    client: HttpClient,
    config: FetcherConfig,
}

impl AssetFetcher {
    /// Create a new fetcher on the shared session
    pub fn new(client: HttpClient) -> Self {
        Self::with_config(client, FetcherConfig::default())
    }

    /// Create a new fetcher with configuration
    pub fn with_config(client: HttpClient, config: FetcherConfig) -> Self {
        Self { client, config }
    }

    /// Set progress callback
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.config.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Set write buffer size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size.max(1);
        self
    }

    /// Download `url` to `dest`; returns the number of bytes written.
    /// The temporary file is removed on every failure path.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ChandlError> {
        info!("Fetching {} -> {}", url, dest.display());
        let tmp_path = with_suffix(dest, DOWNLOAD_SUFFIX);

        match self.stream_to(url, &tmp_path).await {
            Ok(written) => {
                if let Err(e) = replace_file(&tmp_path, dest) {
                    let _ = remove_if_exists(&tmp_path);
                    return Err(e.into());
                }
                info!("Fetched {} bytes", written);
                Ok(written)
            }
            Err(e) => {
                warn!("Fetch failed: {}, cleaning up temp file", e);
                if let Err(cleanup) = remove_if_exists(&tmp_path) {
                    warn!("Could not remove {}: {}", tmp_path.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    async fn stream_to(&self, url: &str, tmp_path: &Path) -> Result<u64, ChandlError> {
        let response = self.client.get_stream(url).await?;
        let idle = self.client.config().read_timeout;
        let total = response.content_length().unwrap_or(0);

        let file = File::create(tmp_path).await?;
        let mut writer = BufWriter::with_capacity(self.config.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut progress = Progress::new(total);
        let mut throttle = ReportThrottle::new(self.config.report_interval);
        let mut downloaded = 0u64;

        loop {
            let next = tokio::time::timeout(idle, stream.next()).await.map_err(|_| {
                ChandlError::transfer(
                    url,
                    format!(
                        "stalled after {} bytes, nothing received for {}",
                        downloaded,
                        humantime::format_duration(idle)
                    ),
                )
            })?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| ChandlError::transfer(url, e))?;
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(callback) = &self.config.progress_callback {
                if throttle.ready() {
                    progress.update(downloaded);
                    callback(progress.clone());
                }
            }
        }

        writer.flush().await?;
        let file = writer.into_inner();
        file.sync_all().await?;
        drop(file);

        if total > 0 && downloaded < total {
            return Err(ChandlError::transfer(
                url,
                format!("body ended after {} of {} bytes", downloaded, total),
            ));
        }

        // Final report regardless of throttling
        if let Some(callback) = &self.config.progress_callback {
            progress.update(downloaded);
            callback(progress);
        }

        debug!("Stream finished: {} bytes", downloaded);
        Ok(downloaded)
    }
}
