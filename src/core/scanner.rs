//! Channel scanner
//!
//! Turns a channel URL into the full list of uploaded videos: resolve the
//! channel, find its uploads collection, walk every page, then enrich the
//! stubs with duration and view counts in batches.

use crate::core::video_info::VideoRecord;
use crate::error::ChandlError;
use crate::platform::youtube::{YouTubeApi, MAX_RESULTS};
use crate::utils::url::{extract_channel_ref, ChannelRef};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Scan milestones reported to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanProgress {
    /// A handle or name is being looked up
    Resolving(String),
    ChannelResolved(String),
    UploadsFound(String),
    /// Running total after each listing page
    PageFetched { total: usize },
    FetchingDetails { total: usize },
    /// One details batch failed and its videos keep zero values
    DetailsBatchFailed { batch: usize, message: String },
}

/// Everything a finished scan knows
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub channel_id: String,
    pub uploads_playlist: String,
    pub videos: Vec<VideoRecord>,
}

type ProgressFn = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Channel scanner
pub struct ChannelScanner {
    api: YouTubeApi,
    progress: Option<ProgressFn>,
}

impl ChannelScanner {
    pub fn new(api: YouTubeApi) -> Self {
        Self {
            api,
            progress: None,
        }
    }

    /// Set progress callback
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ScanProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    fn report(&self, event: ScanProgress) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    /// Canonical channel ID for any accepted channel reference
    pub async fn resolve_channel(&self, channel: &ChannelRef) -> Result<String, ChandlError> {
        if !channel.needs_lookup() {
            return Ok(channel.value().to_string());
        }
        self.report(ScanProgress::Resolving(channel.value().to_string()));
        self.api.search_channel_id(channel.value()).await
    }

    /// Scan a channel; any API error aborts the listing
    pub async fn scan(&self, channel_url: &str) -> Result<ScanResult, ChandlError> {
        let channel = extract_channel_ref(channel_url)?;
        let channel_id = self.resolve_channel(&channel).await?;
        info!("Channel ID: {}", channel_id);
        self.report(ScanProgress::ChannelResolved(channel_id.clone()));

        let uploads_playlist = self.api.uploads_playlist(&channel_id).await?;
        self.report(ScanProgress::UploadsFound(uploads_playlist.clone()));

        let mut videos = self.list_uploads(&uploads_playlist).await?;
        self.enrich(&mut videos).await;

        Ok(ScanResult {
            channel_id,
            uploads_playlist,
            videos,
        })
    }

    /// Walk the uploads listing until no cursor, or an already used one, is returned
    pub async fn list_uploads(&self, playlist_id: &str) -> Result<Vec<VideoRecord>, ChandlError> {
        let mut videos = Vec::new();
        let mut seen = HashSet::new();
        let mut used_tokens = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .api
                .playlist_page(playlist_id, page_token.as_deref())
                .await?;
            for video in page.videos {
                if seen.insert(video.id.clone()) {
                    videos.push(video);
                } else {
                    debug!("Skipping repeated video {}", video.id);
                }
            }
            self.report(ScanProgress::PageFetched {
                total: videos.len(),
            });

            match page.next_page_token {
                Some(token) if used_tokens.insert(token.clone()) => page_token = Some(token),
                Some(token) => {
                    warn!("Page token {} repeated, stopping the listing", token);
                    break;
                }
                None => break,
            }
        }

        Ok(videos)
    }

    /// Merge duration and views onto the stubs, 50 IDs per request.
    /// Failed batches are reported and leave their videos at zero.
    pub async fn enrich(&self, videos: &mut [VideoRecord]) {
        if videos.is_empty() {
            return;
        }
        self.report(ScanProgress::FetchingDetails {
            total: videos.len(),
        });

        for (batch, chunk) in videos.chunks_mut(MAX_RESULTS).enumerate() {
            let ids: Vec<String> = chunk.iter().map(|video| video.id.clone()).collect();
            match self.api.video_details(&ids).await {
                Ok(details) => {
                    for video in chunk.iter_mut() {
                        let found = details.get(&video.id).copied().unwrap_or_default();
                        video.duration = found.duration;
                        video.views = found.views;
                    }
                }
                Err(e) => {
                    warn!("Details batch {} failed: {}", batch + 1, e);
                    self.report(ScanProgress::DetailsBatchFailed {
                        batch: batch + 1,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
