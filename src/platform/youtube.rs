//! YouTube Data API v3 client
//!
//! Thin typed wrapper over the four endpoints a channel scan needs:
//! `search`, `channels`, `playlistItems` and `videos`.

use crate::core::video_info::{ThumbnailSet, VideoRecord};
use crate::error::ChandlError;
use crate::platform::client::HttpClient;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Public API root
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page / batch the API accepts
pub const MAX_RESULTS: usize = 50;

/// Parse a `PT#H#M#S` duration into seconds; absent parts count as zero and
/// anything unparseable yields zero
pub fn parse_duration(value: &str) -> u64 {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?").expect("valid duration pattern")
    });

    let Some(captures) = pattern.captures(value.trim()) else {
        return 0;
    };
    let part = |index: usize| -> u64 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    part(1) * 3600 + part(2) * 60 + part(3)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: PlaylistSnippet,
    content_details: PlaylistContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    #[serde(default)]
    title: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    thumbnails: ThumbnailSet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistContentDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    #[serde(default)]
    content_details: Option<VideoContentDetails>,
    #[serde(default)]
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default)]
    view_count: Option<String>,
}

/// One page of the uploads listing
#[derive(Debug, Clone, Default)]
pub struct PlaylistPage {
    pub videos: Vec<VideoRecord>,
    pub next_page_token: Option<String>,
}

/// Duration and views for one video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoDetails {
    pub duration: u64,
    pub views: u64,
}

/// Data API client bound to one credential
#[derive(Clone)]
pub struct YouTubeApi {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl YouTubeApi {
    /// Client against the public endpoint; an empty key is rejected up front
    pub fn new(client: HttpClient, api_key: impl Into<String>) -> Result<Self, ChandlError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChandlError::MissingCredential);
        }
        Ok(Self {
            client,
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    /// Point at another API root (used against local mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ChandlError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, endpoint))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", &self.api_key);
        debug!("YouTube API {} {:?}", endpoint, params);

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ChandlError::transfer(format!("{}/{}", self.base_url, endpoint), e))?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if let Some(message) = body
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(|message| message.as_str())
        {
            return Err(ChandlError::Api(message.to_string()));
        }
        if !status.is_success() {
            return Err(ChandlError::Api(format!("{} returned HTTP {}", endpoint, status)));
        }

        Ok(serde_json::from_value(body)?)
    }

    /// Canonical channel ID for a handle, custom name or username
    pub async fn search_channel_id(&self, query: &str) -> Result<String, ChandlError> {
        let response: ListResponse<SearchItem> = self
            .call(
                "search",
                &[("part", "snippet"), ("q", query), ("type", "channel")],
            )
            .await?;
        response
            .items
            .into_iter()
            .next()
            .map(|item| item.snippet.channel_id)
            .ok_or_else(|| ChandlError::ChannelNotFound(query.to_string()))
    }

    /// ID of the channel's uploads collection
    pub async fn uploads_playlist(&self, channel_id: &str) -> Result<String, ChandlError> {
        let response: ListResponse<ChannelItem> = self
            .call("channels", &[("part", "contentDetails"), ("id", channel_id)])
            .await?;
        response
            .items
            .into_iter()
            .next()
            .map(|item| item.content_details.related_playlists.uploads)
            .ok_or_else(|| ChandlError::ChannelNotFound(channel_id.to_string()))
    }

    /// One page of the uploads listing
    pub async fn playlist_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistPage, ChandlError> {
        let max_results = MAX_RESULTS.to_string();
        let mut params = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: ListResponse<PlaylistItem> = self.call("playlistItems", &params).await?;
        let videos = response
            .items
            .into_iter()
            .map(|item| {
                VideoRecord::new(
                    item.content_details.video_id,
                    item.snippet.title,
                    item.snippet.published_at,
                )
                .with_thumbnails(item.snippet.thumbnails)
            })
            .collect();

        Ok(PlaylistPage {
            videos,
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    /// Duration and views for up to [`MAX_RESULTS`] IDs
    pub async fn video_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, VideoDetails>, ChandlError> {
        let joined = ids.join(",");
        let response: ListResponse<VideoItem> = self
            .call(
                "videos",
                &[("part", "contentDetails,statistics"), ("id", joined.as_str())],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|item| {
                let duration = item
                    .content_details
                    .map(|details| parse_duration(&details.duration))
                    .unwrap_or(0);
                let views = item
                    .statistics
                    .and_then(|stats| stats.view_count)
                    .and_then(|count| count.parse::<u64>().ok())
                    .unwrap_or(0);
                (item.id, VideoDetails { duration, views })
            })
            .collect())
    }
}
