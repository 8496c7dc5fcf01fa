//! Video records produced by a channel scan

use crate::utils::filename::{artifact_base_name, artifact_filename};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Thumbnail tiers in the order they are preferred
pub const THUMBNAIL_PRIORITY: [&str; 5] = ["maxres", "standard", "high", "medium", "default"];

/// A single thumbnail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Thumbnail URLs keyed by resolution tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailSet {
    #[serde(default)]
    pub maxres: Option<Thumbnail>,
    #[serde(default)]
    pub standard: Option<Thumbnail>,
    #[serde(default)]
    pub high: Option<Thumbnail>,
    #[serde(default)]
    pub medium: Option<Thumbnail>,
    #[serde(default)]
    pub default: Option<Thumbnail>,
}

impl ThumbnailSet {
    /// Look up a tier by name
    pub fn tier(&self, name: &str) -> Option<&Thumbnail> {
        match name {
            "maxres" => self.maxres.as_ref(),
            "standard" => self.standard.as_ref(),
            "high" => self.high.as_ref(),
            "medium" => self.medium.as_ref(),
            "default" => self.default.as_ref(),
            _ => None,
        }
    }

    /// Best available URL: maxres > standard > high > medium > default
    pub fn best_url(&self) -> Option<&str> {
        THUMBNAIL_PRIORITY
            .iter()
            .filter_map(|tier| self.tier(tier))
            .map(|thumb| thumb.url.as_str())
            .find(|url| !url.is_empty())
    }
}

/// Video information gathered from the listing and details passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// YouTube video ID
    pub id: String,
    /// Video title
    pub title: String,
    /// Publish timestamp
    pub published_at: DateTime<Utc>,
    /// Thumbnails by tier
    pub thumbnails: ThumbnailSet,
    /// Duration in seconds (0 when unknown)
    pub duration: u64,
    /// View count (0 when unknown)
    pub views: u64,
}

impl VideoRecord {
    /// Create a record from a listing stub; details default to zero
    pub fn new(id: String, title: String, published_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            published_at,
            thumbnails: ThumbnailSet::default(),
            duration: 0,
            views: 0,
        }
    }

    /// Set thumbnails
    pub fn with_thumbnails(mut self, thumbnails: ThumbnailSet) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    /// Calendar day of publication (UTC)
    pub fn publish_date(&self) -> NaiveDate {
        self.published_at.date_naive()
    }

    /// `YYYYMMDD_<id>`, shared by all artifacts of this video
    pub fn base_name(&self) -> String {
        artifact_base_name(&self.published_at, &self.id)
    }

    /// Artifact filename for the given extension
    pub fn filename(&self, extension: &str) -> String {
        artifact_filename(&self.published_at, &self.id, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn thumb(url: &str) -> Option<Thumbnail> {
        Some(Thumbnail {
            url: url.to_string(),
            width: None,
            height: None,
        })
    }

    #[test]
    fn test_best_url_priority() {
        let mut set = ThumbnailSet {
            high: thumb("https://i.ytimg.com/high.jpg"),
            medium: thumb("https://i.ytimg.com/medium.jpg"),
            default: thumb("https://i.ytimg.com/default.jpg"),
            ..Default::default()
        };
        assert_eq!(set.best_url(), Some("https://i.ytimg.com/high.jpg"));

        set.standard = thumb("https://i.ytimg.com/sd.jpg");
        assert_eq!(set.best_url(), Some("https://i.ytimg.com/sd.jpg"));

        set.maxres = thumb("https://i.ytimg.com/maxres.jpg");
        assert_eq!(set.best_url(), Some("https://i.ytimg.com/maxres.jpg"));
    }

    #[test]
    fn test_best_url_skips_empty_entries() {
        let set = ThumbnailSet {
            maxres: thumb(""),
            default: thumb("https://i.ytimg.com/default.jpg"),
            ..Default::default()
        };
        assert_eq!(set.best_url(), Some("https://i.ytimg.com/default.jpg"));
        assert_eq!(ThumbnailSet::default().best_url(), None);
    }

    #[test]
    fn test_thumbnail_set_deserialization() {
        let json = r#"{
            "default": {"url": "https://i.ytimg.com/vi/x/default.jpg", "width": 120, "height": 90},
            "high": {"url": "https://i.ytimg.com/vi/x/hqdefault.jpg", "width": 480, "height": 360}
        }"#;
        let set: ThumbnailSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.high.as_ref().unwrap().width, Some(480));
        assert!(set.maxres.is_none());
    }

    #[test]
    fn test_record_naming() {
        let published = Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 59).unwrap();
        let record = VideoRecord::new("abcDEF12345".into(), "Title".into(), published);
        assert_eq!(record.base_name(), "20211231_abcDEF12345");
        assert_eq!(record.filename("jpg"), "20211231_abcDEF12345.jpg");
        assert_eq!(record.publish_date(), NaiveDate::from_ymd_opt(2021, 12, 31).unwrap());
        assert_eq!(record.duration, 0);
        assert_eq!(record.views, 0);
    }
}
