//! # chandl - YouTube channel downloader
//!
//! Scans a channel's uploads through the YouTube Data API, filters them by
//! publish date, duration and view count, and downloads the survivors with
//! yt-dlp on a bounded worker pool.
//!
//! ## Features
//!
//! - Channel URLs, @handles, custom names and raw channel IDs
//! - Paginated upload listing with batched duration/view lookups
//! - Independent, toggleable range filters
//! - Parallel video, audio, thumbnail and title downloads with cooperative cancellation
//! - yt-dlp / ffmpeg installer with a fallback mirror
//!
//! ## Example
//!
//! ```rust,no_run
//! use chandl::core::scanner::ChannelScanner;
//! use chandl::core::filter::FilterCriteria;
//! use chandl::platform::{HttpClient, YouTubeApi};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = YouTubeApi::new(HttpClient::new()?, "API_KEY")?;
//!     let scan = ChannelScanner::new(api)
//!         .scan("https://www.youtube.com/@channel")
//!         .await?;
//!
//!     let recent = FilterCriteria::none()
//!         .with_date("2024-01-01", "2024-12-31")
//!         .apply(&scan.videos);
//!     println!("{} of {} videos", recent.videos.len(), scan.videos.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod download;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use config::Settings;
pub use core::{ChannelScanner, FilterCriteria, ToolUpdater, VideoRecord};
pub use download::{DispatchEvent, DispatchHandle, DispatchRequest, Dispatcher};
pub use error::ChandlError;

/// Result type alias for chandl operations
pub type Result<T> = std::result::Result<T, ChandlError>;
