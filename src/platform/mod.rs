//! Remote services: the shared HTTP session, the YouTube Data API and release feeds

pub mod client;
pub mod releases;
pub mod youtube;

pub use client::{HttpClient, HttpClientConfig};
pub use releases::{ReleaseAsset, ReleaseResolver};
pub use youtube::YouTubeApi;
