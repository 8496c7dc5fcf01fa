//! Release resolver for prebuilt tool archives
//!
//! Reads a "latest release" manifest and picks the archive for the target
//! platform: exact names from a preference list first, then a loose
//! substring match.

use crate::error::ChandlError;
use crate::platform::client::HttpClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Accept header expected by the release API
pub const GITHUB_JSON: &str = "application/vnd.github+json";

/// Latest BtbN ffmpeg builds
pub const FFMPEG_RELEASE_API: &str = "https://api.github.com/repos/BtbN/FFmpeg-Builds/releases/latest";

/// Secondary source used when the release API path fails for any reason
pub const FFMPEG_FALLBACK_URL: &str = "https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip";

/// Direct download of the latest yt-dlp Windows binary
pub const YTDLP_DIRECT_URL: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe";

/// A downloadable release file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// The parts of a release manifest we read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseManifest {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// ffmpeg archive names for a platform tag, most specific first
pub fn ffmpeg_asset_preferences(platform_tag: &str) -> Vec<String> {
    vec![
        format!("ffmpeg-master-latest-{}-gpl.zip", platform_tag),
        format!("ffmpeg-master-latest-{}-gpl-shared.zip", platform_tag),
        format!("ffmpeg-master-latest-{}.zip", platform_tag),
    ]
}

/// Pick an asset: first exact preference present, otherwise the first asset
/// whose name is a zip containing the platform tag, `gpl` and `ffmpeg`
pub fn select_asset(
    manifest: &ReleaseManifest,
    preferences: &[String],
    platform_tag: &str,
) -> Result<ReleaseAsset, ChandlError> {
    let by_name: HashMap<&str, &ReleaseAsset> = manifest
        .assets
        .iter()
        .map(|asset| (asset.name.as_str(), asset))
        .collect();

    if let Some(asset) = preferences
        .iter()
        .find_map(|name| by_name.get(name.as_str()))
    {
        debug!("Exact asset match: {}", asset.name);
        return Ok((*asset).clone());
    }

    let tag = platform_tag.to_lowercase();
    manifest
        .assets
        .iter()
        .find(|asset| {
            let name = asset.name.to_lowercase();
            name.ends_with(".zip")
                && name.contains(&tag)
                && name.contains("gpl")
                && name.contains("ffmpeg")
        })
        .cloned()
        .ok_or_else(|| {
            ChandlError::Resolution(format!(
                "no {} asset among {} candidates",
                platform_tag,
                manifest.assets.len()
            ))
        })
}

/// Resolves release assets over HTTP
#[derive(Clone)]
pub struct ReleaseResolver {
    client: HttpClient,
}

impl ReleaseResolver {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Fetch the manifest at `api_url`
    pub async fn fetch_latest(&self, api_url: &str) -> Result<ReleaseManifest, ChandlError> {
        let manifest: ReleaseManifest = self.client.get_json(api_url, GITHUB_JSON).await?;
        info!(
            "Release {} lists {} assets",
            manifest.tag_name.as_deref().unwrap_or("<untagged>"),
            manifest.assets.len()
        );
        Ok(manifest)
    }

    /// Fetch the manifest and select the asset for `platform_tag`
    pub async fn resolve(
        &self,
        api_url: &str,
        preferences: &[String],
        platform_tag: &str,
    ) -> Result<ReleaseAsset, ChandlError> {
        let manifest = self.fetch_latest(api_url).await?;
        select_asset(&manifest, preferences, platform_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            browser_download_url: format!("https://example.com/dl/{}", name),
        }
    }

    fn manifest(names: &[&str]) -> ReleaseManifest {
        ReleaseManifest {
            tag_name: Some("latest".into()),
            assets: names.iter().map(|n| asset(n)).collect(),
        }
    }

    #[test]
    fn test_exact_preference_wins() {
        let m = manifest(&["ffmpeg-master-latest-win64-gpl.zip", "other.zip"]);
        let selected = select_asset(&m, &ffmpeg_asset_preferences("win64"), "win64").unwrap();
        assert_eq!(
            selected.browser_download_url,
            "https://example.com/dl/ffmpeg-master-latest-win64-gpl.zip"
        );
    }

    #[test]
    fn test_preference_order_not_manifest_order() {
        let m = manifest(&[
            "ffmpeg-master-latest-win64.zip",
            "ffmpeg-master-latest-win64-gpl-shared.zip",
        ]);
        let selected = select_asset(&m, &ffmpeg_asset_preferences("win64"), "win64").unwrap();
        assert_eq!(selected.name, "ffmpeg-master-latest-win64-gpl-shared.zip");
    }

    #[test]
    fn test_substring_fallback() {
        let m = manifest(&[
            "checksums.sha256",
            "ffmpeg-n7.1-latest-linux64-gpl-7.1.tar.xz",
            "ffmpeg-n7.1-latest-win64-gpl-7.1.zip",
        ]);
        let selected = select_asset(&m, &ffmpeg_asset_preferences("win64"), "win64").unwrap();
        assert_eq!(selected.name, "ffmpeg-n7.1-latest-win64-gpl-7.1.zip");
    }

    #[test]
    fn test_no_match_is_resolution_error() {
        let m = manifest(&["ffmpeg-master-latest-win64-lgpl.tar.xz", "README.md"]);
        let err = select_asset(&m, &ffmpeg_asset_preferences("win32"), "win32").unwrap_err();
        assert!(matches!(err, ChandlError::Resolution(_)));
    }

    #[tokio::test]
    async fn test_resolve_over_http() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "tag_name": "latest",
            "assets": [
                {"name": "ffmpeg-master-latest-win64-gpl.zip", "browser_download_url": "https://dl/a.zip", "size": 1},
                {"name": "other.zip", "browser_download_url": "https://dl/b.zip"}
            ]
        }"#;
        let mock = server
            .mock("GET", "/repos/BtbN/FFmpeg-Builds/releases/latest")
            .match_header("accept", GITHUB_JSON)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let resolver = ReleaseResolver::new(HttpClient::new().unwrap());
        let url = format!("{}/repos/BtbN/FFmpeg-Builds/releases/latest", server.url());
        let selected = resolver
            .resolve(&url, &ffmpeg_asset_preferences("win64"), "win64")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(selected.browser_download_url, "https://dl/a.zip");
    }

    #[tokio::test]
    async fn test_resolve_http_error_is_transfer() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest")
            .with_status(403)
            .create_async()
            .await;

        let resolver = ReleaseResolver::new(HttpClient::new().unwrap());
        let err = resolver
            .resolve(&format!("{}/latest", server.url()), &[], "win64")
            .await
            .unwrap_err();
        assert!(err.is_transfer_failure());
    }
}
