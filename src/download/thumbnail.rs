//! In-process thumbnail conversion
//!
//! Thumbnails are fetched straight from the CDN and re-encoded locally, which
//! is much quicker than a round trip through the external downloader.

use crate::core::video_info::VideoRecord;
use crate::error::ChandlError;
use crate::platform::client::HttpClient;
use crate::utils::filename::{replace_file, with_suffix, STAGING_SUFFIX};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// JPEG quality of written thumbnails
pub const JPEG_QUALITY: u8 = 85;

/// Target thumbnail dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailSize {
    MaxRes,
    High,
    Medium,
    Default,
    Custom(u32, u32),
}

impl ThumbnailSize {
    /// Width and height in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ThumbnailSize::MaxRes => (1280, 720),
            ThumbnailSize::High => (480, 360),
            ThumbnailSize::Medium => (320, 180),
            ThumbnailSize::Default => (120, 90),
            ThumbnailSize::Custom(w, h) => (*w, *h),
        }
    }

    /// Build from a preset name; `custom` takes the explicit dimensions and
    /// falls back to 1280x720 when either is zero
    pub fn from_preset(name: &str, width: u32, height: u32) -> Result<Self, ChandlError> {
        match name.trim().to_lowercase().as_str() {
            "custom" if width > 0 && height > 0 => Ok(ThumbnailSize::Custom(width, height)),
            "custom" => Ok(ThumbnailSize::MaxRes),
            other => other.parse(),
        }
    }
}

impl FromStr for ThumbnailSize {
    type Err = ChandlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "maxres" => Ok(ThumbnailSize::MaxRes),
            "high" => Ok(ThumbnailSize::High),
            "medium" => Ok(ThumbnailSize::Medium),
            "default" => Ok(ThumbnailSize::Default),
            other => {
                let (w, h) = other
                    .split_once('x')
                    .ok_or_else(|| ChandlError::Config(format!("invalid thumbnail size: {}", s)))?;
                match (w.parse::<u32>(), h.parse::<u32>()) {
                    (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(ThumbnailSize::Custom(w, h)),
                    _ => Err(ChandlError::Config(format!("invalid thumbnail size: {}", s))),
                }
            }
        }
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThumbnailSize::MaxRes => write!(f, "maxres"),
            ThumbnailSize::High => write!(f, "high"),
            ThumbnailSize::Medium => write!(f, "medium"),
            ThumbnailSize::Default => write!(f, "default"),
            ThumbnailSize::Custom(w, h) => write!(f, "{}x{}", w, h),
        }
    }
}

/// Decode, flatten onto white, resize and encode as JPEG
pub fn render_thumbnail(source: &[u8], size: ThumbnailSize) -> Result<Vec<u8>, ChandlError> {
    let decoded = image::load_from_memory(source)?;
    let rgba = decoded.to_rgba8();

    let mut canvas = RgbImage::from_pixel(rgba.width(), rgba.height(), Rgb([255, 255, 255]));
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        canvas.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }

    let (width, height) = size.dimensions();
    let resized = image::imageops::resize(&canvas, width, height, FilterType::Triangle);

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY).encode_image(&resized)?;
    Ok(encoded)
}

/// Fetches and writes thumbnails through the shared HTTP session
#[derive(Clone)]
pub struct ThumbnailWriter {
    client: HttpClient,
    size: ThumbnailSize,
}

impl ThumbnailWriter {
    pub fn new(client: HttpClient, size: ThumbnailSize) -> Self {
        Self { client, size }
    }

    /// Write `<base>.jpg` for `video` into `output_dir`
    pub async fn write(&self, video: &VideoRecord, output_dir: &Path) -> Result<PathBuf, ChandlError> {
        let url = video.thumbnails.best_url().ok_or_else(|| {
            ChandlError::transfer(video.id.clone(), "no thumbnail URL available")
        })?;
        debug!("Fetching thumbnail {}", url);

        let source = self.client.get_bytes(url).await?;
        let size = self.size;
        let encoded = tokio::task::spawn_blocking(move || render_thumbnail(&source, size))
            .await
            .map_err(|e| ChandlError::Config(format!("thumbnail worker failed: {}", e)))??;

        let dest = output_dir.join(video.filename("jpg"));
        let staged = with_suffix(&dest, STAGING_SUFFIX);
        if let Err(e) = tokio::fs::write(&staged, &encoded).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e.into());
        }
        replace_file(&staged, &dest)?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video_info::{Thumbnail, ThumbnailSet};
    use chrono::{TimeZone, Utc};
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(image: RgbaImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_preset_dimensions() {
        assert_eq!(ThumbnailSize::MaxRes.dimensions(), (1280, 720));
        assert_eq!(ThumbnailSize::High.dimensions(), (480, 360));
        assert_eq!(ThumbnailSize::Medium.dimensions(), (320, 180));
        assert_eq!(ThumbnailSize::Default.dimensions(), (120, 90));
        assert_eq!(ThumbnailSize::Custom(64, 48).dimensions(), (64, 48));
    }

    #[test]
    fn test_from_preset() {
        assert_eq!(ThumbnailSize::from_preset("high", 0, 0).unwrap(), ThumbnailSize::High);
        assert_eq!(
            ThumbnailSize::from_preset("custom", 200, 100).unwrap(),
            ThumbnailSize::Custom(200, 100)
        );
        assert_eq!(ThumbnailSize::from_preset("custom", 0, 100).unwrap(), ThumbnailSize::MaxRes);
        assert_eq!("640x360".parse::<ThumbnailSize>().unwrap(), ThumbnailSize::Custom(640, 360));
        assert!("huge".parse::<ThumbnailSize>().is_err());
    }

    #[test]
    fn test_render_flattens_transparency_onto_white() {
        let source = png(RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 0])));
        let jpeg = render_thumbnail(&source, ThumbnailSize::Custom(16, 9)).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (16, 9));
        let pixel = decoded.to_rgb8().get_pixel(8, 4).0;
        assert!(pixel.iter().all(|c| *c >= 245), "expected white, got {:?}", pixel);
    }

    #[test]
    fn test_render_keeps_opaque_colour() {
        let source = png(RgbaImage::from_pixel(40, 30, Rgba([220, 10, 10, 255])));
        let jpeg = render_thumbnail(&source, ThumbnailSize::Default).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (120, 90));
        let [r, g, b] = decoded.get_pixel(60, 45).0;
        assert!(r > 180 && g < 60 && b < 60);
    }

    #[test]
    fn test_render_rejects_garbage() {
        assert!(matches!(
            render_thumbnail(b"not an image", ThumbnailSize::High),
            Err(ChandlError::ImageError(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_saves_jpeg() {
        let mut server = mockito::Server::new_async().await;
        let body = png(RgbaImage::from_pixel(8, 8, Rgba([0, 128, 255, 255])));
        let mock = server
            .mock("GET", "/vi/abc/maxresdefault.jpg")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let published = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let video = VideoRecord::new("abc".into(), "t".into(), published).with_thumbnails(ThumbnailSet {
            maxres: Some(Thumbnail {
                url: format!("{}/vi/abc/maxresdefault.jpg", server.url()),
                width: None,
                height: None,
            }),
            ..Default::default()
        });

        let dir = tempfile::tempdir().unwrap();
        let writer = ThumbnailWriter::new(HttpClient::new().unwrap(), ThumbnailSize::Medium);
        let path = writer.write(&video, dir.path()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(path, dir.path().join("20240506_abc.jpg"));
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.dimensions(), (320, 180));
        assert!(!dir.path().join("20240506_abc.jpg.new").exists());
    }

    #[tokio::test]
    async fn test_writer_without_url_fails() {
        let published = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let video = VideoRecord::new("abc".into(), "t".into(), published);
        let dir = tempfile::tempdir().unwrap();
        let writer = ThumbnailWriter::new(HttpClient::new().unwrap(), ThumbnailSize::Medium);
        assert!(writer.write(&video, dir.path()).await.is_err());
    }
}
