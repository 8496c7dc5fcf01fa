//! Persisted settings
//!
//! Every user-facing option lives in [`Settings`], stored as pretty JSON.
//! Missing keys take their defaults, unknown keys are ignored and a file that
//! does not parse is reported and replaced by defaults on the next save.
//! An API key from the environment or the command line is kept beside the
//! stored one and never written back.

use crate::core::filter::FilterCriteria;
use crate::download::dispatcher::{clamp_concurrency, ArtifactSelection, QualityConfig};
use crate::download::thumbnail::ThumbnailSize;
use crate::download::ytdlp::{AudioSpec, FrameRate, VideoQuality};
use crate::error::ChandlError;
use crate::utils::filename::{remove_if_exists, replace_file, with_suffix, STAGING_SUFFIX};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SETTINGS_FILE: &str = "settings.json";
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// Directory holding the running executable, or the working directory
pub fn executable_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub cookie_file: String,
    pub channel_url: String,

    pub download_video: bool,
    pub download_audio: bool,
    pub download_thumbnail: bool,
    pub download_title: bool,

    pub video_quality: String,
    pub video_fps: String,
    pub audio_format: String,
    pub audio_bitrate: String,
    pub thumb_size: String,
    pub thumb_width: u32,
    pub thumb_height: u32,

    pub use_date_filter: bool,
    pub date_from: String,
    pub date_to: String,
    pub use_duration_filter: bool,
    pub duration_min: String,
    pub duration_max: String,
    pub use_view_filter: bool,
    pub view_min: String,
    pub view_max: String,

    pub thread_count: usize,
    pub output_dir: PathBuf,

    #[serde(skip)]
    api_key_override: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            cookie_file: String::new(),
            channel_url: String::new(),
            download_video: true,
            download_audio: false,
            download_thumbnail: false,
            download_title: false,
            video_quality: "1080p".to_string(),
            video_fps: "30".to_string(),
            audio_format: "mp3".to_string(),
            audio_bitrate: "320k".to_string(),
            thumb_size: "maxres".to_string(),
            thumb_width: 1280,
            thumb_height: 720,
            use_date_filter: false,
            date_from: "2020-01-01".to_string(),
            date_to: chrono::Local::now().format("%Y-%m-%d").to_string(),
            use_duration_filter: false,
            duration_min: "0".to_string(),
            duration_max: "999".to_string(),
            use_view_filter: false,
            view_min: "0".to_string(),
            view_max: "999999999".to_string(),
            thread_count: 3,
            output_dir: executable_dir().join("downloads"),
            api_key_override: None,
        }
    }
}

impl Settings {
    /// `settings.json` next to the executable
    pub fn default_path() -> PathBuf {
        executable_dir().join(SETTINGS_FILE)
    }

    /// Load from `path`, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ChandlError> {
        let mut settings = Self::read(path)?;
        settings.apply_env(env_var_string);
        Ok(settings)
    }

    /// Read `path` without consulting the environment.
    /// A missing or malformed file yields defaults.
    pub fn read(path: &Path) -> Result<Self, ChandlError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut settings = match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring malformed settings {}: {}", path.display(), e);
                Self::default()
            }
        };
        settings.thread_count = clamp_concurrency(settings.thread_count);
        Ok(settings)
    }

    /// Override values from the environment through `env_lookup`
    pub fn apply_env(&mut self, env_lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = env_lookup(API_KEY_ENV) {
            self.set_api_key_override(key);
        }
    }

    /// Use `key` for this run only; `save` keeps writing the stored `api_key`
    pub fn set_api_key_override(&mut self, key: impl Into<String>) {
        self.api_key_override = Some(key.into());
    }

    /// Key in effect: the runtime override, else the stored one
    pub fn effective_api_key(&self) -> &str {
        self.api_key_override.as_deref().unwrap_or(&self.api_key)
    }

    /// Write pretty JSON through a staged file
    pub fn save(&self, path: &Path) -> Result<(), ChandlError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staged = with_suffix(path, STAGING_SUFFIX);
        let json = serde_json::to_string_pretty(self)?;
        if let Err(e) = fs::write(&staged, json).and_then(|()| replace_file(&staged, path)) {
            let _ = remove_if_exists(&staged);
            return Err(e.into());
        }
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn set_thread_count(&mut self, count: usize) {
        self.thread_count = clamp_concurrency(count);
    }

    /// Trimmed API key, or a startup error when it is blank
    pub fn require_api_key(&self) -> Result<&str, ChandlError> {
        let key = self.effective_api_key().trim();
        if key.is_empty() {
            return Err(ChandlError::MissingCredential);
        }
        Ok(key)
    }

    pub fn require_channel(&self) -> Result<&str, ChandlError> {
        let channel = self.channel_url.trim();
        if channel.is_empty() {
            return Err(ChandlError::MissingSelection("no channel URL given".to_string()));
        }
        Ok(channel)
    }

    pub fn cookie_path(&self) -> Option<PathBuf> {
        let cookie = self.cookie_file.trim();
        (!cookie.is_empty()).then(|| PathBuf::from(cookie))
    }

    /// Enabled filters; disabled toggles contribute nothing
    pub fn filter_criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::none();
        if self.use_date_filter {
            criteria = criteria.with_date(&self.date_from, &self.date_to);
        }
        if self.use_duration_filter {
            criteria = criteria.with_duration_minutes(&self.duration_min, &self.duration_max);
        }
        if self.use_view_filter {
            criteria = criteria.with_views(&self.view_min, &self.view_max);
        }
        criteria
    }

    pub fn artifacts(&self) -> ArtifactSelection {
        ArtifactSelection {
            video: self.download_video,
            audio: self.download_audio,
            thumbnail: self.download_thumbnail,
            title: self.download_title,
        }
    }

    pub fn video_quality(&self) -> VideoQuality {
        self.video_quality.parse().unwrap_or_else(|e| {
            warn!("{}, using 1080p", e);
            VideoQuality::MaxHeight(1080)
        })
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.video_fps.parse().unwrap_or_else(|e| {
            warn!("{}, using 30 fps", e);
            FrameRate::Fps(30)
        })
    }

    pub fn audio_spec(&self) -> AudioSpec {
        let defaults = AudioSpec::default();
        let pick = |value: &str, fallback: String| {
            let value = value.trim();
            if value.is_empty() {
                fallback
            } else {
                value.to_string()
            }
        };
        AudioSpec {
            format: pick(&self.audio_format, defaults.format),
            bitrate: pick(&self.audio_bitrate, defaults.bitrate),
        }
    }

    pub fn thumbnail_size(&self) -> ThumbnailSize {
        ThumbnailSize::from_preset(&self.thumb_size, self.thumb_width, self.thumb_height)
            .unwrap_or_else(|e| {
                warn!("{}, using maxres", e);
                ThumbnailSize::MaxRes
            })
    }

    pub fn quality(&self) -> QualityConfig {
        QualityConfig {
            video: self.video_quality(),
            fps: self.frame_rate(),
            audio: self.audio_spec(),
            thumbnail: self.thumbnail_size(),
        }
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
