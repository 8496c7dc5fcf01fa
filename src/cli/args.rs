//! Command line argument parsing

use crate::config::Settings;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// chandl - scan a YouTube channel, filter its uploads and download them with yt-dlp
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to settings.json next to the executable)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install or update yt-dlp and ffmpeg
    UpdateTools(UpdateToolsArgs),
    /// Scan a channel and list the videos passing the filters
    Scan(ScanArgs),
    /// Scan, filter and download
    Download(DownloadArgs),
    /// Inspect or write the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsAction {
    /// Print the effective settings as JSON
    Show,
    /// Write the effective settings (defaults included) to the file
    Save,
    /// Print the settings file location
    Path,
}

#[derive(Args, Debug, Default)]
pub struct UpdateToolsArgs {
    /// Target directory (defaults to the executable's directory)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Release platform tag, e.g. win64
    #[arg(long, value_name = "TAG")]
    pub platform: Option<String>,
}

/// Values that override the loaded settings for one run
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsOverrides {
    /// Channel URL, @handle or channel ID
    #[arg(short, long, value_name = "URL")]
    pub channel: Option<String>,

    /// YouTube Data API key for this run (not saved; YOUTUBE_API_KEY also works)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Netscape cookie file passed to yt-dlp
    #[arg(long, value_name = "PATH")]
    pub cookies: Option<String>,

    /// Video quality: best, 2160p, 1440p, 1080p, 720p, 480p, 360p
    #[arg(long, value_name = "QUALITY")]
    pub quality: Option<String>,

    /// Frame rate: original or a number
    #[arg(long, value_name = "FPS")]
    pub fps: Option<String>,

    /// Audio codec for extraction
    #[arg(long, value_name = "FORMAT")]
    pub audio_format: Option<String>,

    /// Audio bitrate, e.g. 320k
    #[arg(long, value_name = "BITRATE")]
    pub audio_bitrate: Option<String>,

    /// Thumbnail size: maxres, high, medium, default or WIDTHxHEIGHT
    #[arg(long, value_name = "SIZE")]
    pub thumb_size: Option<String>,

    /// Earliest publish date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_from: Option<String>,

    /// Latest publish date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_to: Option<String>,

    /// Minimum duration in minutes
    #[arg(long, value_name = "MIN")]
    pub duration_min: Option<String>,

    /// Maximum duration in minutes
    #[arg(long, value_name = "MIN")]
    pub duration_max: Option<String>,

    /// Minimum view count
    #[arg(long, value_name = "N")]
    pub views_min: Option<String>,

    /// Maximum view count
    #[arg(long, value_name = "N")]
    pub views_max: Option<String>,
}

impl SettingsOverrides {
    /// Copy every given value into `settings`; a bound turns its filter on.
    /// The API key only applies to the current run.
    pub fn apply(&self, settings: &mut Settings) {
        fn set(target: &mut String, value: &Option<String>) -> bool {
            match value {
                Some(value) => {
                    *target = value.clone();
                    true
                }
                None => false,
            }
        }

        set(&mut settings.channel_url, &self.channel);
        if let Some(key) = &self.api_key {
            settings.set_api_key_override(key.clone());
        }
        set(&mut settings.cookie_file, &self.cookies);
        set(&mut settings.video_quality, &self.quality);
        set(&mut settings.video_fps, &self.fps);
        set(&mut settings.audio_format, &self.audio_format);
        set(&mut settings.audio_bitrate, &self.audio_bitrate);

        if let Some(size) = &self.thumb_size {
            match size.split_once(['x', 'X']) {
                Some((w, h)) => {
                    settings.thumb_size = "custom".to_string();
                    settings.thumb_width = w.trim().parse().unwrap_or(0);
                    settings.thumb_height = h.trim().parse().unwrap_or(0);
                }
                None => settings.thumb_size = size.clone(),
            }
        }

        let date_from = set(&mut settings.date_from, &self.date_from);
        let date_to = set(&mut settings.date_to, &self.date_to);
        if date_from || date_to {
            settings.use_date_filter = true;
        }

        let duration_min = set(&mut settings.duration_min, &self.duration_min);
        let duration_max = set(&mut settings.duration_max, &self.duration_max);
        if duration_min || duration_max {
            settings.use_duration_filter = true;
        }

        let views_min = set(&mut settings.view_min, &self.views_min);
        let views_max = set(&mut settings.view_max, &self.views_max);
        if views_min || views_max {
            settings.use_view_filter = true;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    #[command(flatten)]
    pub overrides: SettingsOverrides,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub overrides: SettingsOverrides,

    /// Download the video (merged mp4)
    #[arg(long)]
    pub video: bool,

    /// Extract the audio track
    #[arg(long)]
    pub audio: bool,

    /// Save a resized JPEG thumbnail
    #[arg(long)]
    pub thumbnail: bool,

    /// Save the title as a text file
    #[arg(long)]
    pub title: bool,

    /// Parallel downloads (1-10)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Timeout for each yt-dlp invocation (e.g., 30m, 1h)
    #[arg(long, value_name = "DURATION", default_value = "30m")]
    pub timeout: humantime::Duration,
}

impl DownloadArgs {
    /// Get tool timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// Whether any artifact flag was given
    pub fn has_artifact_flags(&self) -> bool {
        self.video || self.audio || self.thumbnail || self.title
    }

    /// Apply overrides, artifact flags, threads and output to `settings`.
    /// Artifact flags replace the saved selection only when at least one is given.
    pub fn apply(&self, settings: &mut Settings) {
        self.overrides.apply(settings);
        if self.has_artifact_flags() {
            settings.download_video = self.video;
            settings.download_audio = self.audio;
            settings.download_thumbnail = self.thumbnail;
            settings.download_title = self.title;
        }
        if let Some(threads) = self.threads {
            settings.set_thread_count(threads);
        }
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
    }
}

impl Cli {
    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Settings file in effect
    pub fn settings_path(&self) -> PathBuf {
        self.settings.clone().unwrap_or_else(Settings::default_path)
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

// Default for DownloadArgs to make tests work
impl Default for DownloadArgs {
    fn default() -> Self {
        Self {
            overrides: SettingsOverrides::default(),
            video: false,
            audio: false,
            thumbnail: false,
            title: false,
            threads: None,
            output: None,
            timeout: humantime::Duration::from(Duration::from_secs(30 * 60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_level() {
        let cli = Cli::try_parse_from(["chandl", "-q", "settings", "path"]).unwrap();
        assert_eq!(cli.verbosity_level(), VerbosityLevel::Quiet);

        let cli = Cli::try_parse_from(["chandl", "settings", "show", "--verbose"]).unwrap();
        assert_eq!(cli.verbosity_level(), VerbosityLevel::Verbose);

        let cli = Cli::try_parse_from(["chandl", "settings", "save"]).unwrap();
        assert_eq!(cli.verbosity_level(), VerbosityLevel::Normal);
        assert!(matches!(
            cli.command,
            Command::Settings {
                action: SettingsAction::Save
            }
        ));
    }

    #[test]
    fn test_settings_path_override() {
        let cli =
            Cli::try_parse_from(["chandl", "--settings", "/tmp/s.json", "settings", "path"]).unwrap();
        assert_eq!(cli.settings_path(), PathBuf::from("/tmp/s.json"));
    }

    #[test]
    fn test_download_args_parse() {
        let cli = Cli::try_parse_from([
            "chandl",
            "download",
            "--channel",
            "https://www.youtube.com/@someone",
            "--audio",
            "--title",
            "--threads",
            "4",
            "--timeout",
            "10m",
        ])
        .unwrap();

        let Command::Download(args) = cli.command else {
            panic!("expected download command");
        };
        assert!(args.audio && args.title);
        assert!(!args.video);
        assert_eq!(args.threads, Some(4));
        assert_eq!(args.timeout_duration(), Duration::from_secs(600));
        assert_eq!(
            args.overrides.channel.as_deref(),
            Some("https://www.youtube.com/@someone")
        );
    }

    #[test]
    fn test_overrides_enable_filters() {
        let mut settings = Settings::default();
        let overrides = SettingsOverrides {
            date_from: Some("2023-01-01".into()),
            views_min: Some("1000".into()),
            thumb_size: Some("640x360".into()),
            ..Default::default()
        };
        overrides.apply(&mut settings);

        assert!(settings.use_date_filter);
        assert_eq!(settings.date_from, "2023-01-01");
        assert!(settings.use_view_filter);
        assert!(!settings.use_duration_filter);
        assert_eq!(settings.thumb_size, "custom");
        assert_eq!((settings.thumb_width, settings.thumb_height), (640, 360));
    }

    #[test]
    fn test_api_key_flag_is_runtime_only() {
        let mut settings = Settings::default();
        settings.api_key = "stored".into();
        let overrides = SettingsOverrides {
            api_key: Some("flag-key".into()),
            ..Default::default()
        };
        overrides.apply(&mut settings);

        assert_eq!(settings.require_api_key().unwrap(), "flag-key");
        assert_eq!(settings.api_key, "stored");
    }

    #[test]
    fn test_artifact_flags_replace_selection_only_when_given() {
        let mut settings = Settings::default();
        settings.download_thumbnail = true;

        DownloadArgs::default().apply(&mut settings);
        assert!(settings.download_video);
        assert!(settings.download_thumbnail);

        let args = DownloadArgs {
            audio: true,
            threads: Some(99),
            output: Some(PathBuf::from("out")),
            ..Default::default()
        };
        args.apply(&mut settings);
        assert!(!settings.download_video);
        assert!(settings.download_audio);
        assert!(!settings.download_thumbnail);
        assert_eq!(settings.thread_count, 10);
        assert_eq!(settings.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_download_args_default_values() {
        let args = DownloadArgs::default();
        assert!(!args.has_artifact_flags());
        assert_eq!(args.threads, None);
        assert_eq!(args.timeout_duration(), Duration::from_secs(1800));
    }
}
