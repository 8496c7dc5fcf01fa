//! Output formatting and progress display
//!
//! Status lines look like `[14:03:27] ✅ message`. While a progress bar is
//! visible, lines are printed above it instead of tearing it.

use crate::cli::args::VerbosityLevel;
use crate::core::progress::{format_bytes, format_duration, Progress};
use crate::core::scanner::ScanProgress;
use crate::core::updater::{ToolOutcome, UpdateEvent, UpdateSummary};
use crate::core::video_info::VideoRecord;
use crate::download::dispatcher::{DispatchEvent, DispatchSummary};
use chrono::{Local, NaiveTime};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Kind of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Info,
    Success,
    Warning,
    Error,
}

impl Status {
    pub fn glyph(&self) -> &'static str {
        match self {
            Status::Info => "ℹ️ ",
            Status::Success => "✅",
            Status::Warning => "⚠️ ",
            Status::Error => "❌",
        }
    }
}

/// `[HH:MM:SS] <glyph> message`, uncolored
pub fn format_line(time: NaiveTime, status: Status, message: &str) -> String {
    format!("[{}] {} {}", time.format("%H:%M:%S"), status.glyph(), message)
}

/// `YYYY-MM-DD | 12m 5s | 1234 views | title`
pub fn video_line(video: &VideoRecord) -> String {
    format!(
        "{} | {} | {} views | {}",
        video.publish_date(),
        format_duration(Duration::from_secs(video.duration)),
        video.views,
        video.title
    )
}

/// Output formatter for chandl
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    progress_bar: Mutex<Option<ProgressBar>>,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Mutex::new(None),
        }
    }

    fn emit(&self, status: Status, message: &str) {
        if self.verbosity == VerbosityLevel::Quiet && status != Status::Error {
            return;
        }

        let line = format_line(Local::now().time(), status, message);
        let line = match status {
            Status::Info => line.normal(),
            Status::Success => line.green(),
            Status::Warning => line.yellow(),
            Status::Error => line.red(),
        };

        let bar = self
            .progress_bar
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(|bar| !bar.is_finished());
        match (bar, status) {
            (Some(bar), _) => bar.println(line.to_string()),
            (None, Status::Warning | Status::Error) => eprintln!("{}", line),
            (None, _) => println!("{}", line),
        }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        self.emit(Status::Info, message);
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        self.emit(Status::Success, message);
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        self.emit(Status::Warning, message);
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        self.emit(Status::Error, message);
    }

    /// Print debug message
    pub fn debug(&self, message: &str) {
        if self.verbosity == VerbosityLevel::Verbose {
            self.emit(Status::Info, message);
        }
    }

    /// Create a progress bar; `total_size == 0` gives a byte counter without a bar
    pub fn create_progress_bar(&self, total_size: u64, message: &str) -> Option<ProgressBar> {
        if self.verbosity == VerbosityLevel::Quiet {
            return None;
        }

        let template = if total_size > 0 {
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}"
        } else {
            "{spinner:.green} [{elapsed_precise}] {bytes} {msg}"
        };
        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let progress_bar = ProgressBar::new(total_size);
        progress_bar.set_style(style);
        progress_bar.set_message(message.to_string());

        if let Ok(mut guard) = self.progress_bar.lock() {
            *guard = Some(progress_bar.clone());
        }
        Some(progress_bar)
    }

    /// Update the progress bar, creating it on the first report
    pub fn update_progress(&self, progress: &Progress) {
        let existing = self
            .progress_bar
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(|bar| !bar.is_finished());
        let bar = match existing {
            Some(bar) => bar,
            None => match self.create_progress_bar(progress.total_size, "Downloading...") {
                Some(bar) => bar,
                None => return,
            },
        };

        if progress.has_total() {
            bar.set_length(progress.total_size);
        }
        bar.set_position(progress.downloaded_size);
        if let Some(speed) = progress.speed {
            bar.set_message(format!("{}/s", format_bytes(speed as u64)));
        }
    }

    /// Finish progress bar
    pub fn finish_progress(&self, message: &str) {
        let bar = self.progress_bar.lock().ok().and_then(|mut guard| guard.take());
        if let Some(bar) = bar {
            bar.finish_with_message(message.to_string());
        }
    }

    /// Print one scanned video
    pub fn print_video(&self, video: &VideoRecord) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }
        println!("  {}", video_line(video));
    }

    /// Render one scan milestone
    pub fn report_scan_progress(&self, event: &ScanProgress) {
        match event {
            ScanProgress::Resolving(name) => self.info(&format!("Looking up channel {}", name)),
            ScanProgress::ChannelResolved(id) => self.success(&format!("Channel ID: {}", id)),
            ScanProgress::UploadsFound(playlist) => {
                self.debug(&format!("Uploads playlist: {}", playlist))
            }
            ScanProgress::PageFetched { total } => {
                self.info(&format!("Fetched {} videos...", total))
            }
            ScanProgress::FetchingDetails { total } => {
                self.info(&format!("Fetching details for {} videos...", total))
            }
            ScanProgress::DetailsBatchFailed { batch, message } => self.warning(&format!(
                "Details batch {} failed, keeping zero duration/views: {}",
                batch, message
            )),
        }
    }

    pub fn print_scan_summary(&self, total: usize, filtered: usize) {
        self.success(&format!("Total: {} videos | After filter: {}", total, filtered));
    }

    /// Render one dispatcher event
    pub fn report_dispatch_event(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::VideoStarted { base_name, .. } => {
                self.info(&format!("Processing: {}", base_name))
            }
            DispatchEvent::ArtifactCompleted { kind, path, .. } => {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.success(&format!("{}: {}", kind, name))
            }
            DispatchEvent::ArtifactFailed {
                video_id,
                kind,
                error,
            } => self.error(&format!("{} {}: {}", kind, video_id, error)),
            DispatchEvent::ArtifactSkipped { video_id, kind } => {
                self.debug(&format!("{} {} skipped", kind, video_id))
            }
            DispatchEvent::VideoFinished { video_id } => {
                self.debug(&format!("Finished {}", video_id))
            }
            DispatchEvent::Cancelled { remaining } => self.warning(&format!(
                "Download stopped, {} videos not started",
                remaining
            )),
        }
    }

    pub fn print_dispatch_summary(&self, summary: &DispatchSummary, elapsed: Duration) {
        let message = format!(
            "Done: {}/{} videos, {} failed artifacts, {}",
            summary.finished,
            summary.total,
            summary.failed_artifacts,
            format_duration(elapsed)
        );
        if summary.cancelled || summary.failed_artifacts > 0 {
            self.warning(&message);
        } else {
            self.success(&message);
        }
    }

    /// Render one updater event
    pub fn report_update_event(&self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Source { tool, source } => {
                self.info(&format!("{} source: {}", tool, source))
            }
            UpdateEvent::Fallback { reason } => {
                self.finish_progress("failed");
                self.warning(&format!("Primary source failed, using fallback ({})", reason))
            }
            UpdateEvent::Transfer(progress) => self.update_progress(progress),
            UpdateEvent::Version { tool, version } => {
                self.finish_progress("done");
                self.success(&format!("{}: {}", tool, version))
            }
            UpdateEvent::VersionUnreadable { tool, detail } => {
                self.finish_progress("done");
                self.warning(&format!("Could not read {} version: {}", tool, detail))
            }
        }
    }

    pub fn print_update_summary(&self, summary: &UpdateSummary) {
        for (tool, outcome) in [("yt-dlp", &summary.ytdlp), ("ffmpeg", &summary.ffmpeg)] {
            match outcome {
                ToolOutcome::Ready { path, .. } => {
                    let name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    self.success(&format!("{}: {}", tool, name))
                }
                ToolOutcome::Failed(reason) => self.error(&format!("{}: failed ({})", tool, reason)),
            }
        }
        if !summary.extras.is_empty() {
            self.info(&format!("Also installed: {}", summary.extras.join(", ")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_line() {
        let time = NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(
            format_line(time, Status::Success, "Video: 20240309_abc.mp4"),
            "[09:05:07] ✅ Video: 20240309_abc.mp4"
        );
        assert!(format_line(time, Status::Error, "x").starts_with("[09:05:07] ❌"));
    }

    #[test]
    fn test_video_line() {
        let published = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let mut video = VideoRecord::new("abc".into(), "A title".into(), published);
        video.duration = 725;
        video.views = 1234;
        assert_eq!(video_line(&video), "2024-03-09 | 12m 5s | 1234 views | A title");
    }

    #[test]
    fn test_create_progress_bar_quiet_mode() {
        let formatter = OutputFormatter::new(VerbosityLevel::Quiet);
        assert!(formatter.create_progress_bar(1000, "x").is_none());

        // errors still go out in quiet mode; the rest is dropped
        formatter.info("test");
        formatter.warning("test");
        formatter.error("test");
    }

    #[test]
    fn test_progress_bar_lifecycle() {
        let formatter = OutputFormatter::new(VerbosityLevel::Normal);
        let mut progress = Progress::new(1000);
        progress.update(500);

        formatter.update_progress(&progress);
        assert!(formatter.progress_bar.lock().unwrap().is_some());

        formatter.info("printed above the bar");
        formatter.finish_progress("done");
        assert!(formatter.progress_bar.lock().unwrap().is_none());

        // finishing twice is harmless
        formatter.finish_progress("done");
    }

    #[test]
    fn test_report_events_do_not_panic() {
        let formatter = OutputFormatter::new(VerbosityLevel::Verbose);
        formatter.report_dispatch_event(&DispatchEvent::Cancelled { remaining: 3 });
        formatter.report_update_event(&UpdateEvent::Fallback {
            reason: "HTTP 403".into(),
        });
        formatter.print_update_summary(&UpdateSummary {
            ytdlp: ToolOutcome::Failed("offline".into()),
            ffmpeg: ToolOutcome::Ready {
                path: "tools/ffmpeg.exe".into(),
                version: None,
            },
            extras: vec!["ffprobe.exe".into()],
        });
    }
}
