//! External downloader invocation
//!
//! Builds yt-dlp command lines for the video and audio artifacts and runs
//! them as child processes with a hard timeout. The process backend sits
//! behind [`ToolRunner`] so dispatch logic can be exercised without the real
//! binaries.

use crate::error::ChandlError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Per-invocation timeout used when nothing else is configured
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Diagnostic text kept from a failing tool
const STDERR_LIMIT: usize = 200;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Platform file name for an executable stem (`ffmpeg` -> `ffmpeg.exe` on Windows)
pub fn executable_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", stem)
    } else {
        stem.to_string()
    }
}

/// Existing yt-dlp in `dir`, found under the native name or the other one
/// (`yt-dlp.exe` / `yt-dlp`)
pub fn find_ytdlp(dir: &Path) -> Option<PathBuf> {
    [executable_name("yt-dlp"), "yt-dlp.exe".to_string(), "yt-dlp".to_string()]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Requested video resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    Best,
    MaxHeight(u32),
}

impl VideoQuality {
    /// Format selector with four alternatives, most specific first:
    /// H.264 + m4a, any mp4 + m4a, single-file mp4, anything
    pub fn format_selector(&self) -> String {
        match self {
            VideoQuality::Best => {
                "bestvideo[vcodec^=avc1]+bestaudio[ext=m4a]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"
                    .to_string()
            }
            VideoQuality::MaxHeight(h) => format!(
                "bestvideo[height<={h}][vcodec^=avc1]+bestaudio[ext=m4a]/bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best",
                h = h
            ),
        }
    }
}

impl FromStr for VideoQuality {
    type Err = ChandlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        if value == "best" {
            return Ok(VideoQuality::Best);
        }
        value
            .trim_end_matches('p')
            .parse::<u32>()
            .ok()
            .filter(|h| *h > 0)
            .map(VideoQuality::MaxHeight)
            .ok_or_else(|| ChandlError::Config(format!("invalid video quality: {}", s)))
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoQuality::Best => write!(f, "best"),
            VideoQuality::MaxHeight(h) => write!(f, "{}p", h),
        }
    }
}

/// Output frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRate {
    /// Keep the source rate and copy streams without re-encoding
    Original,
    Fps(u32),
}

impl FrameRate {
    /// Arguments handed to ffmpeg through `--postprocessor-args`
    pub fn postprocessor_args(&self) -> String {
        match self {
            FrameRate::Original => "-c:v copy -c:a copy".to_string(),
            FrameRate::Fps(fps) => format!("-c:v libx264 -preset ultrafast -r {} -c:a aac", fps),
        }
    }
}

impl FromStr for FrameRate {
    type Err = ChandlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        if value == "original" {
            return Ok(FrameRate::Original);
        }
        value
            .parse::<u32>()
            .ok()
            .filter(|fps| *fps > 0)
            .map(FrameRate::Fps)
            .ok_or_else(|| ChandlError::Config(format!("invalid frame rate: {}", s)))
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRate::Original => write!(f, "original"),
            FrameRate::Fps(fps) => write!(f, "{}", fps),
        }
    }
}

/// Audio extraction target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpec {
    /// Codec / container, also used as the file extension
    pub format: String,
    /// Passed to `--audio-quality` verbatim (`320k`, `0`, ...)
    pub bitrate: String,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            format: "mp3".to_string(),
            bitrate: "320k".to_string(),
        }
    }
}

/// One external command: program, arguments and a label for log lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub label: String,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            label: label.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Printable command line, for debug logs
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push_str(&format!("\"{}\"", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// First non-empty stdout line, typically a version string
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).find(|line| !line.is_empty())
    }
}

/// Runs external tools
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion; a non-zero exit or an elapsed timeout is an error
    async fn run(&self, invocation: &ToolInvocation, timeout: Duration)
        -> Result<ToolOutput, ChandlError>;
}

/// [`ToolRunner`] backed by real child processes.
///
/// Children get their own process group, so a terminal Ctrl-C reaches only
/// chandl and a running invocation can finish after cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &ToolInvocation,
        timeout: Duration,
    ) -> Result<ToolOutput, ChandlError> {
        debug!("Running: {}", invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);

        let mut child = command.spawn().map_err(|e| ChandlError::SubprocessFailure {
            label: invocation.label.clone(),
            message: format!("failed to start {}: {}", invocation.program.display(), e),
        })?;

        let stdout_reader = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_reader = tokio::spawn(read_pipe(child.stderr.take()));

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!("{} exceeded {:?}, killing", invocation.label, timeout);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", invocation.label, e);
                }
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(ChandlError::SubprocessTimeout {
                    label: invocation.label.clone(),
                    timeout,
                });
            }
        };

        let stdout = stdout_reader.await.unwrap_or_default();
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            let trimmed = stderr.trim();
            let message = if trimmed.is_empty() {
                format!("exited with {}", status)
            } else {
                trimmed.chars().take(STDERR_LIMIT).collect()
            };
            return Err(ChandlError::SubprocessFailure {
                label: invocation.label.clone(),
                message,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Locations of the external tools and optional cookie jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ytdlp: PathBuf,
    /// Directory passed as `--ffmpeg-location`, only set when a local ffmpeg exists
    pub ffmpeg_dir: Option<PathBuf>,
    pub cookie_file: Option<PathBuf>,
}

impl ToolPaths {
    /// Prefer binaries in `tools_dir`; fall back to `yt-dlp` on PATH
    pub fn discover(tools_dir: &Path) -> Self {
        let ytdlp =
            find_ytdlp(tools_dir).unwrap_or_else(|| PathBuf::from(executable_name("yt-dlp")));

        let ffmpeg_dir = tools_dir
            .join(executable_name("ffmpeg"))
            .is_file()
            .then(|| tools_dir.to_path_buf());

        Self {
            ytdlp,
            ffmpeg_dir,
            cookie_file: None,
        }
    }

    /// Attach a cookie file; ignored when blank or missing on disk
    pub fn with_cookie_file(mut self, path: Option<&Path>) -> Self {
        self.cookie_file = path
            .filter(|p| !p.as_os_str().is_empty() && p.is_file())
            .map(Path::to_path_buf);
        self
    }

    fn base(&self, label: String) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(&self.ytdlp, label);
        if let Some(cookies) = &self.cookie_file {
            invocation = invocation
                .arg("--cookies")
                .arg(cookies.display().to_string());
        }
        if let Some(dir) = &self.ffmpeg_dir {
            invocation = invocation
                .arg("--ffmpeg-location")
                .arg(dir.display().to_string());
        }
        invocation
    }

    /// Video download merged into `output` (mp4)
    pub fn video_invocation(
        &self,
        quality: VideoQuality,
        fps: FrameRate,
        output: &Path,
        url: &str,
        label: impl Into<String>,
    ) -> ToolInvocation {
        self.base(label.into())
            .arg("-f")
            .arg(quality.format_selector())
            .arg("-o")
            .arg(output.display().to_string())
            .args(["--merge-output-format", "mp4"])
            .arg("--postprocessor-args")
            .arg(format!("ffmpeg:{}", fps.postprocessor_args()))
            .arg("--no-playlist")
            .args(["--concurrent-fragments", "4"])
            .args(["--buffer-size", "16K"])
            .args(["--http-chunk-size", "10M"])
            .arg(url)
    }

    /// Audio extraction into `output`
    pub fn audio_invocation(
        &self,
        audio: &AudioSpec,
        output: &Path,
        url: &str,
        label: impl Into<String>,
    ) -> ToolInvocation {
        self.base(label.into())
            .arg("-x")
            .arg("--audio-format")
            .arg(audio.format.clone())
            .arg("--audio-quality")
            .arg(audio.bitrate.clone())
            .arg("-o")
            .arg(output.display().to_string())
            .arg("--no-playlist")
            .args(["--concurrent-fragments", "4"])
            .args(["--buffer-size", "16K"])
            .arg(url)
    }
}
