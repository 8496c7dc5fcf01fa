//! Tool maintenance
//!
//! Installs or refreshes yt-dlp and ffmpeg in one directory. yt-dlp updates
//! itself when present and is downloaded otherwise; ffmpeg comes from the
//! latest BtbN release with gyan.dev as the fallback source. Each tool is
//! handled independently so one failing does not block the other.

use crate::config::executable_dir;
use crate::core::progress::Progress;
use crate::download::extractor::ArchiveExtractor;
use crate::download::fetcher::AssetFetcher;
use crate::download::ytdlp::{
    executable_name, find_ytdlp, ProcessRunner, ToolInvocation, ToolRunner,
};
use crate::error::ChandlError;
use crate::platform::client::HttpClient;
use crate::platform::releases::{
    ffmpeg_asset_preferences, ReleaseResolver, FFMPEG_FALLBACK_URL, FFMPEG_RELEASE_API,
    YTDLP_DIRECT_URL,
};
use crate::utils::filename::remove_if_exists;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const FFMPEG_EXE: &str = "ffmpeg.exe";
pub const FFPROBE_EXE: &str = "ffprobe.exe";
pub const FFPLAY_EXE: &str = "ffplay.exe";

/// Scratch archive name inside the tools directory
pub const FFMPEG_ARCHIVE: &str = "_ffmpeg_update.zip";

/// Release platform tag for the running build
pub fn default_platform_tag() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "win64"
    } else {
        "win32"
    }
}

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Directory receiving every executable
    pub dir: PathBuf,
    pub platform_tag: String,
    pub ytdlp_url: String,
    pub ffmpeg_release_api: String,
    pub ffmpeg_fallback_url: String,
    /// Limit for each `-U` / `--version` run
    pub tool_timeout: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            dir: executable_dir(),
            platform_tag: default_platform_tag().to_string(),
            ytdlp_url: YTDLP_DIRECT_URL.to_string(),
            ffmpeg_release_api: FFMPEG_RELEASE_API.to_string(),
            ffmpeg_fallback_url: FFMPEG_FALLBACK_URL.to_string(),
            tool_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Notifications emitted while updating
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// Where a tool is coming from
    Source { tool: &'static str, source: String },
    /// Primary ffmpeg source failed
    Fallback { reason: String },
    Transfer(Progress),
    Version { tool: &'static str, version: String },
    /// The tool is in place but did not report a version
    VersionUnreadable { tool: &'static str, detail: String },
}

/// Final state of one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Ready {
        path: PathBuf,
        version: Option<String>,
    },
    Failed(String),
}

impl ToolOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ToolOutcome::Ready { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub ytdlp: ToolOutcome,
    pub ffmpeg: ToolOutcome,
    /// Extracted executables besides ffmpeg itself
    pub extras: Vec<String>,
}

type EventFn = Arc<dyn Fn(UpdateEvent) + Send + Sync>;

/// Installs and refreshes the external tools
pub struct ToolUpdater {
    config: UpdaterConfig,
    client: HttpClient,
    runner: Arc<dyn ToolRunner>,
    events: Option<EventFn>,
}

impl ToolUpdater {
    pub fn new(client: HttpClient, config: UpdaterConfig) -> Self {
        Self {
            config,
            client,
            runner: Arc::new(ProcessRunner),
            events: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Set event callback
    pub fn with_events<F>(mut self, callback: F) -> Self
    where
        F: Fn(UpdateEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    fn emit(&self, event: UpdateEvent) {
        if let Some(callback) = &self.events {
            callback(event);
        }
    }

    fn fetcher(&self) -> AssetFetcher {
        let fetcher = AssetFetcher::new(self.client.clone());
        match &self.events {
            Some(callback) => {
                let callback = callback.clone();
                fetcher.with_progress_callback(move |p| callback(UpdateEvent::Transfer(p)))
            }
            None => fetcher,
        }
    }

    /// Update both tools; never fails as a whole
    pub async fn run(&self) -> UpdateSummary {
        if let Err(e) = std::fs::create_dir_all(&self.config.dir) {
            let message = format!("cannot create {}: {}", self.config.dir.display(), e);
            return UpdateSummary {
                ytdlp: ToolOutcome::Failed(message.clone()),
                ffmpeg: ToolOutcome::Failed(message),
                extras: Vec::new(),
            };
        }

        let ytdlp = match self.update_ytdlp().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("yt-dlp update failed: {}", e);
                ToolOutcome::Failed(e.to_string())
            }
        };

        let (ffmpeg, extras) = match self.update_ffmpeg().await {
            Ok(result) => result,
            Err(e) => {
                warn!("ffmpeg update failed: {}", e);
                (ToolOutcome::Failed(e.to_string()), Vec::new())
            }
        };

        UpdateSummary {
            ytdlp,
            ffmpeg,
            extras,
        }
    }

    /// Self-update an existing yt-dlp, or download a fresh one
    pub async fn update_ytdlp(&self) -> Result<ToolOutcome, ChandlError> {
        if let Some(path) = find_ytdlp(&self.config.dir) {
            self.emit(UpdateEvent::Source {
                tool: "yt-dlp",
                source: "self-update (-U)".to_string(),
            });
            let update = ToolInvocation::new(&path, "yt-dlp -U").arg("-U");
            // a non-zero exit does not always mean the update failed; --version decides
            let update_result = self.runner.run(&update, self.config.tool_timeout).await;
            let version = match self.query_version("yt-dlp", &path, "--version").await {
                Ok(version) => Some(version),
                Err(detail) => {
                    let detail = match update_result {
                        Err(e) => format!("{}; self-update failed: {}", detail, e),
                        Ok(_) => detail,
                    };
                    self.emit(UpdateEvent::VersionUnreadable {
                        tool: "yt-dlp",
                        detail,
                    });
                    None
                }
            };
            return Ok(ToolOutcome::Ready { path, version });
        }

        let path = self.config.dir.join(executable_name("yt-dlp"));
        self.emit(UpdateEvent::Source {
            tool: "yt-dlp",
            source: self.config.ytdlp_url.clone(),
        });
        self.fetcher().fetch(&self.config.ytdlp_url, &path).await?;
        mark_executable(&path)?;

        let version = self.read_version("yt-dlp", &path, "--version").await;
        Ok(ToolOutcome::Ready { path, version })
    }

    /// Download, extract and verify ffmpeg; returns the outcome and extra executables
    pub async fn update_ffmpeg(&self) -> Result<(ToolOutcome, Vec<String>), ChandlError> {
        let archive = self.config.dir.join(FFMPEG_ARCHIVE);
        remove_if_exists(&archive)?;

        if let Err(e) = self.fetch_primary_ffmpeg(&archive).await {
            warn!("Primary ffmpeg source failed: {}", e);
            self.emit(UpdateEvent::Fallback {
                reason: e.to_string(),
            });
            self.emit(UpdateEvent::Source {
                tool: "ffmpeg",
                source: self.config.ffmpeg_fallback_url.clone(),
            });
            self.fetcher()
                .fetch(&self.config.ffmpeg_fallback_url, &archive)
                .await?;
        }

        let extractor = ArchiveExtractor::new([FFMPEG_EXE, FFPROBE_EXE, FFPLAY_EXE]);
        let target = self.config.dir.clone();
        let archive_path = archive.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract(&archive_path, &target))
                .await
                .map_err(|e| ChandlError::Extraction(format!("extraction task failed: {}", e)));
        remove_if_exists(&archive)?;
        let report = extracted??;

        let extras: Vec<String> = report
            .extracted
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.eq_ignore_ascii_case(FFMPEG_EXE))
            .collect();

        let path = self.config.dir.join(FFMPEG_EXE);
        let version = self.read_version("ffmpeg", &path, "-version").await;
        info!("ffmpeg ready at {}", path.display());
        Ok((ToolOutcome::Ready { path, version }, extras))
    }

    async fn fetch_primary_ffmpeg(&self, archive: &Path) -> Result<(), ChandlError> {
        let tag = &self.config.platform_tag;
        let asset = ReleaseResolver::new(self.client.clone())
            .resolve(
                &self.config.ffmpeg_release_api,
                &ffmpeg_asset_preferences(tag),
                tag,
            )
            .await?;
        self.emit(UpdateEvent::Source {
            tool: "ffmpeg",
            source: asset.name.clone(),
        });
        self.fetcher()
            .fetch(&asset.browser_download_url, archive)
            .await?;
        Ok(())
    }

    /// First line printed by `flag`, reported as a `Version` event.
    /// Errors carry the reason the version could not be read, unreported.
    async fn query_version(
        &self,
        tool: &'static str,
        path: &Path,
        flag: &str,
    ) -> Result<String, String> {
        let invocation = ToolInvocation::new(path, format!("{} {}", tool, flag)).arg(flag);
        let output = self
            .runner
            .run(&invocation, self.config.tool_timeout)
            .await
            .map_err(|e| e.to_string())?;
        let line = output.first_line().ok_or_else(|| "no output".to_string())?;
        self.emit(UpdateEvent::Version {
            tool,
            version: line.to_string(),
        });
        Ok(line.to_string())
    }

    /// Like `query_version`, reporting an unreadable version as an event
    async fn read_version(&self, tool: &'static str, path: &Path, flag: &str) -> Option<String> {
        match self.query_version(tool, path, flag).await {
            Ok(version) => Some(version),
            Err(detail) => {
                self.emit(UpdateEvent::VersionUnreadable { tool, detail });
                None
            }
        }
    }
}

fn mark_executable(path: &Path) -> Result<(), ChandlError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::ytdlp::ToolOutput;
    use async_trait::async_trait;
    use std::io::{Cursor, Write};
    use std::sync::Mutex;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Answers version flags with canned output and records every call
    #[derive(Default)]
    struct FakeRunner {
        fail_update: bool,
        fail_version: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn run(
            &self,
            invocation: &ToolInvocation,
            _timeout: Duration,
        ) -> Result<ToolOutput, ChandlError> {
            self.calls.lock().unwrap().push(invocation.args.clone());
            let stdout = match invocation.args.first().map(String::as_str) {
                Some("-U") if self.fail_update => {
                    return Err(ChandlError::SubprocessFailure {
                        label: invocation.label.clone(),
                        message: "ERROR: Unable to write to yt-dlp.exe".into(),
                    })
                }
                Some("-U") => "Latest version: 2024.08.06",
                Some("--version") if self.fail_version => {
                    return Err(ChandlError::SubprocessFailure {
                        label: invocation.label.clone(),
                        message: "exited with exit status: 1".into(),
                    })
                }
                Some("--version") => "2024.08.06\n",
                Some("-version") => "ffmpeg version 7.1-full_build\nbuilt with gcc 14.2.0\n",
                _ => "",
            };
            Ok(ToolOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            })
        }
    }

    fn ffmpeg_zip(entries: &[&str]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for name in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(name.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn updater(server: &mockito::ServerGuard, dir: &Path, runner: Arc<FakeRunner>) -> ToolUpdater {
        let config = UpdaterConfig {
            dir: dir.to_path_buf(),
            platform_tag: "win64".into(),
            ytdlp_url: format!("{}/yt-dlp.exe", server.url()),
            ffmpeg_release_api: format!("{}/releases/latest", server.url()),
            ffmpeg_fallback_url: format!("{}/essentials.zip", server.url()),
            tool_timeout: Duration::from_secs(5),
        };
        ToolUpdater::new(HttpClient::new().unwrap(), config).with_runner(runner)
    }

    #[test]
    fn test_default_platform_tag() {
        let tag = default_platform_tag();
        assert!(tag == "win64" || tag == "win32");
    }

    #[tokio::test]
    async fn test_ytdlp_fresh_download() {
        let mut server = mockito::Server::new_async().await;
        let download = server
            .mock("GET", "/yt-dlp.exe")
            .with_body("binary")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let outcome = updater(&server, dir.path(), runner.clone())
            .update_ytdlp()
            .await
            .unwrap();

        download.assert_async().await;
        let path = dir.path().join(executable_name("yt-dlp"));
        assert_eq!(std::fs::read(&path).unwrap(), b"binary");
        assert_eq!(
            outcome,
            ToolOutcome::Ready {
                path,
                version: Some("2024.08.06".into())
            }
        );
        assert_eq!(*runner.calls.lock().unwrap(), vec![vec!["--version".to_string()]]);
    }

    #[tokio::test]
    async fn test_ytdlp_existing_self_updates() {
        let mut server = mockito::Server::new_async().await;
        let download = server
            .mock("GET", "/yt-dlp.exe")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(executable_name("yt-dlp")), "old").unwrap();
        let runner = Arc::new(FakeRunner {
            fail_update: true,
            ..Default::default()
        });

        let outcome = updater(&server, dir.path(), runner.clone())
            .update_ytdlp()
            .await
            .unwrap();

        // a failed -U still counts when --version answers
        assert!(outcome.is_ready());
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0], vec!["-U".to_string()]);
        assert_eq!(calls[1], vec!["--version".to_string()]);
        download.assert_async().await;
    }

    #[tokio::test]
    async fn test_ytdlp_unreadable_version_reported_once() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(executable_name("yt-dlp")), "old").unwrap();
        let runner = Arc::new(FakeRunner {
            fail_update: true,
            fail_version: true,
            ..Default::default()
        });

        let details = Arc::new(Mutex::new(Vec::new()));
        let sink = details.clone();
        let outcome = updater(&server, dir.path(), runner)
            .with_events(move |event| {
                if let UpdateEvent::VersionUnreadable { detail, .. } = event {
                    sink.lock().unwrap().push(detail);
                }
            })
            .update_ytdlp()
            .await
            .unwrap();

        assert!(matches!(outcome, ToolOutcome::Ready { version: None, .. }));
        let details = details.lock().unwrap();
        assert_eq!(details.len(), 1);
        assert!(details[0].contains("exited with exit status: 1"));
        assert!(details[0].contains("Unable to write"));
    }

    #[tokio::test]
    async fn test_ytdlp_existing_under_other_name() {
        let mut server = mockito::Server::new_async().await;
        let download = server
            .mock("GET", "/yt-dlp.exe")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let other = if cfg!(windows) { "yt-dlp" } else { "yt-dlp.exe" };
        std::fs::write(dir.path().join(other), "old").unwrap();
        let runner = Arc::new(FakeRunner::default());

        let outcome = updater(&server, dir.path(), runner.clone())
            .update_ytdlp()
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ToolOutcome::Ready {
                path: dir.path().join(other),
                version: Some("2024.08.06".into())
            }
        );
        assert_eq!(runner.calls.lock().unwrap()[0], vec!["-U".to_string()]);
        download.assert_async().await;
    }

    #[tokio::test]
    async fn test_ffmpeg_from_release_api() {
        let mut server = mockito::Server::new_async().await;
        let manifest = format!(
            r#"{{"tag_name":"latest","assets":[
                {{"name":"ffmpeg-master-latest-win64-gpl.zip","browser_download_url":"{url}/gpl.zip"}},
                {{"name":"checksums.sha256","browser_download_url":"{url}/sums"}}]}}"#,
            url = server.url()
        );
        let _api = server
            .mock("GET", "/releases/latest")
            .with_header("content-type", "application/json")
            .with_body(manifest)
            .create_async()
            .await;
        let _zip = server
            .mock("GET", "/gpl.zip")
            .with_body(ffmpeg_zip(&[
                "ffmpeg-master-latest-win64-gpl/bin/ffmpeg.exe",
                "ffmpeg-master-latest-win64-gpl/bin/ffprobe.exe",
            ]))
            .create_async()
            .await;
        let fallback = server
            .mock("GET", "/essentials.zip")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (outcome, extras) = updater(&server, dir.path(), Arc::new(FakeRunner::default()))
            .update_ffmpeg()
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ToolOutcome::Ready {
                path: dir.path().join(FFMPEG_EXE),
                version: Some("ffmpeg version 7.1-full_build".into())
            }
        );
        assert_eq!(extras, vec![FFPROBE_EXE.to_string()]);
        assert!(!dir.path().join(FFMPEG_ARCHIVE).exists());
        fallback.assert_async().await;
    }

    #[tokio::test]
    async fn test_ffmpeg_falls_back_when_api_fails() {
        let mut server = mockito::Server::new_async().await;
        let _api = server
            .mock("GET", "/releases/latest")
            .with_status(403)
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .create_async()
            .await;
        let fallback = server
            .mock("GET", "/essentials.zip")
            .with_body(ffmpeg_zip(&["ffmpeg-7.1-essentials_build/bin/ffmpeg.exe"]))
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fallbacks = Arc::new(Mutex::new(0));
        let counter = fallbacks.clone();
        let (outcome, extras) = updater(&server, dir.path(), Arc::new(FakeRunner::default()))
            .with_events(move |event| {
                if let UpdateEvent::Fallback { .. } = event {
                    *counter.lock().unwrap() += 1;
                }
            })
            .update_ffmpeg()
            .await
            .unwrap();

        fallback.assert_async().await;
        assert!(outcome.is_ready());
        assert!(extras.is_empty());
        assert_eq!(*fallbacks.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tools_fail_independently() {
        let mut server = mockito::Server::new_async().await;
        let _ytdlp = server
            .mock("GET", "/yt-dlp.exe")
            .with_body("binary")
            .create_async()
            .await;
        let _api = server
            .mock("GET", "/releases/latest")
            .with_status(500)
            .create_async()
            .await;
        let _fallback = server
            .mock("GET", "/essentials.zip")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let summary = updater(&server, dir.path(), Arc::new(FakeRunner::default()))
            .run()
            .await;

        assert!(summary.ytdlp.is_ready());
        assert!(matches!(summary.ffmpeg, ToolOutcome::Failed(_)));
        assert!(!dir.path().join(FFMPEG_ARCHIVE).exists());
    }

    #[tokio::test]
    async fn test_archive_without_ffmpeg_fails() {
        let mut server = mockito::Server::new_async().await;
        let _api = server
            .mock("GET", "/releases/latest")
            .with_status(500)
            .create_async()
            .await;
        let _fallback = server
            .mock("GET", "/essentials.zip")
            .with_body(ffmpeg_zip(&["bin/ffprobe.exe"]))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = updater(&server, dir.path(), Arc::new(FakeRunner::default()))
            .update_ffmpeg()
            .await
            .unwrap_err();
        assert!(matches!(err, ChandlError::Extraction(_)));
        assert!(!dir.path().join(FFMPEG_ARCHIVE).exists());
    }
}
