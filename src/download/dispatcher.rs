//! Download dispatcher
//!
//! A fixed pool of workers drains a shared queue of videos. Each worker
//! produces every requested artifact of one video, in the order video, audio,
//! thumbnail, title, before it takes the next. Failures stay local to the
//! artifact that produced them.
//!
//! [`Dispatcher::dispatch`] returns immediately with a [`DispatchHandle`]:
//! the caller reads [`DispatchEvent`]s from it, may cancel through its token,
//! and finally awaits the [`DispatchSummary`].

use crate::core::video_info::VideoRecord;
use crate::download::thumbnail::{ThumbnailSize, ThumbnailWriter};
use crate::download::ytdlp::{
    AudioSpec, FrameRate, ProcessRunner, ToolPaths, ToolRunner, VideoQuality, DEFAULT_TOOL_TIMEOUT,
};
use crate::error::ChandlError;
use crate::platform::client::HttpClient;
use crate::utils::filename::{replace_file, with_suffix, STAGING_SUFFIX};
use crate::utils::url::watch_url;
use futures::future::join_all;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on parallel workers
pub const MAX_CONCURRENCY: usize = 10;

/// Clamp a requested worker count into `1..=MAX_CONCURRENCY`
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Kinds of output produced per video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Video,
    Audio,
    Thumbnail,
    Title,
}

impl ArtifactKind {
    /// Processing order within one video
    pub const ORDER: [ArtifactKind; 4] = [
        ArtifactKind::Video,
        ArtifactKind::Audio,
        ArtifactKind::Thumbnail,
        ArtifactKind::Title,
    ];
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Video => "Video",
            ArtifactKind::Audio => "Audio",
            ArtifactKind::Thumbnail => "Thumbnail",
            ArtifactKind::Title => "Title",
        };
        f.write_str(name)
    }
}

/// Which artifacts to produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactSelection {
    pub video: bool,
    pub audio: bool,
    pub thumbnail: bool,
    pub title: bool,
}

impl ArtifactSelection {
    pub fn contains(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Video => self.video,
            ArtifactKind::Audio => self.audio,
            ArtifactKind::Thumbnail => self.thumbnail,
            ArtifactKind::Title => self.title,
        }
    }

    /// Selected kinds in processing order
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ORDER
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

/// Quality parameters for every artifact kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityConfig {
    pub video: VideoQuality,
    pub fps: FrameRate,
    pub audio: AudioSpec,
    pub thumbnail: ThumbnailSize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            video: VideoQuality::MaxHeight(1080),
            fps: FrameRate::Fps(30),
            audio: AudioSpec::default(),
            thumbnail: ThumbnailSize::MaxRes,
        }
    }
}

/// Everything one dispatch run needs
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub videos: Vec<VideoRecord>,
    pub artifacts: ArtifactSelection,
    pub quality: QualityConfig,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    /// Per-invocation timeout for external tools
    pub timeout: Duration,
}

impl DispatchRequest {
    pub fn new(videos: Vec<VideoRecord>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos,
            artifacts: ArtifactSelection {
                video: true,
                ..Default::default()
            },
            quality: QualityConfig::default(),
            output_dir: output_dir.into(),
            concurrency: 3,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactSelection) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_quality(mut self, quality: QualityConfig) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Progress and outcome notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    VideoStarted {
        video_id: String,
        base_name: String,
    },
    ArtifactCompleted {
        video_id: String,
        kind: ArtifactKind,
        path: PathBuf,
    },
    ArtifactFailed {
        video_id: String,
        kind: ArtifactKind,
        error: String,
    },
    /// Not attempted because the run was cancelled
    ArtifactSkipped {
        video_id: String,
        kind: ArtifactKind,
    },
    VideoFinished {
        video_id: String,
    },
    /// Emitted once, after the workers stopped, with the number of videos never started
    Cancelled {
        remaining: usize,
    },
}

/// Totals of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total: usize,
    /// Videos whose task ran to the end
    pub finished: usize,
    pub failed_artifacts: usize,
    pub cancelled: bool,
}

/// Handle to a running dispatch
pub struct DispatchHandle {
    token: CancellationToken,
    events: UnboundedReceiver<DispatchEvent>,
    task: JoinHandle<DispatchSummary>,
}

impl DispatchHandle {
    /// Stop taking new work; in-flight invocations run to completion
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Next event; `None` once every worker has stopped
    pub async fn next_event(&mut self) -> Option<DispatchEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end, discarding unread events
    pub async fn wait(self) -> Result<DispatchSummary, ChandlError> {
        drop(self.events);
        self.task
            .await
            .map_err(|e| ChandlError::Config(format!("dispatch task failed: {}", e)))
    }
}

/// State shared by all workers of one run
struct WorkerContext {
    runner: Arc<dyn ToolRunner>,
    tools: ToolPaths,
    thumbnails: ThumbnailWriter,
    artifacts: Vec<ArtifactKind>,
    quality: QualityConfig,
    output_dir: PathBuf,
    timeout: Duration,
    queue: Mutex<VecDeque<VideoRecord>>,
    token: CancellationToken,
    events: UnboundedSender<DispatchEvent>,
}

impl WorkerContext {
    fn emit(&self, event: DispatchEvent) {
        // receiver may already be gone; results still land on disk
        let _ = self.events.send(event);
    }
}

/// Runs download requests against the external tools
#[derive(Clone)]
pub struct Dispatcher {
    client: HttpClient,
    tools: ToolPaths,
    runner: Arc<dyn ToolRunner>,
}

impl Dispatcher {
    /// Dispatcher using real child processes
    pub fn new(client: HttpClient, tools: ToolPaths) -> Self {
        Self {
            client,
            tools,
            runner: Arc::new(ProcessRunner),
        }
    }

    /// Replace the process backend
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Start a run with a fresh cancellation token
    pub fn dispatch(&self, request: DispatchRequest) -> Result<DispatchHandle, ChandlError> {
        self.dispatch_with_token(request, CancellationToken::new())
    }

    /// Start a run controlled by `token`
    pub fn dispatch_with_token(
        &self,
        request: DispatchRequest,
        token: CancellationToken,
    ) -> Result<DispatchHandle, ChandlError> {
        if request.videos.is_empty() {
            return Err(ChandlError::MissingSelection("no videos to download".to_string()));
        }
        if request.artifacts.is_empty() {
            return Err(ChandlError::MissingSelection(
                "no artifact kind selected".to_string(),
            ));
        }
        std::fs::create_dir_all(&request.output_dir)?;

        let total = request.videos.len();
        let workers = clamp_concurrency(request.concurrency).min(total);
        let (tx, rx) = unbounded_channel();

        let context = Arc::new(WorkerContext {
            runner: self.runner.clone(),
            tools: self.tools.clone(),
            thumbnails: ThumbnailWriter::new(self.client.clone(), request.quality.thumbnail),
            artifacts: request.artifacts.kinds(),
            quality: request.quality,
            output_dir: request.output_dir,
            timeout: request.timeout,
            queue: Mutex::new(request.videos.into_iter().collect()),
            token: token.clone(),
            events: tx,
        });

        info!("Dispatching {} videos on {} workers", total, workers);
        let task = tokio::spawn(run_pool(context, workers, total));

        Ok(DispatchHandle {
            token,
            events: rx,
            task,
        })
    }
}

async fn run_pool(context: Arc<WorkerContext>, workers: usize, total: usize) -> DispatchSummary {
    let handles: Vec<JoinHandle<(usize, usize)>> = (0..workers)
        .map(|worker| tokio::spawn(worker_loop(context.clone(), worker)))
        .collect();

    let mut summary = DispatchSummary {
        total,
        ..Default::default()
    };
    for result in join_all(handles).await {
        match result {
            Ok((finished, failed)) => {
                summary.finished += finished;
                summary.failed_artifacts += failed;
            }
            Err(e) => warn!("Worker panicked: {}", e),
        }
    }

    if context.token.is_cancelled() {
        let remaining = context.queue.lock().await.len();
        summary.cancelled = true;
        info!("Dispatch cancelled, {} videos not started", remaining);
        context.emit(DispatchEvent::Cancelled { remaining });
    }

    summary
}

/// Returns (videos finished, artifacts failed)
async fn worker_loop(context: Arc<WorkerContext>, worker: usize) -> (usize, usize) {
    let mut finished = 0;
    let mut failed = 0;

    loop {
        if context.token.is_cancelled() {
            debug!("Worker {} stopping on cancellation", worker);
            break;
        }
        let Some(video) = context.queue.lock().await.pop_front() else {
            break;
        };

        failed += process_video(&context, &video).await;
        finished += 1;
    }

    (finished, failed)
}

/// Produce every selected artifact for one video; returns the failure count
async fn process_video(context: &WorkerContext, video: &VideoRecord) -> usize {
    let base_name = video.base_name();
    info!("Processing {}", base_name);
    context.emit(DispatchEvent::VideoStarted {
        video_id: video.id.clone(),
        base_name: base_name.clone(),
    });

    let mut failed = 0;
    for kind in &context.artifacts {
        let kind = *kind;
        if context.token.is_cancelled() {
            context.emit(DispatchEvent::ArtifactSkipped {
                video_id: video.id.clone(),
                kind,
            });
            continue;
        }

        match produce(context, video, kind).await {
            Ok(path) => context.emit(DispatchEvent::ArtifactCompleted {
                video_id: video.id.clone(),
                kind,
                path,
            }),
            Err(e) => {
                warn!("{} {} failed: {}", kind, base_name, e);
                failed += 1;
                context.emit(DispatchEvent::ArtifactFailed {
                    video_id: video.id.clone(),
                    kind,
                    error: e.to_string(),
                });
            }
        }
    }

    context.emit(DispatchEvent::VideoFinished {
        video_id: video.id.clone(),
    });
    failed
}

async fn produce(
    context: &WorkerContext,
    video: &VideoRecord,
    kind: ArtifactKind,
) -> Result<PathBuf, ChandlError> {
    let label = format!("{} {}", kind, video.base_name());
    let url = watch_url(&video.id);

    match kind {
        ArtifactKind::Video => {
            let output = context.output_dir.join(video.filename("mp4"));
            let invocation = context.tools.video_invocation(
                context.quality.video,
                context.quality.fps,
                &output,
                &url,
                label,
            );
            context.runner.run(&invocation, context.timeout).await?;
            Ok(output)
        }
        ArtifactKind::Audio => {
            let output = context
                .output_dir
                .join(video.filename(&context.quality.audio.format));
            let invocation =
                context
                    .tools
                    .audio_invocation(&context.quality.audio, &output, &url, label);
            context.runner.run(&invocation, context.timeout).await?;
            Ok(output)
        }
        ArtifactKind::Thumbnail => context.thumbnails.write(video, &context.output_dir).await,
        ArtifactKind::Title => write_title(video, &context.output_dir).await,
    }
}

/// Write the bare title to `<base>.txt`
async fn write_title(video: &VideoRecord, output_dir: &Path) -> Result<PathBuf, ChandlError> {
    let dest = output_dir.join(video.filename("txt"));
    let staged = with_suffix(&dest, STAGING_SUFFIX);
    if let Err(e) = tokio::fs::write(&staged, video.title.as_bytes()).await {
        let _ = tokio::fs::remove_file(&staged).await;
        return Err(e.into());
    }
    replace_file(&staged, &dest)?;
    Ok(dest)
}
