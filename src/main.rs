//! Main entry point for the chandl CLI

use anyhow::Context;
use chandl::cli::args::{Cli, Command, DownloadArgs, ScanArgs, SettingsAction, UpdateToolsArgs, VerbosityLevel};
use chandl::cli::output::OutputFormatter;
use chandl::config::{executable_dir, Settings};
use chandl::core::scanner::ChannelScanner;
use chandl::core::updater::{ToolUpdater, UpdaterConfig};
use chandl::core::video_info::VideoRecord;
use chandl::download::dispatcher::{DispatchRequest, Dispatcher};
use chandl::download::ytdlp::ToolPaths;
use chandl::platform::client::HttpClient;
use chandl::platform::youtube::YouTubeApi;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = cli.verbosity_level();
    if let Err(e) = init_logging(verbosity) {
        eprintln!("logging disabled: {}", e);
    }

    let formatter = Arc::new(OutputFormatter::new(verbosity));
    match run(cli, formatter.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            formatter.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, formatter: Arc<OutputFormatter>) -> anyhow::Result<()> {
    let settings_path = cli.settings_path();
    debug!("Settings file: {}", settings_path.display());

    match cli.command {
        Command::UpdateTools(args) => update_tools(args, formatter).await,
        Command::Scan(args) => scan(args, &settings_path, formatter).await,
        Command::Download(args) => download(args, &settings_path, formatter).await,
        Command::Settings { action } => settings_command(action, &settings_path),
    }
}

async fn update_tools(args: UpdateToolsArgs, formatter: Arc<OutputFormatter>) -> anyhow::Result<()> {
    let mut config = UpdaterConfig::default();
    if let Some(dir) = args.dir {
        config.dir = dir;
    }
    if let Some(platform) = args.platform {
        config.platform_tag = platform;
    }

    formatter.info(&format!("Tools directory: {}", config.dir.display()));
    if !cfg!(windows) {
        formatter.warning("Release archives target Windows (.exe); other platforms may need manual setup");
    }
    formatter.info("Close programs using yt-dlp or ffmpeg so their files can be replaced");

    let client = HttpClient::new()?;
    let events = formatter.clone();
    let updater =
        ToolUpdater::new(client, config).with_events(move |event| events.report_update_event(&event));

    let summary = updater.run().await;
    formatter.finish_progress("done");
    formatter.print_update_summary(&summary);
    Ok(())
}

/// Scan the configured channel and apply the enabled filters.
/// Returns the unfiltered count and the remaining videos.
async fn scan_and_filter(
    settings: &Settings,
    client: &HttpClient,
    formatter: &Arc<OutputFormatter>,
) -> anyhow::Result<(usize, Vec<VideoRecord>)> {
    let api_key = settings.require_api_key()?;
    let channel = settings.require_channel()?;

    let api = YouTubeApi::new(client.clone(), api_key)?;
    let events = formatter.clone();
    let scanner = ChannelScanner::new(api).with_progress(move |event| events.report_scan_progress(&event));

    formatter.info(&format!("Scanning {}", channel));
    let result = scanner
        .scan(channel)
        .await
        .with_context(|| format!("scanning {}", channel))?;

    let outcome = settings.filter_criteria().apply(&result.videos);
    for warning in &outcome.warnings {
        formatter.warning(&format!("{}, filter skipped", warning));
    }
    Ok((result.videos.len(), outcome.videos))
}

fn save_settings(settings: &Settings, path: &Path, formatter: &OutputFormatter) {
    if let Err(e) = settings.save(path) {
        formatter.warning(&format!("Could not save settings to {}: {}", path.display(), e));
    }
}

async fn scan(args: ScanArgs, settings_path: &Path, formatter: Arc<OutputFormatter>) -> anyhow::Result<()> {
    let mut settings = Settings::load(settings_path)?;
    args.overrides.apply(&mut settings);

    let client = HttpClient::new()?;
    let (total, videos) = scan_and_filter(&settings, &client, &formatter).await?;
    for video in &videos {
        formatter.print_video(video);
    }
    formatter.print_scan_summary(total, videos.len());

    save_settings(&settings, settings_path, &formatter);
    Ok(())
}

async fn download(
    args: DownloadArgs,
    settings_path: &Path,
    formatter: Arc<OutputFormatter>,
) -> anyhow::Result<()> {
    let mut settings = Settings::load(settings_path)?;
    args.apply(&mut settings);

    let artifacts = settings.artifacts();
    if artifacts.is_empty() {
        return Err(chandl::ChandlError::MissingSelection(
            "choose at least one of --video, --audio, --thumbnail, --title".to_string(),
        )
        .into());
    }

    let client = HttpClient::new()?;
    let (total, videos) = scan_and_filter(&settings, &client, &formatter).await?;
    formatter.print_scan_summary(total, videos.len());
    if videos.is_empty() {
        formatter.warning("No videos left to download");
        save_settings(&settings, settings_path, &formatter);
        return Ok(());
    }

    let cookie_path = settings.cookie_path();
    let tools = ToolPaths::discover(&executable_dir()).with_cookie_file(cookie_path.as_deref());
    info!("Using {}", tools.ytdlp.display());

    let request = DispatchRequest::new(videos, settings.output_dir.clone())
        .with_artifacts(artifacts)
        .with_quality(settings.quality())
        .with_concurrency(settings.thread_count)
        .with_timeout(args.timeout_duration());

    formatter.info(&format!(
        "Downloading to {} with {} threads",
        settings.output_dir.display(),
        settings.thread_count
    ));
    let start = Instant::now();
    let mut handle = Dispatcher::new(client, tools).dispatch(request)?;

    let token = handle.cancellation_token();
    let quit = CancellationToken::new();
    let signal = tokio::spawn(watch_interrupts(token, quit.clone(), formatter.clone()));

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => formatter.report_dispatch_event(&event),
                None => break,
            },
            _ = quit.cancelled() => {
                // returning drops the runtime, which kills the running yt-dlp children
                anyhow::bail!("interrupted, downloads in progress were aborted");
            }
        }
    }
    let summary = handle.wait().await?;
    signal.abort();

    formatter.print_dispatch_summary(&summary, start.elapsed());
    save_settings(&settings, settings_path, &formatter);
    Ok(())
}

/// First Ctrl-C stops new work; a second one asks `download` to quit at once
async fn watch_interrupts(
    dispatch: CancellationToken,
    quit: CancellationToken,
    formatter: Arc<OutputFormatter>,
) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    formatter.warning(
        "Stopping: running downloads finish, nothing new starts (Ctrl-C again to quit)",
    );
    dispatch.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        quit.cancel();
    }
}

fn settings_command(action: SettingsAction, settings_path: &Path) -> anyhow::Result<()> {
    match action {
        SettingsAction::Path => println!("{}", settings_path.display()),
        SettingsAction::Show => {
            let settings = Settings::load(settings_path)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Save => {
            Settings::load(settings_path)?.save(settings_path)?;
            println!("{}", settings_path.display());
        }
    }
    Ok(())
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) -> anyhow::Result<()> {
    let default_level = match verbosity {
        VerbosityLevel::Verbose => "chandl=debug,warn",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}
