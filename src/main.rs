//! CLI entry point for the mdex-dl tool.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mdex_core::{
    ApiClient, DownloadOrchestrator, DownloaderConfig, ImageReporter, MangaReport,
    ReqwestTransport, SystemClock, ThrottleTracker, build_catalog,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use cli::{Cli, Command, DownloadArgs, RandomArgs, SearchArgs};

/// Process outcome mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let loaded = app_config::load_default_file_config()?;
    let mut config = DownloaderConfig::default();
    if let Some(file) = &loaded.config {
        if let Some(path) = &loaded.path {
            debug!(path = %path.display(), "loaded config file");
        }
        file.apply_to(&mut config);
    }

    let exit = match &cli.command {
        Command::Search(args) => run_search(args, config).await?,
        Command::Download(args) => run_download(args, config, cli.quiet).await?,
        Command::Random(args) => run_random(args, config).await?,
    };
    Ok(exit.into())
}

async fn run_search(args: &SearchArgs, mut config: DownloaderConfig) -> Result<ProcessExit> {
    if args.pornographic {
        config.include_pornographic = true;
    }
    config.validate()?;

    let api = build_api(&config, Arc::new(AtomicBool::new(false)))?.0;
    let title = args.title();
    let results = api
        .search_manga(&title, usize::from(args.limit))
        .await
        .with_context(|| format!("Search for '{title}' failed"))?;

    if results.is_empty() {
        println!("No manga found for '{title}'");
    }
    for manga in &results {
        println!("{}  {}", manga.id, manga.title);
    }
    Ok(ProcessExit::Success)
}

async fn run_random(args: &RandomArgs, mut config: DownloaderConfig) -> Result<ProcessExit> {
    if args.pornographic {
        config.include_pornographic = true;
    }
    config.validate()?;

    let api = build_api(&config, Arc::new(AtomicBool::new(false)))?.0;
    let manga = api
        .random_manga()
        .await
        .context("Failed to fetch a random manga")?;
    println!("{}  {}", manga.id, manga.title);
    Ok(ProcessExit::Success)
}

async fn run_download(
    args: &DownloadArgs,
    mut config: DownloaderConfig,
    quiet: bool,
) -> Result<ProcessExit> {
    args.apply_to(&mut config);
    config.validate()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let (api, reporter) = build_api(&config, Arc::clone(&interrupted))?;

    let manga = api
        .manga(&args.manga_id)
        .await
        .with_context(|| format!("Failed to look up manga '{}'", args.manga_id))?;
    let records = api
        .chapter_feed(&manga.id)
        .await
        .with_context(|| format!("Failed to list chapters of '{}'", manga.title))?;
    let catalog = build_catalog(&records, &config.language);
    info!(manga = %manga.title, chapters = catalog.len(), language = %config.language, "catalog ready");

    if catalog.is_empty() {
        println!(
            "{}: no chapters available in language '{}'",
            manga.title, config.language
        );
        return Ok(ProcessExit::Success);
    }

    let chapters = match &args.select {
        Some(selection) => selection.apply(&catalog)?,
        None => catalog,
    };

    let orchestrator =
        DownloadOrchestrator::new(api, Some(reporter), config.download_options())?;

    let progress = chapter_progress(chapters.len(), quiet);
    let report = orchestrator
        .download_all(&manga.title, &chapters, |chapter| {
            progress.set_message(chapter.label.clone());
            progress.inc(1);
        })
        .await;
    progress.finish_and_clear();

    print!("{report}");

    if interrupted.load(Ordering::SeqCst) {
        warn!("Interrupted. Run again to resume.");
        return Ok(ProcessExit::Failure);
    }
    Ok(determine_exit_outcome(&report))
}

fn build_api(
    config: &DownloaderConfig,
    interrupted: Arc<AtomicBool>,
) -> Result<(ApiClient, ImageReporter)> {
    let transport =
        ReqwestTransport::new(&config.user_agent).context("Failed to build HTTP client")?;
    let tracker = Arc::new(ThrottleTracker::new(Arc::new(SystemClock)));
    let executor = config
        .executor(Arc::new(transport), tracker)
        .with_interrupt_flag(interrupted);
    let reporter = ImageReporter::new(&executor, &config.report_endpoint, config.report_timeout);
    let api = ApiClient::new(Arc::new(executor), &config.api_root)?
        .with_page_size(config.page_size)
        .with_pornographic(config.include_pornographic);
    Ok((api, reporter))
}

fn chapter_progress(total: usize, quiet: bool) -> ProgressBar {
    let dumb_terminal = std::env::var("TERM").is_ok_and(|value| value.eq_ignore_ascii_case("dumb"));
    if quiet || dumb_terminal || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_bar} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn determine_exit_outcome(report: &MangaReport) -> ProcessExit {
    if report.is_complete() {
        ProcessExit::Success
    } else if report.complete().next().is_some() || report.partial().next().is_some() {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
