use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use mox_core::{
    CatalogScraper, Config, DownloadCoordinator, DownloadReport, DownloadStats, MoxSession,
    SeriesInfo,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::exit_handler;
use crate::app::progress_manager;
use crate::app::terminal::{OutputMode, TerminalEnv};
use crate::cli::{Args, Command, DownloadArgs};

pub(crate) async fn run_mox() -> Result<ProcessExit> {
    let args = Args::parse();

    let output = OutputMode::resolve(&args, TerminalEnv::current());
    output.init_tracing();
    debug!(?args, "CLI arguments parsed");

    let config_path = args
        .config
        .as_deref()
        .context("missing required option --config <FILE>")?;
    let config = load_config(config_path)?;

    match &args.command {
        Command::Download(download) => run_download(config, download, &output).await,
        Command::Info(info) => run_info(&config, info.id).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

async fn sign_in(config: &Config) -> Result<MoxSession> {
    let session = MoxSession::with_base_url(config.base_url(), config.session_settings())
        .context("failed to create HTTP session")?;
    session
        .login(&config.mox.email, &config.mox.password)
        .await
        .context("login failed")?;
    Ok(session)
}

async fn sign_out(session: &MoxSession) {
    if let Err(e) = session.logout().await {
        warn!(error = %e, "logout failed");
    }
}

async fn run_download(
    config: Config,
    args: &DownloadArgs,
    output: &OutputMode,
) -> Result<ProcessExit> {
    let config = config.with_overrides(args.transfers.map(usize::from), args.format, args.tier)?;
    config.init()?;

    info!(series_id = args.id, "mox starting");
    let session = sign_in(&config).await?;
    let outcome = download_series(&config, &session, args.id, output.spinner).await;
    sign_out(&session).await;

    let report = outcome?;
    if !output.quiet {
        print_download_summary(&report, &config.mox.download_path);
    }
    if report.is_complete() {
        info!(volumes = report.volumes, "all volumes downloaded");
    } else if report.interrupted {
        warn!(
            completed = report.completed,
            volumes = report.volumes,
            "Interrupted. Run again to fetch the remaining volumes."
        );
    }
    Ok(exit_handler::exit_outcome_for_report(&report))
}

async fn download_series(
    config: &Config,
    session: &MoxSession,
    series_id: u64,
    use_spinner: bool,
) -> Result<DownloadReport> {
    let coordinator =
        DownloadCoordinator::new(session.clone(), config.mox.transfers, config.download_options())?;
    let series = CatalogScraper::new(session.clone())
        .fetch_series(series_id)
        .await
        .with_context(|| format!("failed to read series {series_id}"))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let stats = Arc::new(DownloadStats::new());
    let (progress_handle, progress_stop) = progress_manager::spawn_progress_ui(
        use_spinner,
        Arc::clone(&stats),
        series.volumes().len(),
    );

    let report = coordinator
        .download_series(&series, interrupted, stats)
        .await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }
    Ok(report)
}

async fn run_info(config: &Config, series_id: u64) -> Result<ProcessExit> {
    let session = sign_in(config).await?;
    let outcome = CatalogScraper::new(session.clone())
        .fetch_series(series_id)
        .await
        .with_context(|| format!("failed to read series {series_id}"));
    sign_out(&session).await;

    print_series(&outcome?);
    Ok(ProcessExit::Success)
}

fn print_series(series: &SeriesInfo) {
    println!("Title:   {}", series.title());
    println!("Authors: {}", series.authors().join(", "));
    println!("Volumes: {}", series.volumes().len());
    for volume in series.volumes() {
        println!("  {:>8}  {}", volume.id(), volume.name());
    }
}

fn print_download_summary(report: &DownloadReport, download_path: &Path) {
    println!(
        "{}: {}/{} volume(s) downloaded to {}",
        report.title,
        report.completed,
        report.volumes,
        download_path.display()
    );
    if report.failed > 0 {
        println!("  {} failed (see log for details)", report.failed);
    }
    if report.cancelled > 0 {
        println!("  {} not started (interrupted)", report.cancelled);
    }
}
