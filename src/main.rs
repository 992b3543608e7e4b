use anyhow::{Context, Result};
use clap::Parser;
use parquetizer::{
    config::{load_config, validate_config},
    pipeline::{BatchJob, CancelHandle, Pipeline},
    progress::CountingProgress,
    storage,
};
use std::{future::Future, io, path::PathBuf, process::ExitCode, sync::Arc, time::Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Convert CSV and LVM files to Parquet on local disk or S3-compatible storage.
#[derive(Parser, Debug)]
#[command(name = "parquetizer", version, about)]
struct Args {
    /// YAML file with the backend and batch settings
    #[arg(short, long)]
    config: PathBuf,

    /// Only convert files ending in this extension, e.g. `.lvm`
    #[arg(short, long)]
    extension: Option<String>,

    /// Concurrent workers (at most 10)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Delete each source once its outputs are written
    #[arg(long)]
    remove_source: bool,

    /// List matching files and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) resolve configuration ────────────────────────────────────
    let args = Args::parse();
    let mut config = load_config(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if let Some(extension) = args.extension {
        config.batch.extension = extension;
    }
    if let Some(workers) = args.workers {
        config.batch.workers = workers;
    }
    if args.remove_source {
        config.batch.remove_source = true;
    }
    validate_config(&config).context("invalid command line overrides")?;

    // ─── 3) connect and list ─────────────────────────────────────────
    let progress = Arc::new(CountingProgress::new());
    let storage = storage::connect(&config.backend, progress.clone())
        .context("connecting to storage backend")?;
    let pipeline = Pipeline::new(storage).with_progress(progress.clone());

    let objects = pipeline
        .list(&config.batch.extension)
        .await
        .context("listing source files")?;
    info!(
        count = objects.len(),
        extension = %config.batch.extension,
        "found source files"
    );

    if args.dry_run {
        for object in &objects {
            println!("{object}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    if objects.is_empty() {
        info!("nothing to convert; exit");
        return Ok(ExitCode::SUCCESS);
    }

    // ─── 4) Ctrl-C stops scheduling, a second one quits ─────────────
    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
            std::process::exit(130);
        }
    });

    // ─── 5) run the batch ────────────────────────────────────────────
    let start = Instant::now();
    let summary = pipeline
        .run(BatchJob {
            objects,
            workers: config.batch.workers,
            remove_source: config.batch.remove_source,
        })
        .await;

    for object in &summary.failed_objects {
        error!(object = %object, "not converted");
    }
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        bytes = progress.bytes(),
        elapsed = ?start.elapsed(),
        "all done"
    );

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Cancel the batch on the first signal. Returns `true` once a second
/// signal arrives, `false` if the signal source fails first.
async fn watch_interrupts<F, Fut>(mut next_signal: F, cancel: CancelHandle) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        return false;
    }
    warn!("interrupted; finishing files already in progress (Ctrl-C again to quit)");
    cancel.cancel();

    if next_signal().await.is_err() {
        return false;
    }
    error!("interrupted twice; exiting without waiting");
    true
}
