use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alert;
use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::error::IngestError;
use crate::ingest::disk::DiskCache;
use crate::ingest::fetch::HttpArchiveSource;
use crate::ingest::{schedule, IngestPipeline};
use crate::server;
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Ingest,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("serve") => Some(Command::Serve),
        Some("ingest") => Some(Command::Ingest),
        _ => None,
    }
}

pub async fn run_with_args(args: &[String]) -> i32 {
    let Some(command) = parse_command(args) else {
        eprintln!("usage: fibermirror <serve|ingest>");
        return 2;
    };

    telemetry::init_tracing();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return 2;
        }
    };

    match command {
        Command::Serve => handle_serve(config).await,
        Command::Ingest => handle_ingest(config).await,
    }
}

/// Wires the cache, disk store, remote source and alert sink into a pipeline.
pub fn build_pipeline(
    config: &Config,
    cache: Arc<SnapshotCache>,
    cancel: CancellationToken,
) -> Result<IngestPipeline, IngestError> {
    let source = HttpArchiveSource::new(config.archive_url.clone(), config.fetch_timeout)?;
    let alerts = alert::from_config(config.telegram.as_ref());
    Ok(IngestPipeline::new(
        cache,
        DiskCache::new(&config.cache_dir),
        Arc::new(source),
        Arc::from(alerts),
    )
    .with_fetch_timeout(config.fetch_timeout)
    .with_cancellation(cancel))
}

async fn handle_serve(config: Config) -> i32 {
    let cache = Arc::new(SnapshotCache::new());
    let cancel = CancellationToken::new();
    let pipeline = match build_pipeline(&config, cache.clone(), cancel.clone()) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(err) => {
            eprintln!("startup error: {err}");
            return 1;
        }
    };

    tracing::info!(
        archive_url = %config.archive_url,
        cache_dir = %config.cache_dir.display(),
        fetch_time = %config.fetch_time.format("%H:%M"),
        "starting ingestion scheduler"
    );
    let scheduler = schedule::spawn(pipeline, config.fetch_time, cancel.clone());
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let served = server::run_server(config.bind_addr, cache, cancel.clone()).await;
    cancel.cancel();
    if let Err(err) = scheduler.await {
        tracing::error!(error = %err, "ingestion scheduler aborted");
    }

    match served {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("server error: {err}");
            1
        }
    }
}

async fn handle_ingest(config: Config) -> i32 {
    let cache = Arc::new(SnapshotCache::new());
    let pipeline = match build_pipeline(&config, cache.clone(), CancellationToken::new()) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            eprintln!("startup error: {err}");
            return 1;
        }
    };

    let outcome = pipeline.run_cycle().await;
    let view = cache.view();
    let health = server::api::health_payload(view.snapshot.as_deref(), &view.status);
    match serde_json::to_string_pretty(&health) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to render status: {err}"),
    }

    if outcome.is_published() {
        0
    } else {
        1
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "could not listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown requested");
    cancel.cancel();
}
