//! Pirogue worker daemon.
//!
//! Boots the caching engine: loads configuration, installs and promotes
//! the current version, warms the data partition, then serves platform
//! events until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pirogue_worker::net::HttpFetcher;
use pirogue_worker::sync::SYNC_DATA_TAG;
use pirogue_worker::{Worker, WorkerConfig, WorkerEvent};

/// Buffer size for the platform event channel.
/// 32 gives bursts of fetch events headroom without unbounded growth.
const EVENT_CHANNEL_SIZE: usize = 32;

/// Initialize tracing: stderr plus a daily rolling log file. The worker
/// is a background process, so the file is the primary sink.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::data_local_dir()
        .map(|dir| dir.join("pirogue-worker").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("./logs"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "worker.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Use RUST_LOG env var to control log level (e.g. RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing()?;

    let config = WorkerConfig::load().context("Failed to load worker configuration")?;
    info!(app = %config.app_id, version = %config.version, "Pirogue worker starting");

    let fetcher = Arc::new(HttpFetcher::new()?);
    let worker = Worker::new(config, fetcher)?;
    worker.start().await.context("Worker installation failed")?;

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let loop_handle = tokio::spawn(worker.run(events_rx));

    // Warm the data partition right away; from here on the platform
    // adapter owns the sending side of the channel.
    let _ = events_tx
        .send(WorkerEvent::Sync {
            tag: SYNC_DATA_TAG.to_string(),
        })
        .await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, draining handlers");

    drop(events_tx);
    loop_handle.await?;
    info!("Pirogue worker shut down");
    Ok(())
}
