//! Spillway load driver: feeds a write batcher and reports its flushes.
//!
//! # Usage
//!
//! ```bash
//! spillway --batch-size 10 --flush-period-ms 3000 --writes 100
//! ```
//!
//! Environment variables can also be used:
//! - `SPILLWAY_BATCH_SIZE`: Writes per size-triggered flush
//! - `SPILLWAY_DATA_DIR`: Persist flushed batches to SQLite
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::{Context, Result};
use spillway::config::Config;
use spillway::load::run_producer;
use spillway::observability::metrics::init_metrics_with_endpoint;
use spillway::observability::tracing::init_tracing;
use spillway::{Batcher, BatcherError, BatcherStats, MemoryStore, SqliteStore, Store};
use std::fs;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let store = config
        .data_dir
        .as_ref()
        .map_or_else(|| "memory".to_string(), |dir| dir.display().to_string());
    eprintln!(
        r#"
  Spillway v{} - size-or-time write batcher

  Configuration:
    Batch size:    {}
    Flush period:  {} ms
    Queue:         {}
    Store:         {}
    Writes:        {} every {} ms

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.batch_size,
        config.flush_period_ms,
        config.queue_capacity,
        store,
        config.writes,
        config.write_interval_ms
    );
}

fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    match &config.data_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data dir {}", dir.display()))?;
            let store = SqliteStore::open(dir.join("spillway.db"), config.reader_pool_size)
                .context("failed to open SQLite store")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        shutdown.cancel();
    });
}

fn print_stats(stats: &BatcherStats, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(stats)?);
    } else {
        println!(
            "Final stats: batches={} total_writes={} failed_batches={} dropped_writes={}",
            stats.batch_count, stats.total_writes, stats.failed_batches, stats.dropped_writes
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    init_tracing(&config.log_level, config.log_format);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    let batch_config = config.batch_config();
    batch_config.validate()?;

    print_banner(&config);

    let store = open_store(&config)?;
    let batcher = Batcher::new(store, batch_config)?;

    // Log every flush as it happens
    let mut events = batcher.flush_events();
    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) if event.is_applied() => tracing::info!(
                    trigger = ?event.trigger,
                    len = event.len,
                    total_writes = event.total_writes,
                    "Flushed batch of {} writes",
                    event.len
                ),
                Ok(event) => tracing::warn!(
                    trigger = ?event.trigger,
                    len = event.len,
                    outcome = ?event.outcome,
                    "Batch dropped"
                ),
                Err(e) => tracing::warn!(error = %e, "Flush event logger lagged"),
            }
        }
    });

    batcher.start()?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let profile = config.load_profile();
    let submitted = run_producer(&batcher, &profile, shutdown.clone()).await?;
    tracing::info!(submitted, "Shutting down batcher");

    let result = batcher.stop().await;
    let final_stats = batcher.stats();
    drop(batcher);
    let _ = event_logger.await;

    match result {
        Ok(stats) => print_stats(&stats, config.json)?,
        Err(e @ BatcherError::FlushFailed { .. }) => {
            // Counters are still meaningful when some batches were dropped
            if let Some(stats) = final_stats {
                print_stats(&stats, config.json)?;
            }
            return Err(e).context("batcher finished with dropped writes");
        }
        Err(e) => return Err(e).context("batcher shutdown failed"),
    }

    tracing::info!("Spillway shutdown complete");
    Ok(())
}
