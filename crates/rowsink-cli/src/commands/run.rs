//! Long-lived synthetic workload with health and metrics endpoints.
//!
//! Producers generate rows at a steady rate until SIGINT/SIGTERM, then the
//! buffer drains gracefully. Useful for soak testing the flush path and for
//! exercising the HTTP observability surface.

use crate::server::{start_server, ServerState};
use anyhow::Result;
use rowsink_core::buffer::WriteBuffer;
use rowsink_core::store::{MemoryStore, Row};
use rowsink_core::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub async fn execute(config: Config, producers: usize, rate: u64, tables: usize) -> Result<()> {
    let monitoring = config.monitoring.clone();
    let store = Arc::new(MemoryStore::new());
    let buffer = WriteBuffer::new(config, Arc::clone(&store) as _)?;

    let state = Arc::new(ServerState {
        health: Arc::clone(buffer.health()),
        metrics: Arc::clone(buffer.metrics()),
    });
    start_server(state, monitoring.health_port, monitoring.metrics_port).await?;

    let (stop_tx, _) = broadcast::channel::<()>(1);
    let mut handles = Vec::with_capacity(producers);

    // Spread the target rate evenly over the producer tasks
    let per_producer = (rate / producers.max(1) as u64).max(1);
    let interval = Duration::from_nanos((1_000_000_000 / per_producer).max(1));

    info!(producers, rate, tables, "Starting synthetic workload");

    for producer in 0..producers {
        let buffer = Arc::clone(&buffer);
        let mut stop_rx = stop_tx.subscribe();
        let table = format!("soak{}", producer % tables.max(1));

        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut n: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let key = format!("{}_{}", producer, n);
                        let row = Row::new(key.clone(), "cf", "cq", key);
                        if !buffer.put(row, &table).await {
                            warn!(producer, table = %table, "Put rejected by backpressure");
                        }
                        n += 1;
                    }
                    _ = stop_rx.recv() => break,
                }
            }
        }));
    }

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, draining");

    let _ = stop_tx.send(());
    for handle in handles {
        let _ = handle.await;
    }

    buffer.shutdown().await?;

    let metrics = buffer.metrics();
    info!(
        accepted = metrics.rows_accepted_total(),
        rejected = metrics.rows_rejected_total(),
        flushed = metrics.rows_flushed_total(),
        failed = metrics.rows_failed_total(),
        tables = store.table_count(),
        "Workload complete"
    );

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
