//! Fixed-workload throughput measurement.
//!
//! Spawns N producer tasks issuing M puts each against an in-memory store,
//! waits for the full drain, and verifies that every accepted row became
//! visible exactly where it was routed.

use anyhow::{ensure, Result};
use rowsink_core::buffer::WriteBuffer;
use rowsink_core::store::{MemoryStore, Row};
use rowsink_core::Config;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Summary of a bench run.
#[derive(Debug, Serialize)]
struct BenchSummary {
    workers: usize,
    puts_per_worker: usize,
    tables: usize,
    rows_accepted: u64,
    rows_rejected: u64,
    rows_visible: usize,
    put_phase_ms: u128,
    total_ms: u128,
    rows_per_second: u64,
    flushes: u64,
    retries: u64,
}

pub async fn execute(
    config: Config,
    workers: usize,
    puts: usize,
    tables: usize,
    json: bool,
) -> Result<()> {
    ensure!(workers > 0 && puts > 0 && tables > 0, "workers, puts and tables must be positive");

    let store = Arc::new(MemoryStore::new());
    let buffer = WriteBuffer::new(config, Arc::clone(&store) as _)?;

    info!(workers, puts, tables, "Starting bench workload");
    let start = Instant::now();

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let buffer = Arc::clone(&buffer);
        let table = format!("bench{}", worker % tables);
        handles.push(tokio::spawn(async move {
            for n in 0..puts {
                let key = format!("{}_{}", worker, n);
                let row = Row::new(key.clone(), "cf", "cq", key);
                buffer.put(row, &table).await;
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }
    let put_phase = start.elapsed();

    buffer.shutdown().await?;
    let total = start.elapsed();

    let rows_visible: usize = (0..tables)
        .map(|t| store.row_count(&format!("bench{}", t)))
        .sum();
    let metrics = buffer.metrics();

    let summary = BenchSummary {
        workers,
        puts_per_worker: puts,
        tables,
        rows_accepted: metrics.rows_accepted_total(),
        rows_rejected: metrics.rows_rejected_total(),
        rows_visible,
        put_phase_ms: put_phase.as_millis(),
        total_ms: total.as_millis(),
        rows_per_second: if total.as_millis() > 0 {
            (rows_visible as u128 * 1000 / total.as_millis()) as u64
        } else {
            rows_visible as u64
        },
        flushes: metrics.flushes_total(),
        retries: metrics.flush_retries_total(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} workers did {} puts each ({} rows) in {} ms, drained in {} ms total",
            summary.workers,
            summary.puts_per_worker,
            summary.workers * summary.puts_per_worker,
            summary.put_phase_ms,
            summary.total_ms
        );
        println!(
            "accepted={} rejected={} visible={} flushes={} retries={} ({} rows/s)",
            summary.rows_accepted,
            summary.rows_rejected,
            summary.rows_visible,
            summary.flushes,
            summary.retries,
            summary.rows_per_second
        );
    }

    ensure!(
        summary.rows_visible as u64 == summary.rows_accepted,
        "store shows {} rows but {} were accepted",
        summary.rows_visible,
        summary.rows_accepted
    );

    Ok(())
}
