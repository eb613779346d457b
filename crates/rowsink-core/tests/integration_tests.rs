//! Integration tests for rowsink-core.
//!
//! These drive the full put -> buffer -> seal -> flush pipeline against the
//! in-memory store adapter, including the concurrency shapes the buffer is
//! built for: hundreds of producer tasks fanning into a handful of tables.

use rowsink_core::buffer::WriteBuffer;
use rowsink_core::config::Config;
use rowsink_core::health::HealthStatus;
use rowsink_core::metrics::SealKind;
use rowsink_core::store::{MemoryStore, Row};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn worker_row(worker: usize, n: usize) -> Row {
    Row::new(
        format!("{}_{}", worker, n),
        "cf",
        "cq",
        format!("{}_{}", worker, n),
    )
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.buffer.batch_size = 1000;
    config.buffer.max_buffer_age_ms = 200;
    config.buffer.flush_tick_ms = 50;
    config.buffer.max_buffered_rows = 200_000;
    config.executor.core_workers = 4;
    config.executor.max_workers = 8;
    config.executor.retry_backoff_base_ms = 5;
    config.executor.retry_backoff_max_ms = 100;
    config
}

/// Spawn `workers` producer tasks, each issuing `puts` rows to the table
/// chosen by `route`. Returns whether every put was accepted.
async fn run_producers(
    buffer: &Arc<WriteBuffer>,
    workers: usize,
    puts: usize,
    route: impl Fn(usize) -> String + Send + Sync + 'static,
) -> bool {
    let route = Arc::new(route);
    let mut handles = Vec::with_capacity(workers);

    for worker in 0..workers {
        let buffer = Arc::clone(buffer);
        let route = Arc::clone(&route);
        handles.push(tokio::spawn(async move {
            let table = route(worker);
            let mut all_accepted = true;
            for n in 0..puts {
                if !buffer.put(worker_row(worker, n), &table).await {
                    all_accepted = false;
                }
            }
            all_accepted
        }));
    }

    let mut all_accepted = true;
    for handle in handles {
        if !handle.await.expect("producer panicked") {
            all_accepted = false;
        }
    }
    all_accepted
}

mod throughput {
    use super::*;

    /// 100 producers x 500 puts to one table: every row visible after drain.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_single_table_throughput() {
        const WORKERS: usize = 100;
        const PUTS: usize = 500;

        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(base_config(), Arc::clone(&store) as _).unwrap();

        let accepted = run_producers(&buffer, WORKERS, PUTS, |_| "buffered1".to_string()).await;
        assert!(accepted, "no put should be rejected below capacity");

        buffer.shutdown().await.unwrap();

        assert_eq!(store.row_count("buffered1"), WORKERS * PUTS);
        assert_eq!(buffer.pending_rows(), 0);
        assert_eq!(buffer.metrics().rows_accepted_total() as usize, WORKERS * PUTS);
        assert_eq!(buffer.metrics().rows_flushed_total() as usize, WORKERS * PUTS);
        assert_eq!(buffer.metrics().rows_failed_total(), 0);
    }

    /// Producers round-robin across three tables; each table ends with
    /// exactly the rows routed to it.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_multi_table_independence() {
        const WORKERS: usize = 99;
        const PUTS: usize = 200;

        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(base_config(), Arc::clone(&store) as _).unwrap();

        let accepted = run_producers(&buffer, WORKERS, PUTS, |worker| {
            format!("buffered{}", worker % 3 + 1)
        })
        .await;
        assert!(accepted);

        buffer.shutdown().await.unwrap();

        // 99 workers split evenly across three tables
        for table in ["buffered1", "buffered2", "buffered3"] {
            assert_eq!(store.row_count(table), WORKERS / 3 * PUTS);
        }
        assert_eq!(buffer.table_count(), 3);
    }

    /// A permanently failing table must not reduce acceptance or delivery on
    /// the healthy ones.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_table_is_isolated() {
        const WORKERS: usize = 30;
        const PUTS: usize = 100;

        let store = Arc::new(MemoryStore::new());
        store.reject_table("cursed");

        let buffer = WriteBuffer::new(base_config(), Arc::clone(&store) as _).unwrap();
        let mut failures = buffer.failures();

        let accepted = run_producers(&buffer, WORKERS, PUTS, |worker| {
            if worker % 3 == 0 {
                "cursed".to_string()
            } else {
                "healthy".to_string()
            }
        })
        .await;
        // Puts to the cursed table are still accepted; failure is downstream
        assert!(accepted);

        buffer.shutdown().await.unwrap();

        assert_eq!(store.row_count("healthy"), 20 * PUTS);
        assert_eq!(store.row_count("cursed"), 0);
        assert_eq!(buffer.metrics().rows_failed_total() as usize, 10 * PUTS);
        assert!(failures.try_recv().is_ok());
    }
}

mod ordering {
    use super::*;

    /// Rows appended to one buffer generation reach the store in append order.
    #[tokio::test]
    async fn test_fifo_within_batch() {
        let mut config = base_config();
        config.buffer.batch_size = 100;

        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(config, Arc::clone(&store) as _).unwrap();

        for n in 0..100 {
            assert!(buffer.put(worker_row(0, n), "ordered").await);
        }
        buffer.shutdown().await.unwrap();

        let keys: Vec<String> = store
            .rows("ordered")
            .iter()
            .map(|r| String::from_utf8_lossy(&r.key).into_owned())
            .collect();
        let expected: Vec<String> = (0..100).map(|n| format!("0_{}", n)).collect();
        assert_eq!(keys, expected);
    }

    /// No row is lost or duplicated across many sealed batches.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_loss_no_duplication() {
        let mut config = base_config();
        config.buffer.batch_size = 64;

        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(config, Arc::clone(&store) as _).unwrap();

        let accepted = run_producers(&buffer, 20, 250, |_| "exact".to_string()).await;
        assert!(accepted);
        buffer.shutdown().await.unwrap();

        let rows = store.rows("exact");
        assert_eq!(rows.len(), 20 * 250);

        let unique: HashSet<&[u8]> = rows.iter().map(|r| r.key.as_ref()).collect();
        assert_eq!(unique.len(), 20 * 250, "duplicate rows in store");
    }
}

mod backpressure {
    use super::*;

    /// Once the global cap is reached puts are rejected, and acceptance
    /// resumes after flushes drain the buffered population.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_backpressure_boundary_and_recovery() {
        let mut config = base_config();
        config.buffer.batch_size = 10;
        config.buffer.max_buffered_rows = 20;
        // Age flush out of the way; only count seals move rows along
        config.buffer.max_buffer_age_ms = 60_000;

        let store = Arc::new(MemoryStore::new());
        store.set_write_delay(Duration::from_millis(300));

        let buffer = WriteBuffer::new(config, Arc::clone(&store) as _).unwrap();

        // Fill to the cap: both sealed batches sit in slow flushes
        for n in 0..20 {
            assert!(buffer.put(worker_row(0, n), "pressured").await, "put {}", n);
        }
        assert_eq!(buffer.pending_rows(), 20);

        // At capacity: rejection, not blocking
        assert!(!buffer.put(worker_row(0, 20), "pressured").await);
        assert!(buffer.metrics().rows_rejected_total() >= 1);
        assert!(buffer.metrics().backpressure_total() >= 1);
        assert_eq!(buffer.health().overall_status(), HealthStatus::Degraded);

        // Once the slow flushes complete, capacity frees up
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if buffer.put(worker_row(1, 0), "pressured").await {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("backpressure never released");

        buffer.shutdown().await.unwrap();
        assert_eq!(store.row_count("pressured"), 21);
    }
}

mod resilience {
    use super::*;

    /// Transient store outages are retried invisibly; every accepted row is
    /// still delivered exactly once.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transient_outage_is_survived() {
        let mut config = base_config();
        config.buffer.batch_size = 50;

        let store = Arc::new(MemoryStore::new());
        store.inject_transient_failures(3);

        let buffer = WriteBuffer::new(config, Arc::clone(&store) as _).unwrap();

        let accepted = run_producers(&buffer, 4, 100, |_| "flaky".to_string()).await;
        assert!(accepted);
        buffer.shutdown().await.unwrap();

        assert_eq!(store.row_count("flaky"), 400);
        assert!(buffer.metrics().flush_retries_total() >= 3);
        assert_eq!(buffer.metrics().rows_failed_total(), 0);
        // Store recovered, so overall health recovered with it
        assert!(buffer.health().is_operational());
    }

    /// Shutdown drains partial batches that never hit a seal threshold.
    #[tokio::test]
    async fn test_drain_on_shutdown() {
        let mut config = base_config();
        config.buffer.batch_size = 1000;
        config.buffer.max_buffer_age_ms = 60_000;

        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(config, Arc::clone(&store) as _).unwrap();

        for table in ["d1", "d2", "d3"] {
            for n in 0..17 {
                assert!(buffer.put(worker_row(0, n), table).await);
            }
        }
        assert_eq!(store.table_count(), 0);

        buffer.shutdown().await.unwrap();

        for table in ["d1", "d2", "d3"] {
            assert_eq!(store.row_count(table), 17);
        }
        assert_eq!(buffer.metrics().seals_by_kind(SealKind::Drain), 3);
    }

    /// Low-throughput tables are flushed by age, bounded by the ticker, with
    /// no further put traffic.
    #[tokio::test]
    async fn test_age_flush_bounds_latency() {
        let mut config = base_config();
        config.buffer.batch_size = 1000;
        config.buffer.max_buffer_age_ms = 100;
        config.buffer.flush_tick_ms = 20;

        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(config, Arc::clone(&store) as _).unwrap();

        assert!(buffer.put(worker_row(0, 0), "quiet").await);

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.row_count("quiet") == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("age-triggered flush never happened");

        assert_eq!(buffer.metrics().seals_by_kind(SealKind::Age), 1);
        buffer.shutdown().await.unwrap();
    }
}
