//! Process-wide write buffer manager.
//!
//! Routes each incoming put to its table's buffer (created lazily on first
//! reference), enforces the global buffered-row capacity, and owns the flush
//! executor, the store client reference, and the background age ticker.
//!
//! Constructed explicitly and dependency-injected; lifecycle (new, shutdown)
//! is caller-controlled. `put()` is the fast path: it touches only the
//! per-table lock and never performs store I/O.

use super::{Batch, TableBuffer};
use crate::config::Config;
use crate::error::BufferError;
use crate::executor::{BatchFailure, FlushExecutor};
use crate::health::HealthCheck;
use crate::metrics::SinkMetrics;
use crate::store::{Row, StoreClient};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on the graceful shutdown drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Concurrency-safe write buffer in front of a distributed key-value store.
pub struct WriteBuffer {
    config: Config,
    tables: DashMap<String, Arc<TableBuffer>>,
    /// Rows accepted but not yet flushed or abandoned; the only counter
    /// touched by every producer, so updates stay on the atomic fast path
    buffered_rows: Arc<AtomicUsize>,
    executor: Arc<FlushExecutor>,
    metrics: Arc<SinkMetrics>,
    health: Arc<HealthCheck>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
    backpressure_active: AtomicBool,
    ticker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl WriteBuffer {
    /// Create a write buffer over the given store client.
    ///
    /// Validates the configuration, starts the flush worker pool and the
    /// age-based flush ticker.
    pub fn new(config: Config, store: Arc<dyn StoreClient>) -> crate::Result<Arc<Self>> {
        config.validate()?;

        let metrics = Arc::new(SinkMetrics::new());
        let health = Arc::new(HealthCheck::new());
        health.register_component("buffer");
        health.register_component("executor");
        health.register_component("store");

        let buffered_rows = Arc::new(AtomicUsize::new(0));
        let executor = FlushExecutor::start(
            config.executor.clone(),
            store,
            Arc::clone(&metrics),
            Arc::clone(&health),
            Arc::clone(&buffered_rows),
        );
        health.mark_healthy("executor");

        let (shutdown_tx, _) = broadcast::channel(1);

        let buffer = Arc::new(Self {
            config,
            tables: DashMap::new(),
            buffered_rows,
            executor,
            metrics,
            health,
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
            backpressure_active: AtomicBool::new(false),
            ticker: parking_lot::Mutex::new(None),
        });

        let handle = buffer.spawn_age_ticker();
        *buffer.ticker.lock() = Some(handle);

        info!(
            batch_size = buffer.config.buffer.batch_size,
            max_buffer_age_ms = buffer.config.buffer.max_buffer_age_ms,
            max_buffered_rows = buffer.config.buffer.max_buffered_rows,
            "Write buffer started"
        );

        Ok(buffer)
    }

    /// Accept a row for eventual flush to `table`.
    ///
    /// Returns `true` once the row is buffered in memory (not yet durable),
    /// `false` when capacity is exhausted or shutdown has begun. This boolean
    /// is the sole backpressure signal producers see.
    pub async fn put(&self, row: Row, table: &str) -> bool {
        match self.try_put(row, table).await {
            Ok(()) => true,
            Err(err) => {
                self.metrics.record_rejected();
                debug!(table = %table, reason = %err, "Put rejected");
                false
            }
        }
    }

    async fn try_put(&self, row: Row, table: &str) -> Result<(), BufferError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(BufferError::ShuttingDown);
        }

        let buffered = self.buffered_rows.load(Ordering::SeqCst);
        let capacity = self.config.buffer.max_buffered_rows;
        if buffered >= capacity {
            if !self.backpressure_active.swap(true, Ordering::SeqCst) {
                self.metrics.record_backpressure();
                self.health
                    .mark_degraded("buffer", "buffered-row capacity reached");
                warn!(buffered = buffered, capacity = capacity, "Backpressure engaged");
            }
            return Err(BufferError::CapacityExceeded { buffered, capacity });
        }

        let buffer = self.table_buffer(table);
        let outcome = buffer.append(row)?;

        let buffered = self.buffered_rows.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.record_accepted();
        self.metrics.set_buffered_rows(buffered as u64);

        if self.backpressure_active.swap(false, Ordering::SeqCst) {
            self.health.mark_healthy("buffer");
            info!("Backpressure released");
        }

        if let Some(batch) = outcome.sealed {
            self.dispatch(batch, buffer).await;
        }

        Ok(())
    }

    /// Look up or lazily create the buffer for `table`.
    ///
    /// The map entry lock is held only for the brief creation window, never
    /// during I/O; concurrent first access from many producers yields one
    /// buffer.
    fn table_buffer(&self, table: &str) -> Arc<TableBuffer> {
        if let Some(existing) = self.tables.get(table) {
            return Arc::clone(existing.value());
        }

        let created = self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| {
                debug!(table = %table, "Created table buffer");
                Arc::new(TableBuffer::new(table, &self.config.buffer))
            })
            .clone();
        self.metrics.set_open_tables(self.tables.len() as u64);
        created
    }

    async fn dispatch(&self, batch: Batch, buffer: Arc<TableBuffer>) {
        self.metrics.record_seal(batch.reason());
        self.executor.submit(batch, buffer).await;
    }

    /// Rows accepted but not yet flushed or abandoned.
    pub fn pending_rows(&self) -> usize {
        self.buffered_rows.load(Ordering::SeqCst)
    }

    /// Number of tables with an open buffer.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Health handle.
    pub fn health(&self) -> &Arc<HealthCheck> {
        &self.health
    }

    /// Subscribe to permanent-failure reports from the flush executor.
    pub fn failures(&self) -> broadcast::Receiver<BatchFailure> {
        self.executor.failures()
    }

    /// Drain all buffers and stop the executor.
    ///
    /// Stops the age ticker, seals whatever is pending in every table,
    /// submits those final batches, then closes the flush queue and joins the
    /// workers. Idempotent; bounded by a graceful-shutdown timeout.
    pub async fn shutdown(&self) -> crate::Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Write buffer shutting down");
        let _ = self.shutdown_tx.send(());

        let ticker = self.ticker.lock().take();
        if let Some(handle) = ticker {
            let _ = handle.await;
        }

        let shutdown_result =
            tokio::time::timeout(SHUTDOWN_TIMEOUT, self.drain_and_stop()).await;
        match shutdown_result {
            Ok(()) => info!("Write buffer shut down"),
            Err(_) => warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Shutdown timeout exceeded, some batches may be unflushed"
            ),
        }

        Ok(())
    }

    async fn drain_and_stop(&self) {
        let drained: Vec<(Arc<TableBuffer>, Batch)> = self
            .tables
            .iter()
            .filter_map(|entry| {
                let buffer = Arc::clone(entry.value());
                buffer.drain().map(|batch| (buffer, batch))
            })
            .collect();

        for (buffer, batch) in drained {
            self.dispatch(batch, buffer).await;
        }

        self.executor.shutdown().await;
    }

    fn spawn_age_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let buffer = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let tick = self.config.buffer.flush_tick();
        let max_age = self.config.buffer.max_buffer_age();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // Seal first, then submit, so the map's shard locks
                        // are never held across an await
                        let sealed: Vec<(Arc<TableBuffer>, Batch)> = buffer
                            .tables
                            .iter()
                            .filter_map(|entry| {
                                let table = Arc::clone(entry.value());
                                table.seal_if_aged(max_age).map(|batch| (table, batch))
                            })
                            .collect();

                        for (table, batch) in sealed {
                            buffer.dispatch(batch, table).await;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Age ticker received shutdown signal");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_row(n: usize) -> Row {
        Row::new(format!("key-{}", n), "cf", "cq", format!("value-{}", n))
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.buffer.batch_size = 10;
        config.buffer.max_buffer_age_ms = 50;
        config.buffer.flush_tick_ms = 10;
        config.executor.core_workers = 2;
        config.executor.max_workers = 4;
        config
    }

    #[tokio::test]
    async fn test_put_and_count_seal() {
        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(test_config(), Arc::clone(&store) as _).unwrap();

        for i in 0..10 {
            assert!(buffer.put(test_row(i), "t1").await);
        }
        buffer.shutdown().await.unwrap();

        assert_eq!(store.row_count("t1"), 10);
        assert_eq!(buffer.pending_rows(), 0);
        assert_eq!(buffer.metrics().rows_accepted_total(), 10);
        assert_eq!(buffer.metrics().rows_flushed_total(), 10);
    }

    #[tokio::test]
    async fn test_age_based_flush_without_put_traffic() {
        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(test_config(), Arc::clone(&store) as _).unwrap();

        // Three rows, well below the count threshold of ten
        for i in 0..3 {
            assert!(buffer.put(test_row(i), "t1").await);
        }

        // The ticker must flush them without further puts
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.row_count("t1") < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("age-based flush never happened");

        assert!(buffer.metrics().seals_by_kind(crate::metrics::SealKind::Age) >= 1);
        buffer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lazy_table_creation() {
        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(test_config(), Arc::clone(&store) as _).unwrap();

        assert_eq!(buffer.table_count(), 0);
        buffer.put(test_row(0), "t1").await;
        buffer.put(test_row(1), "t2").await;
        buffer.put(test_row(2), "t1").await;
        assert_eq!(buffer.table_count(), 2);

        buffer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let mut config = test_config();
        // Age flush effectively disabled; only the shutdown drain can flush
        config.buffer.max_buffer_age_ms = 60_000;
        let buffer = WriteBuffer::new(config, Arc::clone(&store) as _).unwrap();

        for i in 0..7 {
            assert!(buffer.put(test_row(i), "t1").await);
        }
        assert_eq!(store.row_count("t1"), 0);

        buffer.shutdown().await.unwrap();
        assert_eq!(store.row_count("t1"), 7);
        assert_eq!(
            buffer.metrics().seals_by_kind(crate::metrics::SealKind::Drain),
            1
        );
    }

    #[tokio::test]
    async fn test_put_after_shutdown_rejected() {
        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(test_config(), Arc::clone(&store) as _).unwrap();

        buffer.shutdown().await.unwrap();
        assert!(!buffer.put(test_row(0), "t1").await);
        assert_eq!(buffer.metrics().rows_rejected_total(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let buffer = WriteBuffer::new(test_config(), Arc::clone(&store) as _).unwrap();

        buffer.put(test_row(0), "t1").await;
        buffer.shutdown().await.unwrap();
        buffer.shutdown().await.unwrap();
        assert_eq!(store.row_count("t1"), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let store = Arc::new(MemoryStore::new());
        let mut config = test_config();
        config.buffer.batch_size = 0;

        assert!(WriteBuffer::new(config, store as _).is_err());
    }
}
