//! Flush executor: consumes sealed batches and writes them to the store.
//!
//! A bounded task queue feeds `core_workers` long-lived workers; submission
//! pressure can grow the pool up to `max_workers`. Transient store failures
//! are retried with exponential backoff behind a circuit breaker; permanent
//! failures abandon the batch and surface on the failure channel. Producers
//! never observe any of this, matching the fire-and-forget `put()` contract.

use super::RetryPolicy;
use crate::buffer::{Batch, TableBuffer};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::ExecutorConfig;
use crate::health::HealthCheck;
use crate::metrics::SinkMetrics;
use crate::store::StoreClient;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Report of a batch whose rows permanently failed.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Batch identifier
    pub batch_id: Uuid,
    /// Target table
    pub table: String,
    /// Number of failed rows
    pub rows: usize,
    /// Write attempts made before giving up
    pub attempts: u32,
    /// Why the rows failed
    pub reason: String,
}

struct FlushTask {
    batch: Batch,
    buffer: Arc<TableBuffer>,
}

/// What the retry loop concluded for one batch.
enum FlushVerdict {
    /// Every non-rejected row is durable
    Applied { rejected: usize, attempts: u32 },
    /// Batch abandoned; none of its rows are durable
    Abandoned { reason: String, attempts: u32 },
}

/// Bounded worker pool that drains sealed batches into the store.
pub struct FlushExecutor {
    config: ExecutorConfig,
    store: Arc<dyn StoreClient>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    metrics: Arc<SinkMetrics>,
    health: Arc<HealthCheck>,
    buffered_rows: Arc<AtomicUsize>,
    tx: parking_lot::Mutex<Option<mpsc::Sender<FlushTask>>>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<FlushTask>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    worker_count: AtomicUsize,
    failure_tx: broadcast::Sender<BatchFailure>,
}

impl FlushExecutor {
    /// Start the executor with its core worker pool.
    pub fn start(
        config: ExecutorConfig,
        store: Arc<dyn StoreClient>,
        metrics: Arc<SinkMetrics>,
        health: Arc<HealthCheck>,
        buffered_rows: Arc<AtomicUsize>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (failure_tx, _) = broadcast::channel(64);

        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig::new("store")
                .with_failure_threshold(config.circuit_failure_threshold)
                .with_reset_timeout(Duration::from_millis(config.circuit_reset_timeout_ms)),
        );

        let executor = Arc::new(Self {
            retry: RetryPolicy::from_config(&config),
            breaker,
            config,
            store,
            metrics,
            health,
            buffered_rows,
            tx: parking_lot::Mutex::new(Some(tx)),
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            workers: parking_lot::Mutex::new(Vec::new()),
            worker_count: AtomicUsize::new(0),
            failure_tx,
        });

        for _ in 0..executor.config.core_workers {
            executor.spawn_worker();
        }

        info!(
            core_workers = executor.config.core_workers,
            max_workers = executor.config.max_workers,
            queue_capacity = executor.config.queue_capacity,
            "Flush executor started"
        );

        executor
    }

    /// Enqueue a sealed batch for flushing.
    ///
    /// Blocks the calling seal path only when the task queue is at capacity;
    /// this is the designed backpressure boundary. When the queue is full and
    /// the pool has headroom, an extra worker is spawned first.
    pub async fn submit(self: &Arc<Self>, batch: Batch, buffer: Arc<TableBuffer>) {
        let Some(tx) = self.tx.lock().clone() else {
            error!(
                table = %batch.table(),
                rows = batch.len(),
                "Flush queue closed, dropping batch"
            );
            return;
        };

        let task = FlushTask { batch, buffer };
        match tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.maybe_spawn_extra_worker();
                if tx.send(task).await.is_err() {
                    error!("Flush queue closed while waiting for capacity");
                }
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                error!(
                    table = %task.batch.table(),
                    rows = task.batch.len(),
                    "Flush queue closed, dropping batch"
                );
            }
        }
    }

    /// Subscribe to permanent-failure reports.
    pub fn failures(&self) -> broadcast::Receiver<BatchFailure> {
        self.failure_tx.subscribe()
    }

    /// Current worker count.
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for workers to drain outstanding tasks.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());

        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.await;
        }

        info!("Flush executor stopped");
    }

    fn spawn_worker(self: &Arc<Self>) {
        let id = self.worker_count.fetch_add(1, Ordering::SeqCst);
        let executor = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                let task = { executor.rx.lock().await.recv().await };
                let Some(task) = task else {
                    break;
                };
                executor.flush(task).await;
            }
            debug!(worker = id, "Flush worker stopped");
        });

        self.workers.lock().push(handle);
    }

    fn maybe_spawn_extra_worker(self: &Arc<Self>) {
        let count = self.worker_count.load(Ordering::SeqCst);
        if count < self.config.max_workers {
            warn!(
                workers = count + 1,
                max_workers = self.config.max_workers,
                "Flush queue saturated, growing worker pool"
            );
            self.spawn_worker();
        }
    }

    async fn flush(&self, task: FlushTask) {
        let FlushTask { batch, buffer } = task;

        // One in-flight flush per table: wait for this batch's turn
        buffer.wait_turn(batch.seq()).await;

        let start = Instant::now();
        let verdict = self.write_with_retry(&batch, start).await;

        match verdict {
            FlushVerdict::Applied { rejected, attempts } => {
                let applied = batch.len() - rejected;
                self.metrics.record_flush(applied, start.elapsed());
                self.health.mark_healthy("store");

                if rejected > 0 {
                    self.report_failure(
                        &batch,
                        rejected,
                        attempts,
                        "rows rejected by store validation",
                    );
                } else {
                    debug!(
                        table = %batch.table(),
                        batch_id = %batch.id(),
                        rows = applied,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Batch flushed"
                    );
                }
            }
            FlushVerdict::Abandoned { reason, attempts } => {
                self.health.mark_unhealthy("store", &reason);
                self.report_failure(&batch, batch.len(), attempts, &reason);
            }
        }

        // The batch's rows leave the buffered-but-unflushed population either
        // way; backpressure must release even on permanent failure
        self.buffered_rows.fetch_sub(batch.len(), Ordering::SeqCst);
        self.metrics
            .set_buffered_rows(self.buffered_rows.load(Ordering::SeqCst) as u64);

        buffer.complete_flush(batch.seq());
    }

    /// Retry loop for one batch: bounded by attempt count and overall deadline.
    async fn write_with_retry(&self, batch: &Batch, start: Instant) -> FlushVerdict {
        let deadline = start + self.config.flush_deadline();
        let mut attempt: u32 = 0;

        loop {
            if !self.breaker.is_allowed() {
                match self.backoff(batch, &mut attempt, deadline, "circuit open").await {
                    Some(verdict) => return verdict,
                    None => continue,
                }
            }

            match self.store.write_batch(batch.table(), batch.rows()).await {
                Ok(result) if result.has_transient() => {
                    self.breaker.record_failure();
                    if let Some(verdict) = self
                        .backoff(batch, &mut attempt, deadline, "transient row failures")
                        .await
                    {
                        return verdict;
                    }
                }
                Ok(result) => {
                    self.breaker.record_success();
                    return FlushVerdict::Applied {
                        rejected: result.rejected(),
                        attempts: attempt + 1,
                    };
                }
                Err(err) if err.is_transient() => {
                    self.breaker.record_failure();
                    if let Some(verdict) = self
                        .backoff(batch, &mut attempt, deadline, &err.to_string())
                        .await
                    {
                        return verdict;
                    }
                }
                Err(err) => {
                    // Permanent store error: never retried
                    return FlushVerdict::Abandoned {
                        reason: err.to_string(),
                        attempts: attempt + 1,
                    };
                }
            }
        }
    }

    /// Account for a failed attempt. Returns the final verdict once attempts
    /// or the deadline are exhausted; otherwise sleeps the backoff delay so
    /// the caller retries the same batch.
    async fn backoff(
        &self,
        batch: &Batch,
        attempt: &mut u32,
        deadline: Instant,
        cause: &str,
    ) -> Option<FlushVerdict> {
        *attempt += 1;

        if *attempt >= self.config.max_retry_attempts {
            return Some(FlushVerdict::Abandoned {
                reason: format!("retries exhausted after {} attempts: {}", attempt, cause),
                attempts: *attempt,
            });
        }

        let delay = self.retry.calculate_delay(*attempt);
        if Instant::now() + delay >= deadline {
            return Some(FlushVerdict::Abandoned {
                reason: format!("flush deadline exceeded: {}", cause),
                attempts: *attempt,
            });
        }

        self.metrics.record_retry();
        warn!(
            table = %batch.table(),
            batch_id = %batch.id(),
            attempt = *attempt,
            delay_ms = delay.as_millis() as u64,
            cause = %cause,
            "Flush failed, retrying with backoff"
        );
        tokio::time::sleep(delay).await;

        None
    }

    fn report_failure(&self, batch: &Batch, rows: usize, attempts: u32, reason: &str) {
        self.metrics.record_failed_rows(rows);
        error!(
            table = %batch.table(),
            batch_id = %batch.id(),
            rows = rows,
            attempts = attempts,
            reason = %reason,
            "Batch rows permanently failed"
        );

        // No subscribers is fine; the report is best-effort observability
        let _ = self.failure_tx.send(BatchFailure {
            batch_id: batch.id(),
            table: batch.table().to_string(),
            rows,
            attempts,
            reason: reason.to_string(),
        });
    }
}
