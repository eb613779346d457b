//! Per-table pending-row buffer.
//!
//! Each table owns its buffer and its own lock; two tables never contend.
//! Sealing is atomic with respect to concurrent appends: the append that
//! reaches the count threshold seals under the same lock acquisition.
//!
//! Flush sequencing: every sealed batch carries a monotonic per-table
//! sequence number, and the executor waits for the batch's turn before
//! calling the store, so at most one flush per table is ever outstanding
//! and age/count seal races cannot reorder batches.

use super::Batch;
use crate::config::BufferConfig;
use crate::error::BufferError;
use crate::metrics::SealKind;
use crate::store::Row;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Pending rows for exactly one table.
pub struct TableBuffer {
    table: String,
    batch_size: usize,
    queue_capacity: usize,
    inner: Mutex<Pending>,
    /// Sequence number of the batch currently allowed to flush
    flush_gate: watch::Sender<u64>,
}

struct Pending {
    rows: Vec<Row>,
    /// Set when the first row lands after a seal; drives age-based sealing
    opened_at: Option<Instant>,
    next_seq: u64,
}

/// Result of appending one row.
#[derive(Debug, Default)]
pub struct AppendOutcome {
    /// Batch sealed by this append, ready for submission
    pub sealed: Option<Batch>,
}

impl TableBuffer {
    /// Create an empty buffer for `table`.
    pub fn new(table: impl Into<String>, config: &BufferConfig) -> Self {
        let (flush_gate, _) = watch::channel(0);
        Self {
            table: table.into(),
            batch_size: config.batch_size,
            queue_capacity: config.table_queue_capacity,
            inner: Mutex::new(Pending {
                rows: Vec::new(),
                opened_at: None,
                next_seq: 0,
            }),
            flush_gate,
        }
    }

    /// Table this buffer belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Append a row; seals and returns the batch when the count threshold is
    /// reached, all under one lock acquisition.
    pub fn append(&self, row: Row) -> Result<AppendOutcome, BufferError> {
        let mut inner = self.inner.lock();

        if inner.rows.len() >= self.queue_capacity {
            return Err(BufferError::TableQueueFull {
                table: self.table.clone(),
                capacity: self.queue_capacity,
            });
        }

        if inner.rows.is_empty() {
            inner.opened_at = Some(Instant::now());
        }
        inner.rows.push(row);

        if inner.rows.len() >= self.batch_size {
            let batch = Self::seal_locked(&self.table, &mut inner, SealKind::Count);
            return Ok(AppendOutcome {
                sealed: Some(batch),
            });
        }

        Ok(AppendOutcome::default())
    }

    /// Seal the pending rows if the buffer has exceeded `max_age`.
    ///
    /// Called from the background ticker so low-throughput tables still flush
    /// within a bounded latency.
    pub fn seal_if_aged(&self, max_age: Duration) -> Option<Batch> {
        let mut inner = self.inner.lock();
        let opened_at = inner.opened_at?;

        if inner.rows.is_empty() || opened_at.elapsed() < max_age {
            return None;
        }

        Some(Self::seal_locked(&self.table, &mut inner, SealKind::Age))
    }

    /// Seal whatever is pending, or nothing if the buffer is empty. Shutdown path.
    pub fn drain(&self) -> Option<Batch> {
        let mut inner = self.inner.lock();
        if inner.rows.is_empty() {
            return None;
        }
        Some(Self::seal_locked(&self.table, &mut inner, SealKind::Drain))
    }

    /// Number of pending (unsealed) rows.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    /// Wait until batch `seq` is allowed to flush.
    pub async fn wait_turn(&self, seq: u64) {
        let mut rx = self.flush_gate.subscribe();
        // wait_for fails only if the sender is dropped, which cannot happen
        // while a flush task still holds this buffer
        let _ = rx.wait_for(|turn| *turn >= seq).await;
    }

    /// Mark batch `seq` finished (flushed or abandoned), unblocking the next.
    pub fn complete_flush(&self, seq: u64) {
        self.flush_gate.send_modify(|turn| {
            if seq + 1 > *turn {
                *turn = seq + 1;
            }
        });
    }

    fn seal_locked(table: &str, inner: &mut Pending, reason: SealKind) -> Batch {
        let rows = std::mem::take(&mut inner.rows);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.opened_at = None;

        debug!(
            table = %table,
            rows = rows.len(),
            seq = seq,
            trigger = reason.as_label(),
            "Sealed batch"
        );

        Batch::new(table, seq, reason, rows)
    }
}
