//! In-memory store adapter.
//!
//! Backs the test-suite and the CLI bench/run commands. Tables are created on
//! first write. Fault injection knobs let tests script transient outages and
//! permanently rejecting tables without a real cluster.

use super::{BatchWriteResult, Row, RowOutcome, StoreClient};
use crate::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// In-memory [`StoreClient`] implementation.
pub struct MemoryStore {
    tables: DashMap<String, Vec<Row>>,
    /// Tables whose writes are always rejected as permanent failures
    rejected_tables: parking_lot::RwLock<HashSet<String>>,
    /// Remaining write_batch calls to fail with a transient error
    transient_failures: AtomicU32,
    /// Simulated per-call latency in milliseconds
    write_delay_ms: AtomicU64,
    write_calls: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            rejected_tables: parking_lot::RwLock::new(HashSet::new()),
            transient_failures: AtomicU32::new(0),
            write_delay_ms: AtomicU64::new(0),
            write_calls: AtomicU64::new(0),
        }
    }

    /// Fail the next `count` write calls with `StoreError::Unavailable`.
    pub fn inject_transient_failures(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Mark a table so every row written to it is rejected permanently.
    pub fn reject_table(&self, table: &str) {
        self.rejected_tables.write().insert(table.to_string());
    }

    /// Simulate store-side latency on each write call.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of rows visible in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.value().len()).unwrap_or(0)
    }

    /// Number of tables that received at least one write.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Snapshot of a table's rows in write order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|t| t.value().clone())
            .unwrap_or_default()
    }

    /// Total write_batch invocations, including failed ones.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn write_batch(
        &self,
        table: &str,
        rows: &[Row],
    ) -> std::result::Result<BatchWriteResult, StoreError> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);

        let delay = self.write_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        // Consume one scripted transient failure if any remain
        let mut remaining = self.transient_failures.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.transient_failures.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    debug!(table = %table, rows = rows.len(), "Injected transient failure");
                    return Err(StoreError::Unavailable("injected outage".into()));
                }
                Err(current) => remaining = current,
            }
        }

        if self.rejected_tables.read().contains(table) {
            return Ok(BatchWriteResult {
                outcomes: rows
                    .iter()
                    .map(|_| RowOutcome::Rejected("schema mismatch".into()))
                    .collect(),
            });
        }

        let mut entry = self.tables.entry(table.to_string()).or_default();
        entry.extend_from_slice(rows);

        Ok(BatchWriteResult::all_applied(rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_row(n: usize) -> Row {
        Row::new(format!("key-{}", n), "cf", "cq", format!("value-{}", n))
    }

    #[tokio::test]
    async fn test_write_and_count() {
        let store = MemoryStore::new();
        let rows: Vec<Row> = (0..10).map(test_row).collect();

        let result = store.write_batch("t1", &rows).await.unwrap();
        assert_eq!(result.applied(), 10);
        assert_eq!(store.row_count("t1"), 10);
        assert_eq!(store.row_count("t2"), 0);
        assert_eq!(store.table_count(), 1);
    }

    #[tokio::test]
    async fn test_preserves_write_order() {
        let store = MemoryStore::new();
        let rows: Vec<Row> = (0..5).map(test_row).collect();
        store.write_batch("t1", &rows).await.unwrap();

        let stored = store.rows("t1");
        let keys: Vec<_> = stored.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, rows.iter().map(|r| r.key.clone()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_injected_transient_failures() {
        let store = MemoryStore::new();
        store.inject_transient_failures(2);

        let rows = vec![test_row(0)];
        assert!(matches!(
            store.write_batch("t1", &rows).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.write_batch("t1", &rows).await.is_err());
        // Third call succeeds
        assert!(store.write_batch("t1", &rows).await.is_ok());
        assert_eq!(store.row_count("t1"), 1);
        assert_eq!(store.write_calls(), 3);
    }

    #[tokio::test]
    async fn test_rejected_table() {
        let store = MemoryStore::new();
        store.reject_table("bad");

        let rows: Vec<Row> = (0..3).map(test_row).collect();
        let result = store.write_batch("bad", &rows).await.unwrap();
        assert_eq!(result.rejected(), 3);
        assert_eq!(result.applied(), 0);
        assert_eq!(store.row_count("bad"), 0);
    }
}
