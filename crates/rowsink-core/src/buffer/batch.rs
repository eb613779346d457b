//! Sealed batches.

use crate::metrics::SealKind;
use crate::store::Row;
use std::time::Instant;
use uuid::Uuid;

/// An immutable snapshot of rows lifted out of a table buffer at seal time.
///
/// Owned by exactly one flush task after sealing; never mutated.
#[derive(Debug)]
pub struct Batch {
    id: Uuid,
    table: String,
    seq: u64,
    reason: SealKind,
    rows: Vec<Row>,
    sealed_at: Instant,
}

impl Batch {
    /// Seal a batch. `seq` is the table's flush sequence number; the executor
    /// flushes a table's batches strictly in sequence order.
    pub(crate) fn new(table: &str, seq: u64, reason: SealKind, rows: Vec<Row>) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.to_string(),
            seq,
            reason,
            rows,
            sealed_at: Instant::now(),
        }
    }

    /// Unique batch identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Target table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Per-table flush sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// What triggered the seal.
    pub fn reason(&self) -> SealKind {
        self.reason
    }

    /// Rows in append order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Estimated payload size.
    pub fn size_bytes(&self) -> usize {
        self.rows.iter().map(|r| r.size_bytes()).sum()
    }

    /// Time since sealing.
    pub fn age(&self) -> std::time::Duration {
        self.sealed_at.elapsed()
    }
}
