//! Store client adapter boundary.
//!
//! The core never talks to the distributed store directly; it depends only on
//! the [`StoreClient`] capability: submit a batch of rows to a named table and
//! receive per-row outcomes. Connection pooling, cluster topology and table
//! administration live entirely behind this trait.

mod memory;

pub use memory::MemoryStore;

use crate::StoreError;
use async_trait::async_trait;
use bytes::Bytes;

/// An immutable write unit: row key, column family, qualifier and value as
/// byte sequences, with a timestamp assigned at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Row key
    pub key: Bytes,
    /// Column family
    pub family: Bytes,
    /// Column qualifier
    pub qualifier: Bytes,
    /// Cell value
    pub value: Bytes,
    /// Write timestamp (milliseconds since epoch)
    pub timestamp: i64,
}

impl Row {
    /// Create a row with the current wall-clock timestamp.
    pub fn new(
        key: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            key: key.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a row with an explicit timestamp.
    pub fn with_timestamp(
        key: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
        timestamp: i64,
    ) -> Self {
        Self {
            key: key.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
            timestamp,
        }
    }

    /// Estimated size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.family.len() + self.qualifier.len() + self.value.len() + 8
    }
}

/// Outcome of writing a single row within a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Row is durable in the store
    Applied,
    /// Row failed for a recoverable reason; the batch may be retried
    Transient(String),
    /// Row rejected by store-side validation; retrying cannot succeed
    Rejected(String),
}

impl RowOutcome {
    /// Whether this outcome counts as a durable write.
    pub fn is_applied(&self) -> bool {
        matches!(self, RowOutcome::Applied)
    }
}

/// Per-row result of a batch write.
#[derive(Debug, Clone)]
pub struct BatchWriteResult {
    /// One outcome per submitted row, in submission order
    pub outcomes: Vec<RowOutcome>,
}

impl BatchWriteResult {
    /// Result with every row applied.
    pub fn all_applied(rows: usize) -> Self {
        Self {
            outcomes: vec![RowOutcome::Applied; rows],
        }
    }

    /// Number of applied rows.
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    /// Whether any row reported a transient failure.
    pub fn has_transient(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, RowOutcome::Transient(_)))
    }

    /// Rows rejected permanently.
    pub fn rejected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RowOutcome::Rejected(_)))
            .count()
    }
}

/// Capability surface the flush executor consumes.
///
/// `Err(e)` with `e.is_transient()` means the whole request failed recoverably
/// (network, timeout); a permanent `Err` means the batch can never be applied.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Submit a batch of rows to `table`, preserving submission order.
    async fn write_batch(
        &self,
        table: &str,
        rows: &[Row],
    ) -> std::result::Result<BatchWriteResult, StoreError>;
}
