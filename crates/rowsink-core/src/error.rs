//! Error types for the rowsink core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use thiserror::Error;

/// Result type alias for rowsink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for rowsink.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Buffer-related error
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Store-related error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Buffer-specific errors.
///
/// All variants map to the `put() == false` backpressure signal; producers
/// never see these directly.
#[derive(Error, Debug)]
pub enum BufferError {
    /// Global buffered-row capacity reached
    #[error("Capacity exceeded: {buffered} rows buffered, capacity {capacity}")]
    CapacityExceeded { buffered: usize, capacity: usize },

    /// Per-table pending queue is full
    #[error("Table queue full for {table}: capacity {capacity}")]
    TableQueueFull { table: String, capacity: usize },

    /// Manager is shutting down, no new rows accepted
    #[error("Buffer is shutting down")]
    ShuttingDown,
}

/// Store-side errors, classified into transient and permanent.
///
/// Transient errors are retried by the flush executor with backoff; permanent
/// errors abandon the batch and surface through the failure channel.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Store temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Request timed out
    #[error("Store timeout: {0}")]
    Timeout(String),

    /// Row rejected by store-side validation
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Target table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),
}

impl StoreError {
    /// Whether the flush executor should retry the batch.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let buf_err = BufferError::CapacityExceeded {
            buffered: 1000,
            capacity: 1000,
        };
        let err: Error = buf_err.into();
        assert!(err.to_string().contains("Capacity exceeded"));
    }

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::Unavailable("region offline".into()).is_transient());
        assert!(StoreError::Timeout("rpc deadline".into()).is_transient());
        assert!(!StoreError::InvalidRow("empty key".into()).is_transient());
        assert!(!StoreError::TableNotFound("orders".into()).is_transient());
    }

    #[test]
    fn test_table_queue_full_display() {
        let err = BufferError::TableQueueFull {
            table: "events".into(),
            capacity: 5000,
        };
        assert_eq!(
            err.to_string(),
            "Table queue full for events: capacity 5000"
        );
    }
}
