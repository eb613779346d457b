//! Configuration structures for rowsink.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Write buffer configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Flush executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Write buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Rows per count-triggered seal, per table
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Age bound after which a non-empty buffer is sealed regardless of count
    #[serde(default = "default_max_buffer_age_ms")]
    pub max_buffer_age_ms: u64,

    /// Cadence of the background age check
    #[serde(default = "default_flush_tick_ms")]
    pub flush_tick_ms: u64,

    /// Per-table pending queue capacity
    #[serde(default = "default_table_queue_capacity")]
    pub table_queue_capacity: usize,

    /// Global cap on buffered-but-unflushed rows (backpressure boundary)
    #[serde(default = "default_max_buffered_rows")]
    pub max_buffered_rows: usize,
}

impl BufferConfig {
    /// Age threshold as a Duration.
    pub fn max_buffer_age(&self) -> Duration {
        Duration::from_millis(self.max_buffer_age_ms)
    }

    /// Tick interval as a Duration.
    pub fn flush_tick(&self) -> Duration {
        Duration::from_millis(self.flush_tick_ms)
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_buffer_age_ms: default_max_buffer_age_ms(),
            flush_tick_ms: default_flush_tick_ms(),
            table_queue_capacity: default_table_queue_capacity(),
            max_buffered_rows: default_max_buffered_rows(),
        }
    }
}

/// Flush executor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Number of long-lived flush workers
    #[serde(default = "default_core_workers")]
    pub core_workers: usize,

    /// Upper bound on workers spawned under submission pressure
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Flush task queue capacity (bounds memory when flushes lag)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum attempts per batch for transient failures
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Base delay for the first retry
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    /// Cap on the exponential backoff delay
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Overall deadline for one batch including all retries
    #[serde(default = "default_flush_deadline_ms")]
    pub flush_deadline_ms: u64,

    /// Consecutive failures before the store circuit opens
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// Wait before probing an open circuit
    #[serde(default = "default_circuit_reset_timeout_ms")]
    pub circuit_reset_timeout_ms: u64,
}

impl ExecutorConfig {
    /// Per-batch deadline as a Duration.
    pub fn flush_deadline(&self) -> Duration {
        Duration::from_millis(self.flush_deadline_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core_workers: default_core_workers(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            flush_deadline_ms: default_flush_deadline_ms(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_reset_timeout_ms: default_circuit_reset_timeout_ms(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Metrics HTTP port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Health check HTTP port
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            health_port: default_health_port(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_batch_size() -> usize {
    1000
}
fn default_max_buffer_age_ms() -> u64 {
    1000
}
fn default_flush_tick_ms() -> u64 {
    100
}
fn default_table_queue_capacity() -> usize {
    10_000
}
fn default_max_buffered_rows() -> usize {
    100_000
}
fn default_core_workers() -> usize {
    4
}
fn default_max_workers() -> usize {
    8
}
fn default_queue_capacity() -> usize {
    64
}
fn default_max_retry_attempts() -> u32 {
    5
}
fn default_retry_backoff_base_ms() -> u64 {
    100
}
fn default_retry_backoff_max_ms() -> u64 {
    10_000
}
fn default_flush_deadline_ms() -> u64 {
    60_000
}
fn default_circuit_failure_threshold() -> u32 {
    5
}
fn default_circuit_reset_timeout_ms() -> u64 {
    30_000
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_health_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Fails fast at startup, never at steady state.
    pub fn validate(&self) -> crate::Result<()> {
        if self.buffer.batch_size == 0 {
            return Err(crate::Error::Config("batch_size must be positive".into()));
        }

        if self.buffer.batch_size > self.buffer.table_queue_capacity {
            return Err(crate::Error::Config(format!(
                "batch_size ({}) exceeds table_queue_capacity ({})",
                self.buffer.batch_size, self.buffer.table_queue_capacity
            )));
        }

        if self.buffer.max_buffered_rows < self.buffer.batch_size {
            return Err(crate::Error::Config(format!(
                "max_buffered_rows ({}) is below batch_size ({})",
                self.buffer.max_buffered_rows, self.buffer.batch_size
            )));
        }

        if self.buffer.max_buffer_age_ms == 0 || self.buffer.flush_tick_ms == 0 {
            return Err(crate::Error::Config(
                "max_buffer_age_ms and flush_tick_ms must be positive".into(),
            ));
        }

        if self.executor.core_workers == 0 {
            return Err(crate::Error::Config("core_workers must be positive".into()));
        }

        if self.executor.max_workers < self.executor.core_workers {
            return Err(crate::Error::Config(format!(
                "max_workers ({}) is below core_workers ({})",
                self.executor.max_workers, self.executor.core_workers
            )));
        }

        if self.executor.queue_capacity == 0 {
            return Err(crate::Error::Config(
                "queue_capacity must be positive".into(),
            ));
        }

        if self.executor.max_retry_attempts == 0 {
            return Err(crate::Error::Config(
                "max_retry_attempts must be at least 1".into(),
            ));
        }

        if self.executor.retry_backoff_base_ms == 0 {
            return Err(crate::Error::Config(
                "retry_backoff_base_ms must be positive".into(),
            ));
        }

        Ok(())
    }
}
