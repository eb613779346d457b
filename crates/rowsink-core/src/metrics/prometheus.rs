//! Prometheus metrics export.

use prometheus::Registry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries in milliseconds for flush duration.
/// Converts to seconds: [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
const FLUSH_DURATION_BUCKETS_MS: [u64; 7] = [10, 25, 50, 100, 250, 500, 1000];

/// How a batch came to be sealed, for labeled metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SealKind {
    /// Count threshold reached
    Count,
    /// Age threshold reached
    Age,
    /// Shutdown drain
    Drain,
}

impl SealKind {
    /// Get the label value for Prometheus export.
    pub fn as_label(&self) -> &'static str {
        match self {
            SealKind::Count => "count",
            SealKind::Age => "age",
            SealKind::Drain => "drain",
        }
    }
}

/// Write-buffer metrics with counters, gauges, and a flush-duration histogram.
pub struct SinkMetrics {
    // === COUNTERS ===
    /// Rows accepted into a buffer
    rows_accepted_total: AtomicU64,

    /// Rows rejected by backpressure
    rows_rejected_total: AtomicU64,

    /// Batches sealed, by trigger
    seals_count: AtomicU64,
    seals_age: AtomicU64,
    seals_drain: AtomicU64,

    /// Successful batch flushes
    flushes_total: AtomicU64,

    /// Rows made durable in the store
    rows_flushed_total: AtomicU64,

    /// Retried flush attempts
    flush_retries_total: AtomicU64,

    /// Rows abandoned as permanently failed
    rows_failed_total: AtomicU64,

    /// Backpressure episodes
    backpressure_total: AtomicU64,

    // === GAUGES ===
    /// Rows currently buffered or in flight
    buffered_rows: AtomicU64,

    /// Tables with an open buffer
    open_tables: AtomicU64,

    // === HISTOGRAM: flush_duration_seconds ===
    flush_duration_sum_ms: AtomicU64,
    flush_duration_count: AtomicU64,
    flush_duration_buckets: [AtomicU64; 8],

    /// Prometheus registry (optional)
    #[allow(dead_code)]
    registry: Option<Registry>,
}

impl SinkMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            rows_accepted_total: AtomicU64::new(0),
            rows_rejected_total: AtomicU64::new(0),
            seals_count: AtomicU64::new(0),
            seals_age: AtomicU64::new(0),
            seals_drain: AtomicU64::new(0),
            flushes_total: AtomicU64::new(0),
            rows_flushed_total: AtomicU64::new(0),
            flush_retries_total: AtomicU64::new(0),
            rows_failed_total: AtomicU64::new(0),
            backpressure_total: AtomicU64::new(0),
            buffered_rows: AtomicU64::new(0),
            open_tables: AtomicU64::new(0),
            flush_duration_sum_ms: AtomicU64::new(0),
            flush_duration_count: AtomicU64::new(0),
            flush_duration_buckets: Default::default(),
            registry: None,
        }
    }

    /// Create metrics with a Prometheus registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new()
        }
    }

    // === COUNTER RECORDING ===

    /// Record an accepted row.
    pub fn record_accepted(&self) {
        self.rows_accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected row.
    pub fn record_rejected(&self) {
        self.rows_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sealed batch with its trigger.
    pub fn record_seal(&self, kind: SealKind) {
        match kind {
            SealKind::Count => self.seals_count.fetch_add(1, Ordering::Relaxed),
            SealKind::Age => self.seals_age.fetch_add(1, Ordering::Relaxed),
            SealKind::Drain => self.seals_drain.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Record a successful flush with duration histogram.
    pub fn record_flush(&self, rows: usize, duration: Duration) {
        self.flushes_total.fetch_add(1, Ordering::Relaxed);
        self.rows_flushed_total
            .fetch_add(rows as u64, Ordering::Relaxed);

        let duration_ms = duration.as_millis() as u64;
        self.flush_duration_sum_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.flush_duration_count.fetch_add(1, Ordering::Relaxed);

        // Buckets are cumulative (le = less than or equal)
        for (i, &bucket_ms) in FLUSH_DURATION_BUCKETS_MS.iter().enumerate() {
            if duration_ms <= bucket_ms {
                self.flush_duration_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        // +Inf bucket always gets incremented
        self.flush_duration_buckets[7].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retried flush attempt.
    pub fn record_retry(&self) {
        self.flush_retries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record permanently failed rows.
    pub fn record_failed_rows(&self, rows: usize) {
        self.rows_failed_total
            .fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Record a backpressure episode.
    pub fn record_backpressure(&self) {
        self.backpressure_total.fetch_add(1, Ordering::Relaxed);
    }

    // === GAUGE UPDATES ===

    /// Update the buffered-row gauge.
    pub fn set_buffered_rows(&self, rows: u64) {
        self.buffered_rows.store(rows, Ordering::Relaxed);
    }

    /// Update the open-table gauge.
    pub fn set_open_tables(&self, tables: u64) {
        self.open_tables.store(tables, Ordering::Relaxed);
    }

    // === GETTERS ===

    /// Get accepted row count.
    pub fn rows_accepted_total(&self) -> u64 {
        self.rows_accepted_total.load(Ordering::Relaxed)
    }

    /// Get rejected row count.
    pub fn rows_rejected_total(&self) -> u64 {
        self.rows_rejected_total.load(Ordering::Relaxed)
    }

    /// Get seal count by trigger.
    pub fn seals_by_kind(&self, kind: SealKind) -> u64 {
        match kind {
            SealKind::Count => self.seals_count.load(Ordering::Relaxed),
            SealKind::Age => self.seals_age.load(Ordering::Relaxed),
            SealKind::Drain => self.seals_drain.load(Ordering::Relaxed),
        }
    }

    /// Get total flushes.
    pub fn flushes_total(&self) -> u64 {
        self.flushes_total.load(Ordering::Relaxed)
    }

    /// Get total rows flushed.
    pub fn rows_flushed_total(&self) -> u64 {
        self.rows_flushed_total.load(Ordering::Relaxed)
    }

    /// Get total retried attempts.
    pub fn flush_retries_total(&self) -> u64 {
        self.flush_retries_total.load(Ordering::Relaxed)
    }

    /// Get total permanently failed rows.
    pub fn rows_failed_total(&self) -> u64 {
        self.rows_failed_total.load(Ordering::Relaxed)
    }

    /// Get total backpressure episodes.
    pub fn backpressure_total(&self) -> u64 {
        self.backpressure_total.load(Ordering::Relaxed)
    }

    /// Get the buffered-row gauge.
    pub fn buffered_rows(&self) -> u64 {
        self.buffered_rows.load(Ordering::Relaxed)
    }

    /// Get the open-table gauge.
    pub fn open_tables(&self) -> u64 {
        self.open_tables.load(Ordering::Relaxed)
    }

    /// Get flush duration histogram data for Prometheus export.
    pub fn flush_duration_histogram(&self) -> FlushDurationHistogram {
        FlushDurationHistogram {
            sum_seconds: self.flush_duration_sum_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            count: self.flush_duration_count.load(Ordering::Relaxed),
            buckets: [
                (0.01, self.flush_duration_buckets[0].load(Ordering::Relaxed)),
                (0.025, self.flush_duration_buckets[1].load(Ordering::Relaxed)),
                (0.05, self.flush_duration_buckets[2].load(Ordering::Relaxed)),
                (0.1, self.flush_duration_buckets[3].load(Ordering::Relaxed)),
                (0.25, self.flush_duration_buckets[4].load(Ordering::Relaxed)),
                (0.5, self.flush_duration_buckets[5].load(Ordering::Relaxed)),
                (1.0, self.flush_duration_buckets[6].load(Ordering::Relaxed)),
            ],
            inf_bucket: self.flush_duration_buckets[7].load(Ordering::Relaxed),
        }
    }

    /// Export all metrics in Prometheus text format with the default prefix.
    pub fn export_prometheus_text(&self) -> String {
        self.export_prometheus_text_with_prefix("rowsink")
    }

    /// Export metrics in Prometheus text format with a custom prefix.
    pub fn export_prometheus_text_with_prefix(&self, prefix: &str) -> String {
        let mut output = String::with_capacity(4096);

        // === COUNTERS ===

        output.push_str(&format!(
            "# HELP {}_rows_accepted_total Rows accepted into a buffer\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_rows_accepted_total counter\n", prefix));
        output.push_str(&format!(
            "{}_rows_accepted_total {}\n",
            prefix,
            self.rows_accepted_total()
        ));
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_rows_rejected_total Rows rejected by backpressure\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_rows_rejected_total counter\n", prefix));
        output.push_str(&format!(
            "{}_rows_rejected_total {}\n",
            prefix,
            self.rows_rejected_total()
        ));
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_seals Batches sealed by trigger\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_seals counter\n", prefix));
        for kind in [SealKind::Count, SealKind::Age, SealKind::Drain] {
            output.push_str(&format!(
                "{}_seals{{trigger=\"{}\"}} {}\n",
                prefix,
                kind.as_label(),
                self.seals_by_kind(kind)
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_flushes_total Successful batch flushes\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_flushes_total counter\n", prefix));
        output.push_str(&format!(
            "{}_flushes_total {}\n",
            prefix,
            self.flushes_total()
        ));
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_rows_flushed_total Rows made durable in the store\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_rows_flushed_total counter\n", prefix));
        output.push_str(&format!(
            "{}_rows_flushed_total {}\n",
            prefix,
            self.rows_flushed_total()
        ));
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_flush_retries_total Retried flush attempts\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_flush_retries_total counter\n", prefix));
        output.push_str(&format!(
            "{}_flush_retries_total {}\n",
            prefix,
            self.flush_retries_total()
        ));
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_rows_failed_total Rows abandoned as permanently failed\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_rows_failed_total counter\n", prefix));
        output.push_str(&format!(
            "{}_rows_failed_total {}\n",
            prefix,
            self.rows_failed_total()
        ));
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_backpressure_total Backpressure episodes\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_backpressure_total counter\n", prefix));
        output.push_str(&format!(
            "{}_backpressure_total {}\n",
            prefix,
            self.backpressure_total()
        ));
        output.push('\n');

        // === GAUGES ===

        output.push_str(&format!(
            "# HELP {}_buffered_rows Rows currently buffered or in flight\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_buffered_rows gauge\n", prefix));
        output.push_str(&format!(
            "{}_buffered_rows {}\n",
            prefix,
            self.buffered_rows()
        ));
        output.push('\n');

        output.push_str(&format!(
            "# HELP {}_open_tables Tables with an open buffer\n",
            prefix
        ));
        output.push_str(&format!("# TYPE {}_open_tables gauge\n", prefix));
        output.push_str(&format!("{}_open_tables {}\n", prefix, self.open_tables()));
        output.push('\n');

        // === HISTOGRAM: flush_duration_seconds ===

        let hist = self.flush_duration_histogram();

        output.push_str(&format!(
            "# HELP {}_flush_duration_seconds Duration of batch flush operations\n",
            prefix
        ));
        output.push_str(&format!(
            "# TYPE {}_flush_duration_seconds histogram\n",
            prefix
        ));

        for (le, count) in &hist.buckets {
            output.push_str(&format!(
                "{}_flush_duration_seconds_bucket{{le=\"{}\"}} {}\n",
                prefix, le, count
            ));
        }
        output.push_str(&format!(
            "{}_flush_duration_seconds_bucket{{le=\"+Inf\"}} {}\n",
            prefix, hist.inf_bucket
        ));
        output.push_str(&format!(
            "{}_flush_duration_seconds_sum {}\n",
            prefix, hist.sum_seconds
        ));
        output.push_str(&format!(
            "{}_flush_duration_seconds_count {}\n",
            prefix, hist.count
        ));

        output
    }
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Flush duration histogram data for export.
#[derive(Debug, Clone)]
pub struct FlushDurationHistogram {
    /// Sum of all observations in seconds
    pub sum_seconds: f64,
    /// Total count of observations
    pub count: u64,
    /// Bucket counts: (le_boundary_seconds, count)
    pub buckets: [(f64, u64); 7],
    /// +Inf bucket count
    pub inf_bucket: u64,
}
