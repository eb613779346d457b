//! Sink metrics with Prometheus text exposition.

mod prometheus;

pub use prometheus::{FlushDurationHistogram, SealKind, SinkMetrics};
