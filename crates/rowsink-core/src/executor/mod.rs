//! Bounded flush worker pool.

mod flush;
mod retry;

pub use flush::{BatchFailure, FlushExecutor};
pub use retry::RetryPolicy;
