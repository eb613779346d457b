//! Write buffering: per-table accumulation and the process-wide manager.

mod batch;
mod manager;
mod table_buffer;

pub use batch::Batch;
pub use manager::WriteBuffer;
pub use table_buffer::{AppendOutcome, TableBuffer};
