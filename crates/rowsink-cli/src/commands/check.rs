//! Configuration validation.

use anyhow::{bail, Result};
use rowsink_core::Config;
use std::path::PathBuf;

pub fn execute(path: &Option<PathBuf>) -> Result<()> {
    let Some(path) = path else {
        bail!("no configuration file given, pass one with --config");
    };

    let config = Config::from_file(path)?;

    println!("Configuration OK: {}", path.display());
    println!(
        "  buffer: batch_size={} max_buffer_age_ms={} max_buffered_rows={}",
        config.buffer.batch_size, config.buffer.max_buffer_age_ms, config.buffer.max_buffered_rows
    );
    println!(
        "  executor: core_workers={} max_workers={} queue_capacity={} max_retry_attempts={}",
        config.executor.core_workers,
        config.executor.max_workers,
        config.executor.queue_capacity,
        config.executor.max_retry_attempts
    );

    Ok(())
}
