//! Cleanup pseudo-sink
//!
//! The cleanup engine lives in the source crate, but it is scheduled like
//! the real destinations: its presence in the watermark table is what
//! drives it. This sink carries no storage; the scheduler recognizes the
//! `cleanup` name and dispatches to the engine instead of calling
//! [`CleanupSink::store`].

use std::time::Duration;

use logscore::LogScore;

use crate::error::{Result, StorageError};
use crate::sink::BatchSizing;

/// Placeholder destination behind the `cleanup` watermark entry.
#[derive(Debug)]
pub struct CleanupSink {
    interval: Duration,
}

impl CleanupSink {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Sizing is nominal; the engine applies its own interval policy.
    pub fn batch_sizing(&self) -> BatchSizing {
        BatchSizing {
            min_size: 0,
            max_size: 0,
            interval: self.interval,
        }
    }

    /// Always fails: records never flow into the cleanup entry.
    pub fn store(&mut self, _batch: &[LogScore]) -> Result<usize> {
        Err(StorageError::CleanupStore)
    }

    pub fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
