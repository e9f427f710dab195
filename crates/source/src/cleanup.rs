//! Cleanup engine
//!
//! Deletes source rows that every archive destination has durably copied
//! and that have aged past the retention horizon. The deletion bound is
//! the safety floor: the minimum watermark across all real destinations.
//! A destination that has never archived anything pins the floor and
//! blocks deletion entirely.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use archiver_config::Config;
use archiver_storage::{ArchiveStatus, StatusStore, CLEANUP_ARCHIVER};

use crate::error::{Result, SourceError};
use crate::scheduler::too_soon;
use crate::source::Source;

/// Lowest retention the engine will honor, whatever the configuration says.
const MIN_RETENTION_DAYS: u32 = 3;

/// Source-table cleanup pass.
pub struct Cleanup {
    retention_days: u32,
    batch_size: usize,
    interval: Duration,
}

impl Cleanup {
    pub fn new(config: &Config, retention_days: u32) -> Self {
        Self {
            retention_days,
            batch_size: config.cleanup.batch_size,
            interval: config.cleanup.default_interval,
        }
    }

    /// Minimum wall-clock distance between cleanup passes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one bounded cleanup pass.
    ///
    /// `floor` is the safety floor computed from the current watermark
    /// list; `None` means some destination has not archived yet and
    /// nothing may be deleted. Returns the number of deleted rows.
    pub async fn run(
        &self,
        source: &Source,
        floor: Option<i64>,
        entry: &mut ArchiveStatus,
        store: &dyn StatusStore,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if let Some(next) = too_soon(entry.modified_on, self.interval) {
            debug!(next = %next, "not running cleaner until interval elapses");
            return Ok(0);
        }
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let mut days = self.retention_days;
        if days < MIN_RETENTION_DAYS {
            warn!(days, "retention days set too low, resetting to {MIN_RETENTION_DAYS}");
            days = MIN_RETENTION_DAYS;
        }

        let Some(floor) = floor else {
            info!("no safety floor yet, skipping cleanup");
            return Ok(0);
        };

        info!(table = %source.table(), floor, days, "running cleaner");
        let deleted = source.delete_before(days, floor, self.batch_size).await?;
        info!(deleted, "cleaned up rows");

        // Cleanup keeps time in modified_on; its watermark stays NULL.
        let modified = store.advance(CLEANUP_ARCHIVER, 0).await?;
        entry.apply_advance(0, modified);

        Ok(deleted)
    }
}

/// Minimum watermark across all real (non-cleanup) destinations.
///
/// `None` when there are no destinations, or when any destination has no
/// watermark yet; both cases must block deletion.
pub fn safety_floor(statuses: &[ArchiveStatus]) -> Option<i64> {
    let mut floor: Option<i64> = None;

    for status in statuses.iter().filter(|s| !s.is_cleanup()) {
        match status.log_score_id {
            None => return None,
            Some(id) => floor = Some(floor.map_or(id, |f| f.min(id))),
        }
    }

    floor
}

#[cfg(test)]
#[path = "cleanup_test.rs"]
mod cleanup_test;
