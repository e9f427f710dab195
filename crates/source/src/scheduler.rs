//! Per-destination archive loop
//!
//! For one watermark entry: gate on the destination's interval, size the
//! backlog, then fetch → store → advance until the backlog drops below the
//! destination's minimum. The watermark only moves after a successful
//! store, so a crash between the two re-delivers one batch on the next run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use archiver_config::Config;
use archiver_storage::{ArchiveStatus, BatchSizing, Sink, StatusStore};
use logscore::LogScore;

use crate::error::{Result, SourceError};
use crate::source::Source;

/// Record supply side of the archive loop.
///
/// Implemented by [`Source`]; tests drive the loop from an in-memory
/// vector instead.
#[async_trait]
pub trait RecordSource: Send {
    /// Detect optional columns before the first fetch.
    async fn detect_schema(&mut self) -> Result<()> {
        Ok(())
    }

    /// Rows with `id` strictly greater than the watermark.
    async fn count_after(&mut self, id: Option<i64>) -> Result<usize>;

    /// Up to `limit` rows after `last_id`, ascending by `id`.
    async fn fetch_after(&mut self, last_id: i64, limit: usize) -> Result<Vec<LogScore>>;
}

#[async_trait]
impl RecordSource for Source {
    async fn detect_schema(&mut self) -> Result<()> {
        self.has_field("attributes").await?;
        self.has_field("rtt").await?;
        Ok(())
    }

    async fn count_after(&mut self, id: Option<i64>) -> Result<usize> {
        Source::count_after(self, id).await
    }

    async fn fetch_after(&mut self, last_id: i64, limit: usize) -> Result<Vec<LogScore>> {
        Source::fetch_after(self, last_id, limit).await
    }
}

/// Store side of the archive loop, the subset of the sink contract the
/// batch loop needs.
#[async_trait]
pub trait Destination: Send {
    fn batch_sizing(&self) -> BatchSizing;

    async fn store(&mut self, batch: &[LogScore]) -> archiver_storage::Result<usize>;
}

#[async_trait]
impl Destination for Sink {
    fn batch_sizing(&self) -> BatchSizing {
        Sink::batch_sizing(self)
    }

    async fn store(&mut self, batch: &[LogScore]) -> archiver_storage::Result<usize> {
        Sink::store(self, batch).await
    }
}

impl Source {
    /// Archive everything pending for one destination.
    ///
    /// Builds the sink named by the watermark entry, runs the batch loop,
    /// and closes the sink on every exit path. Errors abort only this
    /// destination; the caller continues with the rest.
    pub async fn process(
        &mut self,
        status: &mut ArchiveStatus,
        store: &dyn StatusStore,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut sink = Sink::by_name(&status.archiver, config, cancel.clone()).await?;
        debug!(archiver = %status.archiver, kind = sink.kind(), "processing");

        let result = archive_destination(self, &mut sink, status, store, cancel).await;

        if let Err(e) = sink.close().await {
            warn!(archiver = %status.archiver, error = %e, "error closing archiver");
        }
        result
    }
}

/// The batch loop itself, generic so tests can substitute in-memory fakes
/// for the source, the sink and the watermark store.
pub async fn archive_destination<S, D>(
    source: &mut S,
    sink: &mut D,
    status: &mut ArchiveStatus,
    store: &dyn StatusStore,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: RecordSource,
    D: Destination,
{
    let sizing = sink.batch_sizing();

    if let Some(next) = too_soon(status.modified_on, sizing.interval) {
        debug!(archiver = %status.archiver, next = %next, "interval not elapsed, skipping");
        return Ok(());
    }

    source.detect_schema().await?;

    let watermark = status.log_score_id.filter(|id| *id > 0);
    let mut last_id = watermark.unwrap_or(0);
    let mut backlog = source.count_after(watermark).await?;

    if backlog < sizing.min_size {
        debug!(
            archiver = %status.archiver,
            count = backlog,
            min_size = sizing.min_size,
            "too few entries available"
        );
        return Ok(());
    }
    if backlog > sizing.max_size {
        info!(count = backlog, max = sizing.max_size, "has more than max rows");
    }

    while backlog > sizing.min_size {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let batch = source.fetch_after(last_id, sizing.max_size).await?;
        let Some(last) = batch.last() else {
            // backlog said there was more; re-count next run
            warn!(archiver = %status.archiver, "no log scores to process");
            return Ok(());
        };
        let new_last = last.id;

        let stored = sink.store(&batch).await?;
        info!(archiver = %status.archiver, count = stored, "saved scores");

        let modified = store.advance(&status.archiver, new_last).await?;
        status.apply_advance(new_last, modified);

        last_id = new_last;
        backlog = backlog.saturating_sub(batch.len());
    }

    Ok(())
}

/// When `last + interval` is still in the future, return that next
/// eligible time; `None` means the destination may run now. An entry that
/// never ran is always eligible.
pub fn too_soon(last: Option<DateTime<Utc>>, interval: Duration) -> Option<DateTime<Utc>> {
    let last = last?;
    let interval = chrono::Duration::from_std(interval).ok()?;
    let next = last + interval;
    (Utc::now() < next).then_some(next)
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;
