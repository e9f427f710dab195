//! Watermark store
//!
//! The `log_scores_archive_status` table keeps one row per archive
//! destination with the last copied log score id and the time of the last
//! successful batch. Rows are provisioned by operators; the pipeline only
//! reads and advances them.
//!
//! Advancing happens after a sink has committed a batch and before the
//! next fetch, so a crash in between re-delivers exactly one batch
//! (at-least-once per destination).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mysql_async::prelude::*;
use tracing::debug;

use archiver_db::Pool;

use crate::error::{Result, StorageError};

/// Destination name the scheduler dispatches to the cleanup engine.
pub const CLEANUP_ARCHIVER: &str = "cleanup";

/// One row of the watermark table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStatus {
    /// Surrogate key
    pub id: i64,

    /// Destination name, unique per row
    pub archiver: String,

    /// Last archived log score id; `None` means nothing archived yet
    pub log_score_id: Option<i64>,

    /// Time of the last successful batch commit (or cleanup pass);
    /// `None` means the destination never ran
    pub modified_on: Option<DateTime<Utc>>,
}

impl ArchiveStatus {
    /// True when this entry drives the cleanup engine instead of a sink.
    pub fn is_cleanup(&self) -> bool {
        self.archiver == CLEANUP_ARCHIVER
    }

    /// Fold a committed advance into the in-memory copy.
    ///
    /// A `new_id` of zero mirrors the store-level `nullif` and clears the
    /// watermark (the cleanup entry uses `modified_on` as its clock).
    pub fn apply_advance(&mut self, new_id: i64, modified_on: DateTime<Utc>) {
        self.log_score_id = (new_id != 0).then_some(new_id);
        self.modified_on = Some(modified_on);
    }
}

/// Persistence seam for the watermark table.
///
/// The production implementation talks to the source database; tests use
/// an in-memory fake.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// All watermark rows, laggards first: ordered by
    /// `(log_score_id, modified_on)`. The scheduler processes entries in
    /// exactly this order.
    async fn list_all(&self) -> Result<Vec<ArchiveStatus>>;

    /// Record `new_id` as the last archived id for `archiver` and stamp
    /// `modified_on`. A `new_id` of zero writes a NULL watermark. Returns
    /// the committed `modified_on`.
    async fn advance(&self, archiver: &str, new_id: i64) -> Result<DateTime<Utc>>;
}

/// Watermark store backed by the source database.
pub struct MysqlStatusStore {
    pool: Pool,
}

impl MysqlStatusStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for MysqlStatusStore {
    async fn list_all(&self) -> Result<Vec<ArchiveStatus>> {
        let mut conn = self.pool.get_conn().await?;

        let rows: Vec<(i64, String, Option<i64>, Option<i64>)> = conn
            .query(
                "select id, archiver, log_score_id, UNIX_TIMESTAMP(modified_on) \
                 from log_scores_archive_status \
                 order by log_score_id, modified_on",
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, archiver, log_score_id, modified_on)| ArchiveStatus {
                id,
                archiver,
                log_score_id,
                modified_on: modified_on
                    .filter(|ts| *ts > 0)
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            })
            .collect())
    }

    async fn advance(&self, archiver: &str, new_id: i64) -> Result<DateTime<Utc>> {
        let mut conn = self.pool.get_conn().await?;

        conn.exec_drop(
            "update log_scores_archive_status \
             set log_score_id = nullif(?, 0), modified_on = now() \
             where archiver = ?",
            (new_id, archiver),
        )
        .await?;

        // Read the committed timestamp back so the in-memory copy matches
        // what the next run will see.
        let committed: Option<Option<i64>> = conn
            .exec_first(
                "select UNIX_TIMESTAMP(modified_on) \
                 from log_scores_archive_status where archiver = ?",
                (archiver,),
            )
            .await?;

        let modified_on = committed
            .ok_or_else(|| StorageError::StatusMissing(archiver.to_string()))?
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        debug!(archiver = %archiver, new_id, "advanced watermark");
        Ok(modified_on)
    }
}

#[cfg(test)]
#[path = "status_test.rs"]
mod status_test;
