//! ClickHouse destination
//!
//! Bulk inserts batches into a `log_scores` MergeTree table, creating the
//! table on first use. One buffered insert per batch: rows are streamed
//! with `write` and committed by `end`; dropping the insert without `end`
//! abandons the whole batch, so a failed batch leaves no partial state.

use clickhouse::insert::Insert;
use clickhouse::{Client, Row};
use serde::Serialize;
use tracing::{debug, info};

use archiver_config::Config;
use logscore::LogScore;

use crate::error::{Result, StorageError};
use crate::sink::BatchSizing;

/// Table DDL, partitioned by day and ordered for per-server range scans.
const LOG_SCORES_DDL: &str = "\
CREATE TABLE IF NOT EXISTS log_scores (
    dt          Date,
    id          UInt64,
    monitor_id  UInt32,
    server_id   UInt32,
    ts          DateTime,
    score       Float32,
    step        Float32,
    offset      Nullable(Float64),
    rtt         Nullable(UInt32),
    leap        Nullable(UInt8),
    error       Nullable(String)
) engine=MergeTree
PARTITION BY dt
ORDER BY (server_id, ts)";

/// One row of the ClickHouse `log_scores` table.
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
pub struct ScoreRow {
    /// Partition key: day of the measurement (days since epoch)
    pub dt: u16,
    pub id: u64,
    pub monitor_id: u32,
    pub server_id: u32,
    /// Measurement time (seconds since epoch)
    pub ts: u32,
    pub score: f32,
    pub step: f32,
    pub offset: Option<f64>,
    pub rtt: Option<u32>,
    pub leap: Option<u8>,
    pub error: Option<String>,
}

impl From<&LogScore> for ScoreRow {
    fn from(ls: &LogScore) -> Self {
        Self {
            dt: ls.ts.div_euclid(86_400).clamp(0, u16::MAX as i64) as u16,
            id: ls.id as u64,
            monitor_id: ls.monitor_id as u32,
            server_id: ls.server_id as u32,
            ts: ls.ts.clamp(0, u32::MAX as i64) as u32,
            score: ls.score as f32,
            step: ls.step as f32,
            offset: ls.offset,
            rtt: ls.rtt.map(|v| v as u32),
            leap: (ls.meta.leap != 0).then_some(ls.meta.leap as u8),
            error: (!ls.meta.error.is_empty()).then(|| ls.meta.error.clone()),
        }
    }
}

/// Archiver bulk-inserting into ClickHouse.
pub struct ClickHouseArchiver {
    client: Client,
    sizing: BatchSizing,
}

impl std::fmt::Debug for ClickHouseArchiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseArchiver")
            .field("sizing", &self.sizing)
            .finish()
    }
}

impl ClickHouseArchiver {
    /// Connect and make sure the destination table exists.
    pub async fn new(config: &Config) -> Result<Self> {
        let dsn = config.storage.ch_dsn.clone();
        if dsn.is_empty() {
            return Err(StorageError::config("ch_dsn must be set"));
        }

        let client = Client::default()
            .with_url(dsn)
            .with_database(&config.storage.ch_database);

        client.query(LOG_SCORES_DDL).execute().await?;

        Ok(Self {
            client,
            sizing: BatchSizing {
                min_size: config.batch.ch_min_size,
                max_size: config.batch.ch_max_size,
                interval: config.batch.ch_interval,
            },
        })
    }

    pub fn batch_sizing(&self) -> BatchSizing {
        self.sizing
    }

    pub async fn store(&mut self, batch: &[LogScore]) -> Result<usize> {
        let mut insert: Insert<ScoreRow> = self.client.insert("log_scores")?;

        for ls in batch {
            insert.write(&ScoreRow::from(ls)).await?;
        }
        insert.end().await?;

        debug!(count = batch.len(), "inserted rows");
        Ok(batch.len())
    }

    pub async fn close(&mut self) -> Result<()> {
        // The HTTP client holds no connection state worth tearing down.
        info!("clickhouse archiver closed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "clickhouse_test.rs"]
mod clickhouse_test;
