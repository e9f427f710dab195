//! Sink contract
//!
//! Every archive destination answers the same three questions: how it
//! wants to be batched, how to store a batch, and how to release its
//! resources. The destinations are a closed set, so they are modeled as a
//! tagged variant rather than a trait hierarchy; the scheduler matches on
//! nothing but these three methods.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use archiver_config::Config;
use logscore::LogScore;

use crate::bigquery::BigQueryArchiver;
use crate::cleanup::CleanupSink;
use crate::clickhouse::ClickHouseArchiver;
use crate::error::{Result, StorageError};
use crate::fileavro::AvroArchiver;
use crate::gcsavro::GcsAvroArchiver;

/// Batching preferences a destination announces to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizing {
    /// Skip the destination this run when fewer candidate rows exist.
    pub min_size: usize,

    /// Fetch at most this many rows per batch.
    pub max_size: usize,

    /// Minimum wall-clock distance from the destination's last
    /// successful batch.
    pub interval: Duration,
}

/// One configured archive destination.
#[derive(Debug)]
pub enum Sink {
    FileAvro(AvroArchiver),
    GcsAvro(GcsAvroArchiver),
    BigQuery(BigQueryArchiver),
    ClickHouse(ClickHouseArchiver),
    Cleanup(CleanupSink),
}

impl Sink {
    /// Build the destination registered under `name`.
    ///
    /// Construction already validates backend configuration (paths,
    /// buckets, DSNs) and performs one-time setup such as the ClickHouse
    /// DDL.
    pub async fn by_name(
        name: &str,
        config: &Config,
        cancel: CancellationToken,
    ) -> Result<Self> {
        match name {
            "fileavro" => {
                if config.storage.avro_path.is_empty() {
                    return Err(StorageError::config("avro_path must be set"));
                }
                Ok(Self::FileAvro(AvroArchiver::new(
                    &config.storage.avro_path,
                    &config.batch,
                )?))
            }
            "gcsavro" => Ok(Self::GcsAvro(GcsAvroArchiver::new(config, cancel)?)),
            "bigquery" => Ok(Self::BigQuery(BigQueryArchiver::new(config, cancel).await?)),
            "clickhouse" => Ok(Self::ClickHouse(ClickHouseArchiver::new(config).await?)),
            "cleanup" => Ok(Self::Cleanup(CleanupSink::new(
                config.cleanup.fake_interval,
            ))),
            other => Err(StorageError::UnknownArchiver(other.to_string())),
        }
    }

    /// Destination kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileAvro(_) => "fileavro",
            Self::GcsAvro(_) => "gcsavro",
            Self::BigQuery(_) => "bigquery",
            Self::ClickHouse(_) => "clickhouse",
            Self::Cleanup(_) => "cleanup",
        }
    }

    /// Batching preferences for this destination.
    pub fn batch_sizing(&self) -> BatchSizing {
        match self {
            Self::FileAvro(a) => a.batch_sizing(),
            Self::GcsAvro(a) => a.batch_sizing(),
            Self::BigQuery(a) => a.batch_sizing(),
            Self::ClickHouse(a) => a.batch_sizing(),
            Self::Cleanup(a) => a.batch_sizing(),
        }
    }

    /// Durably commit a batch, all-or-nothing. Returns the number of
    /// records stored. On error no watermark may be advanced; retrying
    /// the same batch must be safe.
    pub async fn store(&mut self, batch: &[LogScore]) -> Result<usize> {
        match self {
            Self::FileAvro(a) => a.store(batch),
            Self::GcsAvro(a) => a.store(batch).await,
            Self::BigQuery(a) => a.store(batch).await,
            Self::ClickHouse(a) => a.store(batch).await,
            Self::Cleanup(a) => a.store(batch),
        }
    }

    /// Release per-destination resources. Called exactly once per run, on
    /// every exit path.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            Self::FileAvro(_) => Ok(()),
            Self::GcsAvro(a) => a.close().await,
            Self::BigQuery(a) => a.close().await,
            Self::ClickHouse(a) => a.close().await,
            Self::Cleanup(a) => a.close(),
        }
    }
}
