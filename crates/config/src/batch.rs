//! Batch sizing configuration per archive destination
//!
//! `min_size` gates whether a destination runs at all this pass,
//! `max_size` bounds a single fetch, `interval` is the minimum wall-clock
//! distance from the destination's last successful batch.

use serde::Deserialize;
use std::time::Duration;

/// Per-backend batch sizing knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// BigQuery minimum batch size
    /// Default: 200
    pub bq_min_size: usize,

    /// BigQuery maximum batch size
    /// Default: 10_000_000
    pub bq_max_size: usize,

    /// BigQuery minimum interval between batches; keeps the pipeline well
    /// under per-table daily load-job quotas
    /// Default: 10m
    #[serde(with = "humantime_serde")]
    pub bq_interval: Duration,

    /// ClickHouse minimum batch size
    /// Default: 50
    pub ch_min_size: usize,

    /// ClickHouse maximum batch size
    /// Default: 500_000
    pub ch_max_size: usize,

    /// ClickHouse minimum interval between batches
    /// Default: 0s
    #[serde(with = "humantime_serde")]
    pub ch_interval: Duration,

    /// File Avro minimum batch size
    /// Default: 500_000
    pub avro_min_size: usize,

    /// File Avro maximum batch size
    /// Default: 10_000_000
    pub avro_max_size: usize,

    /// File Avro minimum interval between batches
    /// Default: 24h
    #[serde(with = "humantime_serde")]
    pub avro_interval: Duration,

    /// Records buffered per Avro block append
    /// Default: 50_000
    pub avro_append_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            bq_min_size: 200,
            bq_max_size: 10_000_000,
            bq_interval: Duration::from_secs(10 * 60),
            ch_min_size: 50,
            ch_max_size: 500_000,
            ch_interval: Duration::ZERO,
            avro_min_size: 500_000,
            avro_max_size: 10_000_000,
            avro_interval: Duration::from_secs(24 * 60 * 60),
            avro_append_size: 50_000,
        }
    }
}
