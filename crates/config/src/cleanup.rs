//! Cleanup engine configuration

use serde::Deserialize;
use std::time::Duration;

/// Settings for the source-table cleanup engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Minimum interval between cleanup runs
    /// Default: 4m
    #[serde(with = "humantime_serde")]
    pub default_interval: Duration,

    /// Rows deleted per cleanup pass
    /// Default: 200_000
    pub batch_size: usize,

    /// Shorter interval after a full delete batch. Currently unused: the
    /// full-batch counter does not survive the process, so a one-shot run
    /// can never observe it.
    /// Default: 1m
    #[serde(with = "humantime_serde")]
    pub reduced_interval: Duration,

    /// Interval reported by the cleanup pseudo-sink's sizing
    /// Default: 10m
    #[serde(with = "humantime_serde")]
    pub fake_interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(4 * 60),
            batch_size: 200_000,
            reduced_interval: Duration::from_secs(60),
            fake_interval: Duration::from_secs(10 * 60),
        }
    }
}
