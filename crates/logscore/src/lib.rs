//! Log score record model
//!
//! A `LogScore` is one monitoring measurement row from the `log_scores`
//! table. Records are immutable once read from the source; every archive
//! destination receives the same representation.
//!
//! The JSON form uses short field names (`sid`, `mid`, `sc`, `st`, `of`)
//! to keep serialized batches compact.

use serde::{Deserialize, Serialize};

/// One monitoring measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogScore {
    /// Primary key in the source table, monotonically increasing.
    pub id: i64,

    /// Server the measurement is about.
    #[serde(rename = "sid")]
    pub server_id: i64,

    /// Monitor that took the measurement; 0 when the source column is NULL.
    #[serde(rename = "mid")]
    pub monitor_id: i64,

    /// Measurement time, Unix epoch seconds in UTC.
    pub ts: i64,

    /// Score assigned to the server at `ts`.
    #[serde(rename = "sc")]
    pub score: f64,

    /// Score delta applied by this measurement.
    #[serde(rename = "st")]
    pub step: f64,

    /// Clock offset in seconds, when the monitor reported one.
    #[serde(rename = "of", skip_serializing_if = "Option::is_none", default)]
    pub offset: Option<f64>,

    /// Round-trip time in microseconds; only populated when the source
    /// table carries the column.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rtt: Option<i64>,

    /// Extra measurement metadata from the `attributes` JSON column.
    #[serde(
        rename = "attributes",
        skip_serializing_if = "LogScoreMeta::is_empty",
        default
    )]
    pub meta: LogScoreMeta,
}

/// Metadata stored in the source's `attributes` JSON column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogScoreMeta {
    /// NTP leap indicator; 0 means none was reported.
    #[serde(skip_serializing_if = "is_zero", default)]
    pub leap: i64,

    /// Error message from the monitor; empty means none.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error: String,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl LogScoreMeta {
    /// True when no metadata was reported.
    pub fn is_empty(&self) -> bool {
        self.leap == 0 && self.error.is_empty()
    }
}

impl LogScore {
    /// Serialize to JSON plus a trailing newline (JSONL form).
    pub fn json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut b = serde_json::to_vec(self)?;
        b.push(b'\n');
        Ok(b)
    }
}
