//! Archive destinations and watermark store
//!
//! Everything downstream of a fetched batch lives here: the per-destination
//! watermark bookkeeping (`status`), the uniform sink contract (`sink`),
//! and one module per destination.
//!
//! # Destinations
//!
//! | Name | Target |
//! |------|--------|
//! | `fileavro` | Avro object container files on local disk |
//! | `gcsavro` | Avro blobs in cloud object storage |
//! | `bigquery` | Warehouse load jobs (Avro staged through the bucket) |
//! | `clickhouse` | `log_scores` MergeTree table |
//! | `cleanup` | pseudo-sink scheduling the source cleanup engine |

mod bigquery;
mod cleanup;
mod clickhouse;
mod error;
mod fileavro;
mod gcsavro;
mod sink;
mod status;

pub use bigquery::BigQueryArchiver;
pub use cleanup::CleanupSink;
pub use crate::clickhouse::{ClickHouseArchiver, ScoreRow};
pub use error::{Result, StorageError};
pub use fileavro::AvroArchiver;
pub use gcsavro::GcsAvroArchiver;
pub use sink::{BatchSizing, Sink};
pub use status::{ArchiveStatus, MysqlStatusStore, StatusStore, CLEANUP_ARCHIVER};
