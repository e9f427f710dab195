//! Storage layer errors

use thiserror::Error;

/// Result alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors from the watermark store and the archive destinations
#[derive(Debug, Error)]
pub enum StorageError {
    /// A destination was selected but its configuration is missing
    #[error("configuration error: {0}")]
    Config(String),

    /// No destination is registered under this name
    #[error("unknown archiver '{0}'")]
    UnknownArchiver(String),

    /// No watermark row is provisioned for this archiver
    #[error("no archive status entry for '{0}'")]
    StatusMissing(String),

    /// Source-database layer error
    #[error(transparent)]
    Db(#[from] archiver_db::DbError),

    /// Driver error from the watermark table
    #[error("database error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Avro schema or encoding error
    #[error("avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    /// Object storage error
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// ClickHouse client error
    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    /// BigQuery client error
    #[error("bigquery error: {0}")]
    BigQuery(#[from] gcp_bigquery_client::error::BQError),

    /// A warehouse load job terminated unsuccessfully
    #[error("load job failed: {0}")]
    LoadJob(String),

    /// The cleanup pseudo-sink cannot store data
    #[error("cleanup archiver cannot store data")]
    CleanupStore,

    /// The run was cancelled mid-operation
    #[error("operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
