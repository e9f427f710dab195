//! Source layer errors

use thiserror::Error;

/// Result alias for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors from the source adapter, scheduler and cleanup engine
#[derive(Debug, Error)]
pub enum SourceError {
    /// Table name is outside the allow-list
    #[error("invalid table name: {0}")]
    InvalidTable(String),

    /// Driver error from the source database
    #[error("database error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// Pool-level error
    #[error(transparent)]
    Db(#[from] archiver_db::DbError),

    /// Watermark store or sink error
    #[error(transparent)]
    Storage(#[from] archiver_storage::StorageError),

    /// A fetched row did not match the expected projection
    #[error("row scan error in column {column}: {message}")]
    Scan { column: usize, message: String },

    /// The `attributes` JSON column could not be decoded. Fatal for the
    /// batch: skipping the row would let the watermark pass over it.
    #[error("invalid attributes JSON: {0}")]
    Attributes(#[from] serde_json::Error),

    /// The run was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl SourceError {
    pub(crate) fn scan(column: usize, message: impl Into<String>) -> Self {
        Self::Scan {
            column,
            message: message.into(),
        }
    }
}
