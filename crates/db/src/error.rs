//! Database layer errors

use thiserror::Error;

/// Result alias for database operations
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors from the source database layer
#[derive(Debug, Error)]
pub enum DbError {
    /// Driver-level error (connection, protocol, server)
    #[error("database error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// The configured DSN could not be parsed
    #[error("invalid database dsn: {0}")]
    Dsn(#[from] mysql_async::UrlError),

    /// Pool sizing configuration was inconsistent
    #[error("invalid pool constraints: idle {idle} > open {open}")]
    PoolConstraints { idle: usize, open: usize },
}
