//! Source database access for the archiver
//!
//! Provides the shared connection [`Pool`] and the run [`Lease`] that
//! serializes archiver instances per database.

mod error;
mod lease;
mod pool;

pub use error::{DbError, Result};
pub use lease::Lease;
pub use pool::{connect, disconnect, ping};

// Re-exported so dependents name one driver type consistently.
pub use mysql_async::Pool;
