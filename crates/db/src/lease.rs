//! Run lease
//!
//! A named, non-blocking server-side lock (`GET_LOCK` with timeout 0) that
//! keeps two archiver instances from working the same database at once.
//! The lock is scoped to the connection holding it, so the lease pins its
//! connection for its whole lifetime; losing the connection releases the
//! lock on the server.

use mysql_async::prelude::*;
use mysql_async::{Conn, Pool};
use tracing::{debug, warn};

use crate::error::Result;

/// A held run lease.
///
/// Dropping the lease without [`Lease::release`] leaves the lock to die
/// with the connection, which is what happens on process exit anyway.
pub struct Lease {
    conn: Conn,
    name: String,
}

impl Lease {
    /// Try to acquire the named lease without blocking.
    ///
    /// Returns `Ok(None)` when another instance holds it.
    pub async fn acquire(pool: &Pool, name: &str) -> Result<Option<Self>> {
        let mut conn = pool.get_conn().await?;

        let locked: Option<Option<i64>> = conn
            .exec_first("SELECT GET_LOCK(?, 0)", (name,))
            .await?;

        match locked.flatten() {
            Some(1) => {
                debug!(lock = %name, "acquired run lease");
                Ok(Some(Self {
                    conn,
                    name: name.to_string(),
                }))
            }
            other => {
                debug!(lock = %name, result = ?other, "lease held elsewhere");
                Ok(None)
            }
        }
    }

    /// Name of the held lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicitly release the lock on the server.
    pub async fn release(mut self) {
        if let Err(e) = self
            .conn
            .exec_drop("SELECT RELEASE_LOCK(?)", (&self.name,))
            .await
        {
            // The lock dies with the connection either way.
            warn!(lock = %self.name, error = %e, "failed to release lease");
        }
    }
}
