//! Connection pool for the source database
//!
//! One pool is shared read-mostly across the run: schema introspection,
//! counting, fetching, watermark updates and cleanup deletes. Statement
//! values are always parameterized; the only interpolated fragment is the
//! allow-listed table name.

use std::time::Duration;

use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};

use archiver_config::DatabaseConfig;

use crate::error::{DbError, Result};

/// Build a pool from the configured DSN and sizing knobs.
///
/// Connections are recycled after `max_lifetime` so long runs do not pin
/// stale connections behind load balancers.
pub fn connect(config: &DatabaseConfig) -> Result<Pool> {
    let opts = Opts::from_url(&config.dsn)?;

    let constraints = PoolConstraints::new(config.max_idle_conns, config.max_open_conns).ok_or(
        DbError::PoolConstraints {
            idle: config.max_idle_conns,
            open: config.max_open_conns,
        },
    )?;

    let pool_opts = PoolOpts::default()
        .with_constraints(constraints)
        .with_abs_conn_ttl(Some(config.max_lifetime))
        .with_abs_conn_ttl_jitter(Some(Duration::from_secs(30)));

    let opts = OptsBuilder::from_opts(opts).pool_opts(pool_opts);
    Ok(Pool::new(opts))
}

/// Verify the pool can reach the server.
pub async fn ping(pool: &Pool) -> Result<()> {
    let mut conn = pool.get_conn().await?;
    conn.ping().await?;
    Ok(())
}

/// Tear the pool down, closing idle connections.
pub async fn disconnect(pool: Pool) -> Result<()> {
    pool.disconnect().await?;
    Ok(())
}
