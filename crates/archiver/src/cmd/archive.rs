//! `archive` subcommand
//!
//! One full pipeline run: acquire the lease, walk the watermark entries in
//! laggards-first order, archive each destination, run cleanup when its
//! entry comes up, and report how it all went. Destination failures are
//! isolated: they are logged, the remaining destinations still run, and
//! the process exits non-zero at the end.

use anyhow::Context;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use archiver_config::Config;
use archiver_db::Lease;
use archiver_source::{safety_floor, Cleanup, Source};
use archiver_storage::{MysqlStatusStore, StatusStore};

/// Arguments for the archive subcommand
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Table to pull data from (defaults to the configured table)
    #[arg(short, long)]
    pub table: Option<String>,
}

/// How a run ended.
pub enum RunOutcome {
    /// Every destination processed (some may have been interval-skipped)
    Completed,

    /// Another instance holds the lease; nothing was touched
    NotLeader,

    /// This many destinations failed; the rest were processed
    DestinationsFailed(usize),
}

/// Execute one archive run.
pub async fn run(args: ArchiveArgs, config: &Config) -> anyhow::Result<RunOutcome> {
    let table = args
        .table
        .unwrap_or_else(|| config.app.default_table.clone());
    if !config.is_valid_table(&table) {
        anyhow::bail!(
            "invalid table name '{}', must be one of: {:?}",
            table,
            config.app.valid_tables
        );
    }

    let pool = archiver_db::connect(&config.database)?;
    archiver_db::ping(&pool)
        .await
        .context("could not connect to database")?;

    // One token covers the whole run; every destination observes it at
    // its batch boundaries and inside long waits.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after the current batch");
                cancel.cancel();
            }
        });
    }

    let lock_name = config.lock_name();
    let Some(lease) = Lease::acquire(&pool, &lock_name).await? else {
        info!(lock = %lock_name, "another archiver instance holds the lease");
        return Ok(RunOutcome::NotLeader);
    };

    let store = MysqlStatusStore::new(pool.clone());
    let mut statuses = store.list_all().await.context("archive status")?;
    info!(table = %table, destinations = statuses.len(), "starting archive run");

    let mut source = Source::new(&table, config.app.retention_days, config, pool.clone())?;
    let cleanup = Cleanup::new(config, source.retention_days());

    let mut failed = 0;
    for i in 0..statuses.len() {
        if cancel.is_cancelled() {
            warn!("run cancelled, skipping remaining destinations");
            break;
        }

        let mut entry = statuses[i].clone();

        if entry.is_cleanup() {
            // The floor reflects watermarks as of right now, including
            // destinations already advanced earlier in this run.
            let floor = safety_floor(&statuses);
            if let Err(e) = cleanup.run(&source, floor, &mut entry, &store, &cancel).await {
                // cleanup trouble never blocks archiving
                error!(error = %e, "error running cleanup");
            }
        } else if let Err(e) = source.process(&mut entry, &store, config, &cancel).await {
            error!(archiver = %entry.archiver, error = %e, "error processing destination");
            failed += 1;
        }

        statuses[i] = entry;
    }

    lease.release().await;
    archiver_db::disconnect(pool).await?;

    if failed > 0 {
        return Ok(RunOutcome::DestinationsFailed(failed));
    }
    Ok(RunOutcome::Completed)
}
