//! Log score archiver
//!
//! Copies the growing `log_scores` table to every configured long-term
//! destination and deletes source rows once all destinations have them.
//!
//! # Usage
//!
//! ```bash
//! # archive the default table
//! archiver archive
//!
//! # archive a specific table with a config file
//! archiver archive --table log_scores_test --config archiver.toml
//! ```
//!
//! Exit code 0 means the run completed (including the clean "another
//! instance holds the lease" case); 1 means configuration failure or at
//! least one destination failing.

mod cmd;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Archive log scores to long-term storage
#[derive(Parser, Debug)]
#[command(name = "archiver")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy pending log scores to every configured destination
    Archive(cmd::archive::ArchiveArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let config = match archiver_config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Archive(args) => match cmd::archive::run(args, &config).await {
            Ok(cmd::archive::RunOutcome::Completed) => ExitCode::SUCCESS,
            Ok(cmd::archive::RunOutcome::NotLeader) => {
                // nothing to do; another instance is working this database
                ExitCode::SUCCESS
            }
            Ok(cmd::archive::RunOutcome::DestinationsFailed(failed)) => {
                tracing::error!(failed, "run finished with failed destinations");
                ExitCode::FAILURE
            }
            Err(e) => {
                tracing::error!(error = %e, "archive run failed");
                ExitCode::FAILURE
            }
        },
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
