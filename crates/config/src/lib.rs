//! Archiver configuration
//!
//! TOML-based configuration with environment-variable overrides and
//! sensible defaults. A minimal deployment only needs a source DSN and one
//! storage backend; everything else has defaults.
//!
//! # Example
//!
//! ```toml
//! [database]
//! dsn = "mysql://archiver@db:3306/ntppool"
//!
//! [storage]
//! avro_path = "/var/spool/archiver"
//!
//! [app]
//! retention_days = 15
//! ```
//!
//! Environment variables override file values; the recognized names match
//! the deployment's historical ones (`ch_dsn`, `gc_bucket`,
//! `retention_days`, `batch_ch_min_size`, ...).

mod app;
mod batch;
mod cleanup;
mod database;
mod error;
mod storage;

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

pub use app::AppConfig;
pub use batch::BatchConfig;
pub use cleanup::CleanupConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, Result};
pub use storage::StorageConfig;

/// Main configuration structure
///
/// All sections are optional in the file; validation decides what is
/// actually required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source database connection
    pub database: DatabaseConfig,

    /// Archive destinations
    pub storage: StorageConfig,

    /// Table selection and retention
    pub app: AppConfig,

    /// Batch sizing per destination
    pub batch: BatchConfig,

    /// Cleanup engine settings
    pub cleanup: CleanupConfig,
}

impl Config {
    /// Load configuration: file (when given), then environment overrides,
    /// then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::read_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file without env overrides or
    /// validation. Mostly useful for tooling.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Apply environment-style overrides from the given lookup.
    ///
    /// Split out from [`Config::load`] so tests can feed a map instead of
    /// mutating the process environment.
    pub fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        override_str(&get, "DATABASE_DSN", &mut self.database.dsn);

        override_str(&get, "ch_dsn", &mut self.storage.ch_dsn);
        override_str(&get, "ch_database", &mut self.storage.ch_database);
        override_str(&get, "bq_dataset", &mut self.storage.bq_dataset);
        override_str(&get, "bq_project", &mut self.storage.bq_project);
        override_str(&get, "gc_bucket", &mut self.storage.gc_bucket);
        override_str(&get, "gc_project", &mut self.storage.gc_project);
        override_str(&get, "gc_content_type", &mut self.storage.gc_content_type);
        override_str(
            &get,
            "gc_cache_control",
            &mut self.storage.gc_cache_control,
        );
        override_str(&get, "avro_path", &mut self.storage.avro_path);
        override_str(
            &get,
            "GOOGLE_APPLICATION_CREDENTIALS",
            &mut self.storage.google_application_credentials,
        );

        override_str(&get, "app_default_table", &mut self.app.default_table);
        if let Some(tables) = get("app_valid_tables") {
            self.app.valid_tables = tables
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        override_parse(&get, "retention_days", &mut self.app.retention_days)?;
        override_parse(
            &get,
            "retention_days_default",
            &mut self.app.retention_days_default,
        )?;

        override_parse(&get, "batch_bq_min_size", &mut self.batch.bq_min_size)?;
        override_parse(&get, "batch_bq_max_size", &mut self.batch.bq_max_size)?;
        override_duration(&get, "batch_bq_interval", &mut self.batch.bq_interval)?;
        override_parse(&get, "batch_ch_min_size", &mut self.batch.ch_min_size)?;
        override_parse(&get, "batch_ch_max_size", &mut self.batch.ch_max_size)?;
        override_duration(&get, "batch_ch_interval", &mut self.batch.ch_interval)?;
        override_parse(&get, "batch_avro_min_size", &mut self.batch.avro_min_size)?;
        override_parse(&get, "batch_avro_max_size", &mut self.batch.avro_max_size)?;
        override_duration(&get, "batch_avro_interval", &mut self.batch.avro_interval)?;
        override_parse(
            &get,
            "batch_avro_append_size",
            &mut self.batch.avro_append_size,
        )?;

        override_duration(
            &get,
            "cleanup_default_interval",
            &mut self.cleanup.default_interval,
        )?;
        override_parse(&get, "cleanup_batch_size", &mut self.cleanup.batch_size)?;
        override_duration(
            &get,
            "cleanup_reduced_interval",
            &mut self.cleanup.reduced_interval,
        )?;
        override_duration(
            &get,
            "cleanup_fake_interval",
            &mut self.cleanup.fake_interval,
        )?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.dsn.is_empty() {
            return Err(ConfigError::validation(
                "database dsn is required (database.dsn or DATABASE_DSN)",
            ));
        }

        if !self.storage.any_configured() {
            return Err(ConfigError::validation(
                "at least one storage backend must be configured \
                 (ch_dsn, bq_dataset, gc_bucket, or avro_path)",
            ));
        }

        // BigQuery load jobs are staged through cloud storage
        if !self.storage.bq_dataset.is_empty() && self.storage.gc_bucket.is_empty() {
            return Err(ConfigError::validation(
                "bq_dataset requires gc_bucket for load-job staging",
            ));
        }

        if self.app.default_table.is_empty() {
            return Err(ConfigError::validation(
                "default table (app_default_table) is required",
            ));
        }
        if self.app.valid_tables.is_empty() {
            return Err(ConfigError::validation(
                "valid tables list (app_valid_tables) cannot be empty",
            ));
        }
        if self.app.retention_days == 0 {
            return Err(ConfigError::validation("retention days must be positive"));
        }

        let sizes = [
            ("bq", self.batch.bq_min_size, self.batch.bq_max_size),
            ("ch", self.batch.ch_min_size, self.batch.ch_max_size),
            ("avro", self.batch.avro_min_size, self.batch.avro_max_size),
        ];
        for (name, min, max) in sizes {
            if min == 0 || max == 0 {
                return Err(ConfigError::validation(format!(
                    "{name} batch sizes must be positive"
                )));
            }
        }

        if self.cleanup.batch_size == 0 {
            return Err(ConfigError::validation(
                "cleanup batch size must be positive",
            ));
        }

        Ok(())
    }

    /// Check a table name against the allow-list
    pub fn is_valid_table(&self, table: &str) -> bool {
        self.app.is_valid_table(table)
    }

    /// Lease name scoped to the source database
    pub fn lock_name(&self) -> String {
        format!("archiver-{}", self.database.database_name())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

fn override_str(get: &impl Fn(&str) -> Option<String>, key: &str, target: &mut String) {
    if let Some(v) = get(key) {
        *target = v;
    }
}

fn override_parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(v) = get(key) {
        *target = v.parse().map_err(|e: T::Err| ConfigError::EnvOverride {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}

fn override_duration(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut Duration,
) -> Result<()> {
    if let Some(v) = get(key) {
        *target = humantime::parse_duration(&v).map_err(|e| ConfigError::EnvOverride {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}
