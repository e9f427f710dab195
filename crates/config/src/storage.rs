//! Archive destination configuration
//!
//! One section covers every backend; a backend is considered configured
//! when its primary key (DSN, dataset, bucket, or path) is non-empty.

use serde::Deserialize;

/// Settings for all archive destinations
///
/// # Example
///
/// ```toml
/// [storage]
/// ch_dsn = "http://clickhouse.example.com:8123"
/// gc_bucket = "logscore-archive"
/// avro_path = "/var/spool/archiver"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// ClickHouse HTTP endpoint
    pub ch_dsn: String,

    /// ClickHouse database name
    /// Default: "default"
    pub ch_database: String,

    /// BigQuery dataset name; enables the bigquery archiver when set
    pub bq_dataset: String,

    /// BigQuery project ID
    /// Default: "ntppool"
    pub bq_project: String,

    /// Cloud storage bucket; enables the gcsavro archiver when set,
    /// and is also required for BigQuery load-job staging
    pub gc_bucket: String,

    /// Cloud storage project ID
    /// Default: "ntppool"
    pub gc_project: String,

    /// Content type for uploaded Avro blobs
    /// Default: "avro/binary"
    pub gc_content_type: String,

    /// Cache-control header for uploaded Avro blobs
    /// Default: "public, max-age=157248000"
    pub gc_cache_control: String,

    /// Local directory for Avro files; enables the fileavro archiver when set
    pub avro_path: String,

    /// Path to Google service account credentials
    /// Also settable via `GOOGLE_APPLICATION_CREDENTIALS`
    pub google_application_credentials: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ch_dsn: String::new(),
            ch_database: "default".into(),
            bq_dataset: String::new(),
            bq_project: "ntppool".into(),
            gc_bucket: String::new(),
            gc_project: "ntppool".into(),
            gc_content_type: "avro/binary".into(),
            gc_cache_control: "public, max-age=157248000".into(),
            avro_path: String::new(),
            google_application_credentials: String::new(),
        }
    }
}

impl StorageConfig {
    /// True when at least one backend is configured
    pub fn any_configured(&self) -> bool {
        !self.ch_dsn.is_empty()
            || !self.bq_dataset.is_empty()
            || !self.gc_bucket.is_empty()
            || !self.avro_path.is_empty()
    }
}
