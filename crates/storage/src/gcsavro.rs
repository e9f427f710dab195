//! Cloud storage Avro destination
//!
//! Serializes each batch through the file Avro writer into an owned temp
//! directory, then uploads the blob to the configured bucket under
//! `<year-of-first-record>/<ts>-<id>.avro`.

use std::sync::Arc;

use chrono::{DateTime, Datelike};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::info;

use archiver_config::Config;
use logscore::LogScore;

use crate::error::{Result, StorageError};
use crate::fileavro::AvroArchiver;
use crate::sink::BatchSizing;

/// Archiver uploading Avro blobs to cloud object storage.
#[derive(Debug)]
pub struct GcsAvroArchiver {
    file_avro: AvroArchiver,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    content_type: String,
    cache_control: String,
    tempdir: Option<TempDir>,
    cancel: CancellationToken,
}

impl GcsAvroArchiver {
    pub fn new(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let bucket = config.storage.gc_bucket.clone();
        if bucket.is_empty() {
            return Err(StorageError::config("gc_bucket must be set"));
        }

        let tempdir = tempfile::Builder::new().prefix("gcsavro").tempdir()?;
        let file_avro = AvroArchiver::new(tempdir.path(), &config.batch)?;

        let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&bucket);
        if !config.storage.google_application_credentials.is_empty() {
            builder = builder
                .with_service_account_path(&config.storage.google_application_credentials);
        }
        let store = Arc::new(builder.build()?);

        Ok(Self {
            file_avro,
            store,
            bucket,
            content_type: config.storage.gc_content_type.clone(),
            cache_control: config.storage.gc_cache_control.clone(),
            tempdir: Some(tempdir),
            cancel,
        })
    }

    pub fn batch_sizing(&self) -> BatchSizing {
        // Sizing follows the file writer; the upload adds no constraints.
        self.file_avro.batch_sizing()
    }

    pub async fn store(&mut self, batch: &[LogScore]) -> Result<usize> {
        let Some(file_name) = AvroArchiver::file_name(batch) else {
            return Ok(0);
        };

        let n = self.file_avro.store(batch)?;
        let local = self.file_avro.path().join(&file_name);

        // Blobs are grouped by the year of the first record.
        let year = DateTime::from_timestamp(batch[0].ts, 0)
            .map(|dt| dt.year())
            .ok_or_else(|| StorageError::config("record timestamp out of range"))?;
        let location = ObjectPath::from(format!("{year}/{file_name}"));

        let upload = async {
            let bytes = tokio::fs::read(&local).await?;

            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, self.content_type.clone().into());
            attributes.insert(Attribute::CacheControl, self.cache_control.clone().into());

            let opts = PutOptions {
                attributes,
                ..Default::default()
            };
            self.store
                .put_opts(&location, PutPayload::from(bytes), opts)
                .await?;
            Ok::<_, StorageError>(())
        };

        let result = tokio::select! {
            r = upload => r,
            _ = self.cancel.cancelled() => Err(StorageError::Cancelled),
        };

        // The local copy is scratch space either way; the watermark only
        // advances on success.
        let _ = tokio::fs::remove_file(&local).await;
        result?;

        info!(bucket = %self.bucket, path = %location, count = n, "uploaded avro blob");
        Ok(n)
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(dir) = self.tempdir.take() {
            dir.close()?;
        }
        Ok(())
    }
}
