//! Warehouse (BigQuery) destination
//!
//! Serializes each batch to Avro, stages the blob in cloud storage, then
//! runs a load job against `<project>.<dataset>.log_scores` and blocks
//! until the job terminates. The REST API offers no local-file media
//! upload, so staging through the configured bucket stands in for it; the
//! staging object is deleted once the job finishes.

use std::sync::Arc;
use std::time::Duration;

use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::job_configuration::JobConfiguration;
use gcp_bigquery_client::model::job_configuration_load::JobConfigurationLoad;
use gcp_bigquery_client::model::table_reference::TableReference;
use gcp_bigquery_client::Client;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archiver_config::Config;
use logscore::LogScore;

use crate::error::{Result, StorageError};
use crate::fileavro::AvroArchiver;
use crate::sink::BatchSizing;

/// Warehouse table loaded by every job.
const TABLE_ID: &str = "log_scores";

/// Prefix for staged load payloads inside the bucket.
const STAGING_PREFIX: &str = "bq-staging";

/// Delay between load-job status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Archiver loading batches into the warehouse via Avro load jobs.
pub struct BigQueryArchiver {
    file_avro: AvroArchiver,
    staging: Arc<dyn ObjectStore>,
    client: Client,
    bucket: String,
    project: String,
    dataset: String,
    sizing: BatchSizing,
    tempdir: Option<TempDir>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for BigQueryArchiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryArchiver")
            .field("file_avro", &self.file_avro)
            .field("staging", &self.staging)
            .field("bucket", &self.bucket)
            .field("project", &self.project)
            .field("dataset", &self.dataset)
            .field("sizing", &self.sizing)
            .field("tempdir", &self.tempdir)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl BigQueryArchiver {
    pub async fn new(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let dataset = config.storage.bq_dataset.clone();
        if dataset.is_empty() {
            return Err(StorageError::config("bq_dataset must be set"));
        }
        let bucket = config.storage.gc_bucket.clone();
        if bucket.is_empty() {
            return Err(StorageError::config(
                "gc_bucket must be set for load-job staging",
            ));
        }

        let tempdir = tempfile::Builder::new().prefix("bqavro").tempdir()?;
        let file_avro = AvroArchiver::new(tempdir.path(), &config.batch)?;

        let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&bucket);
        let credentials = &config.storage.google_application_credentials;
        if !credentials.is_empty() {
            builder = builder.with_service_account_path(credentials);
        }
        let staging = Arc::new(builder.build()?);

        let client = if credentials.is_empty() {
            Client::from_application_default_credentials().await?
        } else {
            Client::from_service_account_key_file(credentials).await?
        };

        Ok(Self {
            file_avro,
            staging,
            client,
            bucket,
            project: config.storage.bq_project.clone(),
            dataset,
            sizing: BatchSizing {
                min_size: config.batch.bq_min_size,
                max_size: config.batch.bq_max_size,
                interval: config.batch.bq_interval,
            },
            tempdir: Some(tempdir),
            cancel,
        })
    }

    pub fn batch_sizing(&self) -> BatchSizing {
        self.sizing
    }

    pub async fn store(&mut self, batch: &[LogScore]) -> Result<usize> {
        let Some(file_name) = AvroArchiver::file_name(batch) else {
            return Ok(0);
        };

        let n = self.file_avro.store(batch)?;
        let local = self.file_avro.path().join(&file_name);
        let location = ObjectPath::from(format!("{STAGING_PREFIX}/{file_name}"));

        let result = self.stage_and_load(&local, &location).await;

        let _ = tokio::fs::remove_file(&local).await;
        if let Err(e) = self.staging.delete(&location).await {
            // The object may not exist when staging itself failed.
            warn!(path = %location, error = %e, "could not remove staging object");
        }
        result?;

        info!(
            project = %self.project,
            dataset = %self.dataset,
            count = n,
            "load job finished"
        );
        Ok(n)
    }

    async fn stage_and_load(
        &self,
        local: &std::path::Path,
        location: &ObjectPath,
    ) -> Result<()> {
        let bytes = tokio::fs::read(local).await?;
        self.staging.put(location, PutPayload::from(bytes)).await?;

        let load = JobConfigurationLoad {
            source_uris: Some(vec![format!("gs://{}/{}", self.bucket, location)]),
            source_format: Some("AVRO".to_string()),
            use_avro_logical_types: Some(true),
            write_disposition: Some("WRITE_APPEND".to_string()),
            destination_table: Some(TableReference {
                project_id: self.project.clone(),
                dataset_id: self.dataset.clone(),
                table_id: TABLE_ID.to_string(),
            }),
            ..Default::default()
        };
        let job = Job {
            configuration: Some(JobConfiguration {
                load: Some(load),
                ..Default::default()
            }),
            ..Default::default()
        };

        let inserted = self.client.job().insert(&self.project, job).await?;
        let reference = inserted
            .job_reference
            .ok_or_else(|| StorageError::LoadJob("job has no reference".into()))?;
        let job_id = reference
            .job_id
            .ok_or_else(|| StorageError::LoadJob("job has no id".into()))?;

        info!(job = %job_id, "waiting for load job");
        self.wait_for_job(&job_id, reference.location.as_deref())
            .await
    }

    /// Poll until the job reaches `DONE`, honoring cancellation. This is
    /// the only unbounded wait in the pipeline.
    async fn wait_for_job(&self, job_id: &str, location: Option<&str>) -> Result<()> {
        loop {
            let job = self
                .client
                .job()
                .get_job(&self.project, job_id, location)
                .await?;

            if let Some(status) = job.status {
                if status.state.as_deref() == Some("DONE") {
                    if let Some(err) = status.error_result {
                        return Err(StorageError::LoadJob(
                            err.message
                                .unwrap_or_else(|| "unspecified load error".into()),
                        ));
                    }
                    return Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = self.cancel.cancelled() => return Err(StorageError::Cancelled),
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(dir) = self.tempdir.take() {
            dir.close()?;
        }
        Ok(())
    }
}
