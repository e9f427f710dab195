//! File Avro destination
//!
//! Writes batches as Avro Object Container Files into a local directory.
//! The cloud destinations reuse [`AvroArchiver::store_writer`] for their
//! payloads, so this module owns the record schema.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use apache_avro::types::Value;
use apache_avro::{Codec, Schema, Writer};
use tracing::{debug, warn};

use archiver_config::BatchConfig;
use logscore::LogScore;

use crate::error::{Result, StorageError};
use crate::sink::BatchSizing;

/// Avro schema for one archived log score.
const LOGSCORE_SCHEMA: &str = r#"
{
  "type": "record",
  "name": "logscore",
  "fields": [
    {"name": "id", "type": "long"},
    {"name": "server_id", "type": "int"},
    {"name": "monitor_id", "type": "int"},
    {"name": "ts", "type": {"type": "long", "logicalType": "timestamp-micros"}},
    {"name": "score", "type": "float"},
    {"name": "step", "type": "float"},
    {"name": "offset", "type": ["null", "float"]},
    {"name": "rtt", "type": ["null", "int"]},
    {"name": "leap", "type": ["null", "int"]},
    {"name": "error", "type": ["null", "string"]}
  ]
}"#;

/// Archiver that stores Avro files in a local directory.
#[derive(Debug)]
pub struct AvroArchiver {
    path: PathBuf,
    sizing: BatchSizing,
    append_size: usize,
}

impl AvroArchiver {
    /// Create an archiver writing into `path`, which must be an existing
    /// directory.
    pub fn new(path: impl Into<PathBuf>, batch: &BatchConfig) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path)?;
        if !meta.is_dir() {
            return Err(StorageError::config(format!(
                "avro path {:?} is not a directory",
                path
            )));
        }

        Ok(Self {
            path,
            sizing: BatchSizing {
                min_size: batch.avro_min_size,
                max_size: batch.avro_max_size,
                interval: batch.avro_interval,
            },
            append_size: batch.avro_append_size.max(1),
        })
    }

    pub fn batch_sizing(&self) -> BatchSizing {
        self.sizing
    }

    /// Suggested file name for a batch: `<ts>-<id>` of the first record.
    pub fn file_name(batch: &[LogScore]) -> Option<String> {
        batch.first().map(|ls| format!("{}-{}.avro", ls.ts, ls.id))
    }

    /// Write a batch to a new file in the configured directory.
    ///
    /// A partially written file is removed before the error is returned,
    /// so a retry of the same batch starts clean.
    pub fn store(&self, batch: &[LogScore]) -> Result<usize> {
        let Some(name) = Self::file_name(batch) else {
            warn!("no records to store");
            return Ok(0);
        };
        let path = self.path.join(name);

        let file = File::create(&path)?;
        match self.store_writer(file, batch) {
            Ok(n) => {
                debug!(path = %path.display(), count = n, "wrote avro file");
                Ok(n)
            }
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    /// Write a batch as an Avro object container stream.
    ///
    /// Records are appended in blocks of the configured append size, with
    /// a final flush at the end of the batch.
    pub fn store_writer<W: Write>(&self, writer: W, batch: &[LogScore]) -> Result<usize> {
        if batch.is_empty() {
            warn!("no records to store");
            return Ok(0);
        }

        let schema = Schema::parse_str(LOGSCORE_SCHEMA)?;
        let mut ocf = Writer::with_codec(&schema, writer, Codec::Null);

        let mut count = 0;
        for chunk in batch.chunks(self.append_size) {
            ocf.extend(chunk.iter().map(record_value))?;
            count += chunk.len();
        }
        ocf.flush()?;

        Ok(count)
    }

    /// Directory files are written into.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn record_value(ls: &LogScore) -> Value {
    Value::Record(vec![
        ("id".into(), Value::Long(ls.id)),
        ("server_id".into(), Value::Int(ls.server_id as i32)),
        ("monitor_id".into(), Value::Int(ls.monitor_id as i32)),
        (
            "ts".into(),
            Value::TimestampMicros(ls.ts.saturating_mul(1_000_000)),
        ),
        ("score".into(), Value::Float(ls.score as f32)),
        ("step".into(), Value::Float(ls.step as f32)),
        (
            "offset".into(),
            match ls.offset {
                Some(v) => Value::Union(1, Box::new(Value::Float(v as f32))),
                None => Value::Union(0, Box::new(Value::Null)),
            },
        ),
        (
            "rtt".into(),
            match ls.rtt {
                Some(v) => Value::Union(1, Box::new(Value::Int(v as i32))),
                None => Value::Union(0, Box::new(Value::Null)),
            },
        ),
        (
            "leap".into(),
            match ls.meta.leap {
                0 => Value::Union(0, Box::new(Value::Null)),
                v => Value::Union(1, Box::new(Value::Int(v as i32))),
            },
        ),
        (
            "error".into(),
            if ls.meta.error.is_empty() {
                Value::Union(0, Box::new(Value::Null))
            } else {
                Value::Union(1, Box::new(Value::String(ls.meta.error.clone())))
            },
        ),
    ])
}

#[cfg(test)]
#[path = "fileavro_test.rs"]
mod fileavro_test;
