//! Source table adapter
//!
//! Reads log scores out of the relational source table. The table name is
//! the only dynamically interpolated SQL fragment and must come from the
//! configured allow-list; every value position is parameterized.
//!
//! The optional `attributes` and `rtt` columns are detected per run via
//! `DESCRIBE` and included in the projection only when present. Detection
//! is cached on the adapter, which lives for exactly one run.

use std::collections::HashSet;

use mysql_async::prelude::*;
use mysql_async::Row;
use tracing::debug;

use archiver_config::Config;
use archiver_db::Pool;
use logscore::{LogScore, LogScoreMeta};

use crate::error::{Result, SourceError};

/// Adapter over one allow-listed source table.
#[derive(Debug)]
pub struct Source {
    table: String,
    retention_days: u32,
    pool: Pool,
    columns: Option<HashSet<String>>,
}

impl Source {
    /// Create an adapter for `table`.
    ///
    /// Fails when the name is not in the allow-list. A `retention_days`
    /// of zero falls back to the configured default.
    pub fn new(table: &str, retention_days: u32, config: &Config, pool: Pool) -> Result<Self> {
        if !config.is_valid_table(table) {
            return Err(SourceError::InvalidTable(table.to_string()));
        }

        let retention_days = if retention_days == 0 {
            config.app.retention_days_default
        } else {
            retention_days
        };

        Ok(Self {
            table: table.to_string(),
            retention_days,
            pool,
            columns: None,
        })
    }

    /// Table this adapter reads from.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Retention horizon in days for the cleanup engine.
    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Whether the table has a column named `field`.
    ///
    /// The column set is described once per run and cached.
    pub async fn has_field(&mut self, field: &str) -> Result<bool> {
        if self.columns.is_none() {
            let mut conn = self.pool.get_conn().await?;
            let rows: Vec<Row> = conn.query(format!("DESCRIBE {}", self.table)).await?;

            let mut columns = HashSet::new();
            for mut row in rows {
                let name: String = row
                    .take(0)
                    .ok_or_else(|| SourceError::scan(0, "DESCRIBE returned no field name"))?;
                columns.insert(name);
            }
            debug!(table = %self.table, columns = columns.len(), "described table");
            self.columns = Some(columns);
        }

        Ok(self
            .columns
            .as_ref()
            .is_some_and(|c| c.contains(field)))
    }

    /// Count rows with `id` strictly greater than the watermark, or all
    /// rows when there is no watermark yet.
    pub async fn count_after(&self, id: Option<i64>) -> Result<usize> {
        let mut conn = self.pool.get_conn().await?;

        let count: Option<i64> = match id {
            Some(id) => {
                conn.exec_first(
                    format!("select count(*) from {} where id > ?", self.table),
                    (id,),
                )
                .await?
            }
            None => {
                conn.query_first(format!("select count(*) from {}", self.table))
                    .await?
            }
        };

        Ok(count.unwrap_or(0).max(0) as usize)
    }

    /// Fetch up to `limit` records with `id` strictly greater than
    /// `last_id`, ordered by ascending `id`. Downstream correctness
    /// depends on the ordering.
    pub async fn fetch_after(&mut self, last_id: i64, limit: usize) -> Result<Vec<LogScore>> {
        let has_attributes = self.has_field("attributes").await?;
        let has_rtt = self.has_field("rtt").await?;

        let sql = fetch_sql(&self.table, has_attributes, has_rtt);

        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(sql, (last_id, limit as u64)).await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            scores.push(scan_row(row, has_attributes, has_rtt)?);
        }
        Ok(scores)
    }

    /// Delete up to `limit` rows older than `days` with `id` strictly
    /// below `floor`. Returns the number of deleted rows.
    pub async fn delete_before(&self, days: u32, floor: i64, limit: usize) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;

        let result = conn
            .exec_iter(
                format!(
                    "delete from {} \
                     where ts < date_sub(now(), interval ? day) and id < ? \
                     order by id limit ?",
                    self.table
                ),
                (days, floor, limit as u64),
            )
            .await?;

        Ok(result.affected_rows())
    }
}

/// Compose the fetch statement for the detected column set.
pub(crate) fn fetch_sql(table: &str, has_attributes: bool, has_rtt: bool) -> String {
    let mut fields =
        String::from("id,monitor_id,server_id,UNIX_TIMESTAMP(ts),score,step,offset");
    if has_attributes {
        fields.push_str(",attributes");
    }
    if has_rtt {
        fields.push_str(",rtt");
    }

    format!("select {fields} from {table} where id > ? order by id limit ?")
}

/// Bind one fetched row into a record.
///
/// Column positions follow the composed projection. A NULL `monitor_id`
/// maps to zero; a NULL or empty `attributes` blob means no metadata.
fn scan_row(mut row: Row, has_attributes: bool, has_rtt: bool) -> Result<LogScore> {
    fn take<T: FromValue>(row: &mut Row, column: usize) -> Result<T> {
        row.take(column)
            .ok_or_else(|| SourceError::scan(column, "unexpected value type"))
    }

    let id: i64 = take(&mut row, 0)?;
    let monitor_id: Option<i64> = take(&mut row, 1)?;
    let server_id: i64 = take(&mut row, 2)?;
    let ts: i64 = take(&mut row, 3)?;
    let score: f64 = take(&mut row, 4)?;
    let step: f64 = take(&mut row, 5)?;
    let offset: Option<f64> = take(&mut row, 6)?;

    let mut column = 7;
    let meta = if has_attributes {
        let raw: Option<Vec<u8>> = take(&mut row, column)?;
        column += 1;
        match raw {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            _ => LogScoreMeta::default(),
        }
    } else {
        LogScoreMeta::default()
    };

    let rtt: Option<i64> = if has_rtt {
        take(&mut row, column)?
    } else {
        None
    };

    Ok(LogScore {
        id,
        server_id,
        monitor_id: monitor_id.unwrap_or(0),
        ts,
        score,
        step,
        offset,
        rtt,
        meta,
    })
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
