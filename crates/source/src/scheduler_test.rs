use super::*;
use std::collections::HashMap;
use std::sync::Mutex;

use archiver_storage::{Result as StorageResult, StorageError};
use logscore::LogScoreMeta;

// =============================================================================
// In-memory fakes
// =============================================================================

/// Record supply backed by a vector of rows.
struct MemorySource {
    rows: Vec<LogScore>,
    /// When set, counting reports this instead of the real backlog.
    fake_count: Option<usize>,
}

impl MemorySource {
    fn with_ids(range: std::ops::RangeInclusive<i64>) -> Self {
        let rows = range.map(score).collect();
        Self {
            rows,
            fake_count: None,
        }
    }
}

fn score(id: i64) -> LogScore {
    LogScore {
        id,
        server_id: 200,
        monitor_id: 1,
        ts: 1_640_995_200 + id,
        score: 10.0,
        step: 0.1,
        offset: None,
        rtt: None,
        meta: LogScoreMeta::default(),
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn count_after(&mut self, id: Option<i64>) -> Result<usize> {
        if let Some(count) = self.fake_count {
            return Ok(count);
        }
        let bound = id.unwrap_or(0);
        Ok(self.rows.iter().filter(|r| r.id > bound).count())
    }

    async fn fetch_after(&mut self, last_id: i64, limit: usize) -> Result<Vec<LogScore>> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|r| r.id > last_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        rows.truncate(limit);
        Ok(rows)
    }
}

/// Recording destination that counts deliveries per record id.
struct MemorySink {
    sizing: BatchSizing,
    batches: Vec<Vec<i64>>,
    deliveries: HashMap<i64, usize>,
    fail_on_batch: Option<usize>,
}

impl MemorySink {
    fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            sizing: BatchSizing {
                min_size,
                max_size,
                interval: std::time::Duration::ZERO,
            },
            batches: Vec::new(),
            deliveries: HashMap::new(),
            fail_on_batch: None,
        }
    }

    fn with_interval(mut self, interval: std::time::Duration) -> Self {
        self.sizing.interval = interval;
        self
    }

    fn total_stored(&self) -> usize {
        self.batches.iter().map(|b| b.len()).sum()
    }
}

#[async_trait]
impl Destination for MemorySink {
    fn batch_sizing(&self) -> BatchSizing {
        self.sizing
    }

    async fn store(&mut self, batch: &[LogScore]) -> StorageResult<usize> {
        if self.fail_on_batch == Some(self.batches.len()) {
            return Err(StorageError::config("injected store failure"));
        }
        let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
        for id in &ids {
            *self.deliveries.entry(*id).or_default() += 1;
        }
        self.batches.push(ids);
        Ok(batch.len())
    }
}

/// In-memory watermark store.
struct MemoryStatusStore {
    entries: Mutex<HashMap<String, ArchiveStatus>>,
}

impl MemoryStatusStore {
    fn with_entry(status: &ArchiveStatus) -> Self {
        let mut entries = HashMap::new();
        entries.insert(status.archiver.clone(), status.clone());
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn watermark(&self, archiver: &str) -> Option<i64> {
        self.entries
            .lock()
            .unwrap()
            .get(archiver)
            .and_then(|s| s.log_score_id)
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn list_all(&self) -> StorageResult<Vec<ArchiveStatus>> {
        let mut all: Vec<_> = self.entries.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|s| (s.log_score_id, s.modified_on));
        Ok(all)
    }

    async fn advance(&self, archiver: &str, new_id: i64) -> StorageResult<chrono::DateTime<Utc>> {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(archiver)
            .ok_or_else(|| StorageError::StatusMissing(archiver.to_string()))?;
        entry.apply_advance(new_id, now);
        Ok(now)
    }
}

fn status(archiver: &str, log_score_id: Option<i64>) -> ArchiveStatus {
    ArchiveStatus {
        id: 1,
        archiver: archiver.into(),
        log_score_id,
        modified_on: None,
    }
}

// =============================================================================
// Batch loop behavior
// =============================================================================

#[tokio::test]
async fn test_full_drain_in_bounded_ordered_batches() {
    let mut source = MemorySource::with_ids(1..=600);
    let mut sink = MemorySink::new(50, 100);
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    // every record delivered exactly once
    assert_eq!(sink.total_stored(), 600);
    assert!(sink.deliveries.values().all(|&n| n == 1));

    // batch bounds: 1..=max records per invocation
    for batch in &sink.batches {
        assert!(!batch.is_empty());
        assert!(batch.len() <= 100);
        // strictly increasing ids within a batch
        assert!(batch.windows(2).all(|w| w[0] < w[1]));
    }

    // watermark followed the last id, in memory and in the store
    assert_eq!(entry.log_score_id, Some(600));
    assert_eq!(store.watermark("test"), Some(600));
}

#[tokio::test]
async fn test_watermark_is_monotonic_across_batches() {
    let mut source = MemorySource::with_ids(1..=500);
    let mut sink = MemorySink::new(10, 64);
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    let last_ids: Vec<i64> = sink.batches.iter().map(|b| *b.last().unwrap()).collect();
    assert!(last_ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_skips_when_backlog_below_min() {
    let mut source = MemorySource::with_ids(1..=40);
    let mut sink = MemorySink::new(50, 100);
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    assert!(sink.batches.is_empty());
    assert_eq!(entry.log_score_id, None);
}

#[tokio::test]
async fn test_leaves_tail_below_min() {
    let mut source = MemorySource::with_ids(1..=120);
    let mut sink = MemorySink::new(50, 100);
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    // one batch of 100; the 20-row tail stays below min for the next run
    assert_eq!(sink.batches.len(), 1);
    assert_eq!(sink.total_stored(), 100);
    assert_eq!(entry.log_score_id, Some(100));
}

#[tokio::test]
async fn test_resumes_from_existing_watermark() {
    let mut source = MemorySource::with_ids(1..=300);
    let mut sink = MemorySink::new(10, 1000);
    let mut entry = status("test", Some(200));
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    // nothing at or below the watermark is re-read
    assert_eq!(sink.total_stored(), 100);
    assert!(sink.deliveries.keys().all(|&id| id > 200));
    assert_eq!(entry.log_score_id, Some(300));
}

#[tokio::test]
async fn test_interval_gate_skips_recent_destination() {
    let mut source = MemorySource::with_ids(1..=1000);
    let mut sink = MemorySink::new(10, 100).with_interval(std::time::Duration::from_secs(3600));
    let mut entry = status("test", None);
    entry.modified_on = Some(Utc::now() - chrono::Duration::minutes(10));
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    assert!(sink.batches.is_empty(), "interval has not elapsed");
}

#[tokio::test]
async fn test_interval_gate_allows_elapsed_destination() {
    let mut source = MemorySource::with_ids(1..=1000);
    let mut sink = MemorySink::new(10, 500).with_interval(std::time::Duration::from_secs(3600));
    let mut entry = status("test", None);
    entry.modified_on = Some(Utc::now() - chrono::Duration::hours(2));
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    assert_eq!(sink.total_stored(), 1000);
}

#[tokio::test]
async fn test_store_error_does_not_advance_watermark() {
    let mut source = MemorySource::with_ids(1..=500);
    let mut sink = MemorySink::new(10, 100);
    sink.fail_on_batch = Some(2); // third batch fails
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    let err = archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Storage(_)));

    // two committed batches of 100; the failed batch moved nothing
    assert_eq!(entry.log_score_id, Some(200));
    assert_eq!(store.watermark("test"), Some(200));
}

#[tokio::test]
async fn test_redelivery_after_crash_window() {
    // A previous run stored ids 1..=100 but crashed before advancing the
    // watermark. The re-run must deliver that batch again, exactly once.
    let mut source = MemorySource::with_ids(1..=150);
    let mut sink = MemorySink::new(10, 100);
    for id in 1..=100 {
        sink.deliveries.insert(id, 1);
    }
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    let duplicated = sink
        .deliveries
        .iter()
        .filter(|(_, &count)| count == 2)
        .count();
    assert_eq!(duplicated, 100, "exactly the crashed batch is re-sent");
    assert!(sink.deliveries.values().all(|&count| count <= 2));
    assert_eq!(entry.log_score_id, Some(150));
}

#[tokio::test]
async fn test_rerun_after_success_is_noop() {
    let mut source = MemorySource::with_ids(1..=200);
    let mut sink = MemorySink::new(10, 100);
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();
    let stored_first = sink.total_stored();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    assert_eq!(sink.total_stored(), stored_first, "second run stores nothing");
}

#[tokio::test]
async fn test_empty_fetch_breaks_loop() {
    let mut source = MemorySource::with_ids(1..=0); // no rows
    source.fake_count = Some(500); // counting lies
    let mut sink = MemorySink::new(10, 100);
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();

    archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap();

    assert!(sink.batches.is_empty());
    assert_eq!(entry.log_score_id, None);
}

#[tokio::test]
async fn test_cancellation_stops_between_batches() {
    let mut source = MemorySource::with_ids(1..=1000);
    let mut sink = MemorySink::new(10, 100);
    let mut entry = status("test", None);
    let store = MemoryStatusStore::with_entry(&entry);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = archive_destination(&mut source, &mut sink, &mut entry, &store, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Cancelled));
    assert!(sink.batches.is_empty());
}

// =============================================================================
// too_soon
// =============================================================================

#[test]
fn test_too_soon_never_ran() {
    assert!(too_soon(None, std::time::Duration::from_secs(3600)).is_none());
}

#[test]
fn test_too_soon_within_interval() {
    let last = Utc::now() - chrono::Duration::minutes(30);
    let next = too_soon(Some(last), std::time::Duration::from_secs(3600));
    assert!(next.is_some());
    assert_eq!(next.unwrap(), last + chrono::Duration::hours(1));
}

#[test]
fn test_too_soon_after_interval() {
    let last = Utc::now() - chrono::Duration::hours(2);
    assert!(too_soon(Some(last), std::time::Duration::from_secs(3600)).is_none());
}

#[test]
fn test_too_soon_zero_interval() {
    let last = Utc::now();
    assert!(too_soon(Some(last), std::time::Duration::ZERO).is_none());
}
