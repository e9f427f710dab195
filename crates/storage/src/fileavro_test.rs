use super::*;
use apache_avro::Reader;
use logscore::LogScoreMeta;
use std::time::Duration;
use tempfile::TempDir;

fn batch_config() -> BatchConfig {
    BatchConfig::default()
}

fn score(id: i64, ts: i64) -> LogScore {
    LogScore {
        id,
        server_id: 200,
        monitor_id: 1,
        ts,
        score: 19.2,
        step: 0.9,
        offset: None,
        rtt: None,
        meta: LogScoreMeta::default(),
    }
}

#[test]
fn test_new_requires_directory() {
    let dir = TempDir::new().unwrap();
    assert!(AvroArchiver::new(dir.path(), &batch_config()).is_ok());

    assert!(AvroArchiver::new("/nonexistent/path", &batch_config()).is_err());

    let file_path = dir.path().join("somefile");
    std::fs::write(&file_path, b"x").unwrap();
    let err = AvroArchiver::new(&file_path, &batch_config()).unwrap_err();
    assert!(err.to_string().contains("not a directory"));
}

#[test]
fn test_batch_sizing_defaults() {
    let dir = TempDir::new().unwrap();
    let archiver = AvroArchiver::new(dir.path(), &batch_config()).unwrap();
    let sizing = archiver.batch_sizing();

    assert_eq!(sizing.min_size, 500_000);
    assert_eq!(sizing.max_size, 10_000_000);
    assert_eq!(sizing.interval, Duration::from_secs(24 * 3600));
}

#[test]
fn test_file_name_from_first_record() {
    assert_eq!(AvroArchiver::file_name(&[]), None);
    assert_eq!(
        AvroArchiver::file_name(&[score(123, 1640995200), score(124, 1640995260)]),
        Some("1640995200-123.avro".to_string())
    );
}

#[test]
fn test_store_writes_readable_ocf() {
    let dir = TempDir::new().unwrap();
    let archiver = AvroArchiver::new(dir.path(), &batch_config()).unwrap();

    let batch = vec![
        LogScore {
            offset: Some(0.05),
            rtt: Some(11234),
            meta: LogScoreMeta {
                leap: 1,
                error: "test error".into(),
            },
            ..score(103535350, 1547999353)
        },
        score(103535351, 1547999412),
    ];

    let n = archiver.store(&batch).unwrap();
    assert_eq!(n, 2);

    let path = dir.path().join("1547999353-103535350.avro");
    let file = std::fs::File::open(&path).unwrap();
    let reader = Reader::new(file).unwrap();

    let values: Vec<_> = reader.map(|v| v.unwrap()).collect();
    assert_eq!(values.len(), 2);

    let apache_avro::types::Value::Record(fields) = &values[0] else {
        panic!("expected record value");
    };
    let field = |name: &str| {
        fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap()
    };

    assert_eq!(field("id"), Value::Long(103535350));
    assert_eq!(field("server_id"), Value::Int(200));
    assert_eq!(
        field("ts"),
        Value::TimestampMicros(1547999353 * 1_000_000)
    );
    assert_eq!(field("rtt"), Value::Union(1, Box::new(Value::Int(11234))));
    assert_eq!(field("leap"), Value::Union(1, Box::new(Value::Int(1))));
    assert_eq!(
        field("error"),
        Value::Union(1, Box::new(Value::String("test error".into())))
    );

    // second record carries nulls
    let apache_avro::types::Value::Record(fields) = &values[1] else {
        panic!("expected record value");
    };
    let null_fields: Vec<_> = fields
        .iter()
        .filter(|(n, _)| ["offset", "rtt", "leap", "error"].contains(&n.as_str()))
        .collect();
    for (name, value) in null_fields {
        assert_eq!(
            *value,
            Value::Union(0, Box::new(Value::Null)),
            "{name} should be null"
        );
    }
}

#[test]
fn test_store_preserves_id_order() {
    let dir = TempDir::new().unwrap();
    let mut config = batch_config();
    // small append blocks so the batch spans several of them
    config.avro_append_size = 3;
    let archiver = AvroArchiver::new(dir.path(), &config).unwrap();

    let batch: Vec<_> = (1..=10).map(|i| score(i, 1640995200 + i)).collect();
    assert_eq!(archiver.store(&batch).unwrap(), 10);

    let file = std::fs::File::open(dir.path().join("1640995201-1.avro")).unwrap();
    let ids: Vec<i64> = Reader::new(file)
        .unwrap()
        .map(|v| match v.unwrap() {
            Value::Record(fields) => match fields.iter().find(|(n, _)| n == "id") {
                Some((_, Value::Long(id))) => *id,
                other => panic!("unexpected id field: {other:?}"),
            },
            other => panic!("unexpected value: {other:?}"),
        })
        .collect();

    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_store_empty_batch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let archiver = AvroArchiver::new(dir.path(), &batch_config()).unwrap();

    assert_eq!(archiver.store(&[]).unwrap(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_store_writer_error_reports() {
    struct FailingWriter;
    impl std::io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    let dir = TempDir::new().unwrap();
    let archiver = AvroArchiver::new(dir.path(), &batch_config()).unwrap();

    let err = archiver
        .store_writer(FailingWriter, &[score(1, 1640995200)])
        .unwrap_err();
    assert!(err.to_string().contains("disk full") || !err.to_string().is_empty());
}

#[test]
fn test_store_removes_partial_file_on_error() {
    let dir = TempDir::new().unwrap();
    let archiver = AvroArchiver::new(dir.path(), &batch_config()).unwrap();

    // Remove the directory out from under the archiver: creating the file
    // fails before anything is written.
    let inner = dir.path().join("gone");
    std::fs::create_dir(&inner).unwrap();
    let archiver_gone = AvroArchiver::new(&inner, &batch_config()).unwrap();
    std::fs::remove_dir(&inner).unwrap();

    assert!(archiver_gone.store(&[score(1, 1640995200)]).is_err());

    // The healthy archiver still works afterwards.
    assert_eq!(archiver.store(&[score(2, 1640995300)]).unwrap(), 1);
}
