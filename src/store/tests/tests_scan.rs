use tempfile::TempDir;

use super::helpers::*;
use crate::StoreError;
use crate::store::{
    FinishStats, IngestStats, LogStore, LogStoreReader, NoopTrace, ScanLogStore, ScanLogStoreReader,
};

/// # Scenario
/// The scan store answers exactly like the sketch stores, by reading
/// every posting.
///
/// # Actions
/// 1. Ingest the sample records and finish.
/// 2. Query live and through a reopened reader.
///
/// # Expected behavior
/// Same answers as the sketch stores; every query covers all batches.
#[test]
fn queries_live_and_reopened() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut store = ScanLogStore::create(dir.path(), POSTINGS);
    let mut ingest_stats = IngestStats::default();
    for (source, line) in LINES {
        store
            .add_record(line.as_bytes(), source, Some(&mut ingest_stats))
            .unwrap();
    }
    assert_eq!(ingest_stats.lines, 5);
    assert_eq!(ingest_stats.tokens, 0);

    let mut finish_stats = FinishStats::default();
    store.finish(&mut finish_stats).unwrap();
    assert!(finish_stats.data_disk_bytes > 0);
    assert_eq!(finish_stats.sketch_disk_bytes, 0);

    let live = store.reader().unwrap();
    let (lines, stats) = token_with_stats(live, "horse");
    assert_eq!(lines, vec![LINES[0].1.to_string(), LINES[3].1.to_string()]);
    assert_eq!(stats.batches, 34);
    assert_eq!(stats.true_positives, 1);
    assert_eq!(contains(live, "ivers"), vec![LINES[3].1.to_string()]);
    Box::new(store).close().unwrap();

    let reader = ScanLogStoreReader::open(dir.path()).unwrap();
    assert_eq!(token(&reader, "lick").len(), 2);
    assert_eq!(contains(&reader, "IVERS"), vec![LINES[3].1.to_string()]);
    assert_eq!(reader.estimated_memory_usage_bytes(), 0);
    Box::new(reader).close().unwrap();
}

#[test]
fn lifecycle_errors() {
    let dir = TempDir::new().unwrap();
    let mut store = ScanLogStore::create(dir.path(), POSTINGS);
    assert!(matches!(store.reader(), Err(StoreError::NotFinished)));
    store.finish(&mut NoopTrace).unwrap();
    assert!(matches!(
        store.add_record(b"late", 0, None),
        Err(StoreError::AlreadyFinished)
    ));
    assert!(matches!(store.finish(&mut NoopTrace), Err(StoreError::AlreadyFinished)));
}

#[test]
fn opening_a_missing_store_fails() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        ScanLogStoreReader::open(dir.path()),
        Err(StoreError::Storage(_))
    ));
}
