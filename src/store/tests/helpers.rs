use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::sketch::SketchConfig;
use crate::store::{LogStore, LogStoreReader, QueryStats};

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

pub const POSTINGS: usize = 64;

/// `(source_id, record)`; sources 0, 1 and 4 land in postings 13, 2 and 33.
pub const LINES: [(u32, &str); 5] = [
    (0, "Look at my horse, my horse is amazing."),
    (1, "Give it a lick!"),
    (4, "Mmm! It tastes just like raisins."),
    (0, "Get on my horse! I'll take you 'round the universe and all the other places, too."),
    (1, "Give it a lick!"),
];

pub fn shifting_config() -> SketchConfig {
    SketchConfig {
        capacity_bits: 1 << 20,
        hash_count: 4,
        repetitions: 1,
        partitions: POSTINGS,
        posting_universe: POSTINGS,
    }
}

pub fn repeated_config() -> SketchConfig {
    SketchConfig {
        capacity_bits: 1 << 20,
        hash_count: 4,
        repetitions: 2,
        partitions: POSTINGS / 8,
        posting_universe: POSTINGS,
    }
}

pub fn ingest(store: &mut dyn LogStore) {
    for (source, line) in LINES {
        store.add_record(line.as_bytes(), source, None).unwrap();
    }
}

pub fn token(reader: &dyn LogStoreReader, term: &str) -> Vec<String> {
    token_with_stats(reader, term).0
}

pub fn token_with_stats(reader: &dyn LogStoreReader, term: &str) -> (Vec<String>, QueryStats) {
    let mut lines = Vec::new();
    let mut stats = QueryStats::default();
    reader
        .query_token(term.as_bytes(), &mut |line| lines.push(to_string(line)), &mut stats, true)
        .unwrap();
    (lines, stats)
}

pub fn contains(reader: &dyn LogStoreReader, term: &str) -> Vec<String> {
    contains_with_stats(reader, term).0
}

pub fn contains_with_stats(reader: &dyn LogStoreReader, term: &str) -> (Vec<String>, QueryStats) {
    let mut lines = Vec::new();
    let mut stats = QueryStats::default();
    reader
        .query_contains(term.as_bytes(), &mut |line| lines.push(to_string(line)), &mut stats, true)
        .unwrap();
    (lines, stats)
}

/// Runs both query kinds without loading data.
pub fn locate_only(reader: &dyn LogStoreReader, term: &str) -> QueryStats {
    let mut stats = QueryStats::default();
    let mut calls = 0;
    reader.query_token(term.as_bytes(), &mut |_| calls += 1, &mut stats, false).unwrap();
    reader.query_contains(term.as_bytes(), &mut |_| calls += 1, &mut stats, false).unwrap();
    assert_eq!(calls, 0);
    stats
}

fn to_string(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

