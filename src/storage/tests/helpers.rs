use std::path::Path;

use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::storage::{BatchReader, BatchWriter};

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// Writes the reference layout: postings 0, 1 and 4 hold records, 2 and 3
/// stay empty.
pub fn write_sample(dir: &Path) -> BatchWriter {
    let mut writer = BatchWriter::new(dir);
    writer.add_record(b"log line 0/1", 0).unwrap();
    writer.add_record(b"log line 1/1", 1).unwrap();
    writer.add_record(b"log line 0/2", 0).unwrap();
    writer.add_record(b"log line 2/1", 4).unwrap();
    writer.add_record(b"log line 0/3", 0).unwrap();
    writer.flush().unwrap();
    writer
}

pub fn read_all(reader: &BatchReader, batch: usize) -> Vec<Vec<u8>> {
    let mut scratch = Vec::new();
    let mut records = Vec::new();
    reader
        .read_batch(batch, &mut scratch, &mut |record| records.push(record.to_vec()))
        .unwrap();
    records
}
