//! Exact verification of candidate batches.
//!
//! Sketch hits are only candidates.  Every candidate batch is decompressed
//! and each record is checked with [`BoyerMoore`]; only true matches reach
//! the consumer.  A candidate with no matching record counts as a false
//! positive, one with at least one match as a true positive.  Candidates
//! past the last stored batch hold no data and count as false positives
//! without any I/O.

use tracing::debug;

use super::{BatchReader, BoyerMoore, StorageError};
use crate::bitset::WordBitSet;
use crate::store::telemetry::QueryTrace;

/// Streams the `candidates` batches through the matcher for `needle`.
///
/// An empty candidate set reports `(0, 0, batch_count)` and reads nothing.
pub fn read_and_post_filter(
    reader: &BatchReader,
    needle: &[u8],
    candidates: &WordBitSet,
    consumer: &mut dyn FnMut(&[u8]),
    trace: &mut dyn QueryTrace,
) -> Result<(), StorageError> {
    if candidates.is_empty() {
        trace.track_error_rate(0, 0, reader.batch_count());
        return Ok(());
    }
    filter_batches(reader, needle, candidates.ones(), consumer, trace)
}

/// Streams every batch through the matcher for `needle`.
pub fn read_all_and_post_filter(
    reader: &BatchReader,
    needle: &[u8],
    consumer: &mut dyn FnMut(&[u8]),
    trace: &mut dyn QueryTrace,
) -> Result<(), StorageError> {
    filter_batches(reader, needle, 0..reader.batch_count(), consumer, trace)
}

fn filter_batches(
    reader: &BatchReader,
    needle: &[u8],
    batches: impl Iterator<Item = usize>,
    consumer: &mut dyn FnMut(&[u8]),
    trace: &mut dyn QueryTrace,
) -> Result<(), StorageError> {
    let matcher = BoyerMoore::new(needle);
    let batch_count = reader.batch_count();
    let mut scratch = Vec::new();
    let mut false_positives = 0;
    let mut true_positives = 0;

    for batch in batches {
        if batch >= batch_count {
            false_positives += 1;
            continue;
        }
        let mut has_match = false;
        reader.read_batch(batch, &mut scratch, &mut |record| {
            if matcher.find(record).is_some() {
                consumer(record);
                has_match = true;
            }
        })?;
        if has_match {
            true_positives += 1;
        } else {
            false_positives += 1;
        }
    }

    debug!(false_positives, true_positives, batch_count, "post-filter done");
    trace.track_error_rate(false_positives, true_positives, batch_count);
    Ok(())
}
