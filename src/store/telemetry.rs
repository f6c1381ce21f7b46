//! Counters reported by stores while ingesting, finishing and querying.
//!
//! Stores only call into these traits; collecting, aggregating and
//! exporting is left to the caller.  The `*Stats` types are simple
//! accumulating implementations, [`NoopTrace`] discards everything.

use std::time::Duration;

/// Per-record ingestion counters.
pub trait IngestTrace {
    /// One record of `source_id` produced `tokens` index tokens.
    fn track_ingested_line(&mut self, source_id: u32, tokens: usize);
}

/// Per-query post-filter counters.
pub trait QueryTrace {
    /// Candidate postings without a match, with a match, and the total
    /// number of postings in the store.
    fn track_error_rate(&mut self, false_positives: usize, true_positives: usize, batches: usize);
}

/// Sealing counters.
pub trait FinishTrace {
    fn track_sketch_memory_usage(&mut self, bytes: usize);
    fn track_sketch_disk_usage(&mut self, bytes: u64);
    fn track_sketch_finish_time(&mut self, elapsed: Duration);
    fn track_data_disk_usage(&mut self, bytes: u64);
    fn track_data_finish_time(&mut self, elapsed: Duration);
}

/// Discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrace;

impl IngestTrace for NoopTrace {
    fn track_ingested_line(&mut self, _: u32, _: usize) {}
}

impl QueryTrace for NoopTrace {
    fn track_error_rate(&mut self, _: usize, _: usize, _: usize) {}
}

impl FinishTrace for NoopTrace {
    fn track_sketch_memory_usage(&mut self, _: usize) {}
    fn track_sketch_disk_usage(&mut self, _: u64) {}
    fn track_sketch_finish_time(&mut self, _: Duration) {}
    fn track_data_disk_usage(&mut self, _: u64) {}
    fn track_data_finish_time(&mut self, _: Duration) {}
}

/// Totals over all ingested records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub tokens: u64,
}

impl IngestTrace for IngestStats {
    fn track_ingested_line(&mut self, _: u32, tokens: usize) {
        self.lines += 1;
        self.tokens += tokens as u64;
    }
}

/// Totals over all observed queries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryStats {
    pub queries: u64,
    pub false_positives: u64,
    pub true_positives: u64,
    pub batches: u64,
}

impl QueryStats {
    /// False-positive postings per posting in the store, over all queries.
    ///
    /// Zero when nothing has been observed.
    pub fn false_positive_rate(&self) -> f64 {
        if self.batches == 0 {
            return 0.0;
        }
        self.false_positives as f64 / self.batches as f64
    }
}

impl QueryTrace for QueryStats {
    fn track_error_rate(&mut self, false_positives: usize, true_positives: usize, batches: usize) {
        self.queries += 1;
        self.false_positives += false_positives as u64;
        self.true_positives += true_positives as u64;
        self.batches += batches as u64;
    }
}

/// Sizes and durations of one `finish`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinishStats {
    pub sketch_memory_bytes: usize,
    pub sketch_disk_bytes: u64,
    pub sketch_finish_time: Duration,
    pub data_disk_bytes: u64,
    pub data_finish_time: Duration,
}

impl FinishTrace for FinishStats {
    fn track_sketch_memory_usage(&mut self, bytes: usize) {
        self.sketch_memory_bytes = bytes;
    }

    fn track_sketch_disk_usage(&mut self, bytes: u64) {
        self.sketch_disk_bytes = bytes;
    }

    fn track_sketch_finish_time(&mut self, elapsed: Duration) {
        self.sketch_finish_time = elapsed;
    }

    fn track_data_disk_usage(&mut self, bytes: u64) {
        self.data_disk_bytes = bytes;
    }

    fn track_data_finish_time(&mut self, elapsed: Duration) {
        self.data_finish_time = elapsed;
    }
}
