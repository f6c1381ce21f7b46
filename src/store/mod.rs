//! Log stores: ingestion, sealing and querying.
//!
//! A [`LogStore`] accepts records, assigns each one to a posting and keeps
//! it in compressed batch storage.  [`LogStore::finish`] seals the store;
//! from then on it serves queries through [`LogStore::reader`], and the
//! same files can be reopened read-only as a [`LogStoreReader`].
//!
//! Two back-ends exist:
//!
//! - [`CscLogStore`] indexes every record's tokens in a sketch and only
//!   reads the postings the sketch returns.
//! - [`ScanLogStore`] keeps data only and scans every posting.
//!
//! Both verify every candidate record exactly, so no back-end returns a
//! record that does not contain the queried bytes (case-insensitively).

pub mod csc;
pub mod scan;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use csc::{CscLogStore, CscLogStoreReader};
pub use scan::{ScanLogStore, ScanLogStoreReader};
pub use telemetry::{
    FinishStats, FinishTrace, IngestStats, IngestTrace, NoopTrace, QueryStats, QueryTrace,
};

use crate::StoreError;

/// Read-only query surface of a sealed store.
///
/// Queries lowercase their input and match case-insensitively.  With
/// `load_data == false` only the candidate lookup runs.
pub trait LogStoreReader: Send + Sync {
    /// Records containing `token`, located through the token and its n-grams.
    fn query_token(
        &self,
        token: &[u8],
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
        load_data: bool,
    ) -> Result<(), StoreError>;

    /// Records containing `needle` anywhere, located through its n-grams.
    fn query_contains(
        &self,
        needle: &[u8],
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
        load_data: bool,
    ) -> Result<(), StoreError>;

    /// Heap bytes held by the index.
    fn estimated_memory_usage_bytes(&self) -> usize;

    /// Releases the data and index mappings.
    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// A store under construction.
///
/// Ingestion is single-threaded.  After [`finish`](LogStore::finish) no
/// more records are accepted.
pub trait LogStore: Send {
    /// Stores `record` and indexes its tokens.
    fn add_record(
        &mut self,
        record: &[u8],
        source_id: u32,
        telemetry: Option<&mut dyn IngestTrace>,
    ) -> Result<(), StoreError>;

    /// Writes the index and consolidates the data.
    ///
    /// An error leaves the store unusable; it has to be rebuilt.
    fn finish(&mut self, telemetry: &mut dyn FinishTrace) -> Result<(), StoreError>;

    /// Query surface over the sealed store.
    fn reader(&self) -> Result<&dyn LogStoreReader, StoreError>;

    fn estimated_memory_usage_bytes(&self) -> usize;

    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

// ------------------------------------------------------------------------------------------------
// Lifecycle
// ------------------------------------------------------------------------------------------------

/// Where a store is in its lifecycle.
#[derive(Debug)]
pub(crate) enum Stage<W, R> {
    Ingesting(W),
    Sealed(R),
    /// `finish` failed part-way.
    Broken,
}

impl<W, R> Stage<W, R> {
    pub(crate) fn ingesting(&mut self) -> Result<&mut W, StoreError> {
        match self {
            Stage::Ingesting(writer) => Ok(writer),
            _ => Err(StoreError::AlreadyFinished),
        }
    }

    pub(crate) fn sealed(&self) -> Result<&R, StoreError> {
        match self {
            Stage::Sealed(reader) => Ok(reader),
            _ => Err(StoreError::NotFinished),
        }
    }

    /// Takes the writer out for sealing, leaving [`Stage::Broken`] behind
    /// until the caller stores the sealed reader.
    pub(crate) fn begin_finish(&mut self) -> Result<W, StoreError> {
        match std::mem::replace(self, Stage::Broken) {
            Stage::Ingesting(writer) => Ok(writer),
            other => {
                *self = other;
                Err(StoreError::AlreadyFinished)
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Posting assignment
// ------------------------------------------------------------------------------------------------

/// Bytes of one source that go into a posting before it spills into the next.
const POSTING_SPILL_SHIFT: u32 = 19;
const INITIAL_SOURCES: usize = 4096;

/// Maps records to postings.
///
/// A source starts at a hashed posting and moves one posting further for
/// every 512 KiB it has ingested, wrapping at `max_postings`.  The result
/// depends only on the bytes seen so far for that source.
#[derive(Debug, Clone)]
pub struct PostingAssigner {
    max_postings: u64,
    source_sizes: Vec<u64>,
}

impl PostingAssigner {
    pub fn new(max_postings: usize) -> Self {
        Self {
            max_postings: max_postings.max(1) as u64,
            source_sizes: vec![0; INITIAL_SOURCES],
        }
    }

    /// First posting of `source_id`.
    pub fn source_start(source_id: u32) -> u32 {
        source_id.wrapping_mul(0x915f_77f5).wrapping_add(13) & 0x7fff_ffff
    }

    /// Posting for the next record of `source_id`, `length` bytes long.
    pub fn assign(&mut self, source_id: u32, length: usize) -> u32 {
        let source = source_id as usize;
        if source >= self.source_sizes.len() {
            let new_len = (source + 1).max(self.source_sizes.len() * 2);
            self.source_sizes.resize(new_len, 0);
        }
        let seen = self.source_sizes[source];
        self.source_sizes[source] = seen + length as u64;
        let posting = (u64::from(Self::source_start(source_id)) + (seen >> POSTING_SPILL_SHIFT))
            % self.max_postings;
        posting as u32
    }

    pub fn max_postings(&self) -> usize {
        self.max_postings as usize
    }
}
