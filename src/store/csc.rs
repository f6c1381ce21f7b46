//! Sketch-indexed log store.
//!
//! Every record is lowercased and tokenized; all tokens are added to the
//! sketch under the record's posting.  A query asks the sketch for the
//! postings that may hold every query token, then post-filters only those.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, trace};

use super::{FinishTrace, IngestTrace, LogStore, LogStoreReader, PostingAssigner, QueryTrace, Stage};
use crate::StoreError;
use crate::bitset::WordBitSet;
use crate::sketch::{self, Sketch, SketchConfig};
use crate::storage::{self, BatchReader, BatchWriter};
use crate::tokenizer::{self, Tokenizer, WindowTokenizer};

/// Sketch file name inside the index directory.
pub const INDEX_FILE_NAME: &str = "csc";

// ------------------------------------------------------------------------------------------------
// Writer
// ------------------------------------------------------------------------------------------------

#[derive(Debug)]
struct Ingest {
    sketch: Box<dyn Sketch>,
    data: BatchWriter,
}

/// Token scratch reused across records.
#[derive(Debug, Default)]
struct TokenBuffer {
    lowercase: Vec<u8>,
    offsets: Vec<usize>,
    lengths: Vec<usize>,
}

/// A sketch-indexed store being built.
pub struct CscLogStore {
    root: PathBuf,
    tokenizer: Box<dyn Tokenizer>,
    assigner: PostingAssigner,
    buffer: TokenBuffer,
    stage: Stage<Ingest, CscLogStoreReader>,
}

impl std::fmt::Debug for CscLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CscLogStore")
            .field("root", &self.root)
            .field("max_postings", &self.assigner.max_postings())
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl CscLogStore {
    /// Creates an empty store under `root` with a sketch sized by `config`.
    ///
    /// `config.posting_universe` is the number of postings records are
    /// spread over.
    pub fn create(
        root: impl Into<PathBuf>,
        tokenizer: Box<dyn Tokenizer>,
        config: &SketchConfig,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        let sketch = sketch::create_sketch(config)?;
        let data = BatchWriter::new(storage::data_directory(&root));
        info!(
            path = %root.display(),
            kind = ?sketch.kind(),
            capacity_bits = config.capacity_bits,
            repetitions = config.repetitions,
            postings = config.posting_universe,
            "csc store created"
        );
        Ok(Self {
            root,
            tokenizer,
            assigner: PostingAssigner::new(config.posting_universe),
            buffer: TokenBuffer::default(),
            stage: Stage::Ingesting(Ingest { sketch, data }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LogStore for CscLogStore {
    fn add_record(
        &mut self,
        record: &[u8],
        source_id: u32,
        telemetry: Option<&mut dyn IngestTrace>,
    ) -> Result<(), StoreError> {
        let ingest = self.stage.ingesting()?;
        let posting = self.assigner.assign(source_id, record.len());
        ingest.data.add_record(record, posting as usize)?;

        let TokenBuffer {
            lowercase,
            offsets,
            lengths,
        } = &mut self.buffer;
        tokenizer::to_lowercase_into(record, lowercase);
        offsets.clear();
        lengths.clear();
        self.tokenizer.tokenize(lowercase, &mut |_, offset, length| {
            offsets.push(offset);
            lengths.push(length);
        });
        ingest.sketch.update_bulk(lowercase, offsets, lengths, posting)?;

        trace!(source_id, posting, tokens = offsets.len(), "record ingested");
        if let Some(telemetry) = telemetry {
            telemetry.track_ingested_line(source_id, offsets.len());
        }
        Ok(())
    }

    fn finish(&mut self, telemetry: &mut dyn FinishTrace) -> Result<(), StoreError> {
        let Ingest { sketch, mut data } = self.stage.begin_finish()?;

        telemetry.track_sketch_memory_usage(sketch.estimated_memory_usage_bytes());
        let start = Instant::now();
        let index_path = storage::index_directory(&self.root).join(INDEX_FILE_NAME);
        let sketch_bytes = sketch::write_index_file(&index_path, sketch.as_ref())?;
        telemetry.track_sketch_disk_usage(sketch_bytes);
        telemetry.track_sketch_finish_time(start.elapsed());

        let start = Instant::now();
        data.flush()?;
        telemetry.track_data_finish_time(start.elapsed());
        telemetry.track_data_disk_usage(storage::directory_size(data.directory())?);

        self.stage = Stage::Sealed(CscLogStoreReader::new(sketch, data.into_reader()?));
        info!(path = %self.root.display(), sketch_bytes, "csc store finished");
        Ok(())
    }

    fn reader(&self) -> Result<&dyn LogStoreReader, StoreError> {
        let reader: &dyn LogStoreReader = self.stage.sealed()?;
        Ok(reader)
    }

    fn estimated_memory_usage_bytes(&self) -> usize {
        match &self.stage {
            Stage::Ingesting(ingest) => ingest.sketch.estimated_memory_usage_bytes(),
            Stage::Sealed(reader) => reader.estimated_memory_usage_bytes(),
            Stage::Broken => 0,
        }
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        match self.stage {
            Stage::Ingesting(Ingest { sketch, data }) => {
                sketch.close()?;
                data.close()?;
            }
            Stage::Sealed(reader) => Box::new(reader).close()?,
            Stage::Broken => {}
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// Queries a sealed sketch-indexed store.
#[derive(Debug)]
pub struct CscLogStoreReader {
    sketch: Box<dyn Sketch>,
    data: BatchReader,
    ngrams: WindowTokenizer,
}

impl CscLogStoreReader {
    fn new(sketch: Box<dyn Sketch>, data: BatchReader) -> Self {
        Self {
            sketch,
            data,
            ngrams: WindowTokenizer::ngram(),
        }
    }

    /// Opens the store under `root`, mapping the sketch and the data.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let sketch = sketch::open_index_file(storage::index_directory(root).join(INDEX_FILE_NAME))?;
        let data = BatchReader::open(storage::data_directory(root))?;
        info!(path = %root.display(), batches = data.batch_count(), "csc reader loaded");
        Ok(Self::new(sketch, data))
    }

    /// The n-grams of `needle`, preceded by `needle` itself when `whole` is set.
    fn query_tokens<'a>(&self, needle: &'a [u8], whole: bool) -> Vec<&'a [u8]> {
        let mut tokens = Vec::new();
        if whole {
            tokens.push(needle);
        }
        self.ngrams.tokenize(needle, &mut |_, offset, length| {
            tokens.push(&needle[offset..offset + length]);
        });
        tokens
    }

    fn post_filter(
        &self,
        needle: &[u8],
        candidates: &WordBitSet,
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
    ) -> Result<(), StoreError> {
        debug!(candidates = candidates.cardinality(), batches = self.data.batch_count(), "candidates located");
        storage::read_and_post_filter(&self.data, needle, candidates, consumer, telemetry)?;
        Ok(())
    }
}

impl LogStoreReader for CscLogStoreReader {
    fn query_token(
        &self,
        token: &[u8],
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
        load_data: bool,
    ) -> Result<(), StoreError> {
        let needle = tokenizer::to_lowercase(token);
        let candidates = self.sketch.query_all(&self.query_tokens(&needle, true))?;
        if load_data {
            self.post_filter(&needle, &candidates, consumer, telemetry)?;
        }
        Ok(())
    }

    fn query_contains(
        &self,
        needle: &[u8],
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
        load_data: bool,
    ) -> Result<(), StoreError> {
        let needle = tokenizer::to_lowercase(needle);
        let tokens = self.query_tokens(&needle, false);
        if tokens.is_empty() {
            // Too short for any n-gram: the sketch cannot narrow it down.
            debug!(needle_len = needle.len(), "no query n-grams, scanning all batches");
            if load_data {
                storage::read_all_and_post_filter(&self.data, &needle, consumer, telemetry)?;
            }
            return Ok(());
        }
        let candidates = self.sketch.query_all(&tokens)?;
        if load_data {
            self.post_filter(&needle, &candidates, consumer, telemetry)?;
        }
        Ok(())
    }

    fn estimated_memory_usage_bytes(&self) -> usize {
        self.sketch.estimated_memory_usage_bytes()
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        let CscLogStoreReader { sketch, data, .. } = *self;
        sketch.close()?;
        data.close()?;
        Ok(())
    }
}
