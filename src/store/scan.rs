//! Data-only log store.  Every query scans every posting.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, trace};

use super::{FinishTrace, IngestTrace, LogStore, LogStoreReader, PostingAssigner, QueryTrace, Stage};
use crate::StoreError;
use crate::storage::{self, BatchReader, BatchWriter};
use crate::tokenizer;

/// A data-only store being built.
#[derive(Debug)]
pub struct ScanLogStore {
    root: PathBuf,
    assigner: PostingAssigner,
    stage: Stage<BatchWriter, ScanLogStoreReader>,
}

impl ScanLogStore {
    pub fn create(root: impl Into<PathBuf>, max_postings: usize) -> Self {
        let root = root.into();
        let data = BatchWriter::new(storage::data_directory(&root));
        info!(path = %root.display(), max_postings, "scan store created");
        Self {
            root,
            assigner: PostingAssigner::new(max_postings),
            stage: Stage::Ingesting(data),
        }
    }
}

impl LogStore for ScanLogStore {
    fn add_record(
        &mut self,
        record: &[u8],
        source_id: u32,
        telemetry: Option<&mut dyn IngestTrace>,
    ) -> Result<(), StoreError> {
        let data = self.stage.ingesting()?;
        let posting = self.assigner.assign(source_id, record.len());
        data.add_record(record, posting as usize)?;

        trace!(source_id, posting, "record stored");
        if let Some(telemetry) = telemetry {
            telemetry.track_ingested_line(source_id, 0);
        }
        Ok(())
    }

    fn finish(&mut self, telemetry: &mut dyn FinishTrace) -> Result<(), StoreError> {
        let mut data = self.stage.begin_finish()?;
        let start = Instant::now();
        data.flush()?;
        telemetry.track_data_finish_time(start.elapsed());
        telemetry.track_data_disk_usage(storage::directory_size(data.directory())?);

        self.stage = Stage::Sealed(ScanLogStoreReader {
            data: data.into_reader()?,
        });
        info!(path = %self.root.display(), "scan store finished");
        Ok(())
    }

    fn reader(&self) -> Result<&dyn LogStoreReader, StoreError> {
        let reader: &dyn LogStoreReader = self.stage.sealed()?;
        Ok(reader)
    }

    fn estimated_memory_usage_bytes(&self) -> usize {
        0
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        match self.stage {
            Stage::Ingesting(data) => data.close()?,
            Stage::Sealed(reader) => reader.data.close()?,
            Stage::Broken => {}
        }
        Ok(())
    }
}

/// Queries a sealed data-only store.
#[derive(Debug)]
pub struct ScanLogStoreReader {
    data: BatchReader,
}

impl ScanLogStoreReader {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let data = BatchReader::open(storage::data_directory(root))?;
        info!(path = %root.display(), batches = data.batch_count(), "scan reader loaded");
        Ok(Self { data })
    }

    fn scan(
        &self,
        needle: &[u8],
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
    ) -> Result<(), StoreError> {
        let needle = tokenizer::to_lowercase(needle);
        storage::read_all_and_post_filter(&self.data, &needle, consumer, telemetry)?;
        Ok(())
    }
}

/// Without an index, reading the data is the query, so `load_data` is ignored.
impl LogStoreReader for ScanLogStoreReader {
    fn query_token(
        &self,
        token: &[u8],
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
        _load_data: bool,
    ) -> Result<(), StoreError> {
        self.scan(token, consumer, telemetry)
    }

    fn query_contains(
        &self,
        needle: &[u8],
        consumer: &mut dyn FnMut(&[u8]),
        telemetry: &mut dyn QueryTrace,
        _load_data: bool,
    ) -> Result<(), StoreError> {
        self.scan(needle, consumer, telemetry)
    }

    fn estimated_memory_usage_bytes(&self) -> usize {
        0
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.data.close()?;
        Ok(())
    }
}
