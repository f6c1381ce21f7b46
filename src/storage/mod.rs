//! Compressed per-posting batch storage.
//!
//! Records are grouped into batches, one per posting.  While a store is
//! being built, every batch that received a record has its own zstd stream
//! in a staging file.  [`BatchWriter::flush`] closes those streams and
//! concatenates them into a single data file, with a header holding the
//! offset of each batch.  Reads decompress exactly one batch into a
//! caller-owned scratch buffer.
//!
//! # On-disk layout
//!
//! ```text
//! data/data     [zstd frame of batch 0][zstd frame of batch 1]…
//! data/header   [MAX_ORIGINAL u64][OFFSET_COUNT u32][OFFSET u64 × OFFSET_COUNT][CRC32 u32]
//! data/tmp/<n>  staging stream of batch n (removed by flush)
//! ```
//!
//! The offset table has one entry per batch plus a sentinel holding the
//! data file length, so batch `n` spans `offsets[n]..offsets[n + 1]`.  A
//! batch that never received a record spans zero bytes and reads as empty.
//! Inside a decompressed batch every record is `[LEN u32][bytes]`.
//!
//! # Concurrency model
//!
//! Writing is single-threaded.  A flushed [`BatchReader`] is immutable and
//! `Sync`; concurrent readers each bring their own scratch buffer.

pub mod boyer_moore;
pub mod post_filter;

#[cfg(test)]
mod tests;

pub use boyer_moore::BoyerMoore;
pub use post_filter::{read_all_and_post_filter, read_and_post_filter};

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::encoding::{self, Encode, EncodingError};
use crate::memory::{Memory, MemoryError};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

const DATA_FILE_NAME: &str = "data";
const HEADER_FILE_NAME: &str = "header";
const STAGING_DIR_NAME: &str = "tmp";
const RECORD_LEN_SIZE: usize = 4;
const HEADER_CHECKSUM_SIZE: usize = 4;
const COMPRESSION_LEVEL: i32 = zstd::DEFAULT_COMPRESSION_LEVEL;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by batch storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Data file mapping error.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Batches were read before [`BatchWriter::flush`].
    #[error("data not yet flushed")]
    NotFlushed,

    /// A record was added, or flush called, after flushing.
    #[error("batch data already flushed")]
    AlreadyFlushed,

    /// Requested batch index is past the last batch.
    #[error("batch {batch} out of range ({batch_count} batches)")]
    BatchOutOfRange {
        /// Requested batch.
        batch: usize,
        /// Number of batches in the store.
        batch_count: usize,
    },

    /// Header checksum mismatch.
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// Structurally invalid header or batch content.
    #[error("Corrupt batch data: {0}")]
    Corrupt(String),
}

// ------------------------------------------------------------------------------------------------
// Directories
// ------------------------------------------------------------------------------------------------

/// Directory holding the batch data of the store rooted at `root`.
pub fn data_directory(root: &Path) -> PathBuf {
    root.join("data")
}

/// Directory holding the index files of the store rooted at `root`.
pub fn index_directory(root: &Path) -> PathBuf {
    root.join("index")
}

/// Total size in bytes of all regular files under `path`.
pub fn directory_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += directory_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

// ------------------------------------------------------------------------------------------------
// Header
// ------------------------------------------------------------------------------------------------

struct BatchHeader {
    max_original_batch_size: u64,
    offsets: Vec<u64>,
}

impl Encode for BatchHeader {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let start = buf.len();
        self.max_original_batch_size.encode_to(buf)?;
        encoding::encode_vec(&self.offsets, buf)?;
        let mut hasher = Crc32::new();
        hasher.update(&buf[start..]);
        hasher.finalize().encode_to(buf)
    }
}

impl BatchHeader {
    fn decode_checked(buf: &[u8]) -> Result<Self, StorageError> {
        if buf.len() < HEADER_CHECKSUM_SIZE {
            return Err(StorageError::Corrupt("header file too small".into()));
        }
        let (body, trailer) = buf.split_at(buf.len() - HEADER_CHECKSUM_SIZE);
        let (stored, _) = encoding::decode_from_slice::<u32>(trailer)?;
        let mut hasher = Crc32::new();
        hasher.update(body);
        if hasher.finalize() != stored {
            error!("batch header checksum mismatch");
            return Err(StorageError::ChecksumMismatch);
        }

        let (max_original_batch_size, consumed) = encoding::decode_from_slice::<u64>(body)?;
        let (offsets, _) = encoding::decode_vec::<u64>(&body[consumed..])?;
        if offsets.is_empty() || offsets.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(StorageError::Corrupt("offsets must be non-empty and ascending".into()));
        }
        Ok(Self {
            max_original_batch_size,
            offsets,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Writer
// ------------------------------------------------------------------------------------------------

type StagingStream = zstd::stream::write::Encoder<'static, BufWriter<File>>;

/// Appends records to per-posting compressed streams until flushed.
pub struct BatchWriter {
    directory: PathBuf,
    streams: Vec<Option<StagingStream>>,
    original_sizes: Vec<u64>,
    flushed: Option<BatchReader>,
}

impl std::fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("directory", &self.directory)
            .field("batches", &self.streams.len())
            .field("flushed", &self.flushed.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchWriter {
    /// Creates a writer storing its files under `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            streams: Vec::new(),
            original_sizes: Vec::new(),
            flushed: None,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn staging_path(&self, batch: usize) -> PathBuf {
        self.directory.join(STAGING_DIR_NAME).join(batch.to_string())
    }

    /// Appends a length-prefixed record to `batch`, opening its stream on first use.
    pub fn add_record(&mut self, record: &[u8], batch: usize) -> Result<(), StorageError> {
        if self.flushed.is_some() {
            return Err(StorageError::AlreadyFlushed);
        }
        if batch >= self.streams.len() {
            let new_len = (batch + 1).max(self.streams.len() * 2);
            self.streams.resize_with(new_len, || None);
            self.original_sizes.resize(new_len, 0);
        }

        if self.streams[batch].is_none() {
            let path = self.staging_path(batch);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = BufWriter::new(File::create(&path)?);
            trace!(batch, path = %path.display(), "opened staging stream");
            self.streams[batch] = Some(zstd::stream::write::Encoder::new(file, COMPRESSION_LEVEL)?);
        }

        let length = encoding::len_to_u32(record.len())?;
        if let Some(stream) = self.streams[batch].as_mut() {
            stream.write_all(&length.to_le_bytes())?;
            stream.write_all(record)?;
        }
        self.original_sizes[batch] += (record.len() + RECORD_LEN_SIZE) as u64;
        Ok(())
    }

    /// Number of batches up to and including the highest one written.
    fn observed_batches(&self) -> usize {
        self.streams
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1)
    }

    /// Consolidates all staged batches into the data and header files.
    ///
    /// Afterwards the writer serves reads and rejects further records.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.flushed.is_some() {
            return Err(StorageError::AlreadyFlushed);
        }
        let start = Instant::now();
        fs::create_dir_all(&self.directory)?;

        let batch_count = self.observed_batches();
        let mut offsets = Vec::with_capacity(batch_count + 1);
        let data_path = self.directory.join(DATA_FILE_NAME);
        let mut data = BufWriter::new(File::create(&data_path)?);
        let mut position = 0u64;

        for batch in 0..batch_count {
            offsets.push(position);
            let Some(stream) = self.streams[batch].take() else {
                continue;
            };
            let staged = stream.finish()?;
            staged.into_inner().map_err(|e| e.into_error())?.sync_all()?;

            let staging_path = self.staging_path(batch);
            let mut staged = File::open(&staging_path)?;
            position += io::copy(&mut staged, &mut data)?;
            drop(staged);
            fs::remove_file(&staging_path)?;
        }
        offsets.push(position);

        let data = data.into_inner().map_err(|e| e.into_error())?;
        data.sync_all()?;

        let header = BatchHeader {
            max_original_batch_size: self.original_sizes.iter().copied().max().unwrap_or(0),
            offsets,
        };
        let header_bytes = encoding::encode_to_vec(&header)?;
        let mut header_file = File::create(self.directory.join(HEADER_FILE_NAME))?;
        header_file.write_all(&header_bytes)?;
        header_file.sync_all()?;

        let staging_dir = self.directory.join(STAGING_DIR_NAME);
        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
        }

        info!(
            path = %self.directory.display(),
            batches = batch_count,
            bytes = position,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch data flushed"
        );

        self.flushed = Some(BatchReader::open(&self.directory)?);
        Ok(())
    }

    /// Reader over the flushed data.
    pub fn reader(&self) -> Result<&BatchReader, StorageError> {
        self.flushed.as_ref().ok_or(StorageError::NotFlushed)
    }

    /// Consumes the writer, keeping only the flushed reader.
    pub fn into_reader(self) -> Result<BatchReader, StorageError> {
        self.flushed.ok_or(StorageError::NotFlushed)
    }

    /// Reads one batch; see [`BatchReader::read_batch`].
    pub fn read_batch(
        &self,
        batch: usize,
        scratch: &mut Vec<u8>,
        consumer: &mut dyn FnMut(&[u8]),
    ) -> Result<(), StorageError> {
        self.reader()?.read_batch(batch, scratch, consumer)
    }

    /// Releases the flushed data mapping, if any.
    pub fn close(self) -> Result<(), StorageError> {
        match self.flushed {
            Some(reader) => reader.close(),
            None => Ok(()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// Random-access reader over flushed batch data.
#[derive(Debug)]
pub struct BatchReader {
    data: Memory,
    offsets: Vec<u64>,
    max_original_batch_size: usize,
}

impl BatchReader {
    /// Opens the data and header files under `directory`.
    ///
    /// The data file is memory-mapped.  It is written once by
    /// [`BatchWriter::flush`] and never modified afterwards.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StorageError> {
        let directory = directory.as_ref();
        let header = BatchHeader::decode_checked(&fs::read(directory.join(HEADER_FILE_NAME))?)?;

        let file = File::open(directory.join(DATA_FILE_NAME))?;
        let data_len = file.metadata()?.len();
        let data = if data_len == 0 {
            Memory::read_only(Vec::new())
        } else {
            // SAFETY: flushed data files are immutable once written.
            Memory::mapped(unsafe { Mmap::map(&file)? })
        };

        if header.offsets.last().copied() != Some(data_len) {
            return Err(StorageError::Corrupt(format!(
                "offset table ends at {:?}, data file has {data_len} bytes",
                header.offsets.last()
            )));
        }
        let max_original_batch_size = usize::try_from(header.max_original_batch_size)
            .map_err(|_| StorageError::Corrupt("batch size exceeds address space".into()))?;

        debug!(
            path = %directory.display(),
            batches = header.offsets.len() - 1,
            bytes = data_len,
            "batch reader opened"
        );
        Ok(Self {
            data,
            offsets: header.offsets,
            max_original_batch_size,
        })
    }

    /// Number of batch slots, including empty ones.
    pub fn batch_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Largest decompressed batch, in bytes.
    pub fn max_original_batch_size(&self) -> usize {
        self.max_original_batch_size
    }

    /// Decompresses `batch` into `scratch` and calls `consumer` once per record,
    /// in insertion order.  An empty batch calls nothing.
    pub fn read_batch(
        &self,
        batch: usize,
        scratch: &mut Vec<u8>,
        consumer: &mut dyn FnMut(&[u8]),
    ) -> Result<(), StorageError> {
        if batch >= self.batch_count() {
            return Err(StorageError::BatchOutOfRange {
                batch,
                batch_count: self.batch_count(),
            });
        }
        let start = self.offsets[batch] as usize;
        let end = self.offsets[batch + 1] as usize;
        if start == end {
            return Ok(());
        }

        // The decoder writes into initialized bytes only, never spare capacity.
        if scratch.len() < self.max_original_batch_size {
            scratch.resize(self.max_original_batch_size, 0);
        }
        let compressed = &self.data.as_slice()[start..end];
        let length = zstd::bulk::decompress_to_buffer(compressed, &mut scratch[..])?;

        let mut position = 0;
        while position < length {
            let (record_len, consumed) = encoding::decode_from_slice::<u32>(&scratch[position..length])?;
            let record_start = position + consumed;
            let record_end = record_start + record_len as usize;
            if record_end > length {
                return Err(StorageError::Corrupt(format!(
                    "record in batch {batch} overruns its batch"
                )));
            }
            consumer(&scratch[record_start..record_end]);
            position = record_end;
        }
        Ok(())
    }

    /// Releases the data mapping.
    pub fn close(self) -> Result<(), StorageError> {
        self.data.release()?;
        Ok(())
    }
}
