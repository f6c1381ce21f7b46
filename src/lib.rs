//! # cscindex
//!
//! A compact index for log records built on **circular-shift-and-coalesce
//! (CSC) sketches**.  Records are spread over a fixed number of postings and
//! stored compressed per posting; the tokens of every record go into a
//! probabilistic sketch that maps a query term to the few postings that may
//! contain it.  Only those postings are decompressed and verified, so
//! results are exact while the index stays a small fraction of the data.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cscindex::store::{FinishStats, NoopTrace};
//! use cscindex::tokenizer::WindowTokenizer;
//! use cscindex::{StoreConfig, StoreType};
//!
//! let config = StoreConfig::default();
//! let mut store = cscindex::create_store("/tmp/logs", Box::new(WindowTokenizer::full()), &config).unwrap();
//!
//! store.add_record(b"GET /api/v2/timeseries 200", 7, None).unwrap();
//! store.add_record(b"GET /api/v2/problems 503", 7, None).unwrap();
//! store.finish(&mut FinishStats::default()).unwrap();
//! store.close().unwrap();
//!
//! let reader = cscindex::load_reader(StoreType::Csc, "/tmp/logs").unwrap();
//! let mut lines = Vec::new();
//! reader
//!     .query_token(b"problems", &mut |line| lines.push(line.to_vec()), &mut NoopTrace, true)
//!     .unwrap();
//! assert_eq!(lines, vec![b"GET /api/v2/problems 503".to_vec()]);
//! reader.close().unwrap();
//! ```
//!
//! ## Features
//!
//! - **No false negatives**: every record containing the term is returned.
//! - **Exact results**: candidate postings are post-filtered with a
//!   case-insensitive Boyer-Moore matcher.
//! - **Zero-copy loading**: sketch and data files are memory-mapped.
//! - **Two sketch layouts**: a single shifting bloom filter (`csc`) or
//!   repeated, partitioned filters (`csc-bf`), plus a `scan` baseline.
//! - **CRC32 integrity** on the batch offset header.

pub mod bitset;
pub mod encoding;
pub mod memory;
pub mod sketch;
pub mod storage;
pub mod store;
pub mod tokenizer;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use sketch::{SketchConfig, SketchError};
use storage::StorageError;
use store::{CscLogStore, CscLogStoreReader, LogStore, LogStoreReader, ScanLogStore, ScanLogStoreReader};
use tokenizer::Tokenizer;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by stores and readers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The store type selector names no known back-end.
    #[error("unknown store type: {0}")]
    UnknownStoreType(String),

    /// Queried before `finish`.
    #[error("store not finished")]
    NotFinished,

    /// Written to, or finished, after `finish`.
    #[error("store already finished")]
    AlreadyFinished,

    /// Filesystem error outside sketch and batch files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Sketch(#[from] SketchError),

    #[error("{0}")]
    Storage(#[from] StorageError),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Store back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    /// One shifting bloom filter; partitions equal postings.
    #[default]
    Csc,
    /// Two partitioned repetitions, `max_posting_count / 8` partitions each.
    CscBf,
    /// No index; every query scans all data.
    Scan,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Csc => "csc",
            StoreType::CscBf => "csc-bf",
            StoreType::Scan => "scan",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = StoreError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csc" => Ok(StoreType::Csc),
            "csc-bf" => Ok(StoreType::CscBf),
            "scan" => Ok(StoreType::Scan),
            _ => Err(StoreError::UnknownStoreType(s.to_string())),
        }
    }
}

const SKETCH_HASH_COUNT: usize = 4;
const CSC_BF_REPETITIONS: usize = 2;
const CSC_BF_POSTINGS_PER_PARTITION: usize = 8;

/// Configuration for [`create_store`].
///
/// # Example
///
/// ```rust
/// use cscindex::{StoreConfig, StoreType};
///
/// let config = StoreConfig {
///     store_type: "csc-bf".parse().unwrap(),
///     ..StoreConfig::default()
/// };
/// assert_eq!(config.store_type, StoreType::CscBf);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Default: [`StoreType::Csc`].
    pub store_type: StoreType,

    /// Number of postings records are spread over.
    ///
    /// Default: 2048. Must be a power of two for the sketch back-ends.
    pub max_posting_count: usize,

    /// Sketch size in MiB.
    ///
    /// Default: 8. Must be ≥ 1.
    pub sketch_size_mb: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Csc,
            max_posting_count: 2048,
            sketch_size_mb: 8,
        }
    }
}

impl StoreConfig {
    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_posting_count < 1 {
            return Err(StoreError::InvalidConfig("max_posting_count must be >= 1".into()));
        }
        if self.max_posting_count > u32::MAX as usize {
            return Err(StoreError::InvalidConfig("max_posting_count must fit in u32".into()));
        }
        if self.sketch_size_mb < 1 {
            return Err(StoreError::InvalidConfig("sketch_size_mb must be >= 1".into()));
        }
        if let Some(params) = self.sketch_params() {
            params.validate().map_err(|e| match e {
                SketchError::InvalidConfig(message) => StoreError::InvalidConfig(message),
                other => StoreError::Sketch(other),
            })?;
        }
        Ok(())
    }

    /// Sketch sizing for the configured back-end; `None` for [`StoreType::Scan`].
    pub fn sketch_params(&self) -> Option<SketchConfig> {
        let capacity_bits = self.sketch_size_mb.saturating_mul(8 * 1024 * 1024);
        match self.store_type {
            StoreType::Csc => Some(SketchConfig {
                capacity_bits,
                hash_count: SKETCH_HASH_COUNT,
                repetitions: 1,
                partitions: self.max_posting_count,
                posting_universe: self.max_posting_count,
            }),
            StoreType::CscBf => Some(SketchConfig {
                capacity_bits,
                hash_count: SKETCH_HASH_COUNT,
                repetitions: CSC_BF_REPETITIONS,
                partitions: self.max_posting_count / CSC_BF_POSTINGS_PER_PARTITION,
                posting_universe: self.max_posting_count,
            }),
            StoreType::Scan => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Entry points
// ------------------------------------------------------------------------------------------------

/// Creates an empty store of `config.store_type` under `root`.
///
/// `tokenizer` splits records into index tokens; the scan back-end does
/// not use it.
///
/// # Errors
///
/// Returns [`StoreError::InvalidConfig`] if any configuration parameter
/// is out of range.
pub fn create_store(
    root: impl Into<PathBuf>,
    tokenizer: Box<dyn Tokenizer>,
    config: &StoreConfig,
) -> Result<Box<dyn LogStore>, StoreError> {
    config.validate()?;
    let root = root.into();
    match config.sketch_params() {
        Some(params) => Ok(Box::new(CscLogStore::create(root, tokenizer, &params)?)),
        None => Ok(Box::new(ScanLogStore::create(root, config.max_posting_count))),
    }
}

/// Reopens a finished store under `root` read-only.
pub fn load_reader(
    store_type: StoreType,
    root: impl AsRef<Path>,
) -> Result<Box<dyn LogStoreReader>, StoreError> {
    let root = root.as_ref();
    info!(path = %root.display(), store_type = %store_type, "loading reader");
    match store_type {
        StoreType::Csc | StoreType::CscBf => Ok(Box::new(CscLogStoreReader::open(root)?)),
        StoreType::Scan => Ok(Box::new(ScanLogStoreReader::open(root)?)),
    }
}
