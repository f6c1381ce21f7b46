//! Circular-shift-and-coalesce (CSC) sketches.
//!
//! A sketch answers "which postings plausibly contain this token" with no
//! false negatives.  Two variants share the [`Sketch`] trait:
//!
//! - [`ShiftingBloomFilter`]: a single bit vector.  A `(token, posting)` pair
//!   sets bit `(hash(token) + posting) mod capacity` for every hash function,
//!   so a query reads the `partitions`-wide window after each anchor and every
//!   surviving bit offset *is* a posting.
//! - [`CscBloomFilter`]: `R` independent repetitions.  Postings are hashed
//!   into `P` partitions per repetition; a query maps surviving partition
//!   bits back to their postings and intersects the repetitions.
//!
//! Windows that run past the end of a vector wrap around to bit 0
//! ([`circular_range`]).  All moduli are bit masks, so capacities and
//! partition counts are powers of two.
//!
//! # Index file
//!
//! ```text
//! [KIND u8: 0 = shifting, 1 = csc][variant header, u32 LE fields][seeds u32 LE][bit vector words]
//! ```
//!
//! [`open_index_file`] maps the file and the bit vectors are zero-copy views
//! into the mapping.  [`read_from`] reads a plain stream into owned heap
//! memory.  Partition functions are never stored; they are re-derived from
//! the header on load.

pub mod csc;
pub mod shifting;

#[cfg(test)]
mod tests;

pub use csc::CscBloomFilter;
pub use shifting::ShiftingBloomFilter;

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;
use tracing::info;
use xxhash_rust::xxh32::xxh32;

use crate::bitset::WordBitSet;
use crate::encoding::{self, EncodingError};
use crate::memory::{Memory, MemoryError, MemoryReader};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by sketch construction, updates, queries and persistence.
#[derive(Debug, Error)]
pub enum SketchError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Bit vector memory error (read-only mutation, unmap failure, short payload).
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Construction parameters violate the sketch invariants.
    #[error("invalid sketch config: {0}")]
    InvalidConfig(String),

    /// The index file starts with an unknown variant byte.
    #[error("unknown sketch kind {0}")]
    UnknownKind(u8),

    /// A posting outside the range the sketch was sized for.
    #[error("posting {posting} out of range (limit {limit})")]
    PostingOutOfRange {
        /// The rejected posting.
        posting: u32,
        /// Exclusive upper bound.
        limit: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Sizing of a sketch.
///
/// `repetitions == 1` selects [`ShiftingBloomFilter`]; any larger power of
/// two selects [`CscBloomFilter`], which splits `capacity_bits` evenly across
/// repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SketchConfig {
    /// Total bits across all repetitions.
    pub capacity_bits: usize,
    /// Hash functions per repetition.
    pub hash_count: usize,
    /// Independent repetitions.
    pub repetitions: usize,
    /// Partitions per repetition (window width of a query).
    pub partitions: usize,
    /// Number of distinct postings the sketch can hold.
    pub posting_universe: usize,
}

impl SketchConfig {
    /// Capacity of one repetition in bits.
    pub fn repetition_capacity(&self) -> usize {
        self.capacity_bits / self.repetitions.max(1)
    }

    pub fn validate(&self) -> Result<(), SketchError> {
        if self.hash_count < 1 {
            return Err(SketchError::InvalidConfig("hash_count must be >= 1".into()));
        }
        if self.repetitions < 1 || !self.repetitions.is_power_of_two() {
            return Err(SketchError::InvalidConfig(format!(
                "repetitions must be a power of two >= 1, got {}",
                self.repetitions
            )));
        }
        let capacity = self.repetition_capacity();
        if !self.capacity_bits.is_power_of_two() || capacity < 64 {
            return Err(SketchError::InvalidConfig(format!(
                "capacity_bits must be a power of two with >= 64 bits per repetition, got {}",
                self.capacity_bits
            )));
        }
        // Header fields are 4 bytes wide.
        to_u32(capacity, "capacity per repetition")?;
        to_u32(self.hash_count, "hash_count")?;
        to_u32(self.repetitions, "repetitions")?;
        if !self.partitions.is_power_of_two() || self.partitions > capacity {
            return Err(SketchError::InvalidConfig(format!(
                "partitions must be a power of two <= {capacity}, got {}",
                self.partitions
            )));
        }
        if self.posting_universe < 1 || self.posting_universe > u32::MAX as usize {
            return Err(SketchError::InvalidConfig(format!(
                "posting_universe must be in [1, u32::MAX], got {}",
                self.posting_universe
            )));
        }
        if self.repetitions == 1 && self.posting_universe > self.partitions {
            return Err(SketchError::InvalidConfig(format!(
                "a single-repetition sketch holds at most {} postings, got {}",
                self.partitions, self.posting_universe
            )));
        }
        Ok(())
    }
}

/// Builds an empty sketch of the variant selected by `config.repetitions`.
pub fn create_sketch(config: &SketchConfig) -> Result<Box<dyn Sketch>, SketchError> {
    config.validate()?;
    if config.repetitions == 1 {
        Ok(Box::new(ShiftingBloomFilter::new(
            config.capacity_bits,
            config.hash_count,
            config.partitions,
        )?))
    } else {
        Ok(Box::new(CscBloomFilter::new(config)?))
    }
}

// ------------------------------------------------------------------------------------------------
// Sketch trait
// ------------------------------------------------------------------------------------------------

/// On-disk variant discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SketchKind {
    Shifting = 0,
    Csc = 1,
}

impl TryFrom<u8> for SketchKind {
    type Error = SketchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SketchKind::Shifting),
            1 => Ok(SketchKind::Csc),
            other => Err(SketchError::UnknownKind(other)),
        }
    }
}

/// Approximate multi-set membership over `(token, posting)` pairs.
///
/// Updates require `&mut self` and are single-threaded.  Queries take
/// `&self` and allocate their own scratch, so a sealed sketch can serve
/// concurrent queries.
pub trait Sketch: Send + Sync + fmt::Debug {
    fn kind(&self) -> SketchKind;

    /// Records that `token` occurs in `posting`.
    fn update(&mut self, token: &[u8], posting: u32) -> Result<(), SketchError>;

    /// Records the tokens `bytes[offsets[i]..offsets[i] + lengths[i]]`, all in
    /// `posting`.
    fn update_bulk(
        &mut self,
        bytes: &[u8],
        offsets: &[usize],
        lengths: &[usize],
        posting: u32,
    ) -> Result<(), SketchError> {
        for (&offset, &length) in offsets.iter().zip(lengths) {
            self.update(&bytes[offset..offset + length], posting)?;
        }
        Ok(())
    }

    /// Postings that plausibly contain `token`, as a bit set over posting ids.
    fn query(&self, token: &[u8]) -> Result<WordBitSet, SketchError>;

    /// Postings that plausibly contain every token.  Stops as soon as the
    /// running intersection is empty.  An empty token list yields an empty set.
    fn query_all(&self, tokens: &[&[u8]]) -> Result<WordBitSet, SketchError> {
        let Some((first, rest)) = tokens.split_first() else {
            return Ok(WordBitSet::with_capacity(0));
        };
        let mut result = self.query(first)?;
        for token in rest {
            if result.is_empty() {
                break;
            }
            result.and(&self.query(token)?)?;
        }
        Ok(result)
    }

    /// Heap bytes held by the bit vectors.  Mapped vectors count as zero.
    fn estimated_memory_usage_bytes(&self) -> usize;

    /// Writes the variant header and bit vectors (without the kind byte).
    fn write_to(&self, out: &mut dyn Write) -> Result<(), SketchError>;

    /// Releases the bit vectors.  Mapped memory is unmapped.
    fn close(self: Box<Self>) -> Result<(), SketchError>;
}

// ------------------------------------------------------------------------------------------------
// Shared helpers
// ------------------------------------------------------------------------------------------------

/// Anchor of `token` under hash `seed` in a vector of `capacity_mask + 1` bits.
#[inline]
pub(crate) fn anchor(token: &[u8], seed: u32, capacity_mask: usize) -> usize {
    xxh32(token, seed) as usize & capacity_mask
}

/// Reads the `width` bits starting at `anchor`, wrapping past `capacity`
/// back to bit 0.
pub(crate) fn circular_range(
    bits: &WordBitSet,
    anchor: usize,
    width: usize,
    capacity: usize,
) -> Result<WordBitSet, SketchError> {
    let end = anchor + width;
    if end <= capacity {
        return Ok(bits.get(anchor, end)?);
    }
    let mut head = bits.get(anchor, capacity)?;
    let tail = bits.get(0, end - capacity)?;
    head.or_at(&tail, capacity - anchor)?;
    Ok(head)
}

/// ANDs the windows of `token` under every seed.
pub(crate) fn intersect_windows(
    bits: &WordBitSet,
    token: &[u8],
    seeds: &[u32],
    width: usize,
    capacity: usize,
) -> Result<WordBitSet, SketchError> {
    let mask = capacity - 1;
    let mut result: Option<WordBitSet> = None;
    for &seed in seeds {
        let window = circular_range(bits, anchor(token, seed, mask), width, capacity)?;
        let acc = match result.take() {
            None => window,
            Some(mut acc) => {
                acc.and(&window)?;
                acc
            }
        };
        let empty = acc.is_empty();
        result = Some(acc);
        if empty {
            break;
        }
    }
    Ok(result.unwrap_or_else(|| WordBitSet::with_capacity(0)))
}

/// Reads one little-endian `u32` header field through a [`MemoryReader`].
pub(crate) fn read_u32(reader: &mut MemoryReader<'_>) -> Result<u32, SketchError> {
    let (value, consumed) = encoding::decode_from_slice::<u32>(reader.peek())?;
    reader.skip(consumed);
    Ok(value)
}

pub(crate) fn to_u32(value: usize, field: &str) -> Result<u32, SketchError> {
    u32::try_from(value)
        .map_err(|_| SketchError::InvalidConfig(format!("{field} {value} exceeds u32::MAX")))
}

// ------------------------------------------------------------------------------------------------
// Index file
// ------------------------------------------------------------------------------------------------

/// Writes `[kind][sketch]` to `path`, creating parent directories.
///
/// Returns the number of bytes written.
pub fn write_index_file(path: impl AsRef<Path>, sketch: &dyn Sketch) -> Result<u64, SketchError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    out.write_all(&[sketch.kind() as u8])?;
    sketch.write_to(&mut out)?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    let bytes = file.metadata()?.len();

    info!(path = %path.display(), kind = ?sketch.kind(), bytes, "sketch written");
    Ok(bytes)
}

/// Loads a sketch from a plain stream into owned heap memory.
pub fn read_from<R: Read>(reader: &mut R) -> Result<Box<dyn Sketch>, SketchError> {
    let kind = encoding::read_fixed::<u8, _>(reader)?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let memory = Memory::read_only(bytes);
    load(kind, &mut MemoryReader::new(&memory))
}

/// Maps `path` read-only and loads the sketch with zero-copy bit vectors.
///
/// The mapping lives until [`Sketch::close`] is called on the result.
pub fn open_index_file(path: impl AsRef<Path>) -> Result<Box<dyn Sketch>, SketchError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    // SAFETY: the index file is written once by `write_index_file` and never
    // modified afterwards, so the mapped bytes stay stable for the mapping's
    // lifetime.
    let map = unsafe { Mmap::map(&file)? };
    let mapping = Memory::mapped(map);
    let sketch = decode(&mapping)?;

    info!(path = %path.display(), kind = ?sketch.kind(), "sketch mapped");
    Ok(Box::new(MappedSketch { sketch, mapping }))
}

fn decode(memory: &Memory) -> Result<Box<dyn Sketch>, SketchError> {
    let mut reader = MemoryReader::new(memory);
    let (kind, consumed) = encoding::decode_from_slice::<u8>(reader.peek())?;
    reader.skip(consumed);
    load(kind, &mut reader)
}

fn load(kind: u8, reader: &mut MemoryReader<'_>) -> Result<Box<dyn Sketch>, SketchError> {
    match SketchKind::try_from(kind)? {
        SketchKind::Shifting => Ok(Box::new(ShiftingBloomFilter::load(reader)?)),
        SketchKind::Csc => Ok(Box::new(CscBloomFilter::load(reader)?)),
    }
}

/// A sketch whose bit vectors are views into a file mapping it owns.
#[derive(Debug)]
struct MappedSketch {
    sketch: Box<dyn Sketch>,
    mapping: Memory,
}

impl Sketch for MappedSketch {
    fn kind(&self) -> SketchKind {
        self.sketch.kind()
    }

    fn update(&mut self, token: &[u8], posting: u32) -> Result<(), SketchError> {
        self.sketch.update(token, posting)
    }

    fn query(&self, token: &[u8]) -> Result<WordBitSet, SketchError> {
        self.sketch.query(token)
    }

    fn query_all(&self, tokens: &[&[u8]]) -> Result<WordBitSet, SketchError> {
        self.sketch.query_all(tokens)
    }

    fn estimated_memory_usage_bytes(&self) -> usize {
        self.sketch.estimated_memory_usage_bytes()
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<(), SketchError> {
        self.sketch.write_to(out)
    }

    fn close(self: Box<Self>) -> Result<(), SketchError> {
        let MappedSketch { sketch, mapping } = *self;
        // Views go first so the mapping is unshared when released.
        sketch.close()?;
        mapping.release()?;
        Ok(())
    }
}
