//! Single-repetition sketch ("shifting bloom filter").
//!
//! # Layout
//!
//! ```text
//! [capacity u32][hash_count u32][partitions u32][seed u32 × hash_count][capacity / 8 bytes]
//! ```

use std::io::Write;

use tracing::trace;

use super::{Sketch, SketchConfig, SketchError, SketchKind, anchor, intersect_windows, read_u32, to_u32};
use crate::bitset::WordBitSet;
use crate::encoding::{self, Encode};
use crate::memory::MemoryReader;

/// One bit vector; posting `p` of a token lives at `anchor + p`.
#[derive(Debug)]
pub struct ShiftingBloomFilter {
    bits: WordBitSet,
    capacity: usize,
    partitions: usize,
    seeds: Vec<u32>,
}

impl ShiftingBloomFilter {
    /// Creates an empty filter with random hash seeds.
    pub fn new(capacity: usize, hash_count: usize, partitions: usize) -> Result<Self, SketchError> {
        let seeds = (0..hash_count).map(|_| rand::random::<u32>()).collect();
        Self::with_seeds(capacity, partitions, seeds)
    }

    /// Creates an empty filter with the given hash seeds.
    pub fn with_seeds(capacity: usize, partitions: usize, seeds: Vec<u32>) -> Result<Self, SketchError> {
        SketchConfig {
            capacity_bits: capacity,
            hash_count: seeds.len(),
            repetitions: 1,
            partitions,
            posting_universe: partitions,
        }
        .validate()?;
        Ok(Self {
            bits: WordBitSet::with_capacity(capacity),
            capacity,
            partitions,
            seeds,
        })
    }

    /// Parses the layout above, viewing the bit vector in place.
    pub(crate) fn load(reader: &mut MemoryReader<'_>) -> Result<Self, SketchError> {
        let capacity = read_u32(reader)? as usize;
        let hash_count = read_u32(reader)? as usize;
        let partitions = read_u32(reader)? as usize;
        SketchConfig {
            capacity_bits: capacity,
            hash_count,
            repetitions: 1,
            partitions,
            posting_universe: partitions,
        }
        .validate()?;

        let (seeds, consumed) = encoding::decode_seq::<u32>(reader.peek(), hash_count)?;
        reader.skip(consumed);
        let bits = WordBitSet::from_memory(reader.create_view(capacity / 8)?);

        trace!(capacity, hash_count, partitions, "shifting filter loaded");
        Ok(Self {
            bits,
            capacity,
            partitions,
            seeds,
        })
    }

    fn check_posting(&self, posting: u32) -> Result<(), SketchError> {
        if posting as usize >= self.partitions {
            return Err(SketchError::PostingOutOfRange {
                posting,
                limit: self.partitions,
            });
        }
        Ok(())
    }
}

impl Sketch for ShiftingBloomFilter {
    fn kind(&self) -> SketchKind {
        SketchKind::Shifting
    }

    fn update(&mut self, token: &[u8], posting: u32) -> Result<(), SketchError> {
        self.check_posting(posting)?;
        let mask = self.capacity - 1;
        for &seed in &self.seeds {
            let position = (anchor(token, seed, mask) + posting as usize) & mask;
            self.bits.set(position)?;
        }
        Ok(())
    }

    fn update_bulk(
        &mut self,
        bytes: &[u8],
        offsets: &[usize],
        lengths: &[usize],
        posting: u32,
    ) -> Result<(), SketchError> {
        self.check_posting(posting)?;
        let mask = self.capacity - 1;
        for (&offset, &length) in offsets.iter().zip(lengths) {
            let token = &bytes[offset..offset + length];
            for &seed in &self.seeds {
                let position = (anchor(token, seed, mask) + posting as usize) & mask;
                self.bits.set(position)?;
            }
        }
        Ok(())
    }

    fn query(&self, token: &[u8]) -> Result<WordBitSet, SketchError> {
        intersect_windows(&self.bits, token, &self.seeds, self.partitions, self.capacity)
    }

    fn estimated_memory_usage_bytes(&self) -> usize {
        self.bits.estimated_memory_usage()
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<(), SketchError> {
        let mut header = Vec::with_capacity(12 + 4 * self.seeds.len());
        to_u32(self.capacity, "capacity")?.encode_to(&mut header)?;
        to_u32(self.seeds.len(), "hash_count")?.encode_to(&mut header)?;
        to_u32(self.partitions, "partitions")?.encode_to(&mut header)?;
        encoding::encode_seq(&self.seeds, &mut header)?;
        out.write_all(&header)?;
        self.bits.write_to(out)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), SketchError> {
        self.bits.into_memory().release()?;
        Ok(())
    }
}
