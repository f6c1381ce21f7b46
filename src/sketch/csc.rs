//! Multi-repetition CSC bloom filter.
//!
//! Each repetition owns a bit vector of `capacity / R` bits, `H` seeds and a
//! partition function.  A posting's partition in repetition `r` is
//! `xxh32(posting_le, r) & (P - 1)`, so the function is rebuilt from the
//! header alone.
//!
//! # Layout
//!
//! ```text
//! [repetitions u32][repetition_capacity u32][hash_count u32][partitions u32][postings u32]
//! [seed u32 × repetitions × hash_count]
//! [repetition_capacity / 8 bytes] × repetitions
//! ```

use std::io::Write;

use tracing::trace;
use xxhash_rust::xxh32::xxh32;

use super::{Sketch, SketchConfig, SketchError, SketchKind, anchor, intersect_windows, read_u32, to_u32};
use crate::bitset::WordBitSet;
use crate::encoding::{self, Encode};
use crate::memory::MemoryReader;

#[derive(Debug)]
struct Repetition {
    bits: WordBitSet,
    seeds: Vec<u32>,
    /// posting → partition
    partition_of: Vec<u32>,
    /// partition → postings
    members: Vec<Vec<u32>>,
}

impl Repetition {
    fn new(index: usize, bits: WordBitSet, seeds: Vec<u32>, partitions: usize, postings: usize) -> Self {
        let mask = partitions - 1;
        let mut partition_of = Vec::with_capacity(postings);
        let mut members = vec![Vec::new(); partitions];
        for posting in 0..postings as u32 {
            let partition = xxh32(&posting.to_le_bytes(), index as u32) as usize & mask;
            partition_of.push(partition as u32);
            members[partition].push(posting);
        }
        Self {
            bits,
            seeds,
            partition_of,
            members,
        }
    }
}

/// `R` hashed repetitions whose candidate postings are intersected.
#[derive(Debug)]
pub struct CscBloomFilter {
    repetitions: Vec<Repetition>,
    repetition_capacity: usize,
    partitions: usize,
    postings: usize,
}

impl CscBloomFilter {
    /// Creates an empty filter with random hash seeds.
    pub fn new(config: &SketchConfig) -> Result<Self, SketchError> {
        let seeds = (0..config.repetitions * config.hash_count)
            .map(|_| rand::random::<u32>())
            .collect();
        Self::with_seeds(config, seeds)
    }

    /// Creates an empty filter; `seeds` holds `hash_count` seeds per repetition.
    pub fn with_seeds(config: &SketchConfig, seeds: Vec<u32>) -> Result<Self, SketchError> {
        config.validate()?;
        if seeds.len() != config.repetitions * config.hash_count {
            return Err(SketchError::InvalidConfig(format!(
                "expected {} seeds, got {}",
                config.repetitions * config.hash_count,
                seeds.len()
            )));
        }
        let capacity = config.repetition_capacity();
        let repetitions = seeds
            .chunks(config.hash_count)
            .enumerate()
            .map(|(index, chunk)| {
                Repetition::new(
                    index,
                    WordBitSet::with_capacity(capacity),
                    chunk.to_vec(),
                    config.partitions,
                    config.posting_universe,
                )
            })
            .collect();
        Ok(Self {
            repetitions,
            repetition_capacity: capacity,
            partitions: config.partitions,
            postings: config.posting_universe,
        })
    }

    /// Parses the layout above, viewing every repetition's bits in place.
    pub(crate) fn load(reader: &mut MemoryReader<'_>) -> Result<Self, SketchError> {
        let repetition_count = read_u32(reader)? as usize;
        let repetition_capacity = read_u32(reader)? as usize;
        let hash_count = read_u32(reader)? as usize;
        let partitions = read_u32(reader)? as usize;
        let postings = read_u32(reader)? as usize;
        let config = SketchConfig {
            capacity_bits: repetition_capacity.saturating_mul(repetition_count),
            hash_count,
            repetitions: repetition_count,
            partitions,
            posting_universe: postings,
        };
        config.validate()?;

        let (seeds, consumed) =
            encoding::decode_seq::<u32>(reader.peek(), repetition_count * hash_count)?;
        reader.skip(consumed);

        let mut repetitions = Vec::with_capacity(repetition_count);
        for (index, chunk) in seeds.chunks(hash_count).enumerate() {
            let bits = WordBitSet::from_memory(reader.create_view(repetition_capacity / 8)?);
            repetitions.push(Repetition::new(index, bits, chunk.to_vec(), partitions, postings));
        }

        trace!(repetition_count, repetition_capacity, hash_count, partitions, postings, "csc filter loaded");
        Ok(Self {
            repetitions,
            repetition_capacity,
            partitions,
            postings,
        })
    }

    fn check_posting(&self, posting: u32) -> Result<(), SketchError> {
        if posting as usize >= self.postings {
            return Err(SketchError::PostingOutOfRange {
                posting,
                limit: self.postings,
            });
        }
        Ok(())
    }

    fn update_token(&mut self, token: &[u8], posting: usize) -> Result<(), SketchError> {
        let mask = self.repetition_capacity - 1;
        for repetition in &mut self.repetitions {
            let partition = repetition.partition_of[posting] as usize;
            for &seed in &repetition.seeds {
                let position = (anchor(token, seed, mask) + partition) & mask;
                repetition.bits.set(position)?;
            }
        }
        Ok(())
    }
}

impl Sketch for CscBloomFilter {
    fn kind(&self) -> SketchKind {
        SketchKind::Csc
    }

    fn update(&mut self, token: &[u8], posting: u32) -> Result<(), SketchError> {
        self.check_posting(posting)?;
        self.update_token(token, posting as usize)
    }

    fn update_bulk(
        &mut self,
        bytes: &[u8],
        offsets: &[usize],
        lengths: &[usize],
        posting: u32,
    ) -> Result<(), SketchError> {
        self.check_posting(posting)?;
        for (&offset, &length) in offsets.iter().zip(lengths) {
            self.update_token(&bytes[offset..offset + length], posting as usize)?;
        }
        Ok(())
    }

    fn query(&self, token: &[u8]) -> Result<WordBitSet, SketchError> {
        let mut result: Option<WordBitSet> = None;
        for repetition in &self.repetitions {
            let hits = intersect_windows(
                &repetition.bits,
                token,
                &repetition.seeds,
                self.partitions,
                self.repetition_capacity,
            )?;
            let mut candidates = WordBitSet::with_capacity(self.postings);
            for partition in hits.ones() {
                for &posting in &repetition.members[partition] {
                    candidates.set(posting as usize)?;
                }
            }
            let acc = match result.take() {
                None => candidates,
                Some(mut acc) => {
                    acc.and(&candidates)?;
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

    fn estimated_memory_usage_bytes(&self) -> usize {
        self.repetitions
            .iter()
            .map(|repetition| repetition.bits.estimated_memory_usage())
            .sum()
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<(), SketchError> {
        let hash_count = self.repetitions.first().map_or(0, |r| r.seeds.len());
        let mut header = Vec::with_capacity(20 + 4 * hash_count * self.repetitions.len());
        to_u32(self.repetitions.len(), "repetitions")?.encode_to(&mut header)?;
        to_u32(self.repetition_capacity, "repetition_capacity")?.encode_to(&mut header)?;
        to_u32(hash_count, "hash_count")?.encode_to(&mut header)?;
        to_u32(self.partitions, "partitions")?.encode_to(&mut header)?;
        to_u32(self.postings, "postings")?.encode_to(&mut header)?;
        for repetition in &self.repetitions {
            encoding::encode_seq(&repetition.seeds, &mut header)?;
        }
        out.write_all(&header)?;
        for repetition in &self.repetitions {
            repetition.bits.write_to(out)?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), SketchError> {
        for repetition in self.repetitions {
            repetition.bits.into_memory().release()?;
        }
        Ok(())
    }
}
