//! Word-packed bit vector over [`Memory`].
//!
//! [`WordBitSet`] stores bits in little-endian 8-byte words.  Its logical
//! length is the number of words up to the highest non-zero word ever
//! written; setting bits only ever grows it.  [`WordBitSet::and`] is the one
//! operation that shrinks a vector, and only down to the length of the
//! shorter operand.
//!
//! Range extraction ([`WordBitSet::get`]) re-bases `[from, to)` to bit 0 of a
//! new vector, shifting across word boundaries when `from` is not
//! word-aligned.  Together with [`WordBitSet::or_at`] this implements the
//! circular range reads of the sketches.


use std::io::{self, Write};

use crate::memory::{Memory, MemoryError};

const WORD_BITS: usize = 64;
const WORD_BYTES: usize = 8;

#[inline]
fn word_index(bit: usize) -> usize {
    bit >> 6
}

/// A bit vector backed by growable, heap or mapped memory.
#[derive(Debug)]
pub struct WordBitSet {
    memory: Memory,
    words_in_use: usize,
}

impl WordBitSet {
    /// Creates an empty, growable vector with room for `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            memory: Memory::growable(bits.div_ceil(WORD_BITS) * WORD_BYTES),
            words_in_use: 0,
        }
    }

    /// Wraps existing memory.  Every full word of it is part of the vector.
    pub fn from_memory(memory: Memory) -> Self {
        let words_in_use = memory.size() / WORD_BYTES;
        Self {
            memory,
            words_in_use,
        }
    }

    /// Gives up the vector, returning its backing memory.
    pub fn into_memory(self) -> Memory {
        self.memory
    }

    /// Logical length in bits.
    pub fn bit_size(&self) -> usize {
        self.words_in_use * WORD_BITS
    }

    #[inline]
    fn word(&self, index: usize) -> u64 {
        if index < self.words_in_use {
            self.memory.get_long(index * WORD_BYTES)
        } else {
            0
        }
    }

    /// Writes a word.  A zero word past the logical end is not stored.
    #[inline]
    fn set_word(&mut self, index: usize, value: u64) -> Result<(), MemoryError> {
        if value == 0 && index >= self.words_in_use {
            return Ok(());
        }
        self.memory.set_long(index * WORD_BYTES, value)?;
        if value != 0 && index >= self.words_in_use {
            self.words_in_use = index + 1;
        }
        Ok(())
    }

    /// Sets the bit at `position`.
    pub fn set(&mut self, position: usize) -> Result<(), MemoryError> {
        let index = word_index(position);
        let value = self.word(index) | (1u64 << (position & 63));
        self.set_word(index, value)
    }

    /// Returns whether the bit at `position` is set.
    pub fn contains(&self, position: usize) -> bool {
        self.word(word_index(position)) & (1u64 << (position & 63)) != 0
    }

    /// Extracts `[from, to)` into a new vector starting at bit 0.
    ///
    /// `to` is clamped to the logical length.  The result is empty if `from`
    /// is at or past the end, or if `from == to`.
    pub fn get(&self, from: usize, to: usize) -> Result<WordBitSet, MemoryError> {
        let length = self.bit_size();
        let to = to.min(length);
        if from >= to {
            return Ok(WordBitSet::with_capacity(0));
        }

        let target_words = ((to - from - 1) >> 6) + 1;
        let mut result = WordBitSet::with_capacity(target_words * WORD_BITS);
        let shift = from & 63;
        let last_word_mask = u64::MAX >> ((WORD_BITS - (to & 63)) & 63);
        let mut source = word_index(from);

        for target in 0..target_words - 1 {
            let value = if shift == 0 {
                self.word(source)
            } else {
                (self.word(source) >> shift) | (self.word(source + 1) << (WORD_BITS - shift))
            };
            result.set_word(target, value)?;
            source += 1;
        }

        // The last word may need bits from the following source word.
        let last = if ((to - 1) & 63) < shift {
            (self.word(source) >> shift)
                | ((self.word(source + 1) & last_word_mask) << (WORD_BITS - shift))
        } else {
            (self.word(source) & last_word_mask) >> shift
        };
        result.set_word(target_words - 1, last)?;

        Ok(result)
    }

    /// ORs all bits of `other` into `self`, shifted up by `bit_offset`.
    pub fn or_at(&mut self, other: &WordBitSet, bit_offset: usize) -> Result<(), MemoryError> {
        let base = word_index(bit_offset);
        let shift = bit_offset & 63;
        for index in 0..other.words_in_use {
            let value = other.word(index);
            if value == 0 {
                continue;
            }
            let low = self.word(base + index) | (value << shift);
            self.set_word(base + index, low)?;
            if shift != 0 {
                let carried = value >> (WORD_BITS - shift);
                if carried != 0 {
                    let high = self.word(base + index + 1) | carried;
                    self.set_word(base + index + 1, high)?;
                }
            }
        }
        Ok(())
    }

    /// Intersects `self` with `other` in place.
    ///
    /// Words beyond the shorter operand are cleared and the logical length
    /// is trimmed to the last non-zero word.
    pub fn and(&mut self, other: &WordBitSet) -> Result<(), MemoryError> {
        let shared = self.words_in_use.min(other.words_in_use);
        let mut last_non_zero = 0;
        for index in 0..self.words_in_use {
            let value = if index < shared {
                self.word(index) & other.word(index)
            } else {
                0
            };
            if self.word(index) != value {
                self.memory.set_long(index * WORD_BYTES, value)?;
            }
            if value != 0 {
                last_non_zero = index + 1;
            }
        }
        self.words_in_use = last_non_zero;
        Ok(())
    }

    /// First set bit at or after `from`.
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut index = word_index(from);
        if index >= self.words_in_use {
            return None;
        }
        let mut word = self.word(index) & (u64::MAX << (from & 63));
        loop {
            if word != 0 {
                return Some(index * WORD_BITS + word.trailing_zeros() as usize);
            }
            index += 1;
            if index >= self.words_in_use {
                return None;
            }
            word = self.word(index);
        }
    }

    /// Iterates over the positions of all set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        let mut next = self.next_set_bit(0);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.next_set_bit(current + 1);
            Some(current)
        })
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        (0..self.words_in_use)
            .map(|index| self.word(index).count_ones() as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        (0..self.words_in_use).all(|index| self.word(index) == 0)
    }

    pub fn estimated_memory_usage(&self) -> usize {
        self.memory.reserved_bytes()
    }

    /// Dumps the raw words of the backing memory.
    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        self.memory.write_to(out)
    }
}
