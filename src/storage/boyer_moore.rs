//! Case-insensitive Boyer-Moore substring matcher (bad-character rule).
//!
//! The pattern is expected to be lowercase already; haystack bytes are
//! lowercased on the fly with the ASCII table, so `A-Z` in the data match
//! `a-z` in the pattern and every other byte matches only itself.

use crate::tokenizer::to_lowercase_byte;

/// Precomputed matcher for one lowercase pattern.
#[derive(Debug, Clone)]
pub struct BoyerMoore {
    pattern: Vec<u8>,
    /// Rightmost index of each byte in the pattern, or -1.
    right: [isize; 256],
}

impl BoyerMoore {
    pub fn new(pattern: &[u8]) -> Self {
        let mut right = [-1isize; 256];
        for (index, &byte) in pattern.iter().enumerate() {
            right[byte as usize] = index as isize;
        }
        Self {
            pattern: pattern.to_vec(),
            right,
        }
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Index of the first match in `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        self.find_in(haystack, 0, haystack.len())
    }

    /// Index (into `data`) of the first match starting inside
    /// `data[offset..offset + length]` and ending inside `data`.
    pub fn find_in(&self, data: &[u8], offset: usize, length: usize) -> Option<usize> {
        let pattern_len = self.pattern.len();
        let window_end = offset.saturating_add(length).min(data.len());
        if window_end < pattern_len || offset > window_end - pattern_len {
            return None;
        }
        let last_start = window_end - pattern_len;

        let mut i = offset;
        while i <= last_start {
            let mut skip = 0;
            for j in (0..pattern_len).rev() {
                let byte = to_lowercase_byte(data[i + j]);
                if self.pattern[j] != byte {
                    skip = (j as isize - self.right[byte as usize]).max(1) as usize;
                    break;
                }
            }
            if skip == 0 {
                return Some(i);
            }
            i += skip;
        }
        None
    }
}
