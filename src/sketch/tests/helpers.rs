use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::sketch::{CscBloomFilter, ShiftingBloomFilter, SketchConfig};

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

pub const CAPACITY: usize = 1024 * 1024;
pub const PARTITIONS: usize = 128;
pub const HASHES: usize = 3;

pub fn shifting() -> ShiftingBloomFilter {
    ShiftingBloomFilter::new(CAPACITY, HASHES, PARTITIONS).unwrap()
}

pub fn csc_config() -> SketchConfig {
    SketchConfig {
        capacity_bits: CAPACITY,
        hash_count: HASHES,
        repetitions: 2,
        partitions: PARTITIONS,
        posting_universe: PARTITIONS,
    }
}

pub fn csc() -> CscBloomFilter {
    CscBloomFilter::new(&csc_config()).unwrap()
}

pub fn postings(set: &crate::bitset::WordBitSet) -> Vec<usize> {
    set.ones().collect()
}
