//! Update / query behavior of both sketch variants.

use super::helpers::*;
use crate::sketch::{CscBloomFilter, ShiftingBloomFilter, Sketch, SketchConfig, SketchError};

fn load_sample(sketch: &mut dyn Sketch) {
    sketch.update(b"covfefe", 10).unwrap();
    sketch.update(b"com.dynatrace", 20).unwrap();
    sketch.update(b"hello", 30).unwrap();
    sketch.update(b"world", 40).unwrap();
    sketch.update(b"covfefe", 15).unwrap();
    sketch.update(b"com.dynatrace", 15).unwrap();
}

/// # Scenario
/// A posting shared by two tokens survives `query_all` on both variants.
///
/// # Starting environment
/// Fresh shifting and CSC sketches (1 Mi bits, 128 partitions, 3 hashes).
///
/// # Actions
/// 1. Insert covfefe→{10,15}, com.dynatrace→{20,15}, hello→30, world→40.
/// 2. `query_all([covfefe, com.dynatrace])` and single-token queries.
///
/// # Expected behavior
/// The intersection contains 15; single queries contain all inserted postings.
#[test]
fn shared_posting_survives_intersection() {
    init_tracing();
    let mut variants: Vec<Box<dyn Sketch>> = vec![Box::new(shifting()), Box::new(csc())];
    for sketch in &mut variants {
        load_sample(sketch.as_mut());

        let shared = sketch.query_all(&[&b"covfefe"[..], &b"com.dynatrace"[..]]).unwrap();
        assert!(shared.contains(15), "{:?}", sketch.kind());

        let covfefe = sketch.query(b"covfefe").unwrap();
        assert!(covfefe.contains(10) && covfefe.contains(15));
        assert!(sketch.query(b"hello").unwrap().contains(30));
        assert!(sketch.query(b"world").unwrap().contains(40));
    }
}

#[test]
fn shifting_single_token_is_exact_when_sparse() {
    let mut sketch = shifting();
    load_sample(&mut sketch);
    assert_eq!(postings(&sketch.query(b"covfefe").unwrap()), vec![10, 15]);
    assert!(sketch.query(b"never-inserted").unwrap().is_empty());
}

#[test]
fn empty_token_list_yields_empty_set() {
    let mut sketch = csc();
    load_sample(&mut sketch);
    assert!(sketch.query_all(&[]).unwrap().is_empty());
}

/// # Scenario
/// A window that runs past the end of the vector wraps to bit 0.
///
/// # Starting environment
/// Tiny shifting filter: 64 bits, 32 partitions, one hash, seed 0.
///
/// # Actions
/// 1. Insert one token into every posting 0..32.
/// 2. Query it.
///
/// # Expected behavior
/// All 32 postings come back, whatever the anchor (the window wraps for
/// anchors above 32).
#[test]
fn window_wraps_around_capacity() {
    for seed in 0..16u32 {
        let mut sketch = ShiftingBloomFilter::with_seeds(64, 32, vec![seed]).unwrap();
        for posting in 0..32 {
            sketch.update(b"wrap", posting).unwrap();
        }
        let result = sketch.query(b"wrap").unwrap();
        assert_eq!(postings(&result), (0..32).collect::<Vec<_>>(), "seed {seed}");
    }
}

#[test]
fn bulk_update_matches_single_updates() {
    let line = b"get on my horse";
    let offsets = [0, 4, 7, 10];
    let lengths = [3, 2, 2, 5];
    let mut sketch = CscBloomFilter::with_seeds(&csc_config(), vec![1, 2, 3, 4, 5, 6]).unwrap();
    sketch.update_bulk(line, &offsets, &lengths, 99).unwrap();
    for token in [&b"get"[..], &b"on"[..], &b"my"[..], &b"horse"[..]] {
        assert!(sketch.query(token).unwrap().contains(99));
    }
}

#[test]
fn postings_outside_range_are_rejected() {
    let mut single = shifting();
    assert!(matches!(
        single.update(b"x", PARTITIONS as u32),
        Err(SketchError::PostingOutOfRange { .. })
    ));

    let config = SketchConfig {
        posting_universe: 256,
        ..csc_config()
    };
    let mut multi = CscBloomFilter::new(&config).unwrap();
    multi.update(b"x", 255).unwrap();
    assert!(multi.query(b"x").unwrap().contains(255));
    assert!(matches!(
        multi.update(b"x", 256),
        Err(SketchError::PostingOutOfRange { .. })
    ));
}

#[test]
fn memory_usage_counts_all_repetitions() {
    assert_eq!(shifting().estimated_memory_usage_bytes(), CAPACITY / 8);
    assert_eq!(csc().estimated_memory_usage_bytes(), CAPACITY / 8);
}
