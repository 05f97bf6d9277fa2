/*!
This module provides the Bloom filter kept in memory for every table file.
Filters are consulted before touching a table during reads, which removes the
large majority of unnecessary disk seeks on lookups for absent keys.

Filters are built from *user* keys, not versioned keys; lookups therefore
strip the version suffix before probing. This is a deliberate contract: a
filter probe answers "might any version of this user key live in this
table?".
*/

use xxhash_rust::xxh32::xxh32;

use crate::key;
use crate::types::Entry;

/// The default target false-positive rate for filters built over a table.
const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/**
A Bloom filter sized for an expected element count and target false-positive
rate.

The bit-array size is `m = ceil(-n * ln(p) / ln(2)^2)` and the number of hash
functions is `k = round((m / n) * ln(2))`. Each hash function is the same
32-bit hash seeded with the function index.

The filter never produces false negatives; its false-positive rate
approximates `p`.
*/
#[derive(Clone, Debug)]
pub(crate) struct BloomFilter {
    /// The bit array, packed eight bits per byte.
    bits: Vec<u8>,

    /// The number of bits in the array.
    num_bits: usize,

    /// The number of seeded hash functions used per key.
    num_hash_fns: u32,
}

/// Crate-only methods
impl BloomFilter {
    /**
    Create a filter sized for `expected_elements` at the target
    `false_positive_rate`.
    */
    pub(crate) fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        // An empty table still gets a well-formed (tiny) filter.
        let n = expected_elements.max(1) as f64;
        let num_bits = (-n * false_positive_rate.ln() / 2_f64.ln().powi(2)).ceil() as usize;
        let num_bits = num_bits.max(1);
        let num_hash_fns = ((num_bits as f64 / n) * 2_f64.ln()).round().max(1.0) as u32;

        Self {
            bits: vec![0; (num_bits + 7) / 8],
            num_bits,
            num_hash_fns,
        }
    }

    /// Build a filter over the user keys of `entries` at the default rate.
    pub(crate) fn build(entries: &[Entry]) -> Self {
        let mut filter = BloomFilter::new(entries.len(), DEFAULT_FALSE_POSITIVE_RATE);
        for entry in entries {
            filter.add(key::parse_key(&entry.key));
        }
        filter
    }

    /// Add a key to the filter.
    pub(crate) fn add(&mut self, key: &[u8]) {
        for seed in 0..self.num_hash_fns {
            let bit = xxh32(key, seed) as usize % self.num_bits;
            self.bits[bit / 8] |= 1 << (bit % 8);
        }
    }

    /// Return true if the key may have been added. Never returns false for a
    /// key that was added.
    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        (0..self.num_hash_fns).all(|seed| {
            let bit = xxh32(key, seed) as usize % self.num_bits;
            self.bits[bit / 8] & (1 << (bit % 8)) != 0
        })
    }
}
