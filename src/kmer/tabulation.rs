//! Tabulation hashing over packed k-mers, with O(1) rolling updates.
//!
//! The hash of a k-mer is the XOR, over every byte-aligned 8-bit window
//! of the packed representation, of a 256-entry table value rotated left
//! by the window position. Rotation distributes over XOR, so a one-base
//! shift or a single substitution updates the hash with a handful of
//! table lookups instead of a full recompute. This is the hot path of
//! the pump walk and allocates nothing.
//!
//! A second, generic tabulation hash over `u64` values (one table per
//! input byte) serves as the cell indexer of sketch tables.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::packed::Kmer;

/// Tabulation hash function for packed k-mers.
///
/// Equal seeds give equal hash functions; no other randomness is
/// involved. K-mers shorter than one window (four bases) hash to 0.
pub struct KmerHasher {
    table: [u64; 256],
}

impl KmerHasher {
    /// Fill the table from a seeded PRNG.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut table = [0u64; 256];
        for entry in table.iter_mut() {
            *entry = rng.gen();
        }
        Self { table }
    }

    /// Hash a k-mer from scratch.
    pub fn hash(&self, kmer: &Kmer) -> u64 {
        let len = kmer.len();
        if len < 4 {
            return 0;
        }
        let mut h = 0u64;
        for k in 0..=(len - 4) {
            h ^= self.table[kmer.window(k) as usize].rotate_left(k as u32);
        }
        h
    }

    /// Hash after dropping the first base and appending `new_base`,
    /// computed from the pre-shift k-mer.
    ///
    /// Every surviving window moves one position down, so its rotation
    /// count drops by one; only the outgoing first window and the
    /// incoming last window need lookups.
    #[inline]
    pub fn roll_forward(&self, hash: u64, kmer: &Kmer, new_base: u8) -> u64 {
        let len = kmer.len();
        if len < 4 {
            return 0;
        }
        let first = kmer.window(0) as usize;
        let last_new = ((kmer.window(len - 4) << 2) | (new_base & 0b11)) as usize;
        (hash ^ self.table[first]).rotate_right(1)
            ^ self.table[last_new].rotate_left((len - 4) as u32)
    }

    /// Hash after dropping the last base and prepending `new_base`,
    /// computed from the pre-shift k-mer.
    #[inline]
    pub fn roll_backward(&self, hash: u64, kmer: &Kmer, new_base: u8) -> u64 {
        let len = kmer.len();
        if len < 4 {
            return 0;
        }
        let last_old = kmer.window(len - 4) as usize;
        let first_new = (((new_base & 0b11) << 6) | (kmer.window(0) >> 2)) as usize;
        (hash ^ self.table[last_old].rotate_left((len - 4) as u32)).rotate_left(1)
            ^ self.table[first_new]
    }

    /// Hash after substituting the base at `pos` with `new_base`.
    ///
    /// Touches only the (at most four) windows overlapping `pos`.
    #[inline]
    pub fn substitute(&self, hash: u64, kmer: &Kmer, pos: usize, new_base: u8) -> u64 {
        let len = kmer.len();
        debug_assert!(pos < len);
        if len < 4 {
            return 0;
        }
        let diff = kmer.base_at(pos) ^ (new_base & 0b11);
        if diff == 0 {
            return hash;
        }
        let mut h = hash;
        let lo = pos.saturating_sub(3);
        let hi = usize::min(len - 4, pos);
        for k in lo..=hi {
            let w_old = kmer.window(k);
            let w_new = w_old ^ (diff << (6 - 2 * (pos - k)));
            h ^= (self.table[w_old as usize] ^ self.table[w_new as usize]).rotate_left(k as u32);
        }
        h
    }
}

/// Generic tabulation hash `u64 → u64`: eight 256-entry tables, one per
/// input byte, XOR-combined. Distinct seeds give near-independent index
/// functions, which is what keeps the tables of one sketch pairwise
/// independent.
pub struct U64Hasher {
    tables: [[u64; 256]; 8],
}

impl U64Hasher {
    /// Fill all eight tables from a seeded PRNG.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tables = [[0u64; 256]; 8];
        for table in tables.iter_mut() {
            for entry in table.iter_mut() {
                *entry = rng.gen();
            }
        }
        Self { tables }
    }

    /// Hash a 64-bit value.
    #[inline(always)]
    pub fn hash(&self, value: u64) -> u64 {
        let mut h = 0u64;
        let mut v = value;
        for table in &self.tables {
            h ^= table[(v & 0xFF) as usize];
            v >>= 8;
        }
        h
    }
}
