//! Packed k-mers, their hashes, and the XOR-closed item stored in
//! sketch cells.
//!
//! [`KmerData`] bundles a packed [`Kmer`](packed::Kmer) with its
//! tabulation hash and integer metadata. All three parts XOR field by
//! field, which is the closure property invertible sketch cells depend
//! on: folding the same item in twice restores the cell exactly.

pub mod bit_encoding;
pub mod packed;
pub mod tabulation;

use std::hash::{Hash, Hasher};

use packed::Kmer;

/// Integer metadata carried alongside every k-mer.
///
/// Each field XORs independently under cell aggregation, so a cell's
/// metadata is meaningful exactly when the cell is pure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KmerMeta {
    /// Global position of the k-mer's first base in its originating
    /// sequence (`base_offset + window index`).
    pub index: u32,
    /// Identifier of the originating sequence set.
    pub set_id: u32,
    /// Ground-truth mutation position, stamped by the mutation pipeline.
    pub mutation_index: u32,
    /// Ground-truth substituted base, stamped by the mutation pipeline.
    pub mutation_value: u32,
}

impl KmerMeta {
    /// Field-wise XOR.
    #[inline(always)]
    pub fn fold(&mut self, other: &KmerMeta) {
        self.index ^= other.index;
        self.set_id ^= other.set_id;
        self.mutation_index ^= other.mutation_index;
        self.mutation_value ^= other.mutation_value;
    }
}

/// A packed k-mer with its tabulation hash and metadata.
#[derive(Clone, Debug)]
pub struct KmerData {
    /// Packed 2-bit representation.
    pub kmer: Kmer,
    /// Tabulation hash of `kmer`.
    pub hash: u64,
    /// Originating-sequence metadata.
    pub meta: KmerMeta,
}

/// The stored hash is the set key, but equality also compares the packed
/// bytes so that true hash collisions do not collapse distinct k-mers.
impl PartialEq for KmerData {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.kmer == other.kmer
    }
}

impl Eq for KmerData {}

impl Hash for KmerData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
