//! Multi-table invertible Bloom lookup tables with cross-peeling decode.
//!
//! A [`Sketch`] owns N independent cell [`Table`](table::Table)s with
//! distinct indexer hashes, so every item lands in one cell per table.
//! Encoding XORs the input into all tables; because XOR is its own
//! inverse, encoding a second set into the same sketch leaves the
//! symmetric difference, which is the primitive behind residual decodes.
//!
//! Decoding peels: a table's pure cells are emitted, then XORed out of
//! the other tables in parallel, often turning further cells pure. The
//! round-robin loop runs until the decode controller stops it, either on
//! a run of empty steps or on the tabu cycle check. Decode never fails;
//! it returns whatever it peeled and callers compare counts.
//!
//! Encode fan-out and cross-peel fan-out are the only two parallel
//! regions. Each worker owns one table's memory outright, so results are
//! identical to a single-threaded run regardless of scheduling.

pub mod decoder;
pub mod pool;
pub mod table;

use rayon::prelude::*;

use crate::error::RecomerError;
use crate::kmer::packed::Kmer;
use crate::kmer::{KmerData, KmerMeta};

pub use decoder::DecodeController;

use pool::BufferPool;
use table::Table;

/// Minimum cells per table; anything smaller degenerates into constant
/// peeling failures.
pub const MIN_CELLS_PER_TABLE: usize = 100;

/// Seed stride separating the per-table indexer hash functions. Any
/// pairwise-distinct scheme works; this one spreads seeds across the
/// whole 64-bit space.
const TABLE_SEED_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;

/// Items a sketch cell can aggregate: XOR-foldable, with a designated
/// neutral value and a 64-bit key used for indexing and purity testing.
pub trait XorItem: Clone + Send + Sync {
    /// The neutral element for cells holding `kmer_len`-base payloads
    /// (`kmer_len` is ignored by hash items).
    fn neutral(kmer_len: usize) -> Self;
    /// XOR-aggregate `other` into `self`.
    fn fold(&mut self, other: &Self);
    /// The stored hash for k-mer items, the value itself for hash items.
    fn key(&self) -> u64;
}

impl XorItem for u64 {
    fn neutral(_kmer_len: usize) -> Self {
        0
    }

    #[inline(always)]
    fn fold(&mut self, other: &Self) {
        *self ^= other;
    }

    #[inline(always)]
    fn key(&self) -> u64 {
        *self
    }
}

impl XorItem for KmerData {
    fn neutral(kmer_len: usize) -> Self {
        KmerData {
            kmer: Kmer::zeroed(kmer_len),
            hash: 0,
            meta: KmerMeta::default(),
        }
    }

    #[inline(always)]
    fn fold(&mut self, other: &Self) {
        self.kmer.xor_bytes(&other.kmer);
        self.hash ^= other.hash;
        self.meta.fold(&other.meta);
    }

    #[inline(always)]
    fn key(&self) -> u64 {
        self.hash
    }
}

/// Multi-table IBLT with a decode controller.
pub struct Sketch<T: XorItem> {
    tables: Vec<Table<T>>,
    cells_per_table: usize,
    current: usize,
    controller: DecodeController,
    scratch: BufferPool<T>,
}

/// Sketch whose cells carry full k-mer payloads.
pub type KmerSketch = Sketch<KmerData>;
/// Sketch whose cells are plain XOR sums of 64-bit hashes.
pub type HashSketch = Sketch<u64>;

impl<T: XorItem> Sketch<T> {
    fn with_len(
        n_tables: usize,
        kmer_len: usize,
        total_cells: usize,
        seed: u64,
    ) -> Result<Self, RecomerError> {
        if n_tables == 0 {
            return Err(RecomerError::InvalidInput(
                "sketch needs at least one table".to_string(),
            ));
        }
        let cells_per_table = usize::max(MIN_CELLS_PER_TABLE, total_cells / n_tables);
        let tables = (0..n_tables)
            .map(|t| {
                let table_seed =
                    seed.wrapping_add((t as u64 + 1).wrapping_mul(TABLE_SEED_STRIDE));
                Table::new(cells_per_table, kmer_len, table_seed)
            })
            .collect();
        Ok(Self {
            tables,
            cells_per_table,
            current: 0,
            controller: DecodeController::tabu(decoder::DEFAULT_EMPTY_LIMIT),
            scratch: BufferPool::new(),
        })
    }

    /// Replace the decode controller (tabu with limit 3 by default).
    pub fn set_controller(&mut self, controller: DecodeController) {
        self.controller = controller;
    }

    /// Cells in each table.
    pub fn cells_per_table(&self) -> usize {
        self.cells_per_table
    }

    /// XOR every item into one cell of every table, tables in parallel.
    ///
    /// Encoding into a sketch that already holds another set leaves the
    /// symmetric difference of the two.
    pub fn encode(&mut self, items: &[T]) {
        self.tables
            .par_iter_mut()
            .for_each(|table| table.encode(items));
    }

    /// Encode only the items whose key is divisible by `modulus`.
    pub fn encode_sampled(&mut self, items: &[T], modulus: u64) -> Result<(), RecomerError> {
        if modulus == 0 {
            return Err(RecomerError::InvalidInput(
                "sampling modulus must be positive".to_string(),
            ));
        }
        let mut sampled = self.scratch.acquire(items.len() / modulus as usize + 1);
        sampled.extend(
            items
                .iter()
                .filter(|item| item.key() % modulus == 0)
                .cloned(),
        );
        self.tables
            .par_iter_mut()
            .for_each(|table| table.encode(&sampled));
        self.scratch.release(sampled);
        Ok(())
    }

    /// One peeling step: decode the current table, XOR its emissions out
    /// of every other table in parallel, advance round-robin. Emitted
    /// items are appended to `out`.
    pub fn decode_step(&mut self, out: &mut Vec<T>) {
        let cur = self.current;
        let mut emitted = self.scratch.acquire(self.cells_per_table);
        self.tables[cur].decode_into(&mut emitted);
        if !emitted.is_empty() {
            self.tables
                .par_iter_mut()
                .enumerate()
                .filter(|(t, _)| *t != cur)
                .for_each(|(_, table)| table.encode(&emitted));
        }
        out.append(&mut emitted);
        self.scratch.release(emitted);
        self.current = (self.current + 1) % self.tables.len();
    }

    /// Iterative cross-peeling decode.
    ///
    /// Every item that can be peeled under a terminating controller is
    /// emitted exactly once; order within a step follows the table's
    /// touched-cell iteration and is not otherwise specified. The result
    /// may fall short of the encoded set (stuck cells, tabu stop) and
    /// may contain false positives from cells whose aggregate passed the
    /// purity check.
    pub fn decode(&mut self) -> Vec<T> {
        self.controller.reset();
        let mut emitted = Vec::new();
        loop {
            let before = emitted.len();
            self.decode_step(&mut emitted);
            if !self.controller.observe_step(&emitted[before..]) {
                break;
            }
        }
        emitted
    }

    /// Whether every cell in every table is neutral.
    pub fn is_drained(&self) -> bool {
        self.tables.iter().all(|table| table.is_drained())
    }
}

impl Sketch<KmerData> {
    /// Build a k-mer sketch. `total_cells` is the sum across tables;
    /// each table gets `total_cells / n_tables` cells with a floor of
    /// [`MIN_CELLS_PER_TABLE`].
    pub fn kmers(
        n_tables: usize,
        kmer_len: usize,
        total_cells: usize,
        seed: u64,
    ) -> Result<Self, RecomerError> {
        if kmer_len == 0 {
            return Err(RecomerError::InvalidInput(
                "k-mer length must be positive".to_string(),
            ));
        }
        Self::with_len(n_tables, kmer_len, total_cells, seed)
    }
}

impl Sketch<u64> {
    /// Build a hash-only sketch with the same sizing convention as
    /// [`Sketch::kmers`].
    pub fn hashes(n_tables: usize, total_cells: usize, seed: u64) -> Result<Self, RecomerError> {
        Self::with_len(n_tables, 0, total_cells, seed)
    }
}

/// Total cells for an expected item count at a given overhead factor
/// (typically 1.3–1.5).
pub fn sized_cells(expected_items: usize, overhead: f64) -> usize {
    (expected_items as f64 * overhead).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_kmer_cell_fold_is_involution() {
        let hasher = crate::kmer::tabulation::KmerHasher::new(0);
        let kmer = Kmer::from_string("ACGTACGT").unwrap();
        let item = KmerData {
            hash: hasher.hash(&kmer),
            kmer,
            meta: KmerMeta {
                index: 5,
                set_id: 1,
                ..KmerMeta::default()
            },
        };
        let mut cell = KmerData::neutral(8);
        cell.fold(&item);
        assert_eq!(cell.key(), item.hash);
        assert_eq!(cell.kmer, item.kmer);
        assert_eq!(cell.meta, item.meta);
        cell.fold(&item);
        assert_eq!(cell.key(), 0);
        assert!(cell.kmer.is_zero());
    }

    #[test]
    fn test_min_cells_floor() {
        let sketch = HashSketch::hashes(3, 13, 0).unwrap();
        assert_eq!(sketch.cells_per_table(), MIN_CELLS_PER_TABLE);
        let sketch = HashSketch::hashes(3, 3000, 0).unwrap();
        assert_eq!(sketch.cells_per_table(), 1000);
    }

    #[test]
    fn test_invalid_construction() {
        assert!(HashSketch::hashes(0, 100, 0).is_err());
        assert!(KmerSketch::kmers(3, 0, 100, 0).is_err());
    }

    #[test]
    fn test_sampled_encode_rejects_zero_modulus() {
        let mut sketch = HashSketch::hashes(3, 300, 0).unwrap();
        assert!(sketch.encode_sampled(&[1u64, 2, 3], 0).is_err());
    }

    #[test]
    fn test_sized_cells() {
        assert_eq!(sized_cells(100, 1.3), 130);
        assert_eq!(sized_cells(0, 1.5), 0);
        assert_eq!(sized_cells(7, 1.4), 10);
    }
}
