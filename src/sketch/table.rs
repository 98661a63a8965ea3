//! A single sketch table: fixed cell array, XOR aggregation, one-pass
//! peeling decode.

use bit_set::BitSet;

use crate::kmer::tabulation::U64Hasher;

use super::XorItem;

/// Array of XOR-aggregating cells with its own indexer hash.
///
/// Cells are pre-allocated neutral values and never re-sized; encoding
/// mutates them in place and marks the touched indexes in a bitmap.
pub struct Table<T> {
    cells: Vec<T>,
    touched: BitSet,
    indexer: U64Hasher,
    kmer_len: usize,
}

impl<T: XorItem> Table<T> {
    /// A table of `n_cells` neutral cells; `kmer_len` fixes the payload
    /// size of k-mer items (ignored for hash items).
    pub fn new(n_cells: usize, kmer_len: usize, seed: u64) -> Self {
        Self {
            cells: vec![T::neutral(kmer_len); n_cells],
            touched: BitSet::with_capacity(n_cells),
            indexer: U64Hasher::new(seed),
            kmer_len,
        }
    }

    #[inline(always)]
    fn cell_index(indexer: &U64Hasher, n_cells: usize, key: u64) -> usize {
        (indexer.hash(key) % n_cells as u64) as usize
    }

    /// XOR each item into its cell and mark the cell touched.
    ///
    /// Encoding is insertion and removal at once: an item already present
    /// cancels out, which is what the set-difference trick and the
    /// cross-peeling of the coordinator rely on.
    pub fn encode(&mut self, items: &[T]) {
        let n_cells = self.cells.len();
        for item in items {
            let idx = Self::cell_index(&self.indexer, n_cells, item.key());
            self.cells[idx].fold(item);
            self.touched.insert(idx);
        }
    }

    /// One peeling pass over the touched cells.
    ///
    /// Pure cells are moved into `out` and reset to neutral. The touched
    /// set is cleared afterwards, so the next pass only revisits cells
    /// re-touched by cross-peeling.
    ///
    /// Purity is the self-consistency check: a non-zero key that indexes
    /// back to the cell holding it. A cell whose aggregate happens to
    /// pass the check is emitted as a false positive; the decode
    /// controller and the pump tolerate those downstream.
    pub fn decode_into(&mut self, out: &mut Vec<T>) {
        let Self {
            cells,
            touched,
            indexer,
            kmer_len,
        } = self;
        let n_cells = cells.len();
        for idx in touched.iter() {
            let cell = &mut cells[idx];
            let key = cell.key();
            if key != 0 && Self::cell_index(indexer, n_cells, key) == idx {
                out.push(std::mem::replace(cell, T::neutral(*kmer_len)));
            }
        }
        touched.clear();
    }

    /// Whether every cell is back to neutral.
    pub fn is_drained(&self) -> bool {
        self.cells.iter().all(|cell| cell.key() == 0)
    }
}
