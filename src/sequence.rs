//! DNA sequence sources and the rolling k-mer stream.
//!
//! A [`Sequence`] stores encoded bases plus the global offset and set id
//! stamped into every k-mer it yields. [`Sequence::kmers`] walks the
//! sequence once, maintaining the tabulation hash by rolling updates so
//! each window after the first costs O(1) hashing work.

use std::fmt;
use std::fmt::Write;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::RecomerError;
use crate::kmer::bit_encoding::{decode_base, encode_base, next_base};
use crate::kmer::packed::Kmer;
use crate::kmer::tabulation::KmerHasher;
use crate::kmer::{KmerData, KmerMeta};

/// An encoded DNA sequence with a global base offset and set identifier.
#[derive(Clone, Debug)]
pub struct Sequence {
    bases: Vec<u8>,
    base_offset: u32,
    set_id: u32,
}

impl Sequence {
    /// Parse from ASCII; rejects empty input and non-ACGT characters.
    pub fn from_string(s: &str, base_offset: u32, set_id: u32) -> Result<Self, RecomerError> {
        if s.is_empty() {
            return Err(RecomerError::InvalidInput("empty sequence".to_string()));
        }
        let mut bases = Vec::with_capacity(s.len());
        for b in s.bytes() {
            bases.push(encode_base(b).ok_or_else(|| {
                RecomerError::InvalidInput(format!("invalid nucleotide '{}'", b as char))
            })?);
        }
        Ok(Self {
            bases,
            base_offset,
            set_id,
        })
    }

    /// Draw a uniform random sequence of `len` bases.
    pub fn random(
        len: usize,
        base_offset: u32,
        set_id: u32,
        rng: &mut StdRng,
    ) -> Result<Self, RecomerError> {
        if len == 0 {
            return Err(RecomerError::InvalidInput("empty sequence".to_string()));
        }
        let bases = (0..len).map(|_| rng.gen_range(0..4u8)).collect();
        Ok(Self {
            bases,
            base_offset,
            set_id,
        })
    }

    /// Number of bases.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Always false; a sequence has at least one base.
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// 2-bit base at `pos`.
    pub fn get(&self, pos: usize) -> Result<u8, RecomerError> {
        if pos >= self.bases.len() {
            return Err(RecomerError::OutOfBounds {
                pos,
                len: self.bases.len(),
            });
        }
        Ok(self.bases[pos])
    }

    /// Global position of base 0.
    pub fn base_offset(&self) -> u32 {
        self.base_offset
    }

    /// Set identifier stamped into k-mer metadata.
    pub fn set_id(&self) -> u32 {
        self.set_id
    }

    /// Lazily yield every k-mer window with its rolling hash maintained.
    ///
    /// A one-shot, finite stream: windows `[0..k)`, `[1..k+1)`, … with
    /// metadata `{index: base_offset + i, set_id}`. Yields nothing when
    /// the sequence is shorter than `kmer_len`.
    pub fn kmers<'a>(&'a self, kmer_len: usize, hasher: &'a KmerHasher) -> KmerStream<'a> {
        KmerStream {
            seq: self,
            hasher,
            kmer_len,
            next: 0,
            window: None,
            hash: 0,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for base in &self.bases {
            f.write_char(decode_base(*base) as char)?;
        }
        Ok(())
    }
}

/// One-shot iterator over the k-mers of a [`Sequence`].
pub struct KmerStream<'a> {
    seq: &'a Sequence,
    hasher: &'a KmerHasher,
    kmer_len: usize,
    next: usize,
    window: Option<Kmer>,
    hash: u64,
}

impl Iterator for KmerStream<'_> {
    type Item = KmerData;

    fn next(&mut self) -> Option<KmerData> {
        if self.kmer_len == 0 || self.next + self.kmer_len > self.seq.len() {
            return None;
        }
        let window = match self.window.take() {
            None => {
                let first = Kmer::from_nucleotides(&self.seq.bases[..self.kmer_len]).ok()?;
                self.hash = self.hasher.hash(&first);
                first
            }
            Some(mut window) => {
                let incoming = self.seq.bases[self.next + self.kmer_len - 1];
                self.hash = self.hasher.roll_forward(self.hash, &window, incoming);
                window.shift_left(incoming);
                window
            }
        };
        let meta = KmerMeta {
            index: self.seq.base_offset + self.next as u32,
            set_id: self.seq.set_id,
            ..KmerMeta::default()
        };
        let item = KmerData {
            kmer: window.clone(),
            hash: self.hash,
            meta,
        };
        self.window = Some(window);
        self.next += 1;
        Some(item)
    }
}

/// A random sequence and a copy mutated at `len / 2` by the cyclic
/// successor base. Seeds the mutation-detection pipeline; both copies
/// share the base offset and set id so their common k-mers are
/// bit-identical.
#[derive(Clone, Debug)]
pub struct DoubleSequence {
    /// The unmutated draw.
    pub original: Sequence,
    /// The copy with one substituted base.
    pub mutated: Sequence,
    /// Position of the substitution within the sequences.
    pub mutation_pos: usize,
    /// The substituted (new) base.
    pub mutation_value: u8,
}

impl DoubleSequence {
    /// Draw the pair from a seeded PRNG.
    pub fn random(
        len: usize,
        base_offset: u32,
        set_id: u32,
        rng: &mut StdRng,
    ) -> Result<Self, RecomerError> {
        let original = Sequence::random(len, base_offset, set_id, rng)?;
        let mutation_pos = len / 2;
        let mutation_value = next_base(original.bases[mutation_pos]);
        let mut mutated = original.clone();
        mutated.bases[mutation_pos] = mutation_value;
        Ok(Self {
            original,
            mutated,
            mutation_pos,
            mutation_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    #[test]
    fn test_parse_and_render() {
        let seq = Sequence::from_string("ACGTacgt", 0, 0).unwrap();
        assert_eq!(seq.to_string(), "ACGTACGT");
        assert_eq!(seq.len(), 8);
        assert!(Sequence::from_string("", 0, 0).is_err());
        assert!(Sequence::from_string("ACGN", 0, 0).is_err());
    }

    #[test]
    fn test_stream_counts_and_metadata() {
        let hasher = KmerHasher::new(0);
        let seq = Sequence::from_string("ACGTACGTAC", 100, 7).unwrap();
        let kmers: Vec<KmerData> = seq.kmers(4, &hasher).collect();
        assert_eq!(kmers.len(), 7);
        for (i, item) in kmers.iter().enumerate() {
            assert_eq!(item.meta.index, 100 + i as u32);
            assert_eq!(item.meta.set_id, 7);
            assert_eq!(item.meta.mutation_index, 0);
        }
        assert_eq!(kmers[0].kmer.to_string(), "ACGT");
        assert_eq!(kmers[6].kmer.to_string(), "GTAC");
    }

    #[test]
    fn test_stream_hashes_match_recompute() {
        let hasher = KmerHasher::new(5);
        let mut rng = StdRng::seed_from_u64(1);
        let seq = Sequence::random(60, 0, 0, &mut rng).unwrap();
        for item in seq.kmers(17, &hasher) {
            assert_eq!(item.hash, hasher.hash(&item.kmer));
        }
    }

    #[test]
    fn test_short_sequence_yields_nothing() {
        let hasher = KmerHasher::new(0);
        let seq = Sequence::from_string("ACG", 0, 0).unwrap();
        assert_eq!(seq.kmers(4, &hasher).count(), 0);
        assert_eq!(seq.kmers(0, &hasher).count(), 0);
    }

    #[test]
    fn test_double_sequence_single_difference() {
        let mut rng = StdRng::seed_from_u64(9);
        let ds = DoubleSequence::random(101, 0, 0, &mut rng).unwrap();
        assert_eq!(ds.mutation_pos, 50);
        let mut diffs = 0;
        for pos in 0..101 {
            if ds.original.get(pos).unwrap() != ds.mutated.get(pos).unwrap() {
                diffs += 1;
                assert_eq!(pos, ds.mutation_pos);
                assert_eq!(ds.mutated.get(pos).unwrap(), ds.mutation_value);
            }
        }
        assert_eq!(diffs, 1);
    }
}
