//! Reconstruction of k-mer sets by walking rolling-hash extensions.
//!
//! The pump treats the recovered hash set as an oracle over an implicit
//! graph: each k-mer has four forward neighbours (shift left by a base)
//! and four reverse neighbours (shift right). Starting from decoded
//! seeds, a depth-first walk probes each neighbour's hash in O(1) via
//! the rolling update and materialises every k-mer whose hash is
//! present. Each hash is consumed at most once, so the walk does
//! O(|hashes|) rolling updates in total.

use hashbrown::HashSet;
use nohash_hasher::BuildNoHashHasher;

use crate::kmer::packed::Kmer;
use crate::kmer::tabulation::KmerHasher;
use crate::kmer::{KmerData, KmerMeta};

/// Hash set keyed directly by tabulation hashes (no re-hashing).
pub type HashSet64 = HashSet<u64, BuildNoHashHasher<u64>>;

/// Expand decoded seeds into every k-mer reachable by rolling
/// extensions whose hash is in `hashes`.
///
/// From each k-mer the four forward extensions are probed in base order
/// and the first whose hash is present is taken (removing the hash);
/// independently the same is done for the four reverse extensions. At
/// most one neighbour per direction is expected to lie in the set, and
/// base order makes ties deterministic.
///
/// Consumed hashes are removed from `hashes`; what remains afterwards
/// was unreachable from the given seeds.
pub fn pump(
    seeds: &[KmerData],
    hashes: &mut HashSet64,
    hasher: &KmerHasher,
) -> HashSet<KmerData> {
    let mut reconstructed: HashSet<KmerData> = HashSet::with_capacity(hashes.len());
    let mut stack: Vec<KmerData> = Vec::with_capacity(seeds.len());

    for seed in seeds {
        if hashes.remove(&seed.hash) {
            stack.push(seed.clone());
            reconstructed.insert(seed.clone());
        }
    }

    while let Some(current) = stack.pop() {
        for base in 0..4u8 {
            let hash = hasher.roll_forward(current.hash, &current.kmer, base);
            if hashes.remove(&hash) {
                let mut kmer = current.kmer.clone();
                kmer.shift_left(base);
                let meta = KmerMeta {
                    index: current.meta.index.wrapping_add(1),
                    ..current.meta
                };
                let next = KmerData { kmer, hash, meta };
                reconstructed.insert(next.clone());
                stack.push(next);
                break;
            }
        }
        for base in 0..4u8 {
            let hash = hasher.roll_backward(current.hash, &current.kmer, base);
            if hashes.remove(&hash) {
                let mut kmer = current.kmer.clone();
                kmer.shift_right(base);
                let meta = KmerMeta {
                    index: current.meta.index.wrapping_sub(1),
                    ..current.meta
                };
                let next = KmerData { kmer, hash, meta };
                reconstructed.insert(next.clone());
                stack.push(next);
                break;
            }
        }
    }

    reconstructed
}

/// Locate a single-base substitution inside a recovered k-mer by probing
/// h-mer hashes.
///
/// Slides every `hmer_len` window across the k-mer with its hash rolled
/// along, and for each window position and each of the three
/// non-identity bases checks the substituted window's hash against
/// `hmer_hashes`. The first hit is returned as the global base index and
/// the substituted base; [`None`] means no window probe matched.
pub fn probe_substitution(
    item: &KmerData,
    hmer_len: usize,
    hmer_hashes: &HashSet64,
    hasher: &KmerHasher,
) -> Option<(u32, u8)> {
    let k = item.kmer.len();
    if !(4..=k).contains(&hmer_len) {
        return None;
    }
    let mut window = Kmer::zeroed(hmer_len);
    for pos in 0..hmer_len {
        window.set_base(pos, item.kmer.base_at(pos));
    }
    let mut hash = hasher.hash(&window);
    for start in 0..=(k - hmer_len) {
        if start > 0 {
            let incoming = item.kmer.base_at(start + hmer_len - 1);
            hash = hasher.roll_forward(hash, &window, incoming);
            window.shift_left(incoming);
        }
        for pos in 0..hmer_len {
            let current = window.base_at(pos);
            for base in 0..4u8 {
                if base == current {
                    continue;
                }
                let probed = hasher.substitute(hash, &window, pos, base);
                if hmer_hashes.contains(&probed) {
                    return Some((item.meta.index + (start + pos) as u32, base));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::sequence::Sequence;

    fn hash_set(items: &[KmerData]) -> HashSet64 {
        items.iter().map(|item| item.hash).collect()
    }

    #[test]
    fn test_pump_recovers_chain_from_middle_seed() {
        let hasher = KmerHasher::new(0);
        let mut rng = StdRng::seed_from_u64(4);
        let seq = Sequence::random(80, 0, 0, &mut rng).unwrap();
        let items: Vec<KmerData> = seq.kmers(21, &hasher).collect();

        let mut hashes = hash_set(&items);
        let seed = items[items.len() / 2].clone();
        let reconstructed = pump(&[seed], &mut hashes, &hasher);

        assert_eq!(reconstructed.len(), items.len());
        assert!(hashes.is_empty());
        for item in &items {
            assert!(reconstructed.contains(item));
        }
        // metadata indexes are rebuilt from the seed's position
        for got in &reconstructed {
            let want = &items[got.meta.index as usize];
            assert_eq!(got.kmer, want.kmer);
        }
    }

    #[test]
    fn test_pump_skips_seeds_outside_hash_set() {
        let hasher = KmerHasher::new(0);
        let mut rng = StdRng::seed_from_u64(5);
        let seq = Sequence::random(40, 0, 0, &mut rng).unwrap();
        let items: Vec<KmerData> = seq.kmers(15, &hasher).collect();

        let mut hashes = HashSet64::default();
        let reconstructed = pump(&items[..2], &mut hashes, &hasher);
        assert!(reconstructed.is_empty());
    }

    #[test]
    fn test_pump_consumes_each_hash_once() {
        let hasher = KmerHasher::new(0);
        let mut rng = StdRng::seed_from_u64(6);
        let seq = Sequence::random(60, 0, 0, &mut rng).unwrap();
        let items: Vec<KmerData> = seq.kmers(13, &hasher).collect();

        let mut hashes = hash_set(&items);
        // duplicate seeds must not duplicate output
        let seeds = vec![items[0].clone(), items[0].clone()];
        let reconstructed = pump(&seeds, &mut hashes, &hasher);
        assert_eq!(reconstructed.len(), items.len());
    }

    #[test]
    fn test_probe_substitution_finds_planted_mutation() {
        let hasher = KmerHasher::new(2);
        let mut rng = StdRng::seed_from_u64(7);
        let seq = Sequence::random(31, 0, 0, &mut rng).unwrap();
        let item = seq.kmers(31, &hasher).next().unwrap();

        let hmer_len = 11;
        let mutation_pos = 16;
        let old = seq.get(mutation_pos).unwrap();
        let new = crate::kmer::bit_encoding::next_base(old);

        // recovered h-mer set: every window of the mutated copy that
        // straddles the substitution
        let mut mutated = item.kmer.clone();
        mutated.set(mutation_pos, new).unwrap();
        let mut hmer_hashes = HashSet64::default();
        for start in 0..=(31 - hmer_len) {
            if start <= mutation_pos && mutation_pos < start + hmer_len {
                let mut window = Kmer::zeroed(hmer_len);
                for pos in 0..hmer_len {
                    window.set_base(pos, mutated.base_at(start + pos));
                }
                hmer_hashes.insert(hasher.hash(&window));
            }
        }

        let hit = probe_substitution(&item, hmer_len, &hmer_hashes, &hasher);
        assert_eq!(hit, Some((mutation_pos as u32, new)));
    }

    #[test]
    fn test_probe_substitution_rejects_bad_window() {
        let hasher = KmerHasher::new(2);
        let mut rng = StdRng::seed_from_u64(8);
        let seq = Sequence::random(20, 0, 0, &mut rng).unwrap();
        let item = seq.kmers(20, &hasher).next().unwrap();
        let hashes = HashSet64::default();
        assert_eq!(probe_substitution(&item, 3, &hashes, &hasher), None);
        assert_eq!(probe_substitution(&item, 21, &hashes, &hasher), None);
        assert_eq!(probe_substitution(&item, 10, &hashes, &hasher), None);
    }
}
