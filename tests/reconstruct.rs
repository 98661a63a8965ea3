// End-to-end reconstruction: pump completeness and the three pipelines.

use pretty_assertions::assert_eq;

use recomer::kmer::tabulation::KmerHasher;
use recomer::pipelines::{
    run_kmer_pipeline, run_mutation_pipeline, run_staged_pipeline, KmerPipelineParams,
    MutationPipelineParams, PipelineParams, StagedPipelineParams,
};
use recomer::pump::{pump, HashSet64};
use recomer::sequence::Sequence;
use recomer::sketch::{sized_cells, HashSketch, KmerSketch};

use rand::rngs::StdRng;
use rand::SeedableRng;

fn test_base(n_sequences: usize, seed: u64) -> PipelineParams {
    PipelineParams {
        n_sequences,
        seq_len: 100,
        kmer_len: 31,
        n_tables: 4,
        overhead: 1.6,
        seed,
    }
}

#[test]
fn pump_recovers_everything_decodable() {
    // seeds from a sampled sketch, hashes from a hash-only sketch: the
    // pump must account for every hash reachable from the seeds
    let hasher = KmerHasher::new(0);
    let mut rng = StdRng::seed_from_u64(2);

    let mut items = Vec::new();
    for s in 0..20u32 {
        let seq = Sequence::random(100, s * 100, s, &mut rng).unwrap();
        items.extend(seq.kmers(31, &hasher));
    }

    let hashes_in: Vec<u64> = items.iter().map(|item| item.hash).collect();
    let mut hash_sketch =
        HashSketch::hashes(4, sized_cells(hashes_in.len(), 1.6), 11).unwrap();
    hash_sketch.encode(&hashes_in);

    let interval = 8u64;
    let mut seed_sketch = KmerSketch::kmers(
        4,
        31,
        sized_cells(items.len() / interval as usize + 1, 1.6),
        12,
    )
    .unwrap();
    seed_sketch.encode_sampled(&items, interval).unwrap();

    let mut hashes: HashSet64 = hash_sketch.decode().into_iter().collect();
    assert_eq!(hashes.len(), items.len());
    let seeds = seed_sketch.decode();
    assert!(!seeds.is_empty());

    let reconstructed = pump(&seeds, &mut hashes, &hasher);

    // every sequence containing a seed is recovered end to end
    let seeded: hashbrown::HashSet<u32> = seeds.iter().map(|s| s.meta.set_id).collect();
    for item in &items {
        if seeded.contains(&item.meta.set_id) {
            assert!(
                reconstructed.contains(item),
                "missing k-mer at index {}",
                item.meta.index
            );
        }
    }
    // and nothing outside the input appears
    let input_keys: HashSet64 = items.iter().map(|item| item.hash).collect();
    for got in &reconstructed {
        assert!(input_keys.contains(&got.hash));
    }
}

#[test]
fn kmer_pipeline_full_recovery() {
    let params = KmerPipelineParams {
        base: test_base(80, 0),
        sample_interval: 16,
        residual_fraction: 0.25,
    };
    let report = run_kmer_pipeline(&params).unwrap();

    assert_eq!(report.recovered_hashes, report.input_kmers);
    assert_eq!(report.reconstructed, report.input_kmers);
    assert_eq!(report.missing, 0);
    assert_eq!(report.false_positives, 0);
    assert!(report.pump_rounds >= 2);
}

#[test]
fn kmer_pipeline_deterministic_given_seed() {
    let params = KmerPipelineParams {
        base: test_base(30, 99),
        sample_interval: 16,
        residual_fraction: 0.25,
    };
    let a = run_kmer_pipeline(&params).unwrap();
    let b = run_kmer_pipeline(&params).unwrap();
    assert_eq!(a.input_kmers, b.input_kmers);
    assert_eq!(a.recovered_hashes, b.recovered_hashes);
    assert_eq!(a.decoded_seeds, b.decoded_seeds);
    assert_eq!(a.reconstructed, b.reconstructed);
    assert_eq!(a.missing, b.missing);
    assert_eq!(a.pump_rounds, b.pump_rounds);
}

#[test]
fn staged_pipeline_full_recovery() {
    // the hashset-extended configuration: three geometric stages over
    // double sequences, then the residual sweep
    let params = StagedPipelineParams {
        base: test_base(50, 0),
        stages: 3,
        sample_base: 15,
        shrink: 1.5,
        residual_fraction: 0.25,
    };
    let report = run_staged_pipeline(&params).unwrap();

    assert_eq!(report.recovered_hashes, report.input_kmers);
    assert_eq!(report.reconstructed, report.input_kmers);
    assert_eq!(report.missing, 0);
    assert_eq!(report.false_positives, 0);
    // 70 shared-prefix/suffix windows plus 31 straddling ones per pair
    assert_eq!(report.input_kmers, 50 * 101);
}

#[test]
fn mutation_pipeline_locates_planted_mutations() {
    let params = MutationPipelineParams {
        base: test_base(50, 0),
        hmer_len: None,
    };
    let report = run_mutation_pipeline(&params).unwrap();

    assert_eq!(report.decoded_kmers, report.input_kmers);
    // every 31-mer window straddling position 50 of its pair
    assert_eq!(report.straddling, 50 * 31);
    assert_eq!(report.located, report.straddling);
    assert_eq!(report.correct, report.straddling);
}

#[test]
fn mutation_pipeline_with_short_probes() {
    let params = MutationPipelineParams {
        base: test_base(10, 5),
        hmer_len: Some(13),
    };
    let report = run_mutation_pipeline(&params).unwrap();
    assert_eq!(report.located, report.straddling);
    assert_eq!(report.correct, report.straddling);
}
