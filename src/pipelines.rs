//! The three reconstruction pipelines composing codec, sketches and pump.
//!
//! Each pipeline generates its own input from a seeded PRNG, encodes it
//! into sketches, reconstructs, and verifies the result against the
//! input it generated. The returned reports carry the counters the
//! experiment layer consumes; nothing is written to disk.
//!
//! * `kmer`: hash-only sketch plus a sampled seed sketch plus an
//!   undersized residual sketch, pumped iteratively through the
//!   residual's set-difference decodes.
//! * `hashset-extended`: geometrically sampled stage sketches with
//!   pre-decode cancellation, then the residual sweep.
//! * `mutation`: full k-mer sketch of the original sequences plus an
//!   h-mer hash difference sketch, probed by single-base substitution.

use std::fmt;
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::RecomerError;
use crate::kmer::tabulation::KmerHasher;
use crate::kmer::KmerData;
use crate::pump::{probe_substitution, pump, HashSet64};
use crate::sequence::{DoubleSequence, Sequence};
use crate::sketch::{sized_cells, HashSketch, KmerSketch};

// Seed offsets separating the sketches and sources derived from one
// experiment seed. Arbitrary distinct constants.
const HASH_SKETCH_SEED: u64 = 0x5eed_0001;
const SEED_SKETCH_SEED: u64 = 0x5eed_0002;
const RESIDUAL_SKETCH_SEED: u64 = 0x5eed_0003;
const HMER_SKETCH_SEED: u64 = 0x5eed_0004;
const STAGE_SKETCH_SEED: u64 = 0x5eed_0100;
const SEQUENCE_SEED: u64 = 0x5eed_1000;

/// Parameters shared by every pipeline.
#[derive(Clone, Debug)]
pub struct PipelineParams {
    /// Number of generated sequences (or sequence pairs).
    pub n_sequences: usize,
    /// Length of each sequence in bases.
    pub seq_len: usize,
    /// K-mer length.
    pub kmer_len: usize,
    /// Tables per sketch.
    pub n_tables: usize,
    /// Cell overhead factor relative to the expected item count.
    pub overhead: f64,
    /// Master seed; hash functions, sketches and sequences all derive
    /// from it.
    pub seed: u64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            n_sequences: 100,
            seq_len: 100,
            kmer_len: 31,
            n_tables: 3,
            overhead: 1.4,
            seed: 0,
        }
    }
}

impl PipelineParams {
    fn validate(&self) -> Result<(), RecomerError> {
        if self.n_sequences == 0 {
            return Err(RecomerError::InvalidInput(
                "need at least one sequence".to_string(),
            ));
        }
        if self.kmer_len < 4 {
            return Err(RecomerError::InvalidInput(
                "k-mer length below one hash window".to_string(),
            ));
        }
        if self.seq_len < self.kmer_len {
            return Err(RecomerError::InvalidInput(format!(
                "sequence length {} shorter than k-mer length {}",
                self.seq_len, self.kmer_len
            )));
        }
        if self.n_tables == 0 {
            return Err(RecomerError::InvalidInput(
                "need at least one table".to_string(),
            ));
        }
        if self.overhead <= 0.0 {
            return Err(RecomerError::InvalidInput(
                "overhead factor must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the iterated-pump `kmer` pipeline.
#[derive(Clone, Debug)]
pub struct KmerPipelineParams {
    /// Shared parameters.
    pub base: PipelineParams,
    /// Sampling interval of the seed sketch (`hash % interval == 0`).
    pub sample_interval: u64,
    /// Sizing of the residual sketch relative to the full item count;
    /// deliberately below the decodable threshold.
    pub residual_fraction: f64,
}

impl Default for KmerPipelineParams {
    fn default() -> Self {
        Self {
            base: PipelineParams::default(),
            sample_interval: 16,
            residual_fraction: 0.25,
        }
    }
}

/// Parameters of the `hashset-extended` (staged) pipeline.
#[derive(Clone, Debug)]
pub struct StagedPipelineParams {
    /// Shared parameters.
    pub base: PipelineParams,
    /// Number of sampled k-mer stage sketches.
    pub stages: usize,
    /// Sampling interval of stage 0.
    pub sample_base: u64,
    /// Geometric growth factor of the interval per stage.
    pub shrink: f64,
    /// Sizing of the residual sketch relative to the full item count.
    pub residual_fraction: f64,
}

impl Default for StagedPipelineParams {
    fn default() -> Self {
        Self {
            base: PipelineParams::default(),
            stages: 3,
            sample_base: 15,
            shrink: 1.5,
            residual_fraction: 0.25,
        }
    }
}

/// Parameters of the mutation-detection pipeline.
#[derive(Clone, Debug, Default)]
pub struct MutationPipelineParams {
    /// Shared parameters.
    pub base: PipelineParams,
    /// Probe window length; defaults to half the k-mer length plus one.
    pub hmer_len: Option<usize>,
}

/// Counters and timing from a reconstruction pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    /// Distinct k-mers fed into the sketches.
    pub input_kmers: usize,
    /// Hashes recovered from the hash-only sketch.
    pub recovered_hashes: usize,
    /// Seeds recovered across the seed-bearing decodes.
    pub decoded_seeds: usize,
    /// Size of the final reconstructed set.
    pub reconstructed: usize,
    /// Input k-mers absent from the reconstruction.
    pub missing: usize,
    /// Reconstructed items whose hash is not in the input.
    pub false_positives: usize,
    /// Pump invocations, including the initial one.
    pub pump_rounds: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input k-mers:\t{}", self.input_kmers)?;
        writeln!(f, "recovered hashes:\t{}", self.recovered_hashes)?;
        writeln!(f, "decoded seeds:\t{}", self.decoded_seeds)?;
        writeln!(f, "reconstructed:\t{}", self.reconstructed)?;
        writeln!(f, "missing:\t{}", self.missing)?;
        writeln!(f, "false positives:\t{}", self.false_positives)?;
        writeln!(f, "pump rounds:\t{}", self.pump_rounds)?;
        write!(f, "elapsed:\t{:.3}s", self.elapsed.as_secs_f64())
    }
}

/// Counters from the mutation-detection pipeline.
#[derive(Clone, Debug)]
pub struct MutationReport {
    /// Distinct original-sequence k-mers fed into the main sketch.
    pub input_kmers: usize,
    /// K-mers recovered from the main sketch.
    pub decoded_kmers: usize,
    /// Recovered k-mers whose window straddles their planted mutation.
    pub straddling: usize,
    /// Straddling k-mers for which the probe returned a hit.
    pub located: usize,
    /// Hits matching the planted (position, base) exactly.
    pub correct: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl fmt::Display for MutationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input k-mers:\t{}", self.input_kmers)?;
        writeln!(f, "decoded k-mers:\t{}", self.decoded_kmers)?;
        writeln!(f, "straddling:\t{}", self.straddling)?;
        writeln!(f, "located:\t{}", self.located)?;
        writeln!(f, "correct:\t{}", self.correct)?;
        write!(f, "elapsed:\t{:.3}s", self.elapsed.as_secs_f64())
    }
}

/// Push items whose hash has not been seen yet; duplicate XOR insertions
/// would cancel in the sketches.
fn collect_distinct(
    stream: impl Iterator<Item = KmerData>,
    seen: &mut HashSet64,
    out: &mut Vec<KmerData>,
) {
    for item in stream {
        if seen.insert(item.hash) {
            out.push(item);
        }
    }
}

/// Iterated pump through an undersized residual sketch.
///
/// Each round cancels the newly reconstructed items out of the residual
/// (set-difference), decodes the leftovers that became peelable, and
/// pumps them as fresh seeds. Items the decode itself removed from the
/// sketch must not be cancelled again. Stops when a round adds nothing.
fn residual_rounds(
    residual: &mut KmerSketch,
    reconstructed: &mut HashSet<KmerData>,
    hashes: &mut HashSet64,
    hasher: &KmerHasher,
    decoded_seeds: &mut usize,
    pump_rounds: &mut usize,
) {
    let mut pending: Vec<KmerData> = reconstructed.iter().cloned().collect();
    loop {
        residual.encode(&pending);
        let leftovers = residual.decode();
        *decoded_seeds += leftovers.len();
        let leftover_keys: HashSet64 = leftovers.iter().map(|item| item.hash).collect();
        let pumped = pump(&leftovers, hashes, hasher);
        *pump_rounds += 1;
        log::debug!(
            "residual round: {} leftovers, {} pumped",
            leftovers.len(),
            pumped.len()
        );
        pending.clear();
        pending.extend(
            pumped
                .iter()
                .filter(|item| !leftover_keys.contains(&item.hash))
                .cloned(),
        );
        let mut grew = false;
        for item in pumped {
            grew |= reconstructed.insert(item);
        }
        if !grew {
            break;
        }
    }
}

fn verify(
    input_keys: &HashSet64,
    items: &[KmerData],
    reconstructed: &HashSet<KmerData>,
) -> (usize, usize) {
    let recovered_keys: HashSet64 = reconstructed.iter().map(|item| item.hash).collect();
    let missing = items
        .iter()
        .filter(|item| !recovered_keys.contains(&item.hash))
        .count();
    let false_positives = reconstructed
        .iter()
        .filter(|item| !input_keys.contains(&item.hash))
        .count();
    (missing, false_positives)
}

/// Reconstruct the full k-mer set of random sequences from a hash-only
/// sketch, a sampled seed sketch and an undersized residual sketch.
pub fn run_kmer_pipeline(params: &KmerPipelineParams) -> Result<PipelineReport, RecomerError> {
    let p = &params.base;
    p.validate()?;
    if params.sample_interval == 0 {
        return Err(RecomerError::InvalidInput(
            "sampling interval must be positive".to_string(),
        ));
    }
    if params.residual_fraction <= 0.0 {
        return Err(RecomerError::InvalidInput(
            "residual fraction must be positive".to_string(),
        ));
    }
    let start = Instant::now();
    let hasher = KmerHasher::new(p.seed);
    let mut rng = StdRng::seed_from_u64(p.seed.wrapping_add(SEQUENCE_SEED));

    let mut input_keys = HashSet64::default();
    let mut items: Vec<KmerData> = Vec::new();
    for s in 0..p.n_sequences {
        let seq = Sequence::random(p.seq_len, (s * p.seq_len) as u32, s as u32, &mut rng)?;
        collect_distinct(seq.kmers(p.kmer_len, &hasher), &mut input_keys, &mut items);
    }
    let n = items.len();
    log::info!("{} distinct k-mers from {} sequences", n, p.n_sequences);

    let hashes_in: Vec<u64> = items.iter().map(|item| item.hash).collect();
    let mut hash_sketch = HashSketch::hashes(
        p.n_tables,
        sized_cells(n, p.overhead),
        p.seed ^ HASH_SKETCH_SEED,
    )?;
    hash_sketch.encode(&hashes_in);

    let expected_seeds = n / params.sample_interval as usize + 1;
    let mut seed_sketch = KmerSketch::kmers(
        p.n_tables,
        p.kmer_len,
        sized_cells(expected_seeds, p.overhead),
        p.seed ^ SEED_SKETCH_SEED,
    )?;
    seed_sketch.encode_sampled(&items, params.sample_interval)?;

    let mut residual = KmerSketch::kmers(
        p.n_tables,
        p.kmer_len,
        sized_cells(n, params.residual_fraction),
        p.seed ^ RESIDUAL_SKETCH_SEED,
    )?;
    residual.encode(&items);

    let mut hashes: HashSet64 = hash_sketch.decode().into_iter().collect();
    let recovered_hashes = hashes.len();
    let seeds = seed_sketch.decode();
    let mut decoded_seeds = seeds.len();
    log::info!("decoded {recovered_hashes} hashes and {decoded_seeds} seeds");

    let mut reconstructed = pump(&seeds, &mut hashes, &hasher);
    let mut pump_rounds = 1;
    residual_rounds(
        &mut residual,
        &mut reconstructed,
        &mut hashes,
        &hasher,
        &mut decoded_seeds,
        &mut pump_rounds,
    );

    let (missing, false_positives) = verify(&input_keys, &items, &reconstructed);
    log::info!(
        "reconstructed {} of {} ({} rounds)",
        reconstructed.len(),
        n,
        pump_rounds
    );
    Ok(PipelineReport {
        input_kmers: n,
        recovered_hashes,
        decoded_seeds,
        reconstructed: reconstructed.len(),
        missing,
        false_positives,
        pump_rounds,
        elapsed: start.elapsed(),
    })
}

/// The `hashset-extended` pipeline: geometric sampling stages with
/// pre-decode cancellation, then the residual sweep.
///
/// Stage `i` samples at interval `ceil(sample_base * shrink^i)`. Before
/// a stage is decoded, everything already reconstructed is re-encoded
/// into it (restricted to the stage's own sampling predicate), so the
/// decode yields only still-missing seeds.
pub fn run_staged_pipeline(params: &StagedPipelineParams) -> Result<PipelineReport, RecomerError> {
    let p = &params.base;
    p.validate()?;
    if params.stages == 0 || params.sample_base == 0 {
        return Err(RecomerError::InvalidInput(
            "need at least one stage and a positive sampling base".to_string(),
        ));
    }
    if params.shrink < 1.0 {
        return Err(RecomerError::InvalidInput(
            "shrink factor must be at least 1".to_string(),
        ));
    }
    if params.residual_fraction <= 0.0 {
        return Err(RecomerError::InvalidInput(
            "residual fraction must be positive".to_string(),
        ));
    }
    let start = Instant::now();
    let hasher = KmerHasher::new(p.seed);
    let mut rng = StdRng::seed_from_u64(p.seed.wrapping_add(SEQUENCE_SEED));

    // both halves of each pair, shared k-mers deduplicated
    let mut input_keys = HashSet64::default();
    let mut items: Vec<KmerData> = Vec::new();
    for s in 0..p.n_sequences {
        let ds = DoubleSequence::random(p.seq_len, (s * p.seq_len) as u32, s as u32, &mut rng)?;
        collect_distinct(
            ds.original.kmers(p.kmer_len, &hasher),
            &mut input_keys,
            &mut items,
        );
        collect_distinct(
            ds.mutated.kmers(p.kmer_len, &hasher),
            &mut input_keys,
            &mut items,
        );
    }
    let n = items.len();
    log::info!("{} distinct k-mers from {} pairs", n, p.n_sequences);

    let hashes_in: Vec<u64> = items.iter().map(|item| item.hash).collect();
    let mut hash_sketch = HashSketch::hashes(
        p.n_tables,
        sized_cells(n, p.overhead),
        p.seed ^ HASH_SKETCH_SEED,
    )?;
    hash_sketch.encode(&hashes_in);

    let mut stage_sketches: Vec<(KmerSketch, u64)> = Vec::with_capacity(params.stages);
    for i in 0..params.stages {
        let interval = (params.sample_base as f64 * params.shrink.powi(i as i32)).ceil() as u64;
        let expected = n / interval as usize + 1;
        let mut sketch = KmerSketch::kmers(
            p.n_tables,
            p.kmer_len,
            sized_cells(expected, p.overhead),
            p.seed ^ (STAGE_SKETCH_SEED + i as u64),
        )?;
        sketch.encode_sampled(&items, interval)?;
        stage_sketches.push((sketch, interval));
    }

    let mut residual = KmerSketch::kmers(
        p.n_tables,
        p.kmer_len,
        sized_cells(n, params.residual_fraction),
        p.seed ^ RESIDUAL_SKETCH_SEED,
    )?;
    residual.encode(&items);

    let mut hashes: HashSet64 = hash_sketch.decode().into_iter().collect();
    let recovered_hashes = hashes.len();
    let mut reconstructed: HashSet<KmerData> = HashSet::new();
    let mut decoded_seeds = 0;
    let mut pump_rounds = 0;

    for (sketch, interval) in stage_sketches.iter_mut() {
        if !reconstructed.is_empty() {
            let recovered: Vec<KmerData> = reconstructed.iter().cloned().collect();
            sketch.encode_sampled(&recovered, *interval)?;
        }
        let seeds = sketch.decode();
        decoded_seeds += seeds.len();
        let pumped = pump(&seeds, &mut hashes, &hasher);
        pump_rounds += 1;
        log::info!(
            "stage interval {}: {} seeds, {} pumped",
            interval,
            seeds.len(),
            pumped.len()
        );
        reconstructed.extend(pumped);
    }

    residual_rounds(
        &mut residual,
        &mut reconstructed,
        &mut hashes,
        &hasher,
        &mut decoded_seeds,
        &mut pump_rounds,
    );

    let (missing, false_positives) = verify(&input_keys, &items, &reconstructed);
    log::info!(
        "reconstructed {} of {} ({} rounds)",
        reconstructed.len(),
        n,
        pump_rounds
    );
    Ok(PipelineReport {
        input_kmers: n,
        recovered_hashes,
        decoded_seeds,
        reconstructed: reconstructed.len(),
        missing,
        false_positives,
        pump_rounds,
        elapsed: start.elapsed(),
    })
}

/// The mutation-detection pipeline.
///
/// Original-sequence k-mers carry their planted mutation in metadata and
/// go into a fully sized k-mer sketch. H-mer hashes of both copies go
/// into one hash sketch, so what survives is the symmetric difference:
/// exactly the windows straddling each mutation. Every recovered k-mer
/// that straddles its mutation is then probed by substitution against
/// that set.
pub fn run_mutation_pipeline(
    params: &MutationPipelineParams,
) -> Result<MutationReport, RecomerError> {
    let p = &params.base;
    p.validate()?;
    let hmer_len = params.hmer_len.unwrap_or(p.kmer_len / 2 + 1);
    if !(4..=p.kmer_len).contains(&hmer_len) {
        return Err(RecomerError::InvalidInput(format!(
            "h-mer length {hmer_len} outside 4..={}",
            p.kmer_len
        )));
    }
    let start = Instant::now();
    let hasher = KmerHasher::new(p.seed);
    let mut rng = StdRng::seed_from_u64(p.seed.wrapping_add(SEQUENCE_SEED));

    let mut input_keys = HashSet64::default();
    let mut items: Vec<KmerData> = Vec::new();
    let mut hmer_hashes_in: Vec<u64> = Vec::new();
    for s in 0..p.n_sequences {
        let ds = DoubleSequence::random(p.seq_len, (s * p.seq_len) as u32, s as u32, &mut rng)?;
        let mutation_index = ds.original.base_offset() + ds.mutation_pos as u32;
        for mut item in ds.original.kmers(p.kmer_len, &hasher) {
            item.meta.mutation_index = mutation_index;
            item.meta.mutation_value = ds.mutation_value as u32;
            if input_keys.insert(item.hash) {
                items.push(item);
            }
        }
        // shared h-mers cancel pairwise, leaving the straddling windows
        for item in ds.original.kmers(hmer_len, &hasher) {
            hmer_hashes_in.push(item.hash);
        }
        for item in ds.mutated.kmers(hmer_len, &hasher) {
            hmer_hashes_in.push(item.hash);
        }
    }
    let n = items.len();
    log::info!("{} distinct original k-mers from {} pairs", n, p.n_sequences);

    let mut main_sketch = KmerSketch::kmers(
        p.n_tables,
        p.kmer_len,
        sized_cells(n, p.overhead),
        p.seed ^ SEED_SKETCH_SEED,
    )?;
    main_sketch.encode(&items);

    let expected_diff = 2 * hmer_len * p.n_sequences;
    let mut hmer_sketch = HashSketch::hashes(
        p.n_tables,
        sized_cells(expected_diff, p.overhead),
        p.seed ^ HMER_SKETCH_SEED,
    )?;
    hmer_sketch.encode(&hmer_hashes_in);

    let decoded = main_sketch.decode();
    let hmer_hashes: HashSet64 = hmer_sketch.decode().into_iter().collect();
    log::info!(
        "decoded {} k-mers and {} difference h-mers",
        decoded.len(),
        hmer_hashes.len()
    );

    let mut straddling = 0;
    let mut located = 0;
    let mut correct = 0;
    for item in &decoded {
        let start_index = item.meta.index;
        let end_index = start_index + p.kmer_len as u32;
        if item.meta.mutation_index < start_index || item.meta.mutation_index >= end_index {
            continue;
        }
        straddling += 1;
        if let Some((index, base)) = probe_substitution(item, hmer_len, &hmer_hashes, &hasher) {
            located += 1;
            if index == item.meta.mutation_index && base as u32 == item.meta.mutation_value {
                correct += 1;
            }
        }
    }
    log::info!("{straddling} straddling k-mers, {located} located, {correct} correct");

    Ok(MutationReport {
        input_kmers: n,
        decoded_kmers: decoded.len(),
        straddling,
        located,
        correct,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        let mut params = KmerPipelineParams::default();
        params.base.kmer_len = 3;
        assert!(run_kmer_pipeline(&params).is_err());

        let mut params = KmerPipelineParams::default();
        params.sample_interval = 0;
        assert!(run_kmer_pipeline(&params).is_err());

        let mut params = KmerPipelineParams::default();
        params.residual_fraction = 0.0;
        assert!(run_kmer_pipeline(&params).is_err());

        let mut params = StagedPipelineParams::default();
        params.shrink = 0.5;
        assert!(run_staged_pipeline(&params).is_err());

        let mut params = StagedPipelineParams::default();
        params.residual_fraction = -1.0;
        assert!(run_staged_pipeline(&params).is_err());

        let mut params = MutationPipelineParams::default();
        params.hmer_len = Some(2);
        assert!(run_mutation_pipeline(&params).is_err());

        let mut params = PipelineParams::default();
        params.seq_len = 10;
        params.kmer_len = 31;
        assert!(params.validate().is_err());
    }
}
