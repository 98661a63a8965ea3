//! Set reconciliation and reconstruction of DNA k-mers with invertible
//! Bloom lookup tables (IBLTs) and rolling tabulation hashes.
//!
//! A set of fixed-length DNA substrings ("k-mers") is summarised into a
//! compact multi-table XOR sketch. Peeling the sketch recovers a sparse
//! subset of the items; because consecutive k-mers overlap in all but
//! one base, a graph walk ("pump") rebuilds everything else from a
//! recovered set of bare hashes, probing neighbours in O(1) with
//! rolling hash updates.
//!
//! The three moving parts:
//!
//! * [`kmer`]: 2-bit packed k-mers ([`kmer::packed::Kmer`]) supporting
//!   shift, substitution and XOR, plus the tabulation hash
//!   ([`kmer::tabulation::KmerHasher`]) whose window structure makes the
//!   rolling updates exact.
//! * [`sketch`]: invertible multi-table sketches over k-mer or plain
//!   hash payloads, decoded by cross-peeling with a tabu cycle breaker.
//! * [`pump`]: the depth-first reconstruction walk and the
//!   substitution probe used for mutation detection.
//!
//! [`pipelines`] composes them into three self-verifying experiment
//! pipelines, runnable from the CLI:
//!
//! ```bash
//! recomer kmer -n 200 -l 100 -k 31 --interval 16 -v
//! recomer hashset --stages 3 --interval 15 --shrink 1.5
//! recomer mutation -n 200 --hmer 16
//! ```
//!
//! # API usage
//!
//! Round-trip a set of hashes through a sketch:
//!
//! ```rust
//! use recomer::sketch::{sized_cells, HashSketch};
//!
//! let values: Vec<u64> = (1..=50u64).map(|v| v.wrapping_mul(0x9e3779b97f4a7c15)).collect();
//! let mut sketch = HashSketch::hashes(3, sized_cells(values.len(), 1.3), 0).unwrap();
//! sketch.encode(&values);
//!
//! let mut decoded = sketch.decode();
//! decoded.sort_unstable();
//! let mut expected = values.clone();
//! expected.sort_unstable();
//! assert_eq!(decoded, expected);
//! ```
//!
//! Reconstruct a sequence's k-mers from one seed and its hash set:
//!
//! ```rust
//! use recomer::kmer::tabulation::KmerHasher;
//! use recomer::pump::{pump, HashSet64};
//! use recomer::sequence::Sequence;
//!
//! let hasher = KmerHasher::new(0);
//! let seq = Sequence::from_string("ACGTACGTACGGTCATTGCA", 0, 0).unwrap();
//! let kmers: Vec<_> = seq.kmers(11, &hasher).collect();
//!
//! let mut hashes: HashSet64 = kmers.iter().map(|item| item.hash).collect();
//! let recovered = pump(&kmers[..1], &mut hashes, &hasher);
//! assert_eq!(recovered.len(), kmers.len());
//! ```
//!
//! Everything is deterministic given the seeds: XOR aggregation is
//! commutative, each parallel worker owns its table outright, and the
//! decode controller runs single-threaded between steps.

#![warn(missing_docs)]

use std::time::Instant;

pub mod cli;
pub mod error;
pub mod kmer;
pub mod pipelines;
pub mod pump;
pub mod sequence;
pub mod sketch;

use crate::cli::{Args, Commands};
use crate::error::RecomerError;
use crate::pipelines::{
    KmerPipelineParams, MutationPipelineParams, PipelineParams, StagedPipelineParams,
};

fn base_params(common: &cli::CommonOpts) -> PipelineParams {
    PipelineParams {
        n_sequences: common.sequences,
        seq_len: common.length,
        kmer_len: common.kmer,
        n_tables: common.tables,
        overhead: common.overhead,
        seed: common.seed,
    }
}

fn run(args: &Args) -> Result<(), RecomerError> {
    match &args.command {
        Commands::Kmer {
            common,
            interval,
            residual,
        } => {
            let params = KmerPipelineParams {
                base: base_params(common),
                sample_interval: *interval,
                residual_fraction: *residual,
            };
            let report = pipelines::run_kmer_pipeline(&params)?;
            println!("{report}");
        }
        Commands::Hashset {
            common,
            stages,
            interval,
            shrink,
            residual,
        } => {
            let params = StagedPipelineParams {
                base: base_params(common),
                stages: *stages,
                sample_base: *interval,
                shrink: *shrink,
                residual_fraction: *residual,
            };
            let report = pipelines::run_staged_pipeline(&params)?;
            println!("{report}");
        }
        Commands::Mutation { common, hmer } => {
            let params = MutationPipelineParams {
                base: base_params(common),
                hmer_len: *hmer,
            };
            let report = pipelines::run_mutation_pipeline(&params)?;
            println!("{report}");
        }
    }
    Ok(())
}

#[doc(hidden)]
pub fn main() {
    let args = cli::cli_args();
    if args.verbose {
        simple_logger::init_with_level(log::Level::Info).unwrap();
    }
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .unwrap();
    }

    eprintln!("recomer: k-mer set reconstruction from invertible sketches");
    let start = Instant::now();
    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    let end = Instant::now();
    eprintln!("recomer done in {}s", end.duration_since(start).as_secs());
    log::info!("Complete");
}
