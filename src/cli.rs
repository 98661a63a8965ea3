//! Command line interface: one subcommand per pipeline.

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Options shared by every pipeline subcommand.
#[derive(ClapArgs, Debug)]
pub struct CommonOpts {
    /// Number of random sequences (or sequence pairs)
    #[arg(short = 'n', long, default_value_t = 100)]
    pub sequences: usize,

    /// Length of each sequence in bases
    #[arg(short = 'l', long, default_value_t = 100)]
    pub length: usize,

    /// K-mer length
    #[arg(short, long, default_value_t = 31)]
    pub kmer: usize,

    /// Tables per sketch
    #[arg(short, long, default_value_t = 3)]
    pub tables: usize,

    /// Cell overhead factor relative to the expected item count
    #[arg(long, default_value_t = 1.4)]
    pub overhead: f64,

    /// Master seed for hash functions, sketches and sequences
    #[arg(short, long, default_value_t = 0)]
    pub seed: u64,
}

/// Top-level arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    /// Pipeline to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Print progress messages to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Size of the thread pool (default: all cores)
    #[arg(long, global = true)]
    pub threads: Option<usize>,
}

/// One subcommand per reconstruction pipeline.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconstruct a k-mer set from sampled seeds with the iterated pump
    Kmer {
        /// Shared sizing options.
        #[command(flatten)]
        common: CommonOpts,

        /// Seed-sketch sampling interval (hash % interval == 0)
        #[arg(long, default_value_t = 16)]
        interval: u64,

        /// Residual sketch size as a fraction of the item count
        #[arg(long, default_value_t = 0.25)]
        residual: f64,
    },
    /// Staged geometric sampling with a residual sweep
    Hashset {
        /// Shared sizing options.
        #[command(flatten)]
        common: CommonOpts,

        /// Number of sampled stage sketches
        #[arg(long, default_value_t = 3)]
        stages: usize,

        /// Sampling interval of stage 0
        #[arg(long, default_value_t = 15)]
        interval: u64,

        /// Geometric growth factor of the interval per stage
        #[arg(long, default_value_t = 1.5)]
        shrink: f64,

        /// Residual sketch size as a fraction of the item count
        #[arg(long, default_value_t = 0.25)]
        residual: f64,
    },
    /// Locate planted single-base mutations by h-mer probing
    Mutation {
        /// Shared sizing options.
        #[command(flatten)]
        common: CommonOpts,

        /// Probe window length (default: kmer / 2 + 1)
        #[arg(long)]
        hmer: Option<usize>,
    },
}

/// Parse the command line.
pub fn cli_args() -> Args {
    Args::parse()
}
