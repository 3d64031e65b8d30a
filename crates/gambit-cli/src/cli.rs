//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub(crate) const CLI_LONG_ABOUT: &str =
    "Termination-certificate synthesis for adversarial transition systems.\n\n\
    Typical use:\n  \
    1. gambit emit --system nondet-loop --out query.smt2\n  \
    2. gambit synthesize --system nondet-loop --configs ./configs\n\n\
    Configurations are JSON files ({ \"command\": ..., \"args\": [...],\n\
    \"timeout_secs\": ... }) tried in lexicographic filename order; the\n\
    first one answering sat wins.";

#[derive(Parser)]
#[command(name = "gambit")]
#[command(about = "Termination-certificate synthesis for adversarial transition systems")]
#[command(long_about = CLI_LONG_ABOUT)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Flags shared by every command that builds a system and encodes it.
#[derive(Args)]
pub(crate) struct EncodeOpts {
    /// Example system to analyze (bucket-game, bucket-game-split,
    /// nondet-loop)
    #[arg(long)]
    pub(crate) system: String,

    /// Encoding strategy: quantified | farkas
    #[arg(long, default_value = "quantified")]
    pub(crate) encoding: String,

    /// Conjoin location invariants into every antecedent
    #[arg(long)]
    pub(crate) use_invariants: bool,

    /// Fix every step weight to this rational constant (e.g. "1", "3/2")
    /// and skip the drift/positivity layers
    #[arg(long)]
    pub(crate) trivial_g: Option<String>,

    /// Enable the heuristic guard refinement H
    #[arg(long)]
    pub(crate) use_heuristic: bool,

    /// Certificate template degree (1 = affine)
    #[arg(long, default_value_t = 1)]
    pub(crate) degree: u32,

    /// Safety margin of the bucket games (bucket volume is 2 - eps)
    #[arg(long, default_value = "1/5")]
    pub(crate) eps: String,

    /// Bucket count of the bucket games
    #[arg(long, default_value_t = 5)]
    pub(crate) buckets: usize,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Encode and run the solver-configuration retry loop
    #[command(display_order = 10)]
    Synthesize {
        #[command(flatten)]
        encode: EncodeOpts,

        /// Directory of solver configuration files
        #[arg(long)]
        configs: PathBuf,

        /// Also persist the emitted query here
        #[arg(long)]
        query_out: Option<PathBuf>,
    },

    /// Emit the solver query without invoking any solver
    #[command(display_order = 11)]
    Emit {
        #[command(flatten)]
        encode: EncodeOpts,

        /// Output path for the query
        #[arg(long)]
        out: PathBuf,
    },
}
