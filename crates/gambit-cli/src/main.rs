//! `gambit` driver binary.

mod cli;
mod examples;

use std::process::ExitCode;

use clap::Parser;
use num::rational::Rational64;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gambit_engine::pipeline::{encode, synthesize, PipelineOptions};
use gambit_engine::result::SynthesisOutcome;
use gambit_engine::synthesis::SynthesisOptions;
use gambit_ir::system::TransitionSystem;
use gambit_smt::compile::EncodingMode;
use gambit_smt::model;

use crate::cli::{Cli, Commands, EncodeOpts};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

type AnyError = Box<dyn std::error::Error>;

fn parse_rational(text: &str) -> Result<Rational64, AnyError> {
    Ok(model::parse_value(text)?)
}

fn build(opts: &EncodeOpts) -> Result<(TransitionSystem, SynthesisOptions, EncodingMode), AnyError>
{
    let eps = parse_rational(&opts.eps)?;
    let ts = examples::by_name(&opts.system, eps, opts.buckets)?;
    let trivial_g = match &opts.trivial_g {
        Some(text) => Some(parse_rational(text)?),
        None => None,
    };
    let synthesis = SynthesisOptions {
        use_invariants: opts.use_invariants,
        trivial_g,
        use_heuristic: opts.use_heuristic,
        degree: opts.degree,
    };
    let encoding: EncodingMode = opts.encoding.parse()?;
    info!(system = %ts.name, %encoding, "system built");
    Ok((ts, synthesis, encoding))
}

fn run(cli: Cli) -> Result<ExitCode, AnyError> {
    match cli.command {
        Commands::Synthesize {
            encode: opts,
            configs,
            query_out,
        } => {
            let (ts, synthesis, encoding) = build(&opts)?;
            let options = PipelineOptions {
                synthesis,
                encoding,
                configs_dir: configs,
                query_out,
            };
            let outcome = synthesize(&ts, &options)?;
            println!("{outcome}");
            Ok(match outcome {
                SynthesisOutcome::Found { .. } => ExitCode::SUCCESS,
                SynthesisOutcome::NoWitness { .. } => ExitCode::FAILURE,
            })
        }
        Commands::Emit { encode: opts, out } => {
            let (ts, synthesis, encoding) = build(&opts)?;
            let (query, _) = encode(&ts, &synthesis, encoding)?;
            std::fs::write(&out, query)?;
            println!("query written to {}", out.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
