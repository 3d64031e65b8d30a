//! End-to-end orchestration: encode once, then try solver configurations
//! strictly sequentially, stopping at the first `sat`. Timeouts and
//! non-`sat` verdicts advance to the next configuration; model decode
//! failures abort the run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use gambit_ir::system::TransitionSystem;
use gambit_smt::compile::EncodingMode;
use gambit_smt::constraint::ConstraintError;
use gambit_smt::smtlib::EncodeError;
use gambit_smt::solver::{load_config_dir, run_solver, SolveStatus, SolverError};

use crate::certificate::{self, CertificateError};
use crate::result::{Attempt, AttemptOutcome, SynthesisOutcome};
use crate::synthesis::{SynthesisOptions, Synthesizer, Templates};

/// Options of a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub synthesis: SynthesisOptions,
    pub encoding: EncodingMode,
    /// Directory of solver configuration files, tried in lexicographic
    /// filename order.
    pub configs_dir: PathBuf,
    /// Persist the emitted query here instead of a scratch file.
    pub query_out: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generate constraints and lower them to a query, without solving.
pub fn encode(
    ts: &TransitionSystem,
    options: &SynthesisOptions,
    mode: EncodingMode,
) -> Result<(String, Templates), SynthesisError> {
    let synthesizer = Synthesizer::new(ts, options.clone());
    let system = synthesizer.constraint_system()?;
    let query = mode.compile(&system)?;
    info!(
        system = %ts.name,
        encoding = %mode,
        bytes = query.len(),
        "query encoded"
    );
    Ok((query, synthesizer.into_templates()))
}

/// Run the full pipeline: encode, persist the query, and walk the
/// configuration sequence until one answers `sat`.
pub fn synthesize(
    ts: &TransitionSystem,
    options: &PipelineOptions,
) -> Result<SynthesisOutcome, SynthesisError> {
    let (query, templates) = encode(ts, &options.synthesis, options.encoding)?;

    // The scratch directory must outlive every solver attempt.
    let mut scratch = None;
    let query_path = match &options.query_out {
        Some(path) => path.clone(),
        None => {
            let dir = tempfile::tempdir()?;
            let path = dir.path().join(format!("{}.smt2", ts.name));
            scratch = Some(dir);
            path
        }
    };
    std::fs::write(&query_path, &query)?;

    let configs = load_config_dir(&options.configs_dir)?;
    let mut attempts = Vec::new();
    for config in &configs {
        info!(config = %config.name, "trying solver configuration");
        match run_solver(&query_path, config) {
            Ok(run) => {
                info!(
                    config = %config.name,
                    status = %run.status,
                    elapsed_ms = run.elapsed.as_millis() as u64,
                    "attempt finished"
                );
                attempts.push(Attempt {
                    config: config.name.clone(),
                    outcome: run.status.into(),
                    elapsed: run.elapsed,
                });
                if run.status == SolveStatus::Sat {
                    let cert = certificate::instantiate(ts, &templates, &run.model)?;
                    drop(scratch);
                    return Ok(SynthesisOutcome::Found {
                        certificate: cert,
                        attempts,
                    });
                }
            }
            Err(err) if err.is_recoverable() => {
                warn!(config = %config.name, error = %err, "attempt failed; skipping");
                attempts.push(Attempt {
                    config: config.name.clone(),
                    outcome: AttemptOutcome::Error(err.to_string()),
                    elapsed: Duration::ZERO,
                });
            }
            Err(err) => return Err(err.into()),
        }
    }
    drop(scratch);
    Ok(SynthesisOutcome::NoWitness { attempts })
}
