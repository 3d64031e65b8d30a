//! Run outcomes and attempt reporting.

use std::fmt;
use std::time::Duration;

use gambit_smt::solver::SolveStatus;

use crate::certificate::Certificate;

/// How one solver configuration attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Sat,
    Unsat,
    Unknown,
    Timeout,
    /// The attempt could not produce a verdict (solver missing, garbage
    /// output); treated like any other non-`sat` answer.
    Error(String),
}

impl From<SolveStatus> for AttemptOutcome {
    fn from(status: SolveStatus) -> Self {
        match status {
            SolveStatus::Sat => AttemptOutcome::Sat,
            SolveStatus::Unsat => AttemptOutcome::Unsat,
            SolveStatus::Unknown => AttemptOutcome::Unknown,
            SolveStatus::Timeout => AttemptOutcome::Timeout,
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Sat => write!(f, "sat"),
            AttemptOutcome::Unsat => write!(f, "unsat"),
            AttemptOutcome::Unknown => write!(f, "unknown"),
            AttemptOutcome::Timeout => write!(f, "timeout"),
            AttemptOutcome::Error(detail) => write!(f, "error: {detail}"),
        }
    }
}

/// One entry of the attempted-configuration trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub config: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({} ms)",
            self.config,
            self.outcome,
            self.elapsed.as_millis()
        )
    }
}

/// The result of a synthesis run.
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    /// Some configuration answered `sat`; the model instantiated the
    /// templates into a concrete certificate.
    Found {
        certificate: Certificate,
        attempts: Vec<Attempt>,
    },
    /// Every configuration was exhausted without `sat`. The template
    /// family admits no certificate here — which is not a proof that the
    /// system diverges.
    NoWitness { attempts: Vec<Attempt> },
}

impl SynthesisOutcome {
    /// Stable verdict string, independent of certificate contents.
    pub fn verdict_class(&self) -> &'static str {
        match self {
            SynthesisOutcome::Found { .. } => "certificate_found",
            SynthesisOutcome::NoWitness { .. } => "no_witness",
        }
    }

    pub fn attempts(&self) -> &[Attempt] {
        match self {
            SynthesisOutcome::Found { attempts, .. } => attempts,
            SynthesisOutcome::NoWitness { attempts } => attempts,
        }
    }
}

impl fmt::Display for SynthesisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisOutcome::Found {
                certificate,
                attempts,
            } => {
                writeln!(f, "RESULT: CERTIFICATE FOUND")?;
                for attempt in attempts {
                    writeln!(f, "  attempt {attempt}")?;
                }
                write!(f, "{certificate}")
            }
            SynthesisOutcome::NoWitness { attempts } => {
                writeln!(f, "RESULT: NO WITNESS FOUND")?;
                for attempt in attempts {
                    writeln!(f, "  attempt {attempt}")?;
                }
                write!(
                    f,
                    "No configuration produced a certificate in this template \
                     family. This does not establish non-termination."
                )
            }
        }
    }
}
