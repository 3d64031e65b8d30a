//! Back-substitution of a solver model into the templates.

use indexmap::IndexMap;
use num::rational::Rational64;
use std::fmt;
use thiserror::Error;

use gambit_ir::expr::Expr;
use gambit_ir::system::TransitionSystem;

use crate::synthesis::Templates;

#[derive(Debug, Error, PartialEq)]
pub enum CertificateError {
    /// The model left a template coefficient unassigned. Treating it as
    /// zero would silently weaken the certificate, so it is an error.
    #[error("solver model does not assign coefficient `{0}`")]
    MissingCoefficient(String),
}

/// Concrete ranking value of one location.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    pub location: String,
    pub value: Expr,
}

/// Concrete step weight of one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct StepWeightEntry {
    pub source: String,
    pub edge: usize,
    pub target: String,
    pub value: Expr,
}

/// Concrete witness function of one angelic-infinite input.
#[derive(Debug, Clone, PartialEq)]
pub struct WitnessEntry {
    pub location: String,
    pub input: String,
    pub value: Expr,
}

/// Concrete heuristic refinement of one location.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicEntry {
    pub location: String,
    pub value: Expr,
}

/// A concrete, human-checkable certificate: every template with its
/// coefficients replaced by the solver's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    pub ranking: Vec<RankingEntry>,
    pub step_weights: Vec<StepWeightEntry>,
    pub witnesses: Vec<WitnessEntry>,
    pub heuristics: Vec<HeuristicEntry>,
}

/// Substitute the model into every template. Fails if a referenced
/// coefficient is unassigned.
pub fn instantiate(
    ts: &TransitionSystem,
    templates: &Templates,
    model: &IndexMap<String, Rational64>,
) -> Result<Certificate, CertificateError> {
    let values: IndexMap<String, Expr> = model
        .iter()
        .map(|(name, value)| (name.clone(), Expr::num(*value)))
        .collect();
    let program_vars = ts.program_variable_names();

    let concretize = |template: &Expr| -> Result<Expr, CertificateError> {
        let image = template.subst(&values);
        for var in image.free_vars() {
            if !program_vars.iter().any(|p| p == &var) {
                return Err(CertificateError::MissingCoefficient(var));
            }
        }
        Ok(image)
    };

    let mut ranking = Vec::with_capacity(ts.locations.len());
    for (i, location) in ts.locations.iter().enumerate() {
        ranking.push(RankingEntry {
            location: location.name.clone(),
            value: concretize(&templates.ranking[i])?,
        });
    }

    let mut step_weights = Vec::new();
    for (i, location) in ts.locations.iter().enumerate() {
        for (j, transition) in location.transitions.iter().enumerate() {
            step_weights.push(StepWeightEntry {
                source: location.name.clone(),
                edge: j,
                target: ts.locations[transition.target].name.clone(),
                value: concretize(&templates.step_weight[i][j])?,
            });
        }
    }

    let mut witnesses = Vec::with_capacity(templates.witness.len());
    for ((loc, input), template) in &templates.witness {
        witnesses.push(WitnessEntry {
            location: ts.locations[*loc].name.clone(),
            input: input.clone(),
            value: concretize(template)?,
        });
    }

    let mut heuristics = Vec::with_capacity(templates.heuristic.len());
    for (i, template) in templates.heuristic.iter().enumerate() {
        heuristics.push(HeuristicEntry {
            location: ts.locations[i].name.clone(),
            value: concretize(template)?,
        });
    }

    Ok(Certificate {
        ranking,
        step_weights,
        witnesses,
        heuristics,
    })
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.ranking {
            writeln!(f, "f({}) = {}", entry.location, entry.value)?;
        }
        for entry in &self.step_weights {
            writeln!(
                f,
                "g({} -> {} [{}]) = {}",
                entry.source, entry.target, entry.edge, entry.value
            )?;
        }
        for entry in &self.witnesses {
            writeln!(f, "t_{}({}) = {}", entry.input, entry.location, entry.value)?;
        }
        for entry in &self.heuristics {
            writeln!(f, "h({}) = {}", entry.location, entry.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::{SynthesisOptions, Synthesizer};
    use gambit_ir::expr::Expr;
    use gambit_ir::system::{Location, LocationKind, Transition, Update, Variable};
    use indexmap::indexmap;

    fn small_system() -> TransitionSystem {
        let l0 = Location::new(
            "work",
            Expr::var("x").ge(Expr::int(0)),
            LocationKind::Deterministic,
            vec![Transition::new(
                1,
                Expr::var("x").gt(Expr::int(0)),
                Update::new(indexmap! {
                    "x".to_string() => Expr::var("x").sub(Expr::int(1)),
                }),
            )],
        );
        let l1 = Location::new("goal", Expr::truth(), LocationKind::Deterministic, vec![]);
        TransitionSystem::new(
            "small",
            indexmap! { "x".to_string() => Expr::var("x").ge(Expr::int(0)) },
            vec![l0, l1],
            0,
            vec![Variable::program("x")],
            vec![],
        )
        .unwrap()
    }

    fn full_model() -> IndexMap<String, Rational64> {
        indexmap! {
            "f_0_0".to_string() => Rational64::from_integer(0),
            "f_0_1".to_string() => Rational64::from_integer(1),
            "f_1_0".to_string() => Rational64::from_integer(0),
            "f_1_1".to_string() => Rational64::from_integer(0),
            "g_0_0_0".to_string() => Rational64::from_integer(1),
            "g_0_0_1".to_string() => Rational64::from_integer(0),
        }
    }

    #[test]
    fn instantiation_keys_entries_by_names() {
        let ts = small_system();
        let synthesizer = Synthesizer::new(&ts, SynthesisOptions::default());
        let certificate = instantiate(&ts, synthesizer.templates(), &full_model()).unwrap();
        assert_eq!(certificate.ranking.len(), 2);
        assert_eq!(certificate.ranking[0].location, "work");
        assert_eq!(certificate.step_weights.len(), 1);
        assert_eq!(certificate.step_weights[0].source, "work");
        assert_eq!(certificate.step_weights[0].target, "goal");
        // Only program variables remain.
        assert_eq!(certificate.ranking[0].value.free_vars().len(), 1);
    }

    #[test]
    fn missing_coefficient_is_an_error_not_zero() {
        let ts = small_system();
        let synthesizer = Synthesizer::new(&ts, SynthesisOptions::default());
        let mut model = full_model();
        model.shift_remove("f_1_1");
        let err = instantiate(&ts, synthesizer.templates(), &model).unwrap_err();
        assert_eq!(err, CertificateError::MissingCoefficient("f_1_1".into()));
    }

    #[test]
    fn instantiation_is_idempotent() {
        let ts = small_system();
        let synthesizer = Synthesizer::new(&ts, SynthesisOptions::default());
        let model = full_model();
        let once = instantiate(&ts, synthesizer.templates(), &model).unwrap();
        // Substituting the already-concrete certificate again changes nothing.
        let values: IndexMap<String, Expr> = model
            .iter()
            .map(|(name, value)| (name.clone(), Expr::num(*value)))
            .collect();
        for entry in &once.ranking {
            assert_eq!(entry.value.subst(&values), entry.value);
        }
    }
}
