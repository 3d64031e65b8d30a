use indexmap::{IndexMap, IndexSet};
use num::rational::Rational64;
use std::fmt;
use thiserror::Error;

use crate::expr::Expr;

/// A unique identifier for a location in the transition system.
pub type LocationId = usize;

/// Role of a named real-valued unknown. Program variables carry the game
/// state; auxiliary variables are nondeterministic choice inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    Program,
    Auxiliary,
}

/// A named real-valued variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub role: VarRole,
}

impl Variable {
    pub fn program(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            role: VarRole::Program,
        }
    }

    pub fn auxiliary(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            role: VarRole::Auxiliary,
        }
    }

    pub fn to_expr(&self) -> Expr {
        Expr::var(self.name.clone())
    }
}

/// A continuous nondeterministic input with rational interval bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct NondetVar {
    pub name: String,
    pub lo: Rational64,
    pub hi: Rational64,
}

impl NondetVar {
    pub fn new(name: impl Into<String>, lo: Rational64, hi: Rational64) -> Self {
        NondetVar {
            name: name.into(),
            lo,
            hi,
        }
    }

    /// The interval constraint `lo <= v && v <= hi`.
    pub fn bound_constraint(&self) -> Expr {
        Expr::and(vec![
            Expr::num(self.lo).le(Expr::var(self.name.clone())),
            Expr::var(self.name.clone()).le(Expr::num(self.hi)),
        ])
    }
}

/// A total mapping from program variables to post-state expressions.
///
/// Variables absent from the map are unchanged. The update also owns the
/// continuous nondeterministic inputs its expressions may read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    assignments: IndexMap<String, Expr>,
    nondet: Vec<NondetVar>,
}

impl Update {
    pub fn new(assignments: IndexMap<String, Expr>) -> Self {
        Update {
            assignments,
            nondet: Vec::new(),
        }
    }

    pub fn with_nondet(assignments: IndexMap<String, Expr>, nondet: Vec<NondetVar>) -> Self {
        Update {
            assignments,
            nondet,
        }
    }

    /// The identity update.
    pub fn identity() -> Self {
        Update::default()
    }

    /// Express `expr` over the pre-state by substituting the post-state map
    /// through it.
    pub fn apply(&self, expr: &Expr) -> Expr {
        expr.subst(&self.assignments)
    }

    pub fn assignments(&self) -> &IndexMap<String, Expr> {
        &self.assignments
    }

    pub fn nondet_vars(&self) -> &[NondetVar] {
        &self.nondet
    }

    /// Conjunction of the interval constraints of every nondet input.
    pub fn nondet_constraint(&self) -> Expr {
        if self.nondet.is_empty() {
            return Expr::truth();
        }
        Expr::and(self.nondet.iter().map(NondetVar::bound_constraint).collect())
    }
}

/// A guarded edge of the transition system.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub target: LocationId,
    pub guard: Expr,
    pub update: Update,
    /// Extra constraint coupling simultaneous nondeterministic choices
    /// (e.g. "the split fractions sum to 1").
    pub choice_constraint: Option<Expr>,
}

impl Transition {
    pub fn new(target: LocationId, guard: Expr, update: Update) -> Self {
        Transition {
            target,
            guard,
            update,
            choice_constraint: None,
        }
    }

    pub fn with_choice_constraint(mut self, constraint: Expr) -> Self {
        self.choice_constraint = Some(constraint);
        self
    }
}

/// Who resolves the choice among a location's outgoing transitions.
///
/// Replaces a boolean-flag encoding that permitted invalid combinations:
/// the four cases are closed and matched exhaustively by the synthesis
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    /// Guards select a single effective successor.
    Deterministic,
    /// An adversary picks; the certificate must survive every edge.
    Demonic,
    /// An existential player picks among a finite, enumerated set of
    /// transitions.
    ///
    /// Precondition (not re-verified here): the transition guards are
    /// jointly exhaustive under the location invariant. An unsatisfied
    /// assumption yields vacuous constraints.
    AngelicFinite,
    /// An existential player picks values for the continuous nondet inputs
    /// of the location's single transition.
    AngelicInfinite,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKind::Deterministic => write!(f, "deterministic"),
            LocationKind::Demonic => write!(f, "demonic"),
            LocationKind::AngelicFinite => write!(f, "angelic-finite"),
            LocationKind::AngelicInfinite => write!(f, "angelic-infinite"),
        }
    }
}

/// A location of the transition system. A location with no outgoing
/// transitions is terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub invariant: Expr,
    pub kind: LocationKind,
    pub transitions: Vec<Transition>,
}

impl Location {
    pub fn new(
        name: impl Into<String>,
        invariant: Expr,
        kind: LocationKind,
        transitions: Vec<Transition>,
    ) -> Self {
        Location {
            name: name.into(),
            invariant,
            kind,
            transitions,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Errors detected while assembling a transition system. These indicate a
/// misuse of the model and are raised at build time, never during
/// constraint generation.
#[derive(Debug, Error, PartialEq)]
pub enum SystemError {
    #[error("transition system `{0}` has no locations")]
    Empty(String),
    #[error("initial location id {initial} out of range ({len} locations)")]
    InitialOutOfRange { initial: LocationId, len: usize },
    #[error("location `{location}` targets unknown location id {target}")]
    TargetOutOfRange { location: String, target: LocationId },
    #[error("angelic-infinite location `{0}` must have exactly one outgoing transition")]
    AngelicChoiceArity(String),
    #[error("angelic-finite location `{0}` has no outgoing transitions")]
    AngelicNoChoices(String),
    #[error("{kind} location `{location}` carries continuous nondet inputs")]
    UnexpectedNondetInput { kind: LocationKind, location: String },
    #[error("duplicate variable name `{0}`")]
    DuplicateVariable(String),
    #[error("initial assertion mentions unknown program variable `{0}`")]
    UnknownAssertionVariable(String),
    #[error("nondet input `{name}` shadows a program variable")]
    NondetShadowsProgramVariable { name: String },
    #[error("nondet input `{name}` of angelic location `{location}` is reused elsewhere")]
    NondetNameClash { name: String, location: String },
}

/// The transition system: a location arena addressed by [`LocationId`],
/// an initial assertion per program variable, and the variable sets.
#[derive(Debug, Clone)]
pub struct TransitionSystem {
    pub name: String,
    /// Initial condition per program variable, in declaration order.
    pub assertion: IndexMap<String, Expr>,
    pub locations: Vec<Location>,
    pub initial: LocationId,
    pub program_variables: Vec<Variable>,
    pub auxiliary_variables: Vec<Variable>,
}

impl TransitionSystem {
    pub fn new(
        name: impl Into<String>,
        assertion: IndexMap<String, Expr>,
        locations: Vec<Location>,
        initial: LocationId,
        program_variables: Vec<Variable>,
        auxiliary_variables: Vec<Variable>,
    ) -> Result<Self, SystemError> {
        let name = name.into();
        if locations.is_empty() {
            return Err(SystemError::Empty(name));
        }
        if initial >= locations.len() {
            return Err(SystemError::InitialOutOfRange {
                initial,
                len: locations.len(),
            });
        }

        let mut seen = IndexSet::new();
        for v in program_variables.iter().chain(auxiliary_variables.iter()) {
            if !seen.insert(v.name.clone()) {
                return Err(SystemError::DuplicateVariable(v.name.clone()));
            }
        }
        for var in assertion.keys() {
            if !program_variables.iter().any(|v| &v.name == var) {
                return Err(SystemError::UnknownAssertionVariable(var.clone()));
            }
        }

        for location in &locations {
            for transition in &location.transitions {
                if transition.target >= locations.len() {
                    return Err(SystemError::TargetOutOfRange {
                        location: location.name.clone(),
                        target: transition.target,
                    });
                }
            }
            match location.kind {
                LocationKind::AngelicInfinite => {
                    if location.transitions.len() != 1 {
                        return Err(SystemError::AngelicChoiceArity(location.name.clone()));
                    }
                }
                LocationKind::AngelicFinite => {
                    if location.transitions.is_empty() {
                        return Err(SystemError::AngelicNoChoices(location.name.clone()));
                    }
                    if location
                        .transitions
                        .iter()
                        .any(|t| !t.update.nondet_vars().is_empty())
                    {
                        return Err(SystemError::UnexpectedNondetInput {
                            kind: location.kind,
                            location: location.name.clone(),
                        });
                    }
                }
                LocationKind::Deterministic => {
                    if location
                        .transitions
                        .iter()
                        .any(|t| !t.update.nondet_vars().is_empty())
                    {
                        return Err(SystemError::UnexpectedNondetInput {
                            kind: location.kind,
                            location: location.name.clone(),
                        });
                    }
                }
                LocationKind::Demonic => {}
            }
        }

        for location in &locations {
            for transition in &location.transitions {
                for nd in transition.update.nondet_vars() {
                    if program_variables.iter().any(|v| v.name == nd.name) {
                        return Err(SystemError::NondetShadowsProgramVariable {
                            name: nd.name.clone(),
                        });
                    }
                }
            }
        }
        // Angelic witness functions are substituted for their inputs across
        // the whole constraint system, so those input names must be unique
        // to their location.
        for (i, location) in locations.iter().enumerate() {
            if location.kind != LocationKind::AngelicInfinite {
                continue;
            }
            for nd in location.transitions[0].update.nondet_vars() {
                let reused = locations.iter().enumerate().any(|(j, other)| {
                    j != i
                        && other
                            .transitions
                            .iter()
                            .any(|t| t.update.nondet_vars().iter().any(|o| o.name == nd.name))
                });
                if reused {
                    return Err(SystemError::NondetNameClash {
                        name: nd.name.clone(),
                        location: location.name.clone(),
                    });
                }
            }
        }

        Ok(TransitionSystem {
            name,
            assertion,
            locations,
            initial,
            program_variables,
            auxiliary_variables,
        })
    }

    pub fn location(&self, id: LocationId) -> &Location {
        &self.locations[id]
    }

    /// Conjunction of every initial-variable condition.
    pub fn full_assertion(&self) -> Expr {
        if self.assertion.is_empty() {
            return Expr::truth();
        }
        Expr::and(self.assertion.values().cloned().collect())
    }

    /// The target location's invariant expressed over the source state by
    /// substituting the transition's update through it, optionally composed
    /// with a second substitution for two-hop lookahead.
    pub fn target_invariant(
        &self,
        transition: &Transition,
        pre: Option<&IndexMap<String, Expr>>,
    ) -> Expr {
        let invariant = transition
            .update
            .apply(&self.locations[transition.target].invariant);
        match pre {
            Some(map) => invariant.subst(map),
            None => invariant,
        }
    }

    pub fn program_variable_names(&self) -> Vec<String> {
        self.program_variables
            .iter()
            .map(|v| v.name.clone())
            .collect()
    }
}

impl fmt::Display for TransitionSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Transition system `{}`:", self.name)?;
        writeln!(f, "  Program variables:")?;
        for v in &self.program_variables {
            match self.assertion.get(&v.name) {
                Some(init) => writeln!(f, "    {}: initially {init}", v.name)?,
                None => writeln!(f, "    {}", v.name)?,
            }
        }
        if !self.auxiliary_variables.is_empty() {
            writeln!(f, "  Auxiliary variables:")?;
            for v in &self.auxiliary_variables {
                writeln!(f, "    {}", v.name)?;
            }
        }
        writeln!(f, "  Locations:")?;
        for (i, loc) in self.locations.iter().enumerate() {
            let initial = if i == self.initial { " (initial)" } else { "" };
            let terminal = if loc.is_terminal() { " (terminal)" } else { "" };
            writeln!(f, "    L{i}: {} [{}]{initial}{terminal}", loc.name, loc.kind)?;
            writeln!(f, "      invariant: {}", loc.invariant)?;
            for (j, t) in loc.transitions.iter().enumerate() {
                writeln!(
                    f,
                    "      t{i}_{j}: -> L{} when {}",
                    t.target, t.guard
                )?;
                for (var, rhs) in t.update.assignments() {
                    writeln!(f, "        {var}' = {rhs}")?;
                }
                for nd in t.update.nondet_vars() {
                    writeln!(f, "        input {} in [{}, {}]", nd.name, nd.lo, nd.hi)?;
                }
                if let Some(extra) = &t.choice_constraint {
                    writeln!(f, "        choice: {extra}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn loop_system() -> TransitionSystem {
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
        let l1 = Location::new(
            "done",
            Expr::truth(),
            LocationKind::Deterministic,
            vec![],
        );
        TransitionSystem::new(
            "loop",
            indexmap! { "x".to_string() => Expr::var("x").ge(Expr::int(0)) },
            vec![l0, l1],
            0,
            vec![Variable::program("x")],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn full_assertion_conjoins_initial_conditions() {
        let ts = loop_system();
        assert_eq!(
            ts.full_assertion(),
            Expr::and(vec![Expr::var("x").ge(Expr::int(0))])
        );
    }

    #[test]
    fn target_invariant_substitutes_update() {
        let ts = loop_system();
        let t = &ts.locations[0].transitions[0];
        // `done` has a trivial invariant; rebuild with x >= 1 to observe
        // the substitution.
        let mut ts2 = ts.clone();
        ts2.locations[1].invariant = Expr::var("x").ge(Expr::int(1));
        let inv = ts2.target_invariant(t, None);
        assert_eq!(
            inv,
            Expr::var("x").sub(Expr::int(1)).ge(Expr::int(1))
        );
    }

    #[test]
    fn target_invariant_composes_pre_substitution() {
        let ts = loop_system();
        let mut ts2 = ts.clone();
        ts2.locations[1].invariant = Expr::var("x").ge(Expr::int(1));
        let t = ts2.locations[0].transitions[0].clone();
        let pre = indexmap! { "x".to_string() => Expr::var("x").sub(Expr::int(2)) };
        let inv = ts2.target_invariant(&t, Some(&pre));
        assert_eq!(
            inv,
            Expr::var("x")
                .sub(Expr::int(2))
                .sub(Expr::int(1))
                .ge(Expr::int(1))
        );
    }

    #[test]
    fn angelic_infinite_requires_single_transition() {
        let t = |target| {
            Transition::new(
                target,
                Expr::truth(),
                Update::with_nondet(
                    indexmap! { "x".to_string() => Expr::var("w") },
                    vec![NondetVar::new(
                        "w",
                        Rational64::from_integer(0),
                        Rational64::from_integer(1),
                    )],
                ),
            )
        };
        let bad = Location::new(
            "choose",
            Expr::truth(),
            LocationKind::AngelicInfinite,
            vec![t(1), t(1)],
        );
        let done = Location::new("done", Expr::truth(), LocationKind::Deterministic, vec![]);
        let err = TransitionSystem::new(
            "bad",
            IndexMap::new(),
            vec![bad, done],
            0,
            vec![Variable::program("x")],
            vec![Variable::auxiliary("w")],
        )
        .unwrap_err();
        assert_eq!(err, SystemError::AngelicChoiceArity("choose".into()));
    }

    #[test]
    fn deterministic_location_rejects_nondet_inputs() {
        let t = Transition::new(
            0,
            Expr::truth(),
            Update::with_nondet(
                indexmap! { "x".to_string() => Expr::var("w") },
                vec![NondetVar::new(
                    "w",
                    Rational64::from_integer(0),
                    Rational64::from_integer(1),
                )],
            ),
        );
        let loc = Location::new("step", Expr::truth(), LocationKind::Deterministic, vec![t]);
        let err = TransitionSystem::new(
            "bad",
            IndexMap::new(),
            vec![loc],
            0,
            vec![Variable::program("x")],
            vec![Variable::auxiliary("w")],
        )
        .unwrap_err();
        assert!(matches!(err, SystemError::UnexpectedNondetInput { .. }));
    }

    #[test]
    fn nondet_bound_constraint_shape() {
        let nd = NondetVar::new("w", Rational64::new(1, 10), Rational64::new(1, 5));
        assert_eq!(
            nd.bound_constraint(),
            Expr::and(vec![
                Expr::rat(1, 10).le(Expr::var("w")),
                Expr::var("w").le(Expr::rat(1, 5)),
            ])
        );
    }
}
