use indexmap::{IndexMap, IndexSet};
use std::fmt;
use thiserror::Error;

use gambit_ir::expr::Expr;

/// An unquantified constraint on the free (coefficient) symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub formula: Expr,
}

impl Constraint {
    pub fn new(formula: Expr) -> Self {
        Constraint { formula }
    }

    pub fn collect_symbols(&self, out: &mut IndexSet<String>) {
        self.formula.collect_vars(out);
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formula)
    }
}

/// "For all bindings of `forall_vars`, condition implies implication."
///
/// Location invariants discovered or declared for the source states are
/// recorded separately; whether they strengthen the antecedent is decided
/// by the owning [`ConstraintSystem`] at encoding time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintPair {
    pub forall_vars: Vec<String>,
    pub condition: Expr,
    pub implication: Expr,
    pub invariants: Vec<Expr>,
}

impl ConstraintPair {
    pub fn new(forall_vars: Vec<String>, condition: Expr, implication: Expr) -> Self {
        ConstraintPair {
            forall_vars,
            condition,
            implication,
            invariants: Vec::new(),
        }
    }

    pub fn with_invariants(mut self, invariants: Vec<Expr>) -> Self {
        self.invariants = invariants;
        self
    }

    /// Symbols of the pair that are not universally quantified.
    pub fn free_symbols(&self) -> IndexSet<String> {
        let mut all = IndexSet::new();
        self.condition.collect_vars(&mut all);
        self.implication.collect_vars(&mut all);
        for inv in &self.invariants {
            inv.collect_vars(&mut all);
        }
        all.retain(|name| !self.forall_vars.iter().any(|v| v == name));
        all
    }
}

impl fmt::Display for ConstraintPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.condition, self.implication)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConstraintError {
    /// Substituting a universally quantified variable would silently change
    /// the meaning of the quantifier and is refused.
    #[error("substitution of universally quantified variable `{0}` is not supported")]
    QuantifiedSubstitution(String),
}

/// Ordered collection of free constraints and constraint pairs, plus the
/// declared program-variable set (always universally quantified).
///
/// Never mutated after solving begins except by the documented coefficient
/// back-substitution.
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    pub program_variables: Vec<String>,
    pub use_invariants: bool,
    pub free_constraints: Vec<Constraint>,
    pub pairs: Vec<ConstraintPair>,
}

impl ConstraintSystem {
    pub fn new(program_variables: Vec<String>, use_invariants: bool) -> Self {
        ConstraintSystem {
            program_variables,
            use_invariants,
            free_constraints: Vec::new(),
            pairs: Vec::new(),
        }
    }

    pub fn add_free_constraint(&mut self, formula: Expr) {
        self.free_constraints.push(Constraint::new(formula));
    }

    pub fn add_pair(&mut self, pair: ConstraintPair) {
        self.pairs.push(pair);
    }

    /// The antecedent actually encoded for `pair`: its condition, with the
    /// recorded invariants conjoined when `use_invariants` is set.
    pub fn effective_condition(&self, pair: &ConstraintPair) -> Expr {
        if !self.use_invariants || pair.invariants.is_empty() {
            return pair.condition.clone();
        }
        let mut terms = Vec::with_capacity(pair.invariants.len() + 1);
        terms.extend(pair.invariants.iter().cloned());
        terms.push(pair.condition.clone());
        Expr::and(terms)
    }

    /// Simultaneous substitution across every constraint. Fails if `map`
    /// names a universally quantified variable of any pair.
    pub fn subst(&mut self, map: &IndexMap<String, Expr>) -> Result<(), ConstraintError> {
        for pair in &self.pairs {
            for var in &pair.forall_vars {
                if map.contains_key(var) {
                    return Err(ConstraintError::QuantifiedSubstitution(var.clone()));
                }
            }
        }
        for constraint in &mut self.free_constraints {
            constraint.formula = constraint.formula.subst(map);
        }
        for pair in &mut self.pairs {
            pair.condition = pair.condition.subst(map);
            pair.implication = pair.implication.subst(map);
            for inv in &mut pair.invariants {
                *inv = inv.subst(map);
            }
        }
        Ok(())
    }

    /// All unquantified symbols of the system, in first-occurrence order.
    /// These are the `(declare-const _ Real)` lines of the emitted query.
    pub fn free_symbols(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        for constraint in &self.free_constraints {
            constraint.collect_symbols(&mut out);
        }
        for pair in &self.pairs {
            for sym in pair.free_symbols() {
                out.insert(sym);
            }
        }
        out
    }
}

impl fmt::Display for ConstraintSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Free constraints:")?;
        for c in &self.free_constraints {
            writeln!(f, "  {c}")?;
        }
        writeln!(f, "Constraint pairs:")?;
        let n = self.pairs.len();
        for (i, p) in self.pairs.iter().enumerate() {
            writeln!(f, "  [pair {}/{n}] {p}", i + 1)?;
        }
        Ok(())
    }
}
