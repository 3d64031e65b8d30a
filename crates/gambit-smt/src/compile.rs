//! The two quantifier-discharge strategies behind one interface.
//!
//! Both compilers consume the same [`ConstraintSystem`]; the synthesis
//! walk that produces it exists exactly once, upstream.

use indexmap::IndexSet;
use std::fmt;
use std::str::FromStr;

use crate::constraint::ConstraintSystem;
use crate::farkas;
use crate::smtlib::{self, EncodeError};

/// Lowers a constraint system to a complete solver query.
pub trait ConstraintCompiler {
    fn compile(&self, system: &ConstraintSystem) -> Result<String, EncodeError>;
}

/// Direct quantified lowering: one `(assert (forall …))` per pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantifiedCompiler;

impl ConstraintCompiler for QuantifiedCompiler {
    fn compile(&self, system: &ConstraintSystem) -> Result<String, EncodeError> {
        let mut asserts = Vec::with_capacity(system.free_constraints.len() + system.pairs.len());
        for constraint in &system.free_constraints {
            asserts.push(smtlib::print_expr(&constraint.formula)?);
        }
        for pair in &system.pairs {
            let condition = system.effective_condition(pair);
            let body = format!(
                "(=> {} {})",
                smtlib::print_expr(&condition)?,
                smtlib::print_expr(&pair.implication)?
            );
            asserts.push(smtlib::print_forall(&pair.forall_vars, &body));
        }
        Ok(smtlib::script(&system.free_symbols(), &asserts))
    }
}

/// Farkas'-Lemma lowering: every pair becomes quantifier-free certificate
/// disjunctions over fresh nonnegative multipliers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FarkasCompiler;

impl ConstraintCompiler for FarkasCompiler {
    fn compile(&self, system: &ConstraintSystem) -> Result<String, EncodeError> {
        let mut declarations = IndexSet::new();
        let mut asserts = Vec::new();
        for constraint in &system.free_constraints {
            constraint.collect_symbols(&mut declarations);
            asserts.push(smtlib::print_expr(&constraint.formula)?);
        }
        for (index, pair) in system.pairs.iter().enumerate() {
            let condition = system.effective_condition(pair);
            let cases = farkas::eliminate_pair(
                index,
                &pair.forall_vars,
                &condition,
                &pair.implication,
            )?;
            for case in cases {
                case.collect_vars(&mut declarations);
                asserts.push(smtlib::print_expr(&case)?);
            }
        }
        Ok(smtlib::script(&declarations, &asserts))
    }
}

/// Which lowering strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingMode {
    #[default]
    Quantified,
    Farkas,
}

impl EncodingMode {
    pub fn compile(&self, system: &ConstraintSystem) -> Result<String, EncodeError> {
        match self {
            EncodingMode::Quantified => QuantifiedCompiler.compile(system),
            EncodingMode::Farkas => FarkasCompiler.compile(system),
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingMode::Quantified => write!(f, "quantified"),
            EncodingMode::Farkas => write!(f, "farkas"),
        }
    }
}

impl FromStr for EncodingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quantified" => Ok(EncodingMode::Quantified),
            "farkas" => Ok(EncodingMode::Farkas),
            other => Err(format!(
                "unknown encoding `{other}` (expected `quantified` or `farkas`)"
            )),
        }
    }
}
