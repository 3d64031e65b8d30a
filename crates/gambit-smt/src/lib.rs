#![doc = include_str!("../README.md")]

//! Constraint/quantifier encoding and solver integration.
//!
//! The synthesis engine hands this crate a [`constraint::ConstraintSystem`];
//! a [`compile::ConstraintCompiler`] lowers it to an SMT-LIB2 query (either
//! directly quantified or quantifier-free via Farkas' Lemma), and
//! [`solver`] runs external solver configurations over the query with a
//! bounded wait per attempt.

pub mod compile;
pub mod constraint;
pub mod farkas;
pub mod model;
pub mod smtlib;
pub mod solver;
