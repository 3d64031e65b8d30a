#![doc = include_str!("../README.md")]

//! Data model for certificate synthesis over adversarial transition systems.
//!
//! This crate defines the symbolic expression representation, the
//! transition-system IR (locations, transitions, guarded updates, and the
//! classification of who resolves each nondeterministic choice), and the
//! generator for parametric ranking/witness templates.

pub mod expr;
pub mod system;
pub mod template;
