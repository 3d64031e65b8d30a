#![doc = include_str!("../README.md")]

//! Certificate synthesis pipeline.
//!
//! Data flows strictly forward: transition system + templates →
//! [`synthesis`] → constraint system → encoder (via `gambit-smt`) →
//! external solver → [`certificate`] back-substitution. [`pipeline`]
//! orchestrates the whole run, [`result`] renders it.

pub mod certificate;
pub mod pipeline;
pub mod result;
pub mod synthesis;
