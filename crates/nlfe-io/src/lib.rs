//! Result tables for the nlfe nonlinear finite element engine.
//!
//! This crate provides:
//! - **Load-displacement tables**: one `(prescribed displacement, reaction force)`
//!   row per load step, written and parsed in a whitespace-delimited text format
//! - **Regression comparison** of a computed curve against a stored reference

pub mod curve;
pub mod error;

pub use curve::LoadDisplacementCurve;
pub use error::{IoError, Result};
