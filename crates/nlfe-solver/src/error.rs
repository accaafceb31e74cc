//! Error types for nlfe-solver

use crate::backend::LinearSolverError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FemError>;

/// Failure kinds surfaced by the engine
///
/// Configuration errors are raised at setup time and are never retried.
/// Numerical and convergence failures abort the current run; the load step
/// in which they occur is rolled back before the error is returned.
#[derive(Error, Debug)]
pub enum FemError {
    /// Invalid model data (topology, constraints, material parameters, sizes)
    #[error("configuration error: {0}")]
    Config(String),

    /// The linear solver could not solve the tangent system
    #[error("numerical failure: {0}")]
    Numerical(#[from] LinearSolverError),

    /// Newton iteration bound exceeded
    #[error(
        "load step {step} did not converge in {iterations} iterations (residual = {residual:.3e})"
    )]
    Convergence {
        step: usize,
        iterations: usize,
        residual: f64,
    },
}

impl FemError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        FemError::Config(message.into())
    }
}
