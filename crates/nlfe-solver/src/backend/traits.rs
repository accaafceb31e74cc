//! Backend trait definitions for linear solvers.
//!
//! These traits abstract over the concrete numerical library used for the
//! global linear solve inside each Newton iteration. Element-level
//! computations remain in nalgebra (small, dense, fixed-size matrices).

use crate::sparse::SparseMatrixCsr;
use nalgebra::DVector;
use thiserror::Error;

/// Failure of a linear solve.
///
/// Kept separate from the outer Newton convergence failure: a linear solver
/// either returns a solution or reports one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearSolverError {
    #[error("singular matrix: {0}")]
    Singular(String),

    #[error("dimension mismatch: matrix is {rows}x{cols}, right-hand side has {rhs} entries")]
    Dimension { rows: usize, cols: usize, rhs: usize },

    #[error("solver backend error: {0}")]
    Backend(String),
}

/// Solver convergence and diagnostic info.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers)
    pub iterations: usize,
    /// Final residual norm ‖A·x − b‖ (if computed)
    pub residual_norm: Option<f64>,
    /// Human-readable solver name (e.g., "nalgebra-LU")
    pub solver_name: String,
}

/// Trait for a linear solver backend.
///
/// Implementations solve `A·x = b` for a sparse matrix in either symmetric
/// (upper triangle) or general storage, with either index base.
pub trait LinearSolver: Send + Sync {
    /// Solve `A·x = b` and return the solution vector.
    fn solve(
        &self,
        matrix: &SparseMatrixCsr,
        rhs: &DVector<f64>,
    ) -> Result<(DVector<f64>, SolveInfo), LinearSolverError>;

    /// Human-readable name of this backend.
    fn name(&self) -> &str;
}

/// Reject a right-hand side that does not match a square matrix.
pub(crate) fn check_dimensions(
    matrix: &SparseMatrixCsr,
    rhs: &DVector<f64>,
) -> Result<(), LinearSolverError> {
    if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.len() {
        return Err(LinearSolverError::Dimension {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            rhs: rhs.len(),
        });
    }
    Ok(())
}
