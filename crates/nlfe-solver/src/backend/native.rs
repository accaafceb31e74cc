//! Native dense backend using nalgebra.
//!
//! This is the default backend. The sparse matrix is expanded to a dense
//! matrix and factorized with partial-pivoting LU, which handles symmetric
//! and general storage alike. Suitable for small-to-medium problems.

use super::traits::*;
use crate::sparse::SparseMatrixCsr;
use nalgebra::DVector;

/// Smallest accepted ratio between the smallest and the largest LU pivot
const PIVOT_RATIO_TOLERANCE: f64 = 1e-12;

/// Dense LU solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLuSolver;

impl LinearSolver for DenseLuSolver {
    fn solve(
        &self,
        matrix: &SparseMatrixCsr,
        rhs: &DVector<f64>,
    ) -> Result<(DVector<f64>, SolveInfo), LinearSolverError> {
        check_dimensions(matrix, rhs)?;
        let n = matrix.nrows();
        if n == 0 {
            return Ok((DVector::zeros(0), direct_info(self.name(), Some(0.0))));
        }

        let lu = matrix.to_dense().lu();

        // a rank-deficient matrix rarely produces an exact zero pivot
        let u = lu.u();
        let diagonal = u.diagonal().map(f64::abs);
        let max_pivot = diagonal.max();
        let min_pivot = diagonal.min();
        if max_pivot == 0.0 || min_pivot / max_pivot < PIVOT_RATIO_TOLERANCE {
            return Err(LinearSolverError::Singular(format!(
                "LU pivot ratio {:.3e} below {:.0e}",
                if max_pivot == 0.0 { 0.0 } else { min_pivot / max_pivot },
                PIVOT_RATIO_TOLERANCE
            )));
        }

        let x = lu
            .solve(rhs)
            .ok_or_else(|| LinearSolverError::Singular("zero pivot in LU decomposition".into()))?;

        let residual = (matrix.product(&x) - rhs).norm();
        Ok((x, direct_info(self.name(), Some(residual))))
    }

    fn name(&self) -> &str {
        "nalgebra-LU"
    }
}

pub(crate) fn direct_info(name: &str, residual_norm: Option<f64>) -> SolveInfo {
    SolveInfo {
        iterations: 1,
        residual_norm,
        solver_name: name.to_string(),
    }
}
