//! Sparse Cholesky backend using nalgebra-sparse.
//!
//! Intended for symmetric positive definite systems, such as the reduced
//! tangent of a well-constrained elastic or hardening model. The matrix is
//! expanded to full CSR, converted to CSC and factorized without fill-reducing
//! ordering.

use super::native::direct_info;
use super::traits::*;
use crate::sparse::SparseMatrixCsr;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::{CholeskyError, CscCholesky};
use nalgebra_sparse::CscMatrix;

/// Sparse Cholesky solver for symmetric positive definite matrices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCholeskySolver;

impl LinearSolver for SparseCholeskySolver {
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

        let csc = CscMatrix::from(&matrix.to_nalgebra());
        let factor = CscCholesky::factor(&csc).map_err(|err| match err {
            CholeskyError::NotPositiveDefinite => {
                LinearSolverError::Singular("matrix is not positive definite".into())
            }
            other => LinearSolverError::Backend(format!("{:?}", other)),
        })?;

        let b = DMatrix::from_column_slice(n, 1, rhs.as_slice());
        let solution = factor.solve(&b);
        let x = DVector::from_column_slice(solution.as_slice());

        if x.iter().any(|v| !v.is_finite()) {
            return Err(LinearSolverError::Singular(
                "non-finite entries in Cholesky solution".into(),
            ));
        }

        let residual = (matrix.product(&x) - rhs).norm();
        Ok((x, direct_info(self.name(), Some(residual))))
    }

    fn name(&self) -> &str {
        "nalgebra-sparse-Cholesky"
    }
}
