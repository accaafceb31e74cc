//! Linear solver backend abstraction layer.
//!
//! This module provides a trait-based interface for the linear solve inside
//! the Newton loop, so the driver stays agnostic of the numerical library.
//! The solver is injected into the driver as `&dyn LinearSolver`.
//!
//! # Backends
//!
//! - **Dense LU** (default): nalgebra partial-pivoting LU. Handles symmetric
//!   and general storage, detects singular matrices from the pivot ratio.
//! - **Sparse Cholesky**: nalgebra-sparse CSC Cholesky for symmetric positive
//!   definite systems.
//!
//! # Architecture
//!
//! ```text
//! Element engine (nalgebra SMatrix, small and dense)
//!         │
//!         ▼
//! Assembly (SparseMatrixCsr + reduced force vectors)
//!         │
//!         ▼
//! LinearSolver trait
//!    ┌────┴────┐
//!    ▼         ▼
//! DenseLu   SparseCholesky
//! ```

pub mod cholesky;
pub mod native;
pub mod traits;

pub use cholesky::SparseCholeskySolver;
pub use native::DenseLuSolver;
pub use traits::*;

/// Returns the default linear solver backend.
pub fn default_backend() -> Box<dyn LinearSolver> {
    Box::new(DenseLuSolver)
}
