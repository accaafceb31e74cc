//! Compressed sparse row matrices for the global system.
//!
//! Two storage schemes are supported:
//! - `General`: every non-zero entry is stored
//! - `Symmetric`: only the upper triangle (`col >= row`) is stored, the lower
//!   triangle is implied
//!
//! The raw CSR arrays can be exposed with a zero- or one-based index base, as
//! required by external direct solvers. The logical interface (`entries`,
//! `to_dense`, `mul_vector`, ...) is always zero-based.
//!
//! Assembly goes through [`SparseMatrixBuilder`], which accumulates duplicate
//! entries in a hash map and compresses them through a nalgebra-sparse
//! `CooMatrix` into sorted CSR rows.

use crate::error::{FemError, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Storage scheme of a sparse matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatrixStorage {
    #[default]
    General,
    Symmetric,
}

/// Index base of the raw CSR arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexBase {
    #[default]
    Zero,
    One,
}

impl IndexBase {
    fn offset(self) -> usize {
        match self {
            IndexBase::Zero => 0,
            IndexBase::One => 1,
        }
    }
}

/// Accumulates matrix entries before compression to CSR
#[derive(Debug, Clone)]
pub struct SparseMatrixBuilder {
    nrows: usize,
    ncols: usize,
    storage: MatrixStorage,
    entry_map: HashMap<(usize, usize), f64>,
}

impl SparseMatrixBuilder {
    pub fn new(nrows: usize, ncols: usize, storage: MatrixStorage) -> Self {
        Self {
            nrows,
            ncols,
            storage,
            entry_map: HashMap::new(),
        }
    }

    pub fn storage(&self) -> MatrixStorage {
        self.storage
    }

    /// Add `value` to entry `(row, col)`; duplicates are summed.
    ///
    /// # Errors
    /// Out-of-range indices, and lower-triangle entries in symmetric storage.
    pub fn add_entry(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.nrows || col >= self.ncols {
            return Err(FemError::config(format!(
                "entry ({}, {}) outside of a {}x{} matrix",
                row, col, self.nrows, self.ncols
            )));
        }
        if self.storage == MatrixStorage::Symmetric && col < row {
            return Err(FemError::config(format!(
                "symmetric storage accepts only upper triangle entries, got ({}, {})",
                row, col
            )));
        }
        *self.entry_map.entry((row, col)).or_insert(0.0) += value;
        Ok(())
    }

    /// Compress the accumulated entries into a zero-based CSR matrix
    pub fn build(self) -> Result<SparseMatrixCsr> {
        if self.storage == MatrixStorage::Symmetric && self.nrows != self.ncols {
            return Err(FemError::config(format!(
                "symmetric storage requires a square matrix, got {}x{}",
                self.nrows, self.ncols
            )));
        }

        let mut rows = Vec::with_capacity(self.entry_map.len());
        let mut cols = Vec::with_capacity(self.entry_map.len());
        let mut values = Vec::with_capacity(self.entry_map.len());
        for ((row, col), value) in self.entry_map {
            rows.push(row);
            cols.push(col);
            values.push(value);
        }

        let coo = CooMatrix::try_from_triplets(self.nrows, self.ncols, rows, cols, values)
            .map_err(|e| FemError::config(format!("failed to create COO matrix: {}", e)))?;

        Ok(SparseMatrixCsr {
            storage: self.storage,
            csr: CsrMatrix::from(&coo),
            one_based: None,
        })
    }
}

/// One-based copies of the CSR index arrays
#[derive(Debug, Clone, PartialEq)]
struct OneBasedIndices {
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
}

/// Sparse matrix in compressed row format
///
/// The entries live in a zero-based nalgebra-sparse [`CsrMatrix`]; in
/// symmetric storage it holds the upper triangle only. Switching to one-based
/// indexing keeps shifted copies of the index arrays next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrixCsr {
    storage: MatrixStorage,
    csr: CsrMatrix<f64>,
    one_based: Option<OneBasedIndices>,
}

impl SparseMatrixCsr {
    /// Wrap raw CSR arrays supplied in the given index base
    ///
    /// Column indices must be sorted and unique within each row.
    ///
    /// # Errors
    /// Inconsistent offsets, out-of-range or unsorted column indices and
    /// lower-triangle entries in symmetric storage.
    pub fn from_csr_arrays(
        nrows: usize,
        ncols: usize,
        storage: MatrixStorage,
        index_base: IndexBase,
        row_offsets: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if storage == MatrixStorage::Symmetric && nrows != ncols {
            return Err(FemError::config(format!(
                "symmetric storage requires a square matrix, got {}x{}",
                nrows, ncols
            )));
        }

        let base = index_base.offset();
        let shift = |indices: &[usize], what: &str| -> Result<Vec<usize>> {
            indices
                .iter()
                .map(|&i| {
                    i.checked_sub(base).ok_or_else(|| {
                        FemError::config(format!("{} {} below index base {}", what, i, base))
                    })
                })
                .collect()
        };
        let zero_offsets = shift(&row_offsets, "row offset")?;
        let zero_indices = shift(&col_indices, "column index")?;

        let csr = CsrMatrix::try_from_csr_data(nrows, ncols, zero_offsets, zero_indices, values)
            .map_err(|e| FemError::config(format!("invalid CSR arrays: {}", e)))?;

        if storage == MatrixStorage::Symmetric {
            if let Some((row, col, _)) = csr.triplet_iter().find(|&(row, col, _)| col < row) {
                return Err(FemError::config(format!(
                    "symmetric storage accepts only upper triangle entries, got ({}, {})",
                    row, col
                )));
            }
        }

        let one_based = (index_base == IndexBase::One).then_some(OneBasedIndices {
            row_offsets,
            col_indices,
        });
        Ok(Self {
            storage,
            csr,
            one_based,
        })
    }

    pub fn nrows(&self) -> usize {
        self.csr.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.csr.ncols()
    }

    pub fn storage(&self) -> MatrixStorage {
        self.storage
    }

    pub fn index_base(&self) -> IndexBase {
        match self.one_based {
            Some(_) => IndexBase::One,
            None => IndexBase::Zero,
        }
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.csr.nnz()
    }

    /// Raw row offsets in the current index base
    pub fn row_offsets(&self) -> &[usize] {
        match &self.one_based {
            Some(indices) => &indices.row_offsets,
            None => self.csr.row_offsets(),
        }
    }

    /// Raw column indices in the current index base
    pub fn col_indices(&self) -> &[usize] {
        match &self.one_based {
            Some(indices) => &indices.col_indices,
            None => self.csr.col_indices(),
        }
    }

    pub fn values(&self) -> &[f64] {
        self.csr.values()
    }

    pub fn set_one_based_indexing(&mut self) {
        if self.one_based.is_none() {
            self.one_based = Some(OneBasedIndices {
                row_offsets: self.csr.row_offsets().iter().map(|i| i + 1).collect(),
                col_indices: self.csr.col_indices().iter().map(|i| i + 1).collect(),
            });
        }
    }

    pub fn set_zero_based_indexing(&mut self) {
        self.one_based = None;
    }

    /// Stored entries as zero-based `(row, col, value)` triplets
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.csr.triplet_iter().map(|(row, col, &value)| (row, col, value))
    }

    /// Full (general storage) nalgebra-sparse CSR copy
    ///
    /// Symmetric storage is expanded by adding the strict lower triangle.
    pub fn to_nalgebra(&self) -> CsrMatrix<f64> {
        match self.storage {
            MatrixStorage::General => self.csr.clone(),
            MatrixStorage::Symmetric => {
                let strict_lower = self.csr.transpose().filter(|row, col, _| row > col);
                &self.csr + &strict_lower
            }
        }
    }

    /// Dense copy of the full matrix
    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from(&self.to_nalgebra())
    }

    /// Matrix-vector product `A·x`
    pub fn mul_vector(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        if x.len() != self.ncols() {
            return Err(FemError::config(format!(
                "cannot multiply a {}x{} matrix with a vector of length {}",
                self.nrows(),
                self.ncols(),
                x.len()
            )));
        }
        Ok(self.product(x))
    }

    /// Unchecked product, `x.len()` must equal `ncols`
    pub(crate) fn product(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.to_nalgebra() * x
    }
}
