//! Small dense matrices over the curve's scalar field.
//!
//! Only what Birkhoff interpolation needs: Gauss-Jordan inversion and a
//! deterministic selection of linearly independent rows.

use ark_ff::{Field, Zero};

use crate::curve::Scalar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Vec<Scalar>>,
}

impl Matrix {
    // Builds a matrix from rectangular row data.
    pub(crate) fn new(data: Vec<Vec<Scalar>>) -> Self {
        let rows = data.len();
        let cols = data.first().map_or(0, Vec::len);
        debug_assert!(data.iter().all(|row| row.len() == cols));
        Self { rows, cols, data }
    }

    pub(crate) fn entry(&self, row: usize, col: usize) -> Scalar {
        self.data[row][col]
    }

    // Inverts a square matrix by Gauss-Jordan elimination with partial
    // pivoting. Returns `None` for singular matrices.
    pub(crate) fn inverse(&self) -> Option<Matrix> {
        debug_assert_eq!(self.rows, self.cols);
        let n = self.rows;
        let mut work = self.data.clone();
        let mut inv: Vec<Vec<Scalar>> = (0..n)
            .map(|i| {
                let mut row = vec![Scalar::zero(); n];
                row[i] = Scalar::ONE;
                row
            })
            .collect();

        for col in 0..n {
            let pivot = (col..n).find(|&r| !work[r][col].is_zero())?;
            work.swap(col, pivot);
            inv.swap(col, pivot);

            let inv_pivot = work[col][col].inverse()?;
            for j in 0..n {
                work[col][j] *= inv_pivot;
                inv[col][j] *= inv_pivot;
            }
            for row in 0..n {
                if row == col || work[row][col].is_zero() {
                    continue;
                }
                let factor = work[row][col];
                for j in 0..n {
                    let w = work[col][j];
                    let v = inv[col][j];
                    work[row][j] -= factor * w;
                    inv[row][j] -= factor * v;
                }
            }
        }
        Some(Matrix::new(inv))
    }

    // Greedily selects the first `want` rows (in row order) that are
    // linearly independent. Deterministic, so every party picks the same
    // rows for the same input. Returns `None` if the matrix has lower rank.
    pub(crate) fn independent_rows(&self, want: usize) -> Option<Vec<usize>> {
        let mut basis: Vec<Vec<Scalar>> = Vec::with_capacity(want);
        let mut pivots: Vec<usize> = Vec::with_capacity(want);
        let mut selected = Vec::with_capacity(want);

        for (idx, row) in self.data.iter().enumerate() {
            if selected.len() == want {
                break;
            }
            let mut reduced = row.clone();
            for (b, &p) in basis.iter().zip(pivots.iter()) {
                if !reduced[p].is_zero() {
                    let factor = reduced[p];
                    for j in 0..self.cols {
                        let bj = b[j];
                        reduced[j] -= factor * bj;
                    }
                }
            }
            if let Some(pivot) = (0..self.cols).find(|&j| !reduced[j].is_zero()) {
                let inv = reduced[pivot].inverse()?;
                for val in reduced.iter_mut() {
                    *val *= inv;
                }
                basis.push(reduced);
                pivots.push(pivot);
                selected.push(idx);
            }
        }
        (selected.len() == want).then_some(selected)
    }

    // Extracts the square submatrix of the given rows.
    pub(crate) fn select_rows(&self, rows: &[usize]) -> Matrix {
        Matrix::new(rows.iter().map(|&r| self.data[r].clone()).collect())
    }
}
