//! Dense matrices and decompositions.
//!
//! [`Matrix`] is a row-major `f64` store. Square systems are solved through
//! [`LuDecomposition`], rectangular (least-squares) systems through
//! [`QrDecomposition`]. Both report singularity before solving; solving a
//! singular system returns an error rather than garbage.
//!
//! # Example
//!
//! ```rust
//! use flatlm::matrix::{LuDecomposition, Matrix};
//!
//! let a = Matrix::from_rows(&[vec![4.0, 3.0], vec![6.0, 3.0]]).unwrap();
//! let lu = LuDecomposition::new(&a);
//! assert!(lu.is_nonsingular());
//!
//! let x = lu.solve_vec(&[10.0, 12.0]).unwrap();
//! assert!((x[0] - 1.0).abs() < 1e-12);
//! assert!((x[1] - 2.0).abs() < 1e-12);
//! ```

mod lu;
mod qr;

pub use lu::LuDecomposition;
pub use qr::QrDecomposition;

use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{FlatError, FlatResult};

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// `rows × cols` matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// `n × n` identity.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Builds a matrix from row vectors.
    ///
    /// # Errors
    ///
    /// [`FlatError::ShapeMismatch`] for ragged rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> FlatResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(FlatError::shape_mismatch(&[cols], &[row.len()]));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Wraps a row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> FlatResult<Self> {
        if data.len() != rows * cols {
            return Err(FlatError::shape_mismatch(&[rows * cols], &[data.len()]));
        }
        Ok(Self { rows, cols, data })
    }

    /// Single-column matrix.
    pub fn column(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    /// Rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether rows == cols.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Row-major storage.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable row-major storage.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Mutable row `i`.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Swaps two rows in place.
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = self.data.split_at_mut(hi * self.cols);
        head[lo * self.cols..(lo + 1) * self.cols].swap_with_slice(&mut tail[..self.cols]);
    }

    /// Copies column `j` out.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self[(i, j)]).collect()
    }

    /// Main diagonal.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self[(i, i)]).collect()
    }

    /// Overwrites the main diagonal.
    pub fn set_diagonal(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.rows.min(self.cols));
        for (i, &v) in values.iter().enumerate() {
            self[(i, i)] = v;
        }
    }

    /// Sets every element to zero.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Transpose.
    pub fn transpose(&self) -> Matrix {
        let mut t = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                t[(j, i)] = self[(i, j)];
            }
        }
        t
    }

    /// Matrix product `self · other`.
    pub fn multiply(&self, other: &Matrix) -> FlatResult<Matrix> {
        if self.cols != other.rows {
            return Err(FlatError::shape_mismatch(&[self.cols], &[other.rows]));
        }
        let mut result = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                let src = other.row(k);
                for (r, b) in result.row_mut(i).iter_mut().zip(src) {
                    *r += a * b;
                }
            }
        }
        Ok(result)
    }

    /// Matrix-vector product `self · v`.
    pub fn multiply_vec(&self, v: &[f64]) -> FlatResult<Vec<f64>> {
        if self.cols != v.len() {
            return Err(FlatError::shape_mismatch(&[self.cols], &[v.len()]));
        }
        Ok((0..self.rows)
            .map(|i| self.row(i).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Matrix) -> FlatResult<Matrix> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise difference.
    pub fn subtract(&self, other: &Matrix) -> FlatResult<Matrix> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Adds `other` into `self`.
    pub fn add_assign(&mut self, other: &Matrix) -> FlatResult<()> {
        self.check_same_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in self.data.iter_mut() {
            *v *= factor;
        }
    }

    /// Frobenius norm.
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Solves `self · X = b`: LU for square matrices, least squares via QR
    /// otherwise.
    pub fn solve(&self, b: &Matrix) -> FlatResult<Matrix> {
        if self.is_square() {
            LuDecomposition::new(self).solve(b)
        } else {
            QrDecomposition::new(self)?.solve(b)
        }
    }

    /// Inverse (square) or pseudo-inverse (tall, full rank).
    pub fn inverse(&self) -> FlatResult<Matrix> {
        self.solve(&Matrix::identity(self.rows))
    }

    fn check_same_shape(&self, other: &Matrix) -> FlatResult<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(FlatError::shape_mismatch(
                &[self.rows, self.cols],
                &[other.rows, other.cols],
            ));
        }
        Ok(())
    }

    fn zip_with(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> FlatResult<Matrix> {
        self.check_same_shape(other)?;
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        debug_assert!(i < self.rows && j < self.cols);
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        debug_assert!(i < self.rows && j < self.cols);
        &mut self.data[i * self.cols + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let c = a.multiply(&b).unwrap();
        assert_eq!(c.as_slice(), &[2.0, 1.0, 4.0, 3.0]);

        let v = a.multiply_vec(&[1.0, 1.0]).unwrap();
        assert_eq!(v, vec![3.0, 7.0]);

        assert!(a.multiply(&Matrix::zeros(3, 1)).is_err());
    }

    #[test]
    fn test_transpose_and_diagonal() {
        let mut a = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let t = a.transpose();
        assert_eq!(t.rows(), 3);
        assert_eq!(t[(2, 1)], 6.0);

        assert_eq!(a.diagonal(), vec![1.0, 5.0]);
        a.set_diagonal(&[0.0, 0.0]);
        assert_eq!(a.row(1), &[4.0, 0.0, 6.0]);
    }

    #[test]
    fn test_swap_rows() {
        let mut a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        a.swap_rows(2, 0);
        assert_eq!(a.as_slice(), &[5.0, 6.0, 3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn test_inverse() {
        let a = Matrix::from_rows(&[vec![2.0, 1.0], vec![1.0, 3.0]]).unwrap();
        let inv = a.inverse().unwrap();
        let id = a.multiply(&inv).unwrap();
        assert!(id.subtract(&Matrix::identity(2)).unwrap().norm() < 1e-12);
    }

    #[test]
    fn test_ragged_rows() {
        assert!(Matrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(Matrix::from_vec(2, 2, vec![0.0; 3]).is_err());
    }
}
