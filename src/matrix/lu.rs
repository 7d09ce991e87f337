//! LU decomposition with partial pivoting.
//!
//! For an `m × n` matrix `A` with `m >= n` this yields a unit lower
//! triangular `L`, an upper triangular `U` and a row permutation `piv` with
//! `A[piv, :] = L · U`. The factorisation always succeeds; singularity shows
//! up as a zero pivot on `U`'s diagonal and is reported by
//! [`is_nonsingular`](LuDecomposition::is_nonsingular).

use super::Matrix;
use crate::error::{FlatError, FlatResult};

/// Left-looking Doolittle LU factorisation.
#[derive(Debug, Clone)]
pub struct LuDecomposition {
    lu: Matrix,
    piv: Vec<usize>,
    pivot_sign: f64,
}

impl LuDecomposition {
    /// Factorises `a`.
    pub fn new(a: &Matrix) -> Self {
        let mut lu = a.clone();
        let m = lu.rows();
        let n = lu.cols();
        let mut piv: Vec<usize> = (0..m).collect();
        let mut pivot_sign = 1.0;
        let mut col_j = vec![0.0; m];

        for j in 0..n {
            for (i, c) in col_j.iter_mut().enumerate() {
                *c = lu[(i, j)];
            }

            // Apply previous transformations to column j.
            for i in 0..m {
                let kmax = i.min(j);
                let row = lu.row(i);
                let s: f64 = row[..kmax].iter().zip(&col_j[..kmax]).map(|(a, b)| a * b).sum();
                col_j[i] -= s;
                lu[(i, j)] = col_j[i];
            }

            // Find pivot and exchange if necessary.
            let mut p = j;
            for i in j + 1..m {
                if col_j[i].abs() > col_j[p].abs() {
                    p = i;
                }
            }
            if p != j {
                lu.swap_rows(p, j);
                piv.swap(p, j);
                pivot_sign = -pivot_sign;
            }

            // Compute multipliers.
            if j < m {
                let pivot = lu[(j, j)];
                if pivot != 0.0 {
                    for i in j + 1..m {
                        lu[(i, j)] /= pivot;
                    }
                }
            }
        }

        Self {
            lu,
            piv,
            pivot_sign,
        }
    }

    /// Whether `A` is square and `U` has no zero pivot.
    pub fn is_nonsingular(&self) -> bool {
        self.lu.rows() == self.lu.cols() && (0..self.lu.cols()).all(|j| self.lu[(j, j)] != 0.0)
    }

    /// Unit lower triangular factor, `m × min(m, n)`.
    pub fn l(&self) -> Matrix {
        let m = self.lu.rows();
        let k = m.min(self.lu.cols());
        let mut l = Matrix::zeros(m, k);
        for i in 0..m {
            for j in 0..k {
                l[(i, j)] = match i.cmp(&j) {
                    std::cmp::Ordering::Greater => self.lu[(i, j)],
                    std::cmp::Ordering::Equal => 1.0,
                    std::cmp::Ordering::Less => 0.0,
                };
            }
        }
        l
    }

    /// Upper triangular factor, `min(m, n) × n`.
    pub fn u(&self) -> Matrix {
        let n = self.lu.cols();
        let k = self.lu.rows().min(n);
        let mut u = Matrix::zeros(k, n);
        for i in 0..k {
            for j in i..n {
                u[(i, j)] = self.lu[(i, j)];
            }
        }
        u
    }

    /// Row permutation: row `i` of `L · U` is row `pivot()[i]` of `A`.
    pub fn pivot(&self) -> &[usize] {
        &self.piv
    }

    /// Determinant of a square `A`.
    ///
    /// # Errors
    ///
    /// [`FlatError::ShapeMismatch`] if `A` is not square.
    pub fn determinant(&self) -> FlatResult<f64> {
        if !self.lu.is_square() {
            return Err(FlatError::shape_mismatch(
                &[self.lu.rows(), self.lu.rows()],
                &[self.lu.rows(), self.lu.cols()],
            ));
        }
        Ok((0..self.lu.cols()).fold(self.pivot_sign, |d, j| d * self.lu[(j, j)]))
    }

    /// Solves `A · X = B`.
    ///
    /// # Errors
    ///
    /// - [`FlatError::ShapeMismatch`] if `B` has a different row count or `A`
    ///   is not square
    /// - [`FlatError::SingularMatrix`] if `A` is singular
    pub fn solve(&self, b: &Matrix) -> FlatResult<Matrix> {
        let m = self.lu.rows();
        let n = self.lu.cols();
        if b.rows() != m || m != n {
            return Err(FlatError::shape_mismatch(&[m, n], &[b.rows(), n]));
        }
        if !self.is_nonsingular() {
            return Err(FlatError::SingularMatrix);
        }

        let nx = b.cols();
        let mut x = Matrix::zeros(n, nx);
        for (i, &p) in self.piv.iter().enumerate() {
            x.row_mut(i).copy_from_slice(b.row(p));
        }

        // Solve L · Y = B[piv, :]
        for k in 0..n {
            for i in k + 1..n {
                let l = self.lu[(i, k)];
                if l == 0.0 {
                    continue;
                }
                for j in 0..nx {
                    x[(i, j)] -= x[(k, j)] * l;
                }
            }
        }
        // Solve U · X = Y
        for k in (0..n).rev() {
            let d = self.lu[(k, k)];
            for j in 0..nx {
                x[(k, j)] /= d;
            }
            for i in 0..k {
                let u = self.lu[(i, k)];
                for j in 0..nx {
                    x[(i, j)] -= x[(k, j)] * u;
                }
            }
        }
        Ok(x)
    }

    /// Solves `A · x = b` for a single right-hand side.
    pub fn solve_vec(&self, b: &[f64]) -> FlatResult<Vec<f64>> {
        let x = self.solve(&Matrix::column(b))?;
        Ok(x.as_slice().to_vec())
    }

    /// Inverse of `A`, column by column against the identity.
    pub fn inverse(&self) -> FlatResult<Matrix> {
        self.solve(&Matrix::identity(self.lu.rows()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(&[
            vec![2.0, -1.0, 0.0],
            vec![-1.0, 2.0, -1.0],
            vec![0.0, -1.0, 2.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_factors_reconstruct() {
        let a = sample();
        let lu = LuDecomposition::new(&a);
        let product = lu.l().multiply(&lu.u()).unwrap();

        for (i, &p) in lu.pivot().iter().enumerate() {
            for j in 0..3 {
                assert!((product[(i, j)] - a[(p, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_determinant() {
        let lu = LuDecomposition::new(&sample());
        assert!((lu.determinant().unwrap() - 4.0).abs() < 1e-12);

        let swapped = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert!((LuDecomposition::new(&swapped).determinant().unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_row_is_singular() {
        let a = Matrix::from_rows(&[
            vec![1.0, 2.0, 3.0],
            vec![0.0, 0.0, 0.0],
            vec![4.0, 5.0, 7.0],
        ])
        .unwrap();
        let lu = LuDecomposition::new(&a);
        assert!(!lu.is_nonsingular());
        assert!(matches!(
            lu.solve_vec(&[1.0, 2.0, 3.0]),
            Err(FlatError::SingularMatrix)
        ));
    }

    #[test]
    fn test_wide_matrix() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let lu = LuDecomposition::new(&a);
        assert!(!lu.is_nonsingular());
        assert!(lu.determinant().is_err());
        assert!(lu.solve_vec(&[1.0, 2.0]).is_err());

        let (l, u) = (lu.l(), lu.u());
        assert_eq!((l.rows(), l.cols()), (2, 2));
        assert_eq!((u.rows(), u.cols()), (2, 3));
        let product = l.multiply(&u).unwrap();
        for (i, &p) in lu.pivot().iter().enumerate() {
            for j in 0..3 {
                assert!((product[(i, j)] - a[(p, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_rhs_shape_checked() {
        let lu = LuDecomposition::new(&sample());
        assert!(matches!(
            lu.solve_vec(&[1.0, 2.0]),
            Err(FlatError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_inverse() {
        let a = sample();
        let inv = LuDecomposition::new(&a).inverse().unwrap();
        let id = a.multiply(&inv).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((id[(i, j)] - expected).abs() < 1e-12);
            }
        }
    }
}
