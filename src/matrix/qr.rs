//! QR decomposition by Householder reflections.
//!
//! For an `m × n` matrix `A` with `m >= n` this yields an orthogonal `Q`
//! (`m × n`) and an upper triangular `R` (`n × n`) with `A = Q · R`. The
//! reflection vectors are stored below the diagonal, `R`'s diagonal
//! separately. Used for least-squares solves of tall systems.

use super::Matrix;
use crate::error::{FlatError, FlatResult};

/// Householder QR factorisation.
#[derive(Debug, Clone)]
pub struct QrDecomposition {
    qr: Matrix,
    r_diag: Vec<f64>,
}

impl QrDecomposition {
    /// Factorises `a`.
    ///
    /// # Errors
    ///
    /// [`FlatError::ShapeMismatch`] if `a` has fewer rows than columns.
    pub fn new(a: &Matrix) -> FlatResult<Self> {
        let m = a.rows();
        let n = a.cols();
        if m < n {
            return Err(FlatError::shape_mismatch(&[n, n], &[m, n]));
        }

        let mut qr = a.clone();
        let mut r_diag = vec![0.0; n];

        for k in 0..n {
            // 2-norm of the k-th column below the diagonal, without overflow.
            let mut nrm = 0.0f64;
            for i in k..m {
                nrm = nrm.hypot(qr[(i, k)]);
            }

            if nrm != 0.0 {
                if qr[(k, k)] < 0.0 {
                    nrm = -nrm;
                }
                for i in k..m {
                    qr[(i, k)] /= nrm;
                }
                qr[(k, k)] += 1.0;

                // Apply the reflection to the remaining columns.
                for j in k + 1..n {
                    let mut s = 0.0;
                    for i in k..m {
                        s += qr[(i, k)] * qr[(i, j)];
                    }
                    s = -s / qr[(k, k)];
                    for i in k..m {
                        let v = qr[(i, k)];
                        qr[(i, j)] += s * v;
                    }
                }
            }
            r_diag[k] = -nrm;
        }

        Ok(Self { qr, r_diag })
    }

    /// Whether `R` has no zero on its diagonal.
    pub fn is_full_rank(&self) -> bool {
        self.r_diag.iter().all(|&d| d != 0.0)
    }

    /// Householder vectors (lower trapezoid).
    pub fn h(&self) -> Matrix {
        let (m, n) = (self.qr.rows(), self.qr.cols());
        let mut h = Matrix::zeros(m, n);
        for i in 0..m {
            for j in 0..n.min(i + 1) {
                h[(i, j)] = self.qr[(i, j)];
            }
        }
        h
    }

    /// Upper triangular factor.
    pub fn r(&self) -> Matrix {
        let n = self.qr.cols();
        let mut r = Matrix::zeros(n, n);
        for i in 0..n {
            r[(i, i)] = self.r_diag[i];
            for j in i + 1..n {
                r[(i, j)] = self.qr[(i, j)];
            }
        }
        r
    }

    /// Orthogonal factor (economy size, `m × n`).
    pub fn q(&self) -> Matrix {
        let (m, n) = (self.qr.rows(), self.qr.cols());
        let mut q = Matrix::zeros(m, n);
        for k in (0..n).rev() {
            q[(k, k)] = 1.0;
            for j in k..n {
                if self.qr[(k, k)] != 0.0 {
                    let mut s = 0.0;
                    for i in k..m {
                        s += self.qr[(i, k)] * q[(i, j)];
                    }
                    s = -s / self.qr[(k, k)];
                    for i in k..m {
                        q[(i, j)] += s * self.qr[(i, k)];
                    }
                }
            }
        }
        q
    }

    /// Least-squares solution of `A · X = B`.
    ///
    /// # Errors
    ///
    /// - [`FlatError::ShapeMismatch`] if `B` has a different row count
    /// - [`FlatError::RankDeficient`] if `A` is rank deficient
    pub fn solve(&self, b: &Matrix) -> FlatResult<Matrix> {
        let m = self.qr.rows();
        let n = self.qr.cols();
        if b.rows() != m {
            return Err(FlatError::shape_mismatch(&[m], &[b.rows()]));
        }
        if !self.is_full_rank() {
            return Err(FlatError::RankDeficient);
        }

        let nx = b.cols();
        let mut x = b.clone();

        // Compute Y = transpose(Q) · B
        for k in 0..n {
            for j in 0..nx {
                let mut s = 0.0;
                for i in k..m {
                    s += self.qr[(i, k)] * x[(i, j)];
                }
                s = -s / self.qr[(k, k)];
                for i in k..m {
                    x[(i, j)] += s * self.qr[(i, k)];
                }
            }
        }
        // Solve R · X = Y
        for k in (0..n).rev() {
            for j in 0..nx {
                x[(k, j)] /= self.r_diag[k];
            }
            for i in 0..k {
                let r = self.qr[(i, k)];
                for j in 0..nx {
                    x[(i, j)] -= x[(k, j)] * r;
                }
            }
        }

        let mut result = Matrix::zeros(n, nx);
        for i in 0..n {
            result.row_mut(i).copy_from_slice(x.row(i));
        }
        Ok(result)
    }
}
