//! Gaussian Markov random field density with a sparse Cholesky factor.
//!
//! Purpose
//! -------
//! Score zero-mean fields against a sparse precision matrix `Q`:
//! `nll(v) = −½ log|Q| + ½ vᵀQv + (n/2) ln 2π`.
//!
//! Key behaviors
//! -------------
//! - [`SparseCholesky`] wraps `nalgebra_sparse`'s `CscCholesky` and caches
//!   `log|Q| = 2 Σ ln L_jj`.
//! - [`GmrfDensity`] factors `Q` once and is reused for `Omega_input` and
//!   every `Epsilon_input` column.
//! - A precision that is not positive definite is recorded as improper; its
//!   `nll` is `+∞` and the evaluation continues.
//!
//! Invariants & assumptions
//! ------------------------
//! - `Q` is square and symmetric (guaranteed by `SpdeMesh`).
//! - Field lengths are checked against `Q` on every call.
use nalgebra::DMatrix;
use nalgebra_sparse::{CscMatrix, factorization::CscCholesky};
use ndarray::{Array1, ArrayView1};
use statrs::consts::LN_SQRT_2PI;

use crate::gompertz::errors::{GompertzError, GompertzResult};

/// `SparseCholesky` — `Q = L Lᵀ` with a cached log-determinant.
pub struct SparseCholesky {
    factor: CscCholesky<f64>,
    log_det: f64,
}

impl std::fmt::Debug for SparseCholesky {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseCholesky")
            .field("n", &self.factor.l().nrows())
            .field("log_det", &self.log_det)
            .finish()
    }
}

impl SparseCholesky {
    /// Factor a symmetric matrix.
    ///
    /// Returns `None` when the matrix is not positive definite, including the
    /// case where round-off leaves a non-finite log-determinant.
    pub fn factor(matrix: &CscMatrix<f64>) -> Option<Self> {
        let factor = CscCholesky::factor(matrix).ok()?;
        let l = factor.l();
        let mut log_det = 0.0;
        for j in 0..l.ncols() {
            let col = l.col(j);
            let diag = col
                .row_indices()
                .iter()
                .zip(col.values())
                .find(|(row, _)| **row == j)
                .map(|(_, v)| *v)?;
            log_det += 2.0 * diag.ln();
        }
        if !log_det.is_finite() {
            return None;
        }
        Some(Self { factor, log_det })
    }

    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    pub fn dim(&self) -> usize {
        self.factor.l().nrows()
    }

    /// Solve `Q x = b` for one right-hand side.
    pub fn solve_vec(&self, b: ArrayView1<f64>) -> Array1<f64> {
        let rhs = DMatrix::from_iterator(b.len(), 1, b.iter().copied());
        let x = self.factor.solve(&rhs);
        Array1::from_iter(x.column(0).iter().copied())
    }
}

/// `GmrfDensity` — zero-mean GMRF with precision `Q`.
#[derive(Debug)]
pub struct GmrfDensity {
    precision: CscMatrix<f64>,
    factor: Option<SparseCholesky>,
}

impl GmrfDensity {
    /// Store `Q` and attempt its factorization.
    pub fn new(precision: CscMatrix<f64>) -> Self {
        let factor = SparseCholesky::factor(&precision);
        if factor.is_none() {
            log::debug!("precision matrix is not positive definite; GMRF terms are +inf");
        }
        Self { precision, factor }
    }

    pub fn dim(&self) -> usize {
        self.precision.nrows()
    }

    /// `true` when `Q` factored successfully.
    pub fn is_proper(&self) -> bool {
        self.factor.is_some()
    }

    pub fn precision(&self) -> &CscMatrix<f64> {
        &self.precision
    }

    pub fn factor(&self) -> Option<&SparseCholesky> {
        self.factor.as_ref()
    }

    /// `log|Q|`, or `NaN` for an improper field.
    pub fn log_det(&self) -> f64 {
        self.factor.as_ref().map_or(f64::NAN, SparseCholesky::log_det)
    }

    /// Negative log-density of `v`; `+∞` when `Q` is not positive definite.
    ///
    /// # Errors
    /// - [`GompertzError::FieldLengthMismatch`] if `v.len() != n`.
    pub fn nll(&self, v: ArrayView1<f64>) -> GompertzResult<f64> {
        self.check_len(v.len())?;
        let Some(factor) = &self.factor else {
            return Ok(f64::INFINITY);
        };
        let n = v.len() as f64;
        Ok(-0.5 * factor.log_det() + 0.5 * quad_form(&self.precision, v) + n * LN_SQRT_2PI)
    }

    /// Gradient of [`nll`](Self::nll) with respect to `v`: `Q v`.
    ///
    /// # Errors
    /// - [`GompertzError::FieldLengthMismatch`] if `v.len() != n`.
    pub fn gradient(&self, v: ArrayView1<f64>) -> GompertzResult<Array1<f64>> {
        self.check_len(v.len())?;
        Ok(matvec(&self.precision, v))
    }

    fn check_len(&self, actual: usize) -> GompertzResult<()> {
        let expected = self.dim();
        if actual != expected {
            return Err(GompertzError::FieldLengthMismatch { expected, actual });
        }
        Ok(())
    }
}

/// `y = A x` for a sparse `A`.
pub fn matvec(a: &CscMatrix<f64>, x: ArrayView1<f64>) -> Array1<f64> {
    let mut y = Array1::zeros(a.nrows());
    for (i, j, v) in a.triplet_iter() {
        y[i] += v * x[j];
    }
    y
}

/// `xᵀ A x` for a sparse `A`.
pub fn quad_form(a: &CscMatrix<f64>, x: ArrayView1<f64>) -> f64 {
    a.triplet_iter().map(|(i, j, v)| x[i] * v * x[j]).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra_sparse::CooMatrix;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The diagonal-precision identity with independent normals.
    // - Sparse log-determinant versus nalgebra's dense Cholesky.
    // - Non-PD precision and length mismatches.
    //
    // They intentionally DO NOT cover:
    // - The log κ derivative of the GMRF term (likelihood.rs).
    // -------------------------------------------------------------------------

    fn csc(n: usize, entries: &[(usize, usize, f64)]) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for &(i, j, v) in entries {
            coo.push(i, j, v);
        }
        CscMatrix::from(&coo)
    }

    #[test]
    // Purpose
    // -------
    // With Q = diag(q) the GMRF NLL is a sum of univariate normal NLLs.
    //
    // Given
    // -----
    // - q = [0.5, 2, 4], v = [1.2, −0.3, 0.7].
    //
    // Expect
    // ------
    // - nll = Σ [ln σ_i + ln√(2π) + v_i²/(2σ_i²)] with σ_i² = 1/q_i.
    fn diagonal_precision_matches_independent_normals() {
        // Arrange
        let q = [0.5, 2.0, 4.0];
        let v = array![1.2, -0.3, 0.7];
        let gmrf = GmrfDensity::new(csc(3, &[(0, 0, q[0]), (1, 1, q[1]), (2, 2, q[2])]));

        // Act
        let nll = gmrf.nll(v.view()).expect("length matches");

        // Assert
        let expected: f64 = q
            .iter()
            .zip(v.iter())
            .map(|(qi, vi)| {
                let sd = (1.0 / qi).sqrt();
                sd.ln() + LN_SQRT_2PI + vi * vi / (2.0 * sd * sd)
            })
            .sum();
        assert_relative_eq!(nll, expected, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // The sparse log-determinant agrees with a dense Cholesky.
    //
    // Given
    // -----
    // - A 3 × 3 tridiagonal SPD matrix.
    //
    // Expect
    // ------
    // - log_det = 2 Σ ln diag(L_dense) within 1e-12; solve_vec inverts Q.
    fn sparse_log_det_matches_dense_cholesky() {
        // Arrange
        let entries =
            [(0, 0, 4.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 3.0), (1, 2, -0.5), (2, 1, -0.5), (2, 2, 2.0)];
        let q = csc(3, &entries);
        let mut dense = DMatrix::zeros(3, 3);
        for &(i, j, v) in &entries {
            dense[(i, j)] = v;
        }

        // Act
        let chol = SparseCholesky::factor(&q).expect("SPD");
        let dense_l = dense.clone().cholesky().expect("SPD").unpack();
        let x = chol.solve_vec(array![1.0, 0.0, -1.0].view());

        // Assert
        let expected: f64 = (0..3).map(|i| 2.0 * dense_l[(i, i)].ln()).sum();
        assert_relative_eq!(chol.log_det(), expected, epsilon = 1e-12);
        let back = matvec(&q, x.view());
        assert_relative_eq!(back[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(back[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(back[2], -1.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // A non-PD precision gives +∞ instead of an error or panic.
    //
    // Given
    // -----
    // - Q = [[1, 2], [2, 1]] (eigenvalues 3 and −1).
    //
    // Expect
    // ------
    // - is_proper() is false, nll = +∞, log_det is NaN.
    fn non_positive_definite_precision_yields_infinity() {
        // Arrange
        let gmrf = GmrfDensity::new(csc(2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 1.0)]));

        // Act
        let nll = gmrf.nll(array![0.1, 0.2].view()).expect("length matches");

        // Assert
        assert!(!gmrf.is_proper());
        assert_eq!(nll, f64::INFINITY);
        assert!(gmrf.log_det().is_nan());
    }

    #[test]
    // Purpose
    // -------
    // Field length is a precondition.
    //
    // Given
    // -----
    // - A 2 × 2 precision and a length-3 field.
    //
    // Expect
    // ------
    // - FieldLengthMismatch { expected: 2, actual: 3 } from nll and gradient.
    fn field_length_mismatch_is_an_error() {
        // Arrange
        let gmrf = GmrfDensity::new(csc(2, &[(0, 0, 1.0), (1, 1, 1.0)]));
        let v = array![0.0, 0.0, 0.0];

        // Act / Assert
        let expected = GompertzError::FieldLengthMismatch { expected: 2, actual: 3 };
        assert_eq!(gmrf.nll(v.view()), Err(expected.clone()));
        assert_eq!(gmrf.gradient(v.view()), Err(expected));
    }
}
