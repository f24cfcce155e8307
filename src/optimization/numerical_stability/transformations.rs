//! Numerical stability utilities.
//!
//! Guarded transforms between the unconstrained optimizer space and bounded
//! natural parameters, plus the delta-method variance used for derived
//! quantities.
//!
//! # Provided items
//! - [`RHO_MARGIN`]: keeps the autoregressive coefficient strictly inside
//!   `(−1, 1)` so the equilibrium factor `1/(1 − ρ)` stays finite.
//! - [`bounded_rho`], [`bounded_rho_inv`], [`bounded_rho_deriv`].
//! - [`EIGEN_EPS`]: eigenvalue floor for pseudo-inverting Hessians.
//! - [`NON_FINITE_COST_PENALTY`]: finite stand-in for a non-finite objective.
//! - [`delta_method_variance`].
use ndarray::{Array1, Array2};

/// Safety margin on the autoregressive coefficient.
///
/// `ρ = (1 − RHO_MARGIN)·tanh(r)`, so `|ρ| ≤ 1 − 1e-6` for every finite `r`.
pub const RHO_MARGIN: f64 = 1e-6;

/// Eigenvalues at or below this are treated as zero when inverting a
/// Hessian.
pub const EIGEN_EPS: f64 = 1e-10;

/// Cost reported to the outer optimizer when the Laplace objective is `NaN`
/// or `±∞` (non-positive-definite precision, failed inner solve).
pub const NON_FINITE_COST_PENALTY: f64 = 1e12;

/// `ρ = (1 − RHO_MARGIN)·tanh(raw)`.
pub fn bounded_rho(raw: f64) -> f64 {
    (1.0 - RHO_MARGIN) * raw.tanh()
}

/// Inverse of [`bounded_rho`].
///
/// `rho` is clamped just inside the admissible interval first, so any value
/// in `[−1, 1]` maps to a finite optimizer coordinate.
pub fn bounded_rho_inv(rho: f64) -> f64 {
    let bound = 1.0 - RHO_MARGIN;
    let scaled = (rho / bound).clamp(-1.0 + 1e-12, 1.0 - 1e-12);
    scaled.atanh()
}

/// `dρ/draw = (1 − RHO_MARGIN)·(1 − tanh²(raw))`.
pub fn bounded_rho_deriv(raw: f64) -> f64 {
    let t = raw.tanh();
    (1.0 - RHO_MARGIN) * (1.0 - t * t)
}

/// Delta-method variance of a scalar function with gradient `grad` under
/// parameter covariance `cov`: `gᵀ Σ g`.
///
/// Negative results from round-off on a near-singular `cov` are floored at
/// zero.
pub fn delta_method_variance(cov: &Array2<f64>, grad: &Array1<f64>) -> f64 {
    grad.dot(&cov.dot(grad)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The autoregressive bound, its inverse and derivative.
    // - delta_method_variance on a hand-computed example.
    //
    // They intentionally DO NOT cover:
    // - Standard errors of a fitted model (inference::sdreport).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // bounded_rho stays inside the margin even for extreme inputs.
    //
    // Given
    // -----
    // - raw in {−1e6, −3, 0, 3, 1e6}.
    //
    // Expect
    // ------
    // - |ρ| ≤ 1 − RHO_MARGIN, and ρ(0) = 0.
    fn bounded_rho_respects_margin() {
        // Act / Assert
        for raw in [-1e6, -3.0, 0.0, 3.0, 1e6] {
            let rho = bounded_rho(raw);
            assert!(rho.abs() <= 1.0 - RHO_MARGIN);
        }
        assert_eq!(bounded_rho(0.0), 0.0);
    }

    #[test]
    // Purpose
    // -------
    // bounded_rho_inv inverts bounded_rho on the interior.
    //
    // Given
    // -----
    // - ρ in {−0.9, −0.2, 0.0, 0.5, 0.95}.
    //
    // Expect
    // ------
    // - bounded_rho(bounded_rho_inv(ρ)) ≈ ρ.
    fn bounded_rho_inv_round_trips() {
        for rho in [-0.9, -0.2, 0.0, 0.5, 0.95] {
            assert_relative_eq!(bounded_rho(bounded_rho_inv(rho)), rho, epsilon = 1e-12);
        }
    }

    #[test]
    // Purpose
    // -------
    // bounded_rho_deriv matches a central difference.
    //
    // Given
    // -----
    // - raw = 0.7, h = 1e-6.
    //
    // Expect
    // ------
    // - Agreement within 1e-8.
    fn bounded_rho_deriv_matches_finite_difference() {
        // Arrange
        let raw = 0.7;
        let h = 1e-6;

        // Act
        let fd = (bounded_rho(raw + h) - bounded_rho(raw - h)) / (2.0 * h);

        // Assert
        assert_relative_eq!(bounded_rho_deriv(raw), fd, epsilon = 1e-8);
    }

    #[test]
    // Purpose
    // -------
    // delta_method_variance computes gᵀΣg.
    //
    // Given
    // -----
    // - Σ = [[2, 0.5], [0.5, 1]], g = [1, −2].
    //
    // Expect
    // ------
    // - 2 − 2·0.5·2 + 4·1 = 4.
    fn delta_method_variance_matches_hand_computation() {
        // Arrange
        let cov = array![[2.0, 0.5], [0.5, 1.0]];
        let g = array![1.0, -2.0];

        // Act / Assert
        assert_relative_eq!(delta_method_variance(&cov, &g), 4.0, epsilon = 1e-12);
    }
}
