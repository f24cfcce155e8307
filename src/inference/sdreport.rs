//! inference::sdreport — standard errors for fitted fixed parameters and
//! the derived SPDE quantities.
//!
//! Purpose
//! -------
//! Combine the optimizer-space covariance of a fitted model with the
//! parameter transforms to report estimates and standard errors on the
//! natural scale:
//! - fixed parameters, through the diagonal Jacobian of the optimizer map
//!   (only `rho` is transformed);
//! - `Range`, `SigmaE` and `SigmaO`, through the delta method
//!   `Var(g(θ̂)) = ∇gᵀ Σ ∇g`.
//!
//! Invariants & assumptions
//! ------------------------
//! - The covariance is `n_opt × n_opt` for the observation model used in
//!   the fit. Parameters held fixed during the fit (`theta_z` under Poisson)
//!   get zero rows and columns in the natural covariance and are omitted
//!   from [`SdReport::fixed`].
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;

use crate::{
    gompertz::core::{
        observation::ObservationModel,
        params::{DerivedQuantities, FixedParams},
    },
    inference::{
        errors::{InferenceError, InferenceResult},
        hessian::standard_errors,
    },
    optimization::numerical_stability::transformations::delta_method_variance,
};

/// A named point estimate with its standard error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
}

/// Standard-error report.
///
/// - `fixed`: estimated fixed parameters on the natural scale.
/// - `derived`: `Range`, `SigmaE`, `SigmaO`.
/// - `covariance`: natural-scale covariance in the full flat fixed layout
///   (`n_p + 7` square).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdReport {
    pub fixed: Vec<Estimate>,
    pub derived: Vec<Estimate>,
    pub covariance: Array2<f64>,
}

impl SdReport {
    /// Build the report from the optimizer-space optimum and covariance.
    ///
    /// # Errors
    /// - [`InferenceError::CovarianceDimMismatch`] if `cov_opt` is not
    ///   `opt_hat.len()` square or `opt_hat` does not match `params` and
    ///   `model`.
    pub fn new(
        opt_hat: ArrayView1<f64>, cov_opt: &Array2<f64>, params: &FixedParams,
        model: ObservationModel,
    ) -> InferenceResult<Self> {
        let n_p = params.n_p();
        let n_opt = FixedParams::n_optimizer(n_p, model);
        if opt_hat.len() != n_opt {
            return Err(InferenceError::CovarianceDimMismatch {
                expected: n_opt,
                actual: opt_hat.len(),
            });
        }
        if cov_opt.nrows() != n_opt || cov_opt.ncols() != n_opt {
            return Err(InferenceError::CovarianceDimMismatch {
                expected: n_opt,
                actual: cov_opt.nrows().max(cov_opt.ncols()),
            });
        }

        let jac = FixedParams::optimizer_jacobian_diag(opt_hat, n_p);
        let n_fixed = FixedParams::n_fixed(n_p);
        let mut covariance = Array2::<f64>::zeros((n_fixed, n_fixed));
        for i in 0..n_opt {
            for j in 0..n_opt {
                covariance[[i, j]] = jac[i] * cov_opt[[i, j]] * jac[j];
            }
        }

        let names = FixedParams::param_names(n_p);
        let theta = params.to_theta();
        let se = standard_errors(&covariance);
        let fixed = (0..n_opt)
            .map(|k| Estimate { name: names[k].clone(), estimate: theta[k], std_error: se[k] })
            .collect();

        let derived_q = params.derived();
        let derived = DerivedQuantities::NAMES
            .iter()
            .zip(derived_q.values())
            .zip(derived_q.gradients(n_p))
            .map(|((name, value), grad)| Estimate {
                name: name.to_string(),
                estimate: value,
                std_error: delta_method_variance(&covariance, &grad).sqrt(),
            })
            .collect();

        Ok(Self { fixed, derived, covariance })
    }

    /// Standard errors of the derived quantities, in `NAMES` order.
    pub fn derived_std_errors(&self) -> Array1<f64> {
        self.derived.iter().map(|e| e.std_error).collect()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    /// - [`InferenceError::Model`] if serialization fails.
    pub fn to_json(&self) -> InferenceResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| InferenceError::Model { text: e.to_string() })
    }
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
    // - The delta-method SEs against closed-form derivatives.
    // - The rho Jacobian and the Poisson layout.
    // - Dimension checks.
    // -------------------------------------------------------------------------

    fn params() -> FixedParams {
        FixedParams::new(array![0.5], 0.1, -0.4, 0.3, 0.2, 0.6, [-0.2, 0.4]).expect("finite")
    }

    #[test]
    // Purpose
    // -------
    // Delta-method SEs match closed forms for a diagonal covariance.
    //
    // Given
    // -----
    // - n_p = 1 under Poisson-lognormal; Σ_opt = diag(s²) with distinct s.
    //
    // Expect
    // ------
    // - SE(Range) = Range·s_κ (Range = √8/κ, ∂Range/∂log κ = −Range).
    // - SE(SigmaE) = SigmaE·√(s_E² + s_κ²) since ∂log SigmaE/∂(log τ_E,
    //   log κ) = (−1, −1).
    // - SE(SigmaO) likewise with s_O.
    fn delta_method_matches_closed_form() {
        // Arrange
        let p = params();
        let model = ObservationModel::PoissonLognormal;
        let opt = p.to_optimizer(model);
        let s = array![0.1, 0.2, 0.3, 0.15, 0.25, 0.05, 0.4, 0.35];
        let cov = Array2::from_diag(&s.mapv(|v| v * v));

        // Act
        let report = SdReport::new(opt.view(), &cov, &p, model).expect("dims match");

        // Assert
        let d = p.derived();
        let (s_e, s_o, s_k) = (s[2], s[3], s[4]);
        let se = report.derived_std_errors();
        assert_relative_eq!(se[0], d.range * s_k, epsilon = 1e-12);
        assert_relative_eq!(se[1], d.sigma_e * (s_e * s_e + s_k * s_k).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(se[2], d.sigma_o * (s_o * s_o + s_k * s_k).sqrt(), epsilon = 1e-12);
        assert_eq!(report.derived[0].name, "Range");
        assert_relative_eq!(report.derived[1].estimate, d.sigma_e);
    }

    #[test]
    // Purpose
    // -------
    // rho's SE passes through the tanh Jacobian; Poisson drops theta_z.
    //
    // Given
    // -----
    // - n_p = 1 under Poisson; Σ_opt = I.
    //
    // Expect
    // ------
    // - 6 fixed estimates; SE(rho) = (1 − 1e-6)(1 − tanh²(raw)); the
    //   theta_z rows of the natural covariance are zero.
    fn rho_jacobian_and_poisson_layout() {
        // Arrange
        let p = params();
        let model = ObservationModel::Poisson;
        let opt = p.to_optimizer(model);
        let cov = Array2::<f64>::eye(6);

        // Act
        let report = SdReport::new(opt.view(), &cov, &p, model).expect("dims match");

        // Assert
        assert_eq!(report.fixed.len(), 6);
        assert_eq!(report.fixed[5].name, "rho");
        let raw = opt[5];
        let expected = (1.0 - 1e-6) * (1.0 - raw.tanh().powi(2));
        assert_relative_eq!(report.fixed[5].std_error, expected, epsilon = 1e-12);
        assert_relative_eq!(report.fixed[5].estimate, p.rho, epsilon = 1e-12);
        assert_eq!(report.covariance.dim(), (8, 8));
        assert!(report.covariance.row(6).iter().all(|v| *v == 0.0));
        assert!(report.to_json().expect("serializable").contains("\"SigmaO\""));
    }

    #[test]
    // Purpose
    // -------
    // Mismatched dimensions are reported, not indexed out of bounds.
    //
    // Given
    // -----
    // - A Poisson-lognormal optimum with a 6 × 6 covariance.
    //
    // Expect
    // ------
    // - CovarianceDimMismatch { expected: 8, actual: 6 }.
    fn dimension_mismatch_is_rejected() {
        let p = params();
        let opt = p.to_optimizer(ObservationModel::PoissonLognormal);
        let err = SdReport::new(opt.view(), &Array2::eye(6), &p, ObservationModel::PoissonLognormal)
            .expect_err("mismatch");
        assert_eq!(err, InferenceError::CovarianceDimMismatch { expected: 8, actual: 6 });
    }
}
