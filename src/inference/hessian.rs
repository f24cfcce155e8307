//! inference::hessian — covariance from the curvature of the marginal NLL.
//!
//! Purpose
//! -------
//! Turn a finite-difference Hessian of a negative log-likelihood at its
//! minimizer into a covariance matrix and standard errors.
//!
//! Key behaviors
//! -------------
//! - [`calc_covariance`] builds `H(θ̂)` with
//!   [`cost_hessian`](crate::optimization::nll_optimizer::finite_diff::cost_hessian),
//!   copies it into a `nalgebra::DMatrix` and returns its eigen-truncated
//!   pseudoinverse.
//! - [`standard_errors`] takes square roots of a covariance diagonal.
//!
//! Invariants & assumptions
//! ------------------------
//! - `H` is treated as symmetric; `cost_hessian` fills both triangles from
//!   one stencil.
//! - Eigenvalues at or below [`EIGEN_EPS`] are dropped, so weakly or
//!   negatively curved directions contribute no variance instead of
//!   producing NaN.
//! - No explicit inverse is formed.
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use crate::optimization::{
    errors::OptResult,
    nll_optimizer::{finite_diff::cost_hessian, types::Theta},
    numerical_stability::transformations::EIGEN_EPS,
};

/// calc_covariance — pseudoinverse of the NLL Hessian at `theta_hat`.
///
/// Parameters
/// ----------
/// - `f`: negative log-likelihood `θ ↦ J(θ)`.
/// - `theta_hat`: evaluation point, normally the fitted optimum.
/// - `rel_step`: relative finite-difference step passed to `cost_hessian`.
///
/// Errors
/// ------
/// - Any error from `f` or from Hessian validation (non-finite entries,
///   invalid step).
pub fn calc_covariance<F: Fn(&Theta) -> OptResult<f64>>(
    f: &F, theta_hat: &Theta, rel_step: f64,
) -> OptResult<Array2<f64>> {
    let hessian = cost_hessian(f, theta_hat, rel_step)?;
    let mut hessian_nalg = DMatrix::<f64>::zeros(hessian.nrows(), hessian.ncols());
    fill_dmatrix(&hessian, &mut hessian_nalg);
    Ok(pseudo_inverse(hessian_nalg))
}

/// `sqrt(max(diag, 0))`.
pub fn standard_errors(covariance: &Array2<f64>) -> Array1<f64> {
    covariance.diag().mapv(|v| v.max(0.0).sqrt())
}

// ---- Helper methods ----

fn fill_dmatrix(src: &Array2<f64>, dst: &mut DMatrix<f64>) {
    for ((i, j), &v) in src.indexed_iter() {
        dst[(i, j)] = v;
    }
}

/// `Σ_{k: λ_k > EIGEN_EPS} q_k q_kᵀ / λ_k` for `H = Q Λ Qᵀ`.
fn pseudo_inverse(hessian: DMatrix<f64>) -> Array2<f64> {
    let n = hessian.nrows();
    let eigen = hessian.symmetric_eigen();
    let q = eigen.eigenvectors;
    let mut cov = Array2::<f64>::zeros((n, n));
    for (k, &lambda) in eigen.eigenvalues.iter().enumerate() {
        if lambda <= EIGEN_EPS {
            continue;
        }
        for i in 0..n {
            let qi = q[(i, k)] / lambda;
            for j in 0..n {
                cov[[i, j]] += qi * q[(j, k)];
            }
        }
    }
    cov
}
