//! Exact gradient of the Laplace marginal in the fixed parameters.
//!
//! Purpose
//! -------
//! Differentiate `L(θ) = J(θ, û) + ½ log|H(θ, û)| − (n_u/2) ln 2π` through
//! the mode `û(θ)` by the implicit function theorem, so the outer optimizer
//! needs no finite differences.
//!
//! Key behaviors
//! -------------
//! - `∂J/∂θ` at fixed `û` comes from [`joint_gradient_at`]; the mode's own
//!   dependence on `θ` drops out of this term because `∇_u J(û) = 0`.
//! - The log-determinant term is `½ tr(H⁻¹ ∂H/∂θ)` at fixed `û` plus
//!   `½ gᵀ dû/dθ`, with `g_k = tr(H⁻¹ ∂H/∂u_k)` and
//!   `dû/dθ = −H⁻¹ ∂²J/∂u∂θ`. Writing `z = H⁻¹ g`, the second part is
//!   `−½ ∂(zᵀ∇_u J)/∂θ` at fixed `z` and `û`.
//! - `H = blockdiag(Q, …, Q) + Σ_i f″_i J_iᵀ J_i`, so every trace reduces to
//!   the record leverages `s_i = J_i H⁻¹ J_iᵀ`, one solve per observed record,
//!   plus `tr(H⁻¹ blockdiag(∂Q/∂log κ))`, one solve per random effect.
//!
//! Invariants & assumptions
//! ------------------------
//! - `mode` must come from [`find_mode`](super::laplace::find_mode) at the
//!   same `θ`; the result is exact only to the extent the mode is
//!   stationary.
//! - A non-finite marginal or a Hessian that does not factor gives an
//!   all-`NaN` gradient.
use nalgebra_sparse::{CooMatrix, CscMatrix};
use ndarray::Array1;

use crate::gompertz::{
    core::{
        data::GompertzData,
        gmrf::SparseCholesky,
        laplace::LaplaceMode,
        likelihood::{
            LikelihoodContext, evaluate_joint, joint_gradient_at, random_hessian_at,
            trace_of_solve,
        },
        params::{FixedParams, RandomEffects},
        recursion::{SparseRow, backpropagate, latent_jacobian, latent_jacobian_drho},
    },
    errors::GompertzResult,
};

/// Gradient of the Laplace marginal in the flat fixed layout.
///
/// # Errors
/// - Dimension errors when `mode` or `params` do not fit `data`.
pub fn laplace_gradient(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, data: &GompertzData, mode: &LaplaceMode,
) -> GompertzResult<Array1<f64>> {
    let n_p = params.n_p();
    let (n_x, n_t) = (data.n_x(), data.n_t());
    let n_u = RandomEffects::n_random(n_x, n_t);
    let undefined = Array1::from_elem(FixedParams::n_fixed(n_p), f64::NAN);
    if !mode.nll.is_finite() {
        return Ok(undefined);
    }

    let u = RandomEffects::from_flat(mode.mode.view(), n_x, n_t)?;
    let eval = evaluate_joint(ctx, params, &u, data)?;
    let joint = joint_gradient_at(&eval, ctx, params, &u, data)?;
    let hessian = random_hessian_at(&eval, params, data, 0.0);
    let Some(factor) = SparseCholesky::factor(&hessian) else {
        return Ok(undefined);
    };

    let rows = latent_jacobian(params, data);
    let rows_drho = latent_jacobian_drho(params, data, &rows);
    let n_eps = n_x * n_t;

    // Leverages, and Σ f″_i ∂J_i/∂θ · H⁻¹J_iᵀ for log_tau_E, log_tau_O, rho.
    let mut leverage = Array1::<f64>::zeros(data.n_i());
    let mut jacobian_trace = [0.0; 3];
    let mut rhs = Array1::<f64>::zeros(n_u);
    for (i, term) in eval.terms.iter().enumerate() {
        let Some(term) = term else { continue };
        rhs.fill(0.0);
        for &(k, v) in &rows[i] {
            rhs[k] = v;
        }
        let w = factor.solve_vec(rhs.view());
        leverage[i] = sparse_dot(&rows[i], &w);
        let (eps, omega) = split_dot(&rows[i], &w, n_eps);
        jacobian_trace[0] -= term.d2 * eps;
        jacobian_trace[1] -= term.d2 * omega;
        jacobian_trace[2] += term.d2 * sparse_dot(&rows_drho[i], &w);
    }

    let mut third = Array1::<f64>::zeros(n_u);
    for (i, term) in eval.terms.iter().enumerate() {
        let Some(term) = term else { continue };
        let c = term.d3 * leverage[i];
        for &(k, v) in &rows[i] {
            third[k] += c * v;
        }
    }
    let z = factor.solve_vec(third.view());

    let n_i = data.n_i();
    let (mut w_trace, mut w_mode) = (Array1::<f64>::zeros(n_i), Array1::<f64>::zeros(n_i));
    let mut mode_jacobian = [0.0; 3];
    let (mut trace_z, mut mode_z) = ([0.0; 2], [0.0; 2]);
    for (i, term) in eval.terms.iter().enumerate() {
        let Some(term) = term else { continue };
        let s = leverage[i];
        let jz = sparse_dot(&rows[i], &z);
        w_trace[i] = term.d3 * s;
        w_mode[i] = term.d2 * jz;
        let (eps, omega) = split_dot(&rows[i], &z, n_eps);
        mode_jacobian[0] -= term.d1 * eps;
        mode_jacobian[1] -= term.d1 * omega;
        mode_jacobian[2] += term.d1 * sparse_dot(&rows_drho[i], &z);
        trace_z[0] += s * term.d2_log_sd;
        trace_z[1] += s * term.d2_log_clustersize;
        mode_z[0] += jz * term.d1_log_sd;
        mode_z[1] += jz * term.d1_log_clustersize;
    }
    let adj_trace = backpropagate(params, data, &eval.latent, w_trace.view())?;
    let adj_mode = backpropagate(params, data, &eval.latent, w_mode.view())?;

    let dq = ctx.mesh.precision_dlog_kappa(params.log_kappa);
    let trace_kappa = trace_of_solve(&factor, &block_diagonal(&dq, n_t + 1));
    let mode_kappa: f64 = (0..=n_t)
        .map(|b| {
            let offset = b * n_x;
            dq.triplet_iter()
                .map(|(i, j, v)| z[offset + i] * v * mode.mode[offset + j])
                .sum::<f64>()
        })
        .sum();

    let mut grad = joint.fixed;
    for k in 0..n_p {
        grad[k] += 0.5 * (adj_trace.alpha[k] - adj_mode.alpha[k]);
    }
    grad[n_p] += 0.5 * (adj_trace.phi - adj_mode.phi);
    grad[n_p + 1] += 0.5
        * (adj_trace.log_tau_e + 2.0 * jacobian_trace[0] - adj_mode.log_tau_e - mode_jacobian[0]);
    grad[n_p + 2] += 0.5
        * (adj_trace.log_tau_o + 2.0 * jacobian_trace[1] - adj_mode.log_tau_o - mode_jacobian[1]);
    grad[n_p + 3] += 0.5 * (trace_kappa - mode_kappa);
    grad[n_p + 4] +=
        0.5 * (adj_trace.rho + 2.0 * jacobian_trace[2] - adj_mode.rho - mode_jacobian[2]);
    grad[n_p + 5] += 0.5 * (trace_z[0] - mode_z[0]);
    grad[n_p + 6] += 0.5 * (trace_z[1] - mode_z[1]);
    Ok(grad)
}

// ---- Helper methods ----

fn sparse_dot(row: &SparseRow, v: &Array1<f64>) -> f64 {
    row.iter().map(|&(k, value)| value * v[k]).sum()
}

/// `row · v` split into its `Epsilon_input` and `Omega_input` parts.
fn split_dot(row: &SparseRow, v: &Array1<f64>, n_eps: usize) -> (f64, f64) {
    row.iter().fold((0.0, 0.0), |(eps, omega), &(k, value)| {
        if k < n_eps { (eps + value * v[k], omega) } else { (eps, omega + value * v[k]) }
    })
}

fn block_diagonal(block: &CscMatrix<f64>, n_blocks: usize) -> CscMatrix<f64> {
    let n = block.nrows();
    let mut coo = CooMatrix::new(n * n_blocks, n * n_blocks);
    for b in 0..n_blocks {
        for (i, j, v) in block.triplet_iter() {
            coo.push(b * n + i, b * n + j, *v);
        }
    }
    CscMatrix::from(&coo)
}
