//! Gompertz state recursion, its reverse pass, and its random-effect
//! Jacobian.
//!
//! Purpose
//! -------
//! Compute the latent log density `log_chat_i` of every record and
//! propagate derivatives back through the recursion.
//!
//! Key behaviors
//! -------------
//! - [`compute_latent`] scales the random fields, forms the equilibrium and
//!   walks the records in index order:
//!   - `t_i == 0`: `log_chat_i = phi + Equil_x[x] + Epsilon_xt[x, 0]`
//!   - `t_i > 0`: `log_chat_i = rho·log_chat_{i−1} + eta_x[x] + Omega_x[x]
//!     + Epsilon_xt[x, t]`
//! - [`backpropagate`] takes `w_i = ∂F/∂log_chat_i` for some scalar `F` and
//!   returns `∂F` with respect to every fixed parameter and random effect,
//!   using the adjoint `λ_i = w_i + [t_{i+1} > 0]·rho·λ_{i+1}`.
//! - [`latent_jacobian`] returns `∂log_chat_i/∂u` as sparse rows over the
//!   flat random-effect layout. `log_chat` is affine in `u`, so the rows
//!   depend only on the fixed parameters. [`latent_jacobian_drho`] gives
//!   their derivative in `rho`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Dimensions are checked by [`check_dimensions`] before any indexing.
//! - `rho = 1` makes `Equil_x` infinite; it is a degenerate parameter value
//!   and is not guarded.
//! - The previous record is the literal previous array slot. `GompertzData`
//!   guarantees record 0 has `t = 0`.
use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1};

use crate::gompertz::{
    core::{
        data::GompertzData,
        params::{FixedParams, RandomEffects},
    },
    errors::{GompertzResult, ParamError},
};

/// Latent quantities of one evaluation.
///
/// - `eta_x`: `X_xp · alpha`.
/// - `omega_x`: `Omega_input / exp(log_tau_O)`.
/// - `epsilon_xt`: `Epsilon_input / exp(log_tau_E)`.
/// - `equil_x`: `(eta_x + omega_x) / (1 − rho)`.
/// - `log_chat`: latent log density per record.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentFields {
    pub eta_x: Array1<f64>,
    pub omega_x: Array1<f64>,
    pub epsilon_xt: Array2<f64>,
    pub equil_x: Array1<f64>,
    pub log_chat: Array1<f64>,
}

/// Partials of a scalar with respect to every parameter, produced by
/// [`backpropagate`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdjointPartials {
    pub alpha: Array1<f64>,
    pub phi: f64,
    pub log_tau_e: f64,
    pub log_tau_o: f64,
    pub rho: f64,
    pub epsilon_input: Array2<f64>,
    pub omega_input: Array1<f64>,
}

/// Sparse row `(flat random index, value)`, sorted by index.
pub type SparseRow = Vec<(usize, f64)>;

/// Check that parameters and random effects fit the data.
///
/// # Errors
/// - [`ParamError::AlphaLengthMismatch`], [`ParamError::EpsilonShapeMismatch`],
///   [`ParamError::OmegaLengthMismatch`], wrapped in `GompertzError`.
pub fn check_dimensions(
    params: &FixedParams, random: &RandomEffects, data: &GompertzData,
) -> GompertzResult<()> {
    check_alpha(params, data)?;
    random.check_dims(data.n_x(), data.n_t())?;
    Ok(())
}

fn check_alpha(params: &FixedParams, data: &GompertzData) -> GompertzResult<()> {
    if params.alpha.len() != data.n_p() {
        return Err(ParamError::AlphaLengthMismatch {
            expected: data.n_p(),
            actual: params.alpha.len(),
        }
        .into());
    }
    Ok(())
}

/// Evaluate the recursion for every record.
///
/// # Errors
/// - Dimension errors from [`check_dimensions`].
pub fn compute_latent(
    params: &FixedParams, random: &RandomEffects, data: &GompertzData,
) -> GompertzResult<LatentFields> {
    check_dimensions(params, random, data)?;
    let eta_x = data.covariates.dot(&params.alpha);
    let omega_x = &random.omega_input * (-params.log_tau_o).exp();
    let epsilon_xt = &random.epsilon_input * (-params.log_tau_e).exp();
    let equil_x = (&eta_x + &omega_x) / (1.0 - params.rho);

    let mut log_chat = Array1::zeros(data.n_i());
    for i in 0..data.n_i() {
        let (x, t) = (data.x_s[i], data.t_i[i]);
        log_chat[i] = if t == 0 {
            params.phi + equil_x[x] + epsilon_xt[[x, 0]]
        } else {
            let prev = if i > 0 { log_chat[i - 1] } else { f64::NAN };
            params.rho * prev + eta_x[x] + omega_x[x] + epsilon_xt[[x, t]]
        };
    }
    Ok(LatentFields { eta_x, omega_x, epsilon_xt, equil_x, log_chat })
}

/// Reverse pass of [`compute_latent`].
///
/// `w[i]` is `∂F/∂log_chat_i` for the scalar `F` being differentiated; the
/// result holds `∂F` for every parameter. `latent` must come from
/// `compute_latent` with the same inputs.
///
/// # Errors
/// - [`ParamError::AlphaLengthMismatch`] for a mismatched `alpha`.
pub fn backpropagate(
    params: &FixedParams, data: &GompertzData, latent: &LatentFields, w: ArrayView1<f64>,
) -> GompertzResult<AdjointPartials> {
    check_alpha(params, data)?;
    let (n_i, n_x, n_t) = (data.n_i(), data.n_x(), data.n_t());
    let rho = params.rho;
    let one_minus_rho = 1.0 - rho;

    let mut lambda = Array1::<f64>::zeros(n_i);
    for i in (0..n_i).rev() {
        let carried = if i + 1 < n_i && data.t_i[i + 1] > 0 { rho * lambda[i + 1] } else { 0.0 };
        lambda[i] = w[i] + carried;
    }

    let mut d_eta = Array1::<f64>::zeros(n_x);
    let mut d_omega_x = Array1::<f64>::zeros(n_x);
    let mut d_epsilon_xt = Array2::<f64>::zeros((n_x, n_t));
    let (mut d_phi, mut d_rho) = (0.0, 0.0);
    for i in 0..n_i {
        let (x, t, l) = (data.x_s[i], data.t_i[i], lambda[i]);
        if t == 0 {
            d_phi += l;
            d_eta[x] += l / one_minus_rho;
            d_omega_x[x] += l / one_minus_rho;
            d_rho += l * (latent.eta_x[x] + latent.omega_x[x]) / (one_minus_rho * one_minus_rho);
        } else {
            if i > 0 {
                d_rho += l * latent.log_chat[i - 1];
            }
            d_eta[x] += l;
            d_omega_x[x] += l;
        }
        d_epsilon_xt[[x, t]] += l;
    }

    let scale_o = (-params.log_tau_o).exp();
    let scale_e = (-params.log_tau_e).exp();
    Ok(AdjointPartials {
        alpha: data.covariates.t().dot(&d_eta),
        phi: d_phi,
        log_tau_e: -(&latent.epsilon_xt * &d_epsilon_xt).sum(),
        log_tau_o: -latent.omega_x.dot(&d_omega_x),
        rho: d_rho,
        epsilon_input: d_epsilon_xt * scale_e,
        omega_input: d_omega_x * scale_o,
    })
}

/// Rows of `∂log_chat/∂u` over the flat random-effect layout.
pub fn latent_jacobian(params: &FixedParams, data: &GompertzData) -> Vec<SparseRow> {
    let (n_x, n_t) = (data.n_x(), data.n_t());
    let scale_e = (-params.log_tau_e).exp();
    let scale_o = (-params.log_tau_o).exp();
    let mut rows: Vec<SparseRow> = Vec::with_capacity(data.n_i());
    for i in 0..data.n_i() {
        let (x, t) = (data.x_s[i], data.t_i[i]);
        let mut row: BTreeMap<usize, f64> = BTreeMap::new();
        let omega_coef = if t == 0 {
            scale_o / (1.0 - params.rho)
        } else {
            if let Some(prev) = rows.last() {
                for &(k, v) in prev {
                    *row.entry(k).or_insert(0.0) += params.rho * v;
                }
            }
            scale_o
        };
        *row.entry(RandomEffects::epsilon_index(x, t, n_x)).or_insert(0.0) += scale_e;
        *row.entry(RandomEffects::omega_index(x, n_x, n_t)).or_insert(0.0) += omega_coef;
        rows.push(row.into_iter().collect());
    }
    rows
}

/// Rows of `∂²log_chat/∂u ∂rho`, given the rows of [`latent_jacobian`] at
/// the same parameters.
///
/// Follows the recursion of the Jacobian itself: a first-year row has only
/// its `Omega` entry, `scale_O/(1 − rho)²`; a later row is
/// `J_{i−1} + rho·∂J_{i−1}/∂rho`.
pub fn latent_jacobian_drho(
    params: &FixedParams, data: &GompertzData, jacobian: &[SparseRow],
) -> Vec<SparseRow> {
    let (n_x, n_t) = (data.n_x(), data.n_t());
    let scale_o = (-params.log_tau_o).exp();
    let one_minus_rho = 1.0 - params.rho;
    let mut rows: Vec<SparseRow> = Vec::with_capacity(data.n_i());
    for i in 0..data.n_i() {
        let (x, t) = (data.x_s[i], data.t_i[i]);
        if t == 0 {
            let omega = RandomEffects::omega_index(x, n_x, n_t);
            rows.push(vec![(omega, scale_o / (one_minus_rho * one_minus_rho))]);
            continue;
        }
        let mut row: BTreeMap<usize, f64> = BTreeMap::new();
        if i > 0 {
            for &(k, v) in &jacobian[i - 1] {
                *row.entry(k).or_insert(0.0) += v;
            }
            for &(k, v) in &rows[i - 1] {
                *row.entry(k).or_insert(0.0) += params.rho * v;
            }
        }
        rows.push(row.into_iter().collect());
    }
    rows
}
