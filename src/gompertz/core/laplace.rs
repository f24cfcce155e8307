//! Laplace approximation of the marginal NLL over the random effects.
//!
//! Purpose
//! -------
//! Integrate `Epsilon_input` and `Omega_input` out of the joint NLL:
//! `L(θ) = J(û) + ½ log|H(û)| − (n_u/2) ln 2π`, where `û` minimizes the
//! joint NLL `J(θ, ·)` and `H` is its Hessian in the random effects.
//!
//! Key behaviors
//! -------------
//! - [`find_mode`] runs a damped Newton iteration from a caller-supplied
//!   start (or zeros). Each step is halved until the joint NLL does not
//!   increase. A Hessian that fails to factor is shifted by `λI`, with `λ`
//!   growing tenfold per failure.
//! - [`laplace_nll`] returns only `L(θ)`.
//!
//! Invariants & assumptions
//! ------------------------
//! - A non-PD `Q` short-circuits to `L = +∞` without iterating.
//! - A Hessian that is not PD at the returned mode gives `L = NaN`; the
//!   fitting layer maps non-finite values to a finite penalty.
//! - Non-convergence is reported through [`LaplaceMode::converged`], not as
//!   an error.
use ndarray::{Array1, ArrayView1};
use statrs::consts::LN_SQRT_2PI;

use crate::gompertz::{
    core::{
        data::GompertzData,
        gmrf::SparseCholesky,
        likelihood::{
            JointEvaluation, LikelihoodContext, evaluate_joint, random_gradient_at,
            random_hessian_at,
        },
        params::{FixedParams, RandomEffects},
    },
    errors::{GompertzError, GompertzResult},
};

/// Maximum number of Levenberg shifts tried per Newton step.
const MAX_SHIFTS: usize = 20;
/// Initial Levenberg shift.
const INITIAL_SHIFT: f64 = 1e-6;
/// Relative slack when accepting a step.
const ACCEPT_TOL: f64 = 1e-12;

/// Inner Newton configuration.
///
/// - `max_iter`: Newton steps before giving up (> 0).
/// - `tol_grad`: convergence threshold on `max |∂J/∂u|` (finite, > 0).
/// - `max_halvings`: step halvings per iteration (> 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InnerOptions {
    pub max_iter: usize,
    pub tol_grad: f64,
    pub max_halvings: usize,
}

impl InnerOptions {
    /// # Errors
    /// - [`GompertzError::InvalidInnerOptions`] for a zero count or a
    ///   non-positive / non-finite tolerance.
    pub fn new(max_iter: usize, tol_grad: f64, max_halvings: usize) -> GompertzResult<Self> {
        if max_iter == 0 {
            return Err(GompertzError::InvalidInnerOptions { reason: "max_iter must be > 0" });
        }
        if !tol_grad.is_finite() || tol_grad <= 0.0 {
            return Err(GompertzError::InvalidInnerOptions {
                reason: "tol_grad must be finite and > 0",
            });
        }
        if max_halvings == 0 {
            return Err(GompertzError::InvalidInnerOptions {
                reason: "max_halvings must be > 0",
            });
        }
        Ok(Self { max_iter, tol_grad, max_halvings })
    }
}

impl Default for InnerOptions {
    fn default() -> Self {
        Self { max_iter: 100, tol_grad: 1e-9, max_halvings: 30 }
    }
}

/// Outcome of the inner optimization.
///
/// - `nll`: Laplace marginal `L(θ)`.
/// - `jnll`: joint NLL at the mode.
/// - `log_det_hessian`: `log|H(û)|` (`NaN` if `H` is not PD).
/// - `mode`: `û` in the flat random layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LaplaceMode {
    pub nll: f64,
    pub jnll: f64,
    pub log_det_hessian: f64,
    pub mode: Array1<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub grad_max: f64,
}

/// Locate the mode of the joint NLL in the random effects and evaluate the
/// Laplace marginal there.
///
/// # Errors
/// - [`ParamError::RandomLengthMismatch`](crate::gompertz::errors::ParamError)
///   when `start` has the wrong length, and the dimension errors of
///   [`evaluate_joint`].
pub fn find_mode(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, data: &GompertzData,
    start: Option<ArrayView1<f64>>, opts: &InnerOptions,
) -> GompertzResult<LaplaceMode> {
    let (n_x, n_t) = (data.n_x(), data.n_t());
    let n_u = RandomEffects::n_random(n_x, n_t);
    let mut u = match start {
        Some(s) => RandomEffects::from_flat(s, n_x, n_t)?,
        None => RandomEffects::zeros(n_x, n_t),
    };

    let mut eval = evaluate_joint(ctx, params, &u, data)?;
    if !eval.gmrf.is_proper() {
        return Ok(LaplaceMode {
            nll: f64::INFINITY,
            jnll: eval.jnll,
            log_det_hessian: f64::NAN,
            mode: u.to_flat(),
            iterations: 0,
            converged: false,
            grad_max: f64::NAN,
        });
    }

    let mut grad = random_gradient_at(&eval, params, &u, data)?;
    let mut grad_max = max_abs(&grad);
    let mut iterations = 0;
    let mut converged = grad_max < opts.tol_grad;

    while !converged && iterations < opts.max_iter {
        let Some(step) = newton_direction(&eval, params, data, &grad) else {
            log::debug!("inner Newton: Hessian could not be factored after {MAX_SHIFTS} shifts");
            break;
        };
        let Some((next_u, next_eval)) = line_search(ctx, params, data, &u, eval.jnll, &step, opts)?
        else {
            log::debug!("inner Newton: no decrease after {} halvings", opts.max_halvings);
            break;
        };
        u = next_u;
        eval = next_eval;
        grad = random_gradient_at(&eval, params, &u, data)?;
        grad_max = max_abs(&grad);
        iterations += 1;
        converged = grad_max < opts.tol_grad;
        log::debug!("inner Newton iteration {iterations}: jnll = {}, max |grad| = {grad_max:e}", eval.jnll);
    }
    if !converged {
        log::warn!(
            "inner Newton stopped after {iterations} iterations with max |grad| = {grad_max:e}"
        );
    }

    let hessian = random_hessian_at(&eval, params, data, 0.0);
    let log_det_hessian = SparseCholesky::factor(&hessian).map_or_else(
        || {
            log::warn!("random-effect Hessian is not positive definite at the mode");
            f64::NAN
        },
        |f| f.log_det(),
    );
    let nll = eval.jnll + 0.5 * log_det_hessian - n_u as f64 * LN_SQRT_2PI;

    Ok(LaplaceMode {
        nll,
        jnll: eval.jnll,
        log_det_hessian,
        mode: u.to_flat(),
        iterations,
        converged,
        grad_max,
    })
}

/// Laplace marginal NLL `L(θ)`.
///
/// # Errors
/// - As [`find_mode`].
pub fn laplace_nll(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, data: &GompertzData,
    start: Option<ArrayView1<f64>>, opts: &InnerOptions,
) -> GompertzResult<f64> {
    Ok(find_mode(ctx, params, data, start, opts)?.nll)
}

// ---- Helper methods ----

/// `max |v_k|`, or `NaN` if any entry is `NaN`.
fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| {
        if acc.is_nan() || x.is_nan() { f64::NAN } else { acc.max(x.abs()) }
    })
}

/// `−H⁻¹ g`, shifting `H` by `λI` until it factors.
fn newton_direction(
    eval: &JointEvaluation, params: &FixedParams,
    data: &GompertzData, grad: &Array1<f64>,
) -> Option<Array1<f64>> {
    let mut shift = 0.0;
    for _ in 0..=MAX_SHIFTS {
        let hessian = random_hessian_at(eval, params, data, shift);
        if let Some(factor) = SparseCholesky::factor(&hessian) {
            return Some(-factor.solve_vec(grad.view()));
        }
        shift = if shift == 0.0 { INITIAL_SHIFT } else { shift * 10.0 };
    }
    None
}

type Accepted = (RandomEffects, JointEvaluation);

fn line_search(
    ctx: &LikelihoodContext<'_>, params: &FixedParams, data: &GompertzData, u: &RandomEffects,
    current: f64, step: &Array1<f64>, opts: &InnerOptions,
) -> GompertzResult<Option<Accepted>> {
    let (n_x, n_t) = (data.n_x(), data.n_t());
    let base = u.to_flat();
    let slack = ACCEPT_TOL * (1.0 + current.abs());
    let mut scale = 1.0;
    for _ in 0..opts.max_halvings {
        let trial = &base + &(step * scale);
        if trial.iter().all(|v| v.is_finite()) {
            let candidate = RandomEffects::from_flat(trial.view(), n_x, n_t)?;
            let eval = evaluate_joint(ctx, params, &candidate, data)?;
            if eval.jnll.is_finite() && eval.jnll <= current + slack {
                return Ok(Some((candidate, eval)));
            }
        }
        scale *= 0.5;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gompertz::core::{
        mesh::{SpdeMesh, tests::path_mesh},
        observation::ObservationModel,
        recursion::tests::{single_site_data, small_data, small_params},
    };
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The closed-form marginal with no observations.
    // - Stationarity of the returned mode and warm-start consistency.
    // - Non-PD precision and option validation.
    //
    // They intentionally DO NOT cover:
    // - Gradients of L(θ) with respect to θ (marginal_gradient.rs).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // A NaN gradient entry is never reported as converged.
    //
    // Given
    // -----
    // - [0.5, NaN, −2] and [NaN, 1] (f64::max would drop the NaN).
    //
    // Expect
    // ------
    // - max_abs is NaN for both, so `grad_max < tol` is false; a finite
    //   vector still gives its largest magnitude.
    fn max_abs_propagates_nan() {
        assert!(max_abs(&array![0.5, f64::NAN, -2.0]).is_nan());
        assert!(max_abs(&array![f64::NAN, 1.0]).is_nan());
        assert_eq!(max_abs(&array![0.5, -2.0, 1.0]), 2.0);
    }

    #[test]
    // Purpose
    // -------
    // With every count missing, the random effects are pure GMRF draws and
    // the Laplace marginal integrates to exactly zero.
    //
    // Given
    // -----
    // - One vertex, three years, all counts missing.
    //
    // Expect
    // ------
    // - Mode at zero, L = 0 up to rounding, converged.
    fn no_observations_integrates_to_zero() {
        // Arrange
        let mesh = path_mesh(1);
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::Poisson);
        let data = single_site_data(vec![None; 3]);
        let params =
            FixedParams::new(array![0.7], 0.2, -0.3, 0.4, 0.1, 0.5, [0.0, 0.0]).expect("finite");

        // Act
        let mode = find_mode(&ctx, &params, &data, None, &InnerOptions::default()).expect("valid");

        // Assert
        assert!(mode.converged);
        assert!(mode.mode.iter().all(|v| v.abs() < 1e-12));
        assert_relative_eq!(mode.nll, 0.0, epsilon = 1e-10);
    }

    #[test]
    // Purpose
    // -------
    // The returned mode is stationary and the marginal is assembled from
    // its parts.
    //
    // Given
    // -----
    // - The 3 × 3 fixture under both observation models.
    //
    // Expect
    // ------
    // - converged; max |∂J/∂u| below tolerance;
    //   nll = jnll + ½ log|H| − n_u ln √(2π).
    fn mode_is_stationary() {
        let mesh = path_mesh(3);
        let (params, data) = (small_params(), small_data());
        for model in [ObservationModel::Poisson, ObservationModel::PoissonLognormal] {
            // Arrange
            let ctx = LikelihoodContext::new(&mesh, model);
            let opts = InnerOptions::default();

            // Act
            let mode = find_mode(&ctx, &params, &data, None, &opts).expect("valid");

            // Assert
            assert!(mode.converged, "{model:?} did not converge");
            let u = RandomEffects::from_flat(mode.mode.view(), 3, 3).expect("finite");
            let eval = evaluate_joint(&ctx, &params, &u, &data).expect("valid");
            let grad = random_gradient_at(&eval, &params, &u, &data).expect("valid");
            assert!(max_abs(&grad) < 1e-8);
            assert_relative_eq!(
                mode.nll,
                mode.jnll + 0.5 * mode.log_det_hessian - 12.0 * LN_SQRT_2PI,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    // Purpose
    // -------
    // Starting at the mode returns the same marginal without further work.
    //
    // Given
    // -----
    // - A cold solve, then a warm solve seeded with its mode.
    //
    // Expect
    // ------
    // - Equal nll to 1e-10; the warm solve takes at most one iteration.
    fn warm_start_reproduces_marginal() {
        // Arrange
        let mesh = path_mesh(3);
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::Poisson);
        let (params, data) = (small_params(), small_data());
        let opts = InnerOptions::default();
        let cold = find_mode(&ctx, &params, &data, None, &opts).expect("valid");

        // Act
        let warm = find_mode(&ctx, &params, &data, Some(cold.mode.view()), &opts).expect("valid");

        // Assert
        assert_relative_eq!(warm.nll, cold.nll, epsilon = 1e-10);
        assert!(warm.iterations <= 1);
        assert_eq!(laplace_nll(&ctx, &params, &data, None, &opts).expect("valid"), cold.nll);
    }

    #[test]
    // Purpose
    // -------
    // A non-PD precision short-circuits to an infinite marginal.
    //
    // Given
    // -----
    // - Q = −1 on a single vertex.
    //
    // Expect
    // ------
    // - nll = +∞, zero iterations, not converged.
    fn non_pd_precision_is_infinite() {
        // Arrange
        let mesh = SpdeMesh::from_triplets(1, &[(0, 0, 1.0)], &[], &[(0, 0, -2.0)])
            .expect("valid structure");
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::Poisson);
        let data = single_site_data(vec![Some(1.0); 3]);
        let params =
            FixedParams::new(array![1.0], 0.0, 0.0, 0.0, 0.0, 0.5, [0.0, 0.0]).expect("finite");

        // Act
        let mode = find_mode(&ctx, &params, &data, None, &InnerOptions::default()).expect("valid");

        // Assert
        assert_eq!(mode.nll, f64::INFINITY);
        assert_eq!(mode.iterations, 0);
        assert!(!mode.converged);
    }

    #[test]
    // Purpose
    // -------
    // Option validation and start-length checks.
    //
    // Given
    // -----
    // - Zero counts, a negative tolerance, and a start vector of length 2.
    //
    // Expect
    // ------
    // - InvalidInnerOptions for the options; InvalidParams for the start.
    fn invalid_inputs_are_rejected() {
        assert!(matches!(
            InnerOptions::new(0, 1e-9, 30),
            Err(GompertzError::InvalidInnerOptions { .. })
        ));
        assert!(matches!(
            InnerOptions::new(10, -1.0, 30),
            Err(GompertzError::InvalidInnerOptions { .. })
        ));
        assert!(matches!(
            InnerOptions::new(10, 1e-9, 0),
            Err(GompertzError::InvalidInnerOptions { .. })
        ));

        let mesh = path_mesh(3);
        let ctx = LikelihoodContext::new(&mesh, ObservationModel::Poisson);
        let start = array![0.0, 0.0];
        let err = find_mode(
            &ctx,
            &small_params(),
            &small_data(),
            Some(start.view()),
            &InnerOptions::default(),
        )
        .expect_err("bad start");
        assert!(matches!(err, GompertzError::InvalidParams(_)));
    }
}
