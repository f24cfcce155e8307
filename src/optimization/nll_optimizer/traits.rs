//! Public surface for negative log-likelihood minimization.
//!
//! - [`NegLogLikelihood`]: trait a model implements to be fitted.
//! - [`MLEOptions`] and [`Tolerances`]: optimizer configuration.
//! - [`LineSearcher`]: line search used inside L-BFGS.
//! - [`OptimOutcome`]: normalized result of [`minimize`](super::minimize).
//!
//! Convention: models return the negative log-likelihood `J(θ)` directly and
//! the optimizer minimizes it as-is. Analytic gradients, when provided, are
//! `∇J(θ)`.
use crate::optimization::{
    errors::{OptError, OptResult},
    nll_optimizer::{
        types::{Cost, FnEvalMap, Grad, Theta},
        validation::{validate_theta_hat, validate_value, verify_tol_cost, verify_tol_grad},
    },
};
use argmin::core::TerminationStatus;
use argmin_math::ArgminL2Norm;
use std::str::FromStr;

/// Model-side objective interface.
///
/// - `type Data`: observations carried into `value`/`grad`/`check`.
///
/// Required:
/// - `value(&Theta, &Data) -> OptResult<Cost>`: evaluate `J(θ)`.
/// - `check(&Theta, &Data) -> OptResult<()>`: reject malformed `θ`/data
///   pairs once, before the solver starts.
///
/// Optional:
/// - `grad(&Theta, &Data) -> OptResult<Grad>`: analytic `∇J(θ)`. The default
///   returns [`OptError::GradientNotImplemented`], which switches the adapter
///   to finite differences.
pub trait NegLogLikelihood {
    type Data: 'static;

    // Required methods
    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost>;
    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()>;

    // Optional methods
    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> OptResult<Grad> {
        Err(OptError::GradientNotImplemented)
    }
}

/// Line search used inside the L-BFGS solver.
///
/// Parses case-insensitively from `"MoreThuente"` or `"HagerZhang"`; any
/// other name is an [`OptError::InvalidLineSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morethuente" => Ok(LineSearcher::MoreThuente),
            "hagerzhang" => Ok(LineSearcher::HagerZhang),
            _ => Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'MoreThuente' or 'HagerZhang'.",
            }),
        }
    }
}

/// Outer optimizer configuration.
///
/// Fields:
/// - `tols`: stopping rules, see [`Tolerances`].
/// - `line_searcher`: line search used by L-BFGS.
/// - `verbose`: attach argmin's slog observer (only with the `obs_slog`
///   feature).
/// - `lbfgs_mem`: L-BFGS history size; `None` uses
///   [`DEFAULT_LBFGS_MEM`](super::types::DEFAULT_LBFGS_MEM).
///
/// Default: `tol_grad = 1e-5`, `tol_cost = None`, `max_iter = 200`,
/// More–Thuente, not verbose, default memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MLEOptions {
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
}

impl MLEOptions {
    /// Build options; `verbose` starts off and can be flipped on the field.
    ///
    /// # Errors
    /// - [`OptError::InvalidLBFGSMem`] if `lbfgs_mem == Some(0)`.
    pub fn new(
        tols: Tolerances, line_searcher: LineSearcher, lbfgs_mem: Option<usize>,
    ) -> OptResult<Self> {
        if let Some(m) = lbfgs_mem {
            if m == 0 {
                return Err(OptError::InvalidLBFGSMem {
                    mem: m,
                    reason: "L-BFGS memory must be greater than zero.",
                });
            }
        }
        Ok(Self { tols, line_searcher, verbose: false, lbfgs_mem })
    }
}

impl Default for MLEOptions {
    fn default() -> Self {
        Self {
            tols: Tolerances { tol_grad: Some(1e-5), tol_cost: None, max_iter: Some(200) },
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
        }
    }
}

/// Stopping rules for the outer optimizer.
///
/// - `tol_grad`: stop when the gradient norm falls below this threshold.
/// - `tol_cost`: stop when the change in cost falls below this threshold.
/// - `max_iter`: hard cap on iterations.
///
/// At least one must be provided (see [`Tolerances::new`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// Construct validated tolerances.
    ///
    /// # Rules
    /// - At least one of `tol_grad`, `tol_cost`, `max_iter` must be `Some`.
    /// - Tolerances, when present, are finite and strictly positive.
    /// - `max_iter`, when present, is `> 0`.
    ///
    /// # Errors
    /// - [`OptError::NoTolerancesProvided`] if all three are `None`.
    /// - [`OptError::InvalidTolGrad`] / [`OptError::InvalidTolCost`] for bad tolerances.
    /// - [`OptError::InvalidMaxIter`] if `max_iter == Some(0)`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(OptError::NoTolerancesProvided);
        }
        verify_tol_cost(tol_cost)?;
        verify_tol_grad(tol_grad)?;
        if let Some(max_iter) = max_iter {
            if max_iter == 0 {
                return Err(OptError::InvalidMaxIter {
                    max_iter,
                    reason: "Maximum iterations must be greater than zero.",
                });
            }
        }
        Ok(Self { tol_grad, tol_cost, max_iter })
    }
}

/// Result returned by [`minimize`](super::minimize).
///
/// - `theta_hat`: best optimizer-space parameters found.
/// - `value`: negative log-likelihood at `theta_hat`.
/// - `converged`: `true` when argmin reported any terminating status.
/// - `status`: termination status as text.
/// - `iterations`: outer iterations performed.
/// - `fn_evals`: argmin's evaluation counters.
/// - `grad_norm`: norm of the last gradient, when available.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl OptimOutcome {
    /// Build a validated outcome from raw solver state.
    ///
    /// # Errors
    /// - [`OptError::MissingThetaHat`] / [`OptError::InvalidThetaHat`] for a
    ///   missing or non-finite best parameter.
    /// - [`OptError::NonFiniteCost`] for a non-finite best value.
    pub fn new(
        theta_hat_opt: Option<Theta>, value: f64, termination: TerminationStatus,
        iterations: u64, fn_evals: FnEvalMap, grad: Option<Grad>,
    ) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(theta_hat_opt)?;
        validate_value(value)?;
        let (converged, status) = match termination {
            TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
            other => (true, format!("{other:?}")),
        };
        let grad_norm = grad.map(|g| g.l2_norm());
        Ok(Self {
            theta_hat,
            value,
            converged,
            status,
            iterations: iterations as usize,
            fn_evals,
            grad_norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argmin::core::TerminationReason;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Tolerance validation rules and the MLEOptions memory guard.
    // - Case-insensitive parsing of line-search names.
    // - Termination-status mapping in OptimOutcome::new.
    //
    // They intentionally DO NOT cover:
    // - Running a solver (see api.rs and the integration tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Tolerances::new refuses an all-None configuration and bad values.
    //
    // Given
    // -----
    // - (None, None, None), a negative tol_grad, and max_iter = 0.
    //
    // Expect
    // ------
    // - NoTolerancesProvided, InvalidTolGrad and InvalidMaxIter respectively.
    fn tolerances_new_rejects_invalid_configurations() {
        // Arrange / Act
        let none = Tolerances::new(None, None, None);
        let neg = Tolerances::new(Some(-1.0), None, None);
        let zero_iter = Tolerances::new(None, None, Some(0));

        // Assert
        assert_eq!(none, Err(OptError::NoTolerancesProvided));
        assert!(matches!(neg, Err(OptError::InvalidTolGrad { .. })));
        assert!(matches!(zero_iter, Err(OptError::InvalidMaxIter { .. })));
    }

    #[test]
    // Purpose
    // -------
    // MLEOptions::new rejects a zero L-BFGS memory and leaves verbose off.
    //
    // Given
    // -----
    // - Valid tolerances with lbfgs_mem = Some(0) and Some(5).
    //
    // Expect
    // ------
    // - Some(0) fails with InvalidLBFGSMem; Some(5) succeeds with verbose = false.
    fn mle_options_new_validates_memory() {
        // Arrange
        let tols = Tolerances::new(Some(1e-6), None, Some(10)).expect("valid tolerances");

        // Act
        let bad = MLEOptions::new(tols, LineSearcher::MoreThuente, Some(0));
        let good = MLEOptions::new(tols, LineSearcher::HagerZhang, Some(5))
            .expect("memory 5 should be accepted");

        // Assert
        assert!(matches!(bad, Err(OptError::InvalidLBFGSMem { mem: 0, .. })));
        assert!(!good.verbose);
        assert_eq!(good.lbfgs_mem, Some(5));
    }

    #[test]
    // Purpose
    // -------
    // LineSearcher parsing is case-insensitive and rejects unknown names.
    //
    // Given
    // -----
    // - "morethuente", "HAGERZHANG" and "backtracking".
    //
    // Expect
    // ------
    // - The first two parse; the last returns InvalidLineSearch.
    fn line_searcher_from_str_is_case_insensitive() {
        // Act / Assert
        assert_eq!("morethuente".parse::<LineSearcher>(), Ok(LineSearcher::MoreThuente));
        assert_eq!("HAGERZHANG".parse::<LineSearcher>(), Ok(LineSearcher::HagerZhang));
        assert!(matches!(
            "backtracking".parse::<LineSearcher>(),
            Err(OptError::InvalidLineSearch { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // OptimOutcome::new maps termination status and computes the gradient norm.
    //
    // Given
    // -----
    // - A finite theta_hat, value 1.5, a MaxItersReached status and grad [3, 4].
    //
    // Expect
    // ------
    // - converged = true, grad_norm = 5, iterations copied over.
    fn optim_outcome_new_maps_status_and_norm() {
        // Arrange
        let status = TerminationStatus::Terminated(TerminationReason::MaxItersReached);

        // Act
        let out = OptimOutcome::new(
            Some(array![0.1, 0.2]),
            1.5,
            status,
            12,
            FnEvalMap::new(),
            Some(array![3.0, 4.0]),
        )
        .expect("outcome should validate");

        // Assert
        assert!(out.converged);
        assert_eq!(out.iterations, 12);
        assert!((out.grad_norm.expect("norm present") - 5.0).abs() < 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // OptimOutcome::new refuses a missing parameter vector.
    //
    // Given
    // -----
    // - theta_hat = None.
    //
    // Expect
    // ------
    // - Err(MissingThetaHat).
    fn optim_outcome_new_requires_theta_hat() {
        // Act
        let out = OptimOutcome::new(
            None,
            0.0,
            TerminationStatus::NotTerminated,
            0,
            FnEvalMap::new(),
            None,
        );

        // Assert
        assert_eq!(out, Err(OptError::MissingThetaHat));
    }
}
