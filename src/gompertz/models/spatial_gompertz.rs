//! Spatial Gompertz model: evaluation, reporting, Laplace marginal and fit.
//!
//! This module wires the core numerics to the `NegLogLikelihood` trait.
//! The outer objective is the Laplace marginal NLL of the fixed parameters
//! in unconstrained optimizer space:
//! - `rho = (1 − 1e-6)·tanh(rho_raw)`;
//! - `theta_z` is dropped under the Poisson model and held at the value
//!   supplied to `fit`.
//!
//! Each outer evaluation warm-starts the inner Newton solve from the last
//! mode stored in [`GompertzScratch`]. Non-finite marginals (non-PD `Q` or
//! Hessian) are returned to the optimizer as
//! [`NON_FINITE_COST_PENALTY`] so the line search backs off; the gradient
//! there is zero. Elsewhere the gradient is the exact implicit-function
//! gradient of [`laplace_gradient`], chained through the `rho` transform.
//!
//! Standard errors difference the marginal directly: every stencil point
//! restarts the inner solve from the fitted mode, and a non-finite value is
//! an error rather than a penalty.
use nalgebra_sparse::CscMatrix;
use ndarray::{Array1, ArrayView1, s};

use crate::{
    gompertz::{
        core::{
            data::GompertzData,
            laplace::{LaplaceMode, find_mode},
            likelihood::{
                JointGradient, LikelihoodContext, evaluate_joint, joint_gradient, random_hessian,
            },
            marginal_gradient::laplace_gradient,
            mesh::SpdeMesh,
            options::GompertzOptions,
            params::{FixedParams, RandomEffects},
            report::GompertzReport,
            workspace::GompertzScratch,
        },
        errors::{GompertzError, GompertzResult, ParamError},
    },
    inference::{
        errors::{InferenceError, InferenceResult},
        hessian::calc_covariance,
        sdreport::SdReport,
    },
    optimization::{
        errors::{OptError, OptResult},
        nll_optimizer::{
            Cost, Grad, NegLogLikelihood, OptimOutcome, Theta, finite_diff::COST_HESSIAN_STEP,
            minimize,
        },
        numerical_stability::transformations::NON_FINITE_COST_PENALTY,
    },
};

/// Spatial Gompertz model over a fixed SPDE mesh.
///
/// Holds the mesh, run-time options and warm-start scratch. After
/// [`fit`](Self::fit), `results`, `fitted_params`, `fitted_mode` and
/// `fitted_report` are populated.
///
/// # Notes
/// - The scratch uses interior mutability, so one instance must not be
///   shared across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGompertz {
    pub mesh: SpdeMesh,
    pub options: GompertzOptions,
    pub scratch: GompertzScratch,
    /// Outer optimizer outcome (optimizer space).
    pub results: Option<OptimOutcome>,
    /// Fitted fixed parameters (natural space).
    pub fitted_params: Option<FixedParams>,
    /// Laplace mode at the fitted parameters.
    pub fitted_mode: Option<LaplaceMode>,
    /// Report at the fitted parameters and mode.
    pub fitted_report: Option<GompertzReport>,
}

impl SpatialGompertz {
    pub fn new(mesh: SpdeMesh, options: GompertzOptions) -> Self {
        Self {
            mesh,
            options,
            scratch: GompertzScratch::new(),
            results: None,
            fitted_params: None,
            fitted_mode: None,
            fitted_report: None,
        }
    }

    pub fn context(&self) -> LikelihoodContext<'_> {
        LikelihoodContext::new(&self.mesh, self.options.observation)
    }

    /// Joint NLL and its gradient with respect to every fixed parameter and
    /// random effect.
    ///
    /// # Errors
    /// - Dimension and mesh/data mismatches as [`GompertzError`].
    pub fn evaluate(
        &self, params: &FixedParams, random: &RandomEffects, data: &GompertzData,
    ) -> GompertzResult<(f64, JointGradient)> {
        let (eval, grad) = joint_gradient(&self.context(), params, random, data)?;
        Ok((eval.jnll, grad))
    }

    /// [`evaluate`](Self::evaluate) on the flat layouts.
    ///
    /// # Errors
    /// - [`ParamError`] length/finiteness failures, then as `evaluate`.
    pub fn evaluate_flat(
        &self, theta: ArrayView1<f64>, random_flat: ArrayView1<f64>, data: &GompertzData,
    ) -> GompertzResult<(f64, JointGradient)> {
        let params = FixedParams::from_theta(theta, data.n_p())?;
        let random = RandomEffects::from_flat(random_flat, data.n_x(), data.n_t())?;
        self.evaluate(&params, &random, data)
    }

    /// Named report of the joint evaluation.
    ///
    /// # Errors
    /// - As [`evaluate`](Self::evaluate).
    pub fn report(
        &self, params: &FixedParams, random: &RandomEffects, data: &GompertzData,
    ) -> GompertzResult<GompertzReport> {
        let eval = evaluate_joint(&self.context(), params, random, data)?;
        Ok(GompertzReport::new(&eval, params, data))
    }

    /// Hessian of the joint NLL in the random effects.
    ///
    /// # Errors
    /// - As [`evaluate`](Self::evaluate).
    pub fn random_hessian(
        &self, params: &FixedParams, random: &RandomEffects, data: &GompertzData,
    ) -> GompertzResult<CscMatrix<f64>> {
        random_hessian(&self.context(), params, random, data)
    }

    /// Laplace marginal at `params`, warm-started from the last mode.
    ///
    /// # Errors
    /// - As [`find_mode`].
    pub fn laplace(&self, params: &FixedParams, data: &GompertzData) -> GompertzResult<LaplaceMode> {
        let n_u = RandomEffects::n_random(data.n_x(), data.n_t());
        let start = self.scratch.warm_start(n_u);
        let mode = find_mode(
            &self.context(),
            params,
            data,
            start.as_ref().map(|s| s.view()),
            &self.options.inner,
        )?;
        if mode.nll.is_finite() {
            self.scratch.store_mode(mode.mode.view());
        }
        Ok(mode)
    }

    /// Fit the fixed parameters by minimizing the Laplace marginal NLL.
    ///
    /// ## Steps
    /// 1. Hold `theta0.theta_z` for models that ignore it and clear the
    ///    warm start.
    /// 2. Map `theta0` to optimizer space and run L-BFGS per
    ///    `options.mle_opts`.
    /// 3. Map `theta_hat` back, recompute the mode there, and cache the
    ///    outcome, parameters, mode and report.
    ///
    /// # Errors
    /// - [`ParamError::AlphaLengthMismatch`] (as `OptError`) if `theta0` has
    ///   the wrong number of covariates.
    /// - Optimizer and model errors from the run.
    pub fn fit(&mut self, theta0: FixedParams, data: &GompertzData) -> OptResult<()> {
        let n_p = data.n_p();
        if theta0.n_p() != n_p {
            return Err(ParamError::AlphaLengthMismatch { expected: n_p, actual: theta0.n_p() }
                .into());
        }
        let model = self.options.observation;
        self.scratch.set_held_theta_z(theta0.theta_z);
        self.scratch.clear_mode();
        let opt0 = theta0.to_optimizer(model);
        log::debug!(
            "fitting spatial Gompertz ({model:?}): {} fixed, {} random",
            opt0.len(),
            RandomEffects::n_random(data.n_x(), data.n_t())
        );

        let outcome = minimize(&*self, opt0, data, &self.options.mle_opts)?;
        log::debug!(
            "fit finished: status = {}, value = {}, iterations = {}",
            outcome.status,
            outcome.value,
            outcome.iterations
        );

        let fitted = FixedParams::from_optimizer(
            outcome.theta_hat.view(),
            n_p,
            model,
            self.scratch.held_theta_z(),
        )?;
        let mode = self.laplace(&fitted, data)?;
        let random = RandomEffects::from_flat(mode.mode.view(), data.n_x(), data.n_t())?;
        let report = self.report(&fitted, &random, data)?;

        self.results = Some(outcome);
        self.fitted_params = Some(fitted);
        self.fitted_mode = Some(mode);
        self.fitted_report = Some(report);
        Ok(())
    }

    /// Standard errors at the fitted optimum.
    ///
    /// The optimizer-space covariance is the pseudoinverse of the
    /// finite-difference Hessian of the marginal NLL (step
    /// [`COST_HESSIAN_STEP`]). Each stencil point starts its inner solve
    /// from the fitted mode, and the warm start is left there afterwards.
    ///
    /// # Errors
    /// - [`InferenceError::ModelNotFitted`] before `fit`.
    /// - [`InferenceError::Hessian`] if the Hessian cannot be formed,
    ///   including [`OptError::NonFiniteCost`] when a stencil point has no
    ///   finite marginal.
    pub fn sd_report(&self, data: &GompertzData) -> InferenceResult<SdReport> {
        let (Some(outcome), Some(params), Some(fitted_mode)) =
            (&self.results, &self.fitted_params, &self.fitted_mode)
        else {
            return Err(InferenceError::ModelNotFitted);
        };
        let objective = |theta: &Theta| -> OptResult<f64> {
            self.scratch.store_mode(fitted_mode.mode.view());
            let (_, mode) = self.marginal_at(theta, data)?;
            let nll = mode.nll;
            if nll.is_finite() {
                Ok(nll)
            } else {
                log::warn!("non-finite Laplace marginal at stencil point {theta}");
                Err(OptError::NonFiniteCost { value: nll })
            }
        };
        let cov = calc_covariance(&objective, &outcome.theta_hat, COST_HESSIAN_STEP);
        self.scratch.store_mode(fitted_mode.mode.view());
        SdReport::new(outcome.theta_hat.view(), &cov?, params, self.options.observation)
    }

    pub fn fitted_params(&self) -> GompertzResult<&FixedParams> {
        self.fitted_params.as_ref().ok_or(GompertzError::ModelNotFitted)
    }

    pub fn fitted_report(&self) -> GompertzResult<&GompertzReport> {
        self.fitted_report.as_ref().ok_or(GompertzError::ModelNotFitted)
    }
}

impl SpatialGompertz {
    /// Decode optimizer-space `theta` and solve the inner problem there.
    fn marginal_at(
        &self, theta: &Theta, data: &GompertzData,
    ) -> OptResult<(FixedParams, LaplaceMode)> {
        let params = FixedParams::from_optimizer(
            theta.view(),
            data.n_p(),
            self.options.observation,
            self.scratch.held_theta_z(),
        )?;
        let mode = self.laplace(&params, data)?;
        Ok((params, mode))
    }
}

impl NegLogLikelihood for SpatialGompertz {
    type Data = GompertzData;

    /// Laplace marginal NLL at optimizer-space `theta`; non-finite values
    /// become [`NON_FINITE_COST_PENALTY`].
    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost> {
        let (_, mode) = self.marginal_at(theta, data)?;
        if mode.nll.is_finite() {
            Ok(mode.nll)
        } else {
            log::debug!("non-finite Laplace marginal at {theta}; returning penalty");
            Ok(NON_FINITE_COST_PENALTY)
        }
    }

    /// Mesh/data agreement and the optimizer-space length and finiteness.
    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()> {
        self.context().check_data(data)?;
        FixedParams::from_optimizer(
            theta.view(),
            data.n_p(),
            self.options.observation,
            self.scratch.held_theta_z(),
        )?;
        Ok(())
    }

    /// Exact gradient of the marginal in optimizer space.
    ///
    /// The natural-space gradient is truncated to the optimizer layout
    /// (dropping `theta_z` when the model ignores it) and scaled by
    /// `∂rho/∂rho_raw`. Where the marginal is non-finite the gradient of the
    /// constant penalty, zero, is returned.
    fn grad(&self, theta: &Theta, data: &Self::Data) -> OptResult<Grad> {
        let (params, mode) = self.marginal_at(theta, data)?;
        let natural = laplace_gradient(&self.context(), &params, data, &mode)?;
        if !natural.iter().all(|g| g.is_finite()) {
            log::debug!("non-finite Laplace gradient at {theta}; returning zeros");
            return Ok(Array1::zeros(theta.len()));
        }
        let jacobian = FixedParams::optimizer_jacobian_diag(theta.view(), data.n_p());
        Ok(natural.slice(s![..theta.len()]).to_owned() * &jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gompertz::core::{
            laplace::InnerOptions,
            mesh::tests::path_mesh,
            observation::ObservationModel,
            recursion::tests::{single_site_data, small_data, small_params, small_random},
        },
        optimization::{
            errors::OptError,
            nll_optimizer::{LineSearcher, MLEOptions, Tolerances},
        },
    };
    use approx::assert_relative_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - `evaluate` / `evaluate_flat` agreement and `report` wiring.
    // - NegLogLikelihood conformance (`value`, `check`, `grad`).
    // - A short fit, the not-fitted paths, and sd_report at a point whose
    //   stencil leaves the proper region.
    //
    // They intentionally DO NOT cover:
    // - Joint-likelihood derivatives and Laplace internals (core tests).
    // -------------------------------------------------------------------------

    fn model(observation: ObservationModel, max_iter: usize) -> SpatialGompertz {
        let tols = Tolerances::new(Some(1e-6), None, Some(max_iter)).expect("valid tolerances");
        let mle = MLEOptions::new(tols, LineSearcher::MoreThuente, None).expect("valid options");
        let options = GompertzOptions::new(observation, mle, Default::default());
        SpatialGompertz::new(path_mesh(3), options)
    }

    #[test]
    // Purpose
    // -------
    // The flat entry point agrees with the structured one and with report.
    //
    // Given
    // -----
    // - The small fixture under Poisson-lognormal.
    //
    // Expect
    // ------
    // - Identical jnll and gradients; report.jnll equal to the value.
    fn evaluate_flat_matches_evaluate() {
        // Arrange
        let m = model(ObservationModel::PoissonLognormal, 5);
        let (p, r, d) = (small_params(), small_random(), small_data());

        // Act
        let (jnll, grad) = m.evaluate(&p, &r, &d).expect("valid");
        let (jnll_flat, grad_flat) =
            m.evaluate_flat(p.to_theta().view(), r.to_flat().view(), &d).expect("valid");
        let report = m.report(&p, &r, &d).expect("valid");

        // Assert
        assert_eq!(jnll, jnll_flat);
        assert_eq!(grad, grad_flat);
        assert_eq!(report.jnll, jnll);
        assert_eq!(m.random_hessian(&p, &r, &d).expect("valid").nrows(), 12);
    }

    #[test]
    // Purpose
    // -------
    // `value` is the Laplace marginal at the decoded optimizer point, and
    // `check` rejects a vector of the wrong length.
    //
    // Given
    // -----
    // - Poisson, so the optimizer vector has n_p + 5 = 7 entries.
    //
    // Expect
    // ------
    // - value == laplace(params).nll; a length-9 vector is a
    //   ThetaLengthMismatch.
    fn value_and_check_conform() {
        // Arrange
        let m = model(ObservationModel::Poisson, 5);
        let (p, d) = (small_params(), small_data());
        m.scratch.set_held_theta_z(p.theta_z);
        let opt = p.to_optimizer(ObservationModel::Poisson);

        // Act
        let value = m.value(&opt, &d).expect("finite");
        m.scratch.clear_mode();
        let decoded =
            FixedParams::from_optimizer(opt.view(), 2, ObservationModel::Poisson, p.theta_z)
                .expect("valid");
        let laplace = m.laplace(&decoded, &d).expect("valid");

        // Assert
        assert_eq!(opt.len(), 7);
        assert_relative_eq!(value, laplace.nll, epsilon = 1e-8);
        assert!(m.check(&opt, &d).is_ok());
        let long = p.to_theta();
        assert_eq!(
            m.check(&long, &d),
            Err(OptError::ThetaLengthMismatch { expected: 7, actual: 9 })
        );
    }

    #[test]
    // Purpose
    // -------
    // A short fit does not increase the objective and caches its results.
    //
    // Given
    // -----
    // - The small fixture under Poisson, at most 5 outer iterations.
    //
    // Expect
    // ------
    // - Finite outcome with value ≤ the starting value; fitted report and
    //   sd_report are available; derived SEs are finite.
    fn short_fit_populates_results() {
        // Arrange
        let mut m = model(ObservationModel::Poisson, 5);
        let (p, d) = (small_params(), small_data());
        m.scratch.set_held_theta_z(p.theta_z);
        let start = m.value(&p.to_optimizer(ObservationModel::Poisson), &d).expect("finite");

        // Act
        m.fit(p.clone(), &d).expect("fit runs");

        // Assert
        let outcome = m.results.as_ref().expect("results cached");
        assert!(outcome.value.is_finite());
        assert!(outcome.value <= start + 1e-8);
        let fitted = m.fitted_params().expect("fitted");
        assert_eq!(fitted.theta_z, p.theta_z);
        assert_eq!(m.fitted_report().expect("report").x_s, d.x_s);
        let sd = m.sd_report(&d).expect("sd report");
        assert_eq!(sd.fixed.len(), 7);
        assert!(sd.derived.iter().all(|e| e.std_error.is_finite()));
    }

    #[test]
    // Purpose
    // -------
    // Fitted accessors and sd_report require a fit; fit rejects a mismatched
    // covariate count.
    //
    // Given
    // -----
    // - A fresh model; parameters with one alpha against two covariates.
    //
    // Expect
    // ------
    // - ModelNotFitted from each accessor; fit returns an error.
    fn not_fitted_paths() {
        let mut m = model(ObservationModel::Poisson, 5);
        let d = small_data();
        assert_eq!(m.fitted_params(), Err(GompertzError::ModelNotFitted));
        assert_eq!(m.fitted_report(), Err(GompertzError::ModelNotFitted));
        assert_eq!(m.sd_report(&d), Err(InferenceError::ModelNotFitted));

        let short =
            FixedParams::new(ndarray::array![1.0], 0.0, 0.0, 0.0, 0.0, 0.5, [0.0, 0.0]).expect("finite");
        assert!(m.fit(short, &d).is_err());
        assert!(m.results.is_none());
    }

    #[test]
    // Purpose
    // -------
    // `grad` is the derivative of `value` in optimizer space, including the
    // rho transform and the Poisson truncation.
    //
    // Given
    // -----
    // - The small fixture under both models, inner tolerance 1e-12; central
    //   differences of `value` with h = 1e-5.
    //
    // Expect
    // ------
    // - Lengths 7 (Poisson) and 9; agreement within 2e-5 absolute or 1e-4
    //   relative.
    fn grad_matches_central_differences_of_value() {
        for (observation, n_opt) in
            [(ObservationModel::Poisson, 7), (ObservationModel::PoissonLognormal, 9)]
        {
            // Arrange
            let mut m = model(observation, 5);
            m.options.inner = InnerOptions::new(200, 1e-12, 60).expect("valid inner options");
            let (p, d) = (small_params(), small_data());
            m.scratch.set_held_theta_z(p.theta_z);
            let opt = p.to_optimizer(observation);
            let h = 1e-5;

            // Act
            let grad = m.grad(&opt, &d).expect("finite marginal");

            // Assert
            assert_eq!(grad.len(), n_opt);
            for k in 0..opt.len() {
                let (mut up, mut dn) = (opt.clone(), opt.clone());
                up[k] += h;
                dn[k] -= h;
                let fd = (m.value(&up, &d).expect("finite") - m.value(&dn, &d).expect("finite"))
                    / (2.0 * h);
                assert_relative_eq!(grad[k], fd, epsilon = 2e-5, max_relative = 1e-4);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // sd_report fails loudly when a stencil point has no finite marginal,
    // instead of differencing the penalty.
    //
    // Given
    // -----
    // - One vertex with Q(κ) = κ⁴ − 1, proper only for log κ > 0.
    // - A fitted state placed by hand at log κ = 5e-5, so the log κ stencil
    //   point at −5e-5 is improper.
    //
    // Expect
    // ------
    // - The marginal at the fitted point is finite; sd_report returns
    //   Hessian(NonFiniteCost); the warm start is the fitted mode afterwards.
    fn sd_report_rejects_improper_stencil_point() {
        // Arrange
        let mesh = SpdeMesh::from_triplets(1, &[(0, 0, 1.0)], &[], &[(0, 0, -1.0)])
            .expect("valid structure");
        let tols = Tolerances::new(Some(1e-6), None, Some(5)).expect("valid tolerances");
        let mle = MLEOptions::new(tols, LineSearcher::MoreThuente, None).expect("valid options");
        let options = GompertzOptions::new(ObservationModel::Poisson, mle, Default::default());
        let mut m = SpatialGompertz::new(mesh, options);
        let data = single_site_data(vec![Some(2.0), Some(3.0), Some(2.0)]);
        let params = FixedParams::new(ndarray::array![1.0], 0.0, 0.0, 0.0, 5e-5, 0.5, [0.0, 0.0])
            .expect("finite");
        m.scratch.set_held_theta_z(params.theta_z);
        let mode = m.laplace(&params, &data).expect("valid");
        assert!(mode.nll.is_finite());
        m.results = Some(OptimOutcome {
            theta_hat: params.to_optimizer(ObservationModel::Poisson),
            value: mode.nll,
            converged: true,
            status: "placed".to_string(),
            iterations: 0,
            fn_evals: Default::default(),
            grad_norm: None,
        });
        m.fitted_params = Some(params);
        m.fitted_mode = Some(mode.clone());

        // Act
        let err = m.sd_report(&data).expect_err("improper stencil point");

        // Assert
        assert!(
            matches!(err, InferenceError::Hessian(OptError::NonFiniteCost { .. })),
            "got {err:?}"
        );
        assert_eq!(m.scratch.warm_start(mode.mode.len()), Some(mode.mode));
    }
}
