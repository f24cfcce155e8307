//! Entry point for minimizing a [`NegLogLikelihood`].
//!
//! Selects an L-BFGS solver with Hager–Zhang or More–Thuente line search,
//! wraps the model in an [`ArgMinAdapter`] and delegates to [`run_lbfgs`].
use crate::optimization::{
    errors::OptResult,
    nll_optimizer::{
        adapter::ArgMinAdapter,
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        run::run_lbfgs,
        traits::{LineSearcher, MLEOptions, NegLogLikelihood, OptimOutcome},
        types::Theta,
    },
};

/// Minimize `J(θ)` with L-BFGS.
///
/// # Behavior
/// - Validates the starting point with `f.check(theta0, data)`.
/// - Builds the solver for `opts.line_searcher` and runs it from `theta0`
///   (consumed).
///
/// # Errors
/// - Anything `f.check` returns.
/// - Solver configuration and runtime errors.
///
/// # Example
/// ```no_run
/// use ndarray::array;
/// use spatial_gompertz::optimization::errors::OptResult;
/// use spatial_gompertz::optimization::nll_optimizer::{
///     minimize, MLEOptions, NegLogLikelihood, Theta,
/// };
///
/// struct Bowl;
/// impl NegLogLikelihood for Bowl {
///     type Data = ();
///     fn value(&self, theta: &Theta, _: &()) -> OptResult<f64> {
///         Ok(theta.dot(theta))
///     }
///     fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
///         Ok(())
///     }
/// }
///
/// let out = minimize(&Bowl, array![0.1, -0.2], &(), &MLEOptions::default())?;
/// println!("θ̂ = {:?}", out.theta_hat);
/// # Ok::<(), spatial_gompertz::optimization::errors::OptError>(())
/// ```
pub fn minimize<F: NegLogLikelihood>(
    f: &F, theta0: Theta, data: &F::Data, opts: &MLEOptions,
) -> OptResult<OptimOutcome> {
    f.check(&theta0, data)?;
    let problem = ArgMinAdapter::new(f, data);
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            let solver = build_optimizer_more_thuente(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
        LineSearcher::HagerZhang => {
            let solver = build_optimizer_hager_zhang(opts)?;
            run_lbfgs(theta0, opts, problem, solver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{
        errors::OptError,
        nll_optimizer::{traits::Tolerances, types::Grad},
    };
    use ndarray::{Array1, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - minimize on a convex quadratic with analytic and numeric gradients.
    // - Early rejection through NegLogLikelihood::check.
    //
    // They intentionally DO NOT cover:
    // - The Gompertz objective (models::spatial_gompertz and integration tests).
    // -------------------------------------------------------------------------

    struct ShiftedBowl {
        analytic: bool,
    }

    impl NegLogLikelihood for ShiftedBowl {
        type Data = Array1<f64>;

        fn value(&self, theta: &Theta, center: &Array1<f64>) -> OptResult<f64> {
            let d = theta - center;
            Ok(0.5 * d.dot(&d))
        }

        fn check(&self, theta: &Theta, center: &Array1<f64>) -> OptResult<()> {
            if theta.len() != center.len() {
                return Err(OptError::ThetaLengthMismatch {
                    expected: center.len(),
                    actual: theta.len(),
                });
            }
            Ok(())
        }

        fn grad(&self, theta: &Theta, center: &Array1<f64>) -> OptResult<Grad> {
            if self.analytic { Ok(theta - center) } else { Err(OptError::GradientNotImplemented) }
        }
    }

    #[test]
    // Purpose
    // -------
    // Both line searches find the minimum of a shifted quadratic.
    //
    // Given
    // -----
    // - J(θ) = ½‖θ − c‖² with c = [1, −2, 0.5], analytic and numeric gradients.
    //
    // Expect
    // ------
    // - theta_hat ≈ c and value ≈ 0.
    fn minimize_recovers_quadratic_minimum() {
        // Arrange
        let center = array![1.0, -2.0, 0.5];
        let tols = Tolerances::new(Some(1e-8), None, Some(100)).expect("valid tolerances");

        for (analytic, ls) in [(true, LineSearcher::MoreThuente), (false, LineSearcher::HagerZhang)]
        {
            let opts = MLEOptions::new(tols, ls, None).expect("options");

            // Act
            let out = minimize(&ShiftedBowl { analytic }, array![0.0, 0.0, 0.0], &center, &opts)
                .expect("minimize should succeed");

            // Assert
            for (est, truth) in out.theta_hat.iter().zip(center.iter()) {
                assert!((est - truth).abs() < 1e-4, "estimate {est} vs {truth}");
            }
            assert!(out.value < 1e-8);
        }
    }

    #[test]
    // Purpose
    // -------
    // check() failures stop minimize before any solver work.
    //
    // Given
    // -----
    // - A 2-vector start against a 3-vector center.
    //
    // Expect
    // ------
    // - Err(ThetaLengthMismatch { expected: 3, actual: 2 }).
    fn minimize_propagates_check_errors() {
        // Arrange
        let center = array![1.0, 2.0, 3.0];

        // Act
        let err = minimize(
            &ShiftedBowl { analytic: true },
            array![0.0, 0.0],
            &center,
            &MLEOptions::default(),
        )
        .expect_err("length mismatch");

        // Assert
        assert_eq!(err, OptError::ThetaLengthMismatch { expected: 3, actual: 2 });
    }
}
