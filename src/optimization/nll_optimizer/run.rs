//! Runs an argmin solver on an adapted negative log-likelihood and converts
//! the final state into an [`OptimOutcome`].
use crate::optimization::{
    errors::OptResult,
    nll_optimizer::{
        adapter::ArgMinAdapter,
        traits::{MLEOptions, NegLogLikelihood, OptimOutcome},
        types::{Grad, Theta},
    },
};
use argmin::core::{CostFunction, Executor, State};
#[cfg(feature = "obs_slog")]
use argmin::core::Gradient;
#[cfg(feature = "obs_slog")]
use argmin_math::ArgminL2Norm;
use log::debug;

/// Run an argmin solver from `theta0`.
///
/// Wires the adapter, solver, initial parameters, optional `max_iters` and,
/// with the `obs_slog` feature and `opts.verbose`, argmin's terminal
/// observer. The starting cost is logged at `debug` level.
///
/// # Errors
/// - argmin runtime errors (line-search failures, model errors raised inside
///   cost/gradient calls), converted to `OptError`.
/// - Validation errors from [`OptimOutcome::new`].
pub fn run_lbfgs<'a, F, S>(
    theta0: Theta, opts: &MLEOptions, problem: ArgMinAdapter<'a, F>, solver: S,
) -> OptResult<OptimOutcome>
where
    F: NegLogLikelihood,
    S: argmin::core::Solver<
            ArgMinAdapter<'a, F>,
            argmin::core::IterState<Theta, Grad, (), (), (), f64>,
        > + Send
        + 'static,
{
    let cost0 = problem.cost(&theta0)?;
    debug!("outer optimizer start: dim = {}, cost(theta0) = {cost0:.6}", theta0.len());
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        log_initial_gradient(&theta0, &problem);
    }

    let mut optimizer = Executor::new(problem, solver);
    optimizer = optimizer.configure(|state| state.param(theta0));
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, argmin::core::observers::ObserverMode::Always);
    }
    if let Some(max_iter) = opts.tols.max_iter {
        optimizer = optimizer.configure(|state| state.max_iters(max_iter as u64));
    }

    let mut result = optimizer.run()?.state().clone();
    let iterations = result.get_iter();
    let function_counts = result.get_func_counts().clone();
    let termination = result.get_termination_status().clone();
    let grad = result.take_gradient();
    let best_cost = result.get_best_cost();
    debug!("outer optimizer finished after {iterations} iterations: {termination:?}");
    OptimOutcome::new(
        result.take_best_param(),
        best_cost,
        termination,
        iterations,
        function_counts,
        grad,
    )
}

// ---- Helper Methods ----

#[cfg(feature = "obs_slog")]
fn log_initial_gradient<F: NegLogLikelihood>(theta0: &Theta, problem: &ArgMinAdapter<'_, F>) {
    if let Ok(g) = problem.gradient(theta0) {
        debug!("outer optimizer start: ||grad(theta0)|| = {:.6}", g.l2_norm());
    }
}
