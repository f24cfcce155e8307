//! nll_optimizer — argmin-backed minimization of negative log-likelihoods.
//!
//! Purpose
//! -------
//! Adapt a model's marginal negative log-likelihood `J(θ)` to the external
//! argmin L-BFGS solver. Models implement [`NegLogLikelihood`] and call
//! [`minimize`]; this layer never implements an optimizer of its own.
//!
//! Key behaviors
//! -------------
//! - [`adapter::ArgMinAdapter`] forwards costs and gradients to argmin,
//!   finite-differencing the cost when no analytic gradient exists.
//! - [`minimize`] checks the start, builds the solver ([`builders`]) and
//!   runs it ([`run::run_lbfgs`]), returning an [`OptimOutcome`].
//! - [`finite_diff`] provides gradient and Hessian approximations, including
//!   a cost-based Hessian with a configurable step for noisy objectives.
//!
//! Invariants & assumptions
//! ------------------------
//! - Costs are minimized as returned; there is no sign convention to track.
//! - Non-finite costs are errors at this boundary; models that want the
//!   line search to back off from a degenerate region return a large finite
//!   penalty instead.
//! - Configuration types validate on construction.
//!
//! Downstream usage
//! ----------------
//! - `gompertz::models::spatial_gompertz` implements [`NegLogLikelihood`]
//!   over the Laplace marginal and calls [`minimize`] from `fit`.
//! - `inference` uses [`finite_diff::cost_hessian`] for standard errors.
//!
//! Testing notes
//! -------------
//! - Unit tests live in each submodule; the Gompertz fit is exercised in
//!   `tests/integration_gompertz_pipeline.rs`.

pub mod adapter;
pub mod api;
pub mod builders;
pub mod finite_diff;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::minimize;
pub use self::traits::{LineSearcher, MLEOptions, NegLogLikelihood, OptimOutcome, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Hessian, Theta};

pub mod prelude {
    pub use super::api::minimize;
    pub use super::traits::{LineSearcher, MLEOptions, NegLogLikelihood, OptimOutcome, Tolerances};
    pub use super::types::{Cost, Grad, Theta};
}
