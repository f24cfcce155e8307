//! optimization — outer optimizer, numerical helpers, and error surface.
//!
//! Purpose
//! -------
//! Provide the optimization layer used to fit the spatial Gompertz model:
//! an argmin-backed minimizer of negative log-likelihoods, the bounded
//! reparameterizations shared by the model and its standard errors, and one
//! error/result surface for both.
//!
//! Key behaviors
//! -------------
//! - [`nll_optimizer`]: minimizes `J(θ)` with L-BFGS. Models implement
//!   `NegLogLikelihood`, choose tolerances, and get an `OptimOutcome` back.
//! - [`numerical_stability`]: the autoregressive bound transform, shared
//!   tolerances, and the delta-method variance used by `inference`.
//! - [`errors`]: `OptError`/`OptResult`, including conversions from argmin's
//!   boxed errors and from model errors.
//!
//! Invariants & assumptions
//! ------------------------
//! - The optimizer works in an unconstrained space. Constrained natural
//!   parameters (the autoregressive coefficient) are reached through
//!   `numerical_stability` transforms.
//! - Failures are reported as `OptError`, never panics.
//!
//! Conventions
//! -----------
//! - Costs are negative log-likelihoods and are minimized as returned.
//! - Parameters, gradients, and Hessians use the `ndarray` aliases in
//!   `nll_optimizer::types`.
//! - Progress is logged through the `log` facade at `debug` level; no I/O.
//!
//! Downstream usage
//! ----------------
//! - `gompertz::models::spatial_gompertz` implements `NegLogLikelihood` and
//!   calls `minimize` from `fit`.
//! - `inference::sdreport` uses `finite_diff::cost_hessian` and
//!   `delta_method_variance`.
//!
//! Testing notes
//! -------------
//! - Unit tests in each submodule cover solver wiring, validation,
//!   transforms and error conversions; end-to-end fitting is covered in
//!   `tests/integration_gompertz_pipeline.rs`.

pub mod errors;
pub mod nll_optimizer;
pub mod numerical_stability;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use spatial_gompertz::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::nll_optimizer::prelude::*;
    pub use super::numerical_stability::prelude::*;
}
