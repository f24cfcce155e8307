//! models — the user-facing spatial Gompertz model.
//!
//! Purpose
//! -------
//! Expose [`SpatialGompertz`], which ties the mesh, options and warm-start
//! scratch to the core numerics and implements
//! [`NegLogLikelihood`](crate::optimization::nll_optimizer::NegLogLikelihood)
//! over the Laplace marginal so it plugs into the argmin-backed optimizer.
//!
//! Key behaviors
//! -------------
//! - `evaluate` / `evaluate_flat`: joint NLL and exact gradient.
//! - `report`, `random_hessian`, `laplace`.
//! - `fit`: L-BFGS on the Laplace marginal with its exact gradient; caches
//!   outcome, parameters, mode and report.
//! - `sd_report`: delta-method standard errors at the fitted optimum.
//!
//! Invariants & assumptions
//! ------------------------
//! - Scratch is single-owner; concurrent use of one instance is not
//!   supported.

pub mod spatial_gompertz;

pub use self::spatial_gompertz::SpatialGompertz;

pub mod prelude {
    pub use super::spatial_gompertz::SpatialGompertz;
}
