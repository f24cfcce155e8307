//! inference — standard errors for fitted spatial Gompertz models.
//!
//! Purpose
//! -------
//! Quantify uncertainty after a fit: invert the curvature of the Laplace
//! marginal NLL at the optimum, then carry it to the natural fixed
//! parameters and to the derived `Range`, `SigmaE` and `SigmaO` through the
//! delta method.
//!
//! Key behaviors
//! -------------
//! - [`calc_covariance`] forms the eigen-truncated pseudoinverse of a
//!   finite-difference Hessian in optimizer space.
//! - [`SdReport`] maps that covariance to the natural scale and attaches
//!   names, estimates and standard errors.
//! - [`InferenceError`] / [`InferenceResult`] report failures.
//!
//! Conventions
//! -----------
//! - The Hessian is taken in the unconstrained optimizer space used by
//!   `fit`; the only non-identity transform is `rho = (1 − 1e-6)·tanh(raw)`.
//! - Pure functions: no logging, no global state.
//!
//! Downstream usage
//! ----------------
//! - `SpatialGompertz::sd_report(&data)` is the usual entry point; it calls
//!   [`calc_covariance`] on the model's own objective and builds an
//!   [`SdReport`].

pub mod errors;
pub mod hessian;
pub mod sdreport;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::errors::{InferenceError, InferenceResult};
pub use self::hessian::{calc_covariance, standard_errors};
pub use self::sdreport::{Estimate, SdReport};

pub mod prelude {
    pub use super::errors::{InferenceError, InferenceResult};
    pub use super::hessian::calc_covariance;
    pub use super::sdreport::{Estimate, SdReport};
}
