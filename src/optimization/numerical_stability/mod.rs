//! numerical_stability — bounded transforms and covariance helpers.
//!
//! Purpose
//! -------
//! Keep the small numeric tolerances and reparameterizations that the model
//! and the inference layer must agree on in one place.
//!
//! Key behaviors
//! -------------
//! - [`bounded_rho`] maps an unconstrained real into `(−1 + RHO_MARGIN,
//!   1 − RHO_MARGIN)`; [`bounded_rho_inv`] and [`bounded_rho_deriv`] give
//!   its inverse and derivative for starting values and Jacobians.
//! - [`delta_method_variance`] turns a covariance and a gradient into the
//!   variance `gᵀ Σ g` of a scalar function.
//! - Shared constants: [`RHO_MARGIN`], [`EIGEN_EPS`],
//!   [`NON_FINITE_COST_PENALTY`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Inputs are finite; shape checks happen in the callers.
//! - Pure functions, no logging.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`transformations`] check the bound, inverse round trip,
//!   derivative versus finite differences, and the delta method on a known
//!   covariance.

pub mod transformations;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::transformations::{
    EIGEN_EPS, NON_FINITE_COST_PENALTY, RHO_MARGIN, bounded_rho, bounded_rho_deriv,
    bounded_rho_inv, delta_method_variance,
};

pub mod prelude {
    pub use super::transformations::{
        EIGEN_EPS, NON_FINITE_COST_PENALTY, RHO_MARGIN, bounded_rho, bounded_rho_inv,
        delta_method_variance,
    };
}
