//! nll_optimizer::types — numeric aliases and L-BFGS wiring.
//!
//! Purpose
//! -------
//! Keep the vector, matrix and solver types used by the optimizer in one
//! place, so the adapter, builders and runner never spell out `ndarray` or
//! argmin generics themselves.
//!
//! Conventions
//! -----------
//! - `Theta` is the unconstrained optimizer-space parameter vector. The
//!   model layer owns the mapping to natural parameters (bounded `rho`,
//!   dropped `theta_z` under the Poisson model).
//! - `Cost` is a negative log-likelihood; smaller is better and no sign flip
//!   happens anywhere in this layer.
//! - `Hessian` is dense `dim × dim`; it is only used for standard errors,
//!   never inside the L-BFGS loop.
use argmin::solver::{
    linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
    quasinewton::LBFGS,
};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Optimizer-space parameter vector.
pub type Theta = Array1<f64>;

/// Gradient of the cost with respect to `Theta`.
pub type Grad = Array1<f64>;

/// Dense second-derivative matrix of the cost.
pub type Hessian = Array2<f64>;

/// Scalar negative log-likelihood.
pub type Cost = f64;

/// Function-evaluation counters keyed by argmin's counter names
/// (`"cost_count"`, `"gradient_count"`).
pub type FnEvalMap = HashMap<String, u64>;

/// Default L-BFGS history size.
pub const DEFAULT_LBFGS_MEM: usize = 7;

pub type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, Cost>;
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;

/// L-BFGS with Hager–Zhang line search.
pub type LbfgsHagerZhang = LBFGS<HagerZhangLS, Theta, Grad, Cost>;

/// L-BFGS with More–Thuente line search.
pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Theta, Grad, Cost>;
