//! core — mesh, data, parameters and the numerical layers of the spatial
//! Gompertz model.
//!
//! Purpose
//! -------
//! Collect the building blocks the model type wires together: the SPDE mesh
//! and its sparse precision, the GMRF density, the count kernels, the
//! Gompertz recursion with its reverse pass, the joint likelihood, the
//! Laplace integration and the report.
//!
//! Key behaviors
//! -------------
//! - [`SpdeMesh`] builds `Q(κ) = κ⁴G0 + 2κ²G1 + G2`; [`GmrfDensity`] scores
//!   fields against it through a sparse Cholesky factor.
//! - [`ObservationModel`] evaluates Poisson and Poisson-lognormal negative
//!   log-densities together with their derivatives.
//! - [`compute_latent`] runs the recursion; [`backpropagate`] and
//!   [`latent_jacobian`] differentiate it.
//! - [`evaluate_joint`] / [`joint_gradient`] / [`random_hessian`] assemble
//!   the joint objective; [`find_mode`] integrates the random effects out
//!   and [`laplace_gradient`] differentiates the resulting marginal.
//!
//! Invariants & assumptions
//! ------------------------
//! - Random effects are laid out `Epsilon_input` year-major, then
//!   `Omega_input`: `E(x, t) → t·n_x + x`, `Ω(x) → n_x·n_t + x`.
//! - Fixed parameters use `[alpha…, phi, log_tau_E, log_tau_O, log_kappa,
//!   rho, theta_z[0], theta_z[1]]`.
//! - Numerical domain failures surface as non-finite objectives; only
//!   precondition violations are `Err`.
//!
//! Testing notes
//! -------------
//! - Each submodule carries unit tests; shared fixtures live in
//!   `mesh::tests` and `recursion::tests`.

pub mod data;
pub mod gmrf;
pub mod laplace;
pub mod likelihood;
pub mod marginal_gradient;
pub mod mesh;
pub mod observation;
pub mod options;
pub mod params;
pub mod recursion;
pub mod report;
pub mod workspace;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::data::{GompertzData, GompertzMeta, RecordOrdering};
pub use self::gmrf::{GmrfDensity, SparseCholesky};
pub use self::laplace::{InnerOptions, LaplaceMode, find_mode, laplace_nll};
pub use self::likelihood::{
    JointEvaluation, JointGradient, LikelihoodContext, evaluate_joint, joint_gradient,
    random_gradient, random_hessian,
};
pub use self::marginal_gradient::laplace_gradient;
pub use self::mesh::{SpdeMesh, Triplet};
pub use self::observation::{ObservationModel, ObservationTerms};
pub use self::options::GompertzOptions;
pub use self::params::{DerivedQuantities, FixedParams, RandomEffects};
pub use self::recursion::{
    LatentFields, backpropagate, compute_latent, latent_jacobian, latent_jacobian_drho,
};
pub use self::report::GompertzReport;
pub use self::workspace::GompertzScratch;

pub mod prelude {
    pub use super::data::{GompertzData, GompertzMeta, RecordOrdering};
    pub use super::laplace::InnerOptions;
    pub use super::mesh::SpdeMesh;
    pub use super::observation::ObservationModel;
    pub use super::options::GompertzOptions;
    pub use super::params::{FixedParams, RandomEffects};
    pub use super::report::GompertzReport;
}
