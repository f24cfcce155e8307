//! gompertz — spatial Gompertz population model with SPDE random fields.
//!
//! Purpose
//! -------
//! Provide the complete model stack: counts `c_i` observed at mesh vertex
//! `x_s[i]` in year `t_i[i]` follow a Gompertz recursion on the log scale,
//! driven by covariates, a spatial field `Omega` and yearly spatial fields
//! `Epsilon`, each a zero-mean GMRF with SPDE precision. Counts are scored
//! with a Poisson or Poisson-lognormal kernel.
//!
//! Key behaviors
//! -------------
//! - [`core`] holds the mesh, data, parameter layouts, the joint NLL with
//!   its exact gradient and random-effect Hessian, and the Laplace marginal.
//! - [`models`] exposes [`SpatialGompertz`], which evaluates, reports, fits
//!   the Laplace marginal with L-BFGS and computes delta-method standard
//!   errors.
//! - [`errors`] defines [`GompertzError`] and [`ParamError`].
//!
//! Downstream usage
//! ----------------
//! 1. Build an [`SpdeMesh`] from the `G0`, `G1`, `G2` matrices.
//! 2. Build [`GompertzData`] from counts, indices and covariates.
//! 3. Construct [`SpatialGompertz::new(mesh, options)`](SpatialGompertz::new).
//! 4. Call `evaluate`, `report`, `laplace`, or `fit` then `sd_report`.

pub mod core;
pub mod errors;
pub mod models;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{
    FixedParams, GompertzData, GompertzMeta, GompertzOptions, GompertzReport, InnerOptions,
    ObservationModel, RandomEffects, RecordOrdering, SpdeMesh,
};
pub use self::errors::{GompertzError, GompertzResult, ParamError, ParamResult};
pub use self::models::SpatialGompertz;

pub mod prelude {
    pub use super::{
        FixedParams, GompertzData, GompertzError, GompertzMeta, GompertzOptions, GompertzReport,
        GompertzResult, InnerOptions, ObservationModel, ParamError, RandomEffects, RecordOrdering,
        SpatialGompertz, SpdeMesh,
    };
}
