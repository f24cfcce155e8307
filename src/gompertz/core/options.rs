//! Gompertz options — configuration for evaluation and fitting.
//!
//! Purpose
//! -------
//! Bundle the run-time choices of a [`SpatialGompertz`] model in one place:
//! which observation kernel scores counts, how the outer L-BFGS optimizer is
//! tuned, and how the inner Newton solve for the random effects behaves.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every component is validated by its own constructor
//!   ([`MLEOptions::new`], [`InnerOptions::new`]); [`GompertzOptions`] adds
//!   no cross-field rules.
//!
//! [`SpatialGompertz`]: crate::gompertz::models::SpatialGompertz
use crate::{
    gompertz::core::{laplace::InnerOptions, observation::ObservationModel},
    optimization::nll_optimizer::MLEOptions,
};

/// GompertzOptions — model-level configuration.
///
/// Fields
/// ------
/// - `observation`: count kernel (`Poisson` by default).
/// - `mle_opts`: outer optimizer tolerances and line search.
/// - `inner`: Laplace inner Newton settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GompertzOptions {
    pub observation: ObservationModel,
    pub mle_opts: MLEOptions,
    pub inner: InnerOptions,
}

impl GompertzOptions {
    pub fn new(observation: ObservationModel, mle_opts: MLEOptions, inner: InnerOptions) -> Self {
        Self { observation, mle_opts, inner }
    }
}
