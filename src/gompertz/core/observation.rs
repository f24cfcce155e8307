//! Observation density kernels for counts given the latent log density.
//!
//! Purpose
//! -------
//! Score each non-missing count `c_i` against the latent log mean
//! `log_chat_i` under one of two observation models, and supply the
//! derivatives the likelihood and Laplace layers need.
//!
//! Key behaviors
//! -------------
//! - [`dpois`], [`dlognorm`] and [`d_poisson_lognormal`] evaluate densities on
//!   the log or natural scale (`give_log`).
//! - [`ObservationModel`] selects the family (`Poisson` or
//!   `PoissonLognormal`); [`ObservationModel::nll_terms`] returns the
//!   per-record NLL together with its first three derivatives in the log
//!   mean, its first derivatives in `theta_z = [log_sd, log_clustersize]`,
//!   and the mixed derivatives of `d1` and `d2` in `theta_z` that the
//!   Laplace gradient needs.
//!
//! Conventions
//! -----------
//! - Poisson-lognormal: with `a = exp(log_mean)/exp(log_clustersize)`, a zero
//!   count has log-probability `−a`. A positive count has log-density
//!   `ln(1 − e^{−a}) + dlognorm(x, log_mean − ln(1 − e^{−a}), log_sd)`.
//! - `dlognorm` at `x ≤ 0` is `−∞` (log scale) or `0` (natural scale).
//! - The only branch is on the observed count being zero, which does not
//!   depend on parameters.
//!
//! Testing notes
//! -------------
//! - Unit tests cover the zero mass identity, numerical normalization of the
//!   mixture, analytic derivatives versus finite differences, and parsing.
use std::str::FromStr;

use statrs::{consts::LN_SQRT_2PI, function::gamma::ln_gamma};

use crate::gompertz::errors::{GompertzError, GompertzResult};

/// Below this encounter rate the Poisson-lognormal derivatives switch to
/// their series expansions around `a = 0`.
const SMALL_ENCOUNTER_RATE: f64 = 1e-8;

/// Observation model for the counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationModel {
    /// `c_i ~ Poisson(exp(log_chat_i))`.
    #[default]
    Poisson,
    /// Zero-inflated Poisson-lognormal cluster model, parameterized by
    /// `theta_z = [log_sd, log_clustersize]`.
    PoissonLognormal,
}

impl ObservationModel {
    /// Legacy integer selector: `0` is Poisson, `1` Poisson-lognormal.
    ///
    /// # Errors
    /// - [`GompertzError::UnknownObservationModel`] for any other code.
    pub fn from_code(code: i64) -> GompertzResult<Self> {
        match code {
            0 => Ok(ObservationModel::Poisson),
            1 => Ok(ObservationModel::PoissonLognormal),
            other => Err(GompertzError::UnknownObservationModel { value: other.to_string() }),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ObservationModel::Poisson => 0,
            ObservationModel::PoissonLognormal => 1,
        }
    }

    /// `true` when `theta_z` enters the likelihood.
    pub fn uses_theta_z(&self) -> bool {
        matches!(self, ObservationModel::PoissonLognormal)
    }

    /// Density of count `x` at latent log mean `log_mean`.
    pub fn log_density(&self, x: f64, log_mean: f64, theta_z: [f64; 2], give_log: bool) -> f64 {
        match self {
            ObservationModel::Poisson => dpois(x, log_mean, give_log),
            ObservationModel::PoissonLognormal => {
                d_poisson_lognormal(x, log_mean, theta_z[0], theta_z[1], give_log)
            }
        }
    }

    /// Per-record NLL and its derivatives.
    pub fn nll_terms(&self, x: f64, log_mean: f64, theta_z: [f64; 2]) -> ObservationTerms {
        match self {
            ObservationModel::Poisson => poisson_terms(x, log_mean),
            ObservationModel::PoissonLognormal => {
                poisson_lognormal_terms(x, log_mean, theta_z[0], theta_z[1])
            }
        }
    }
}

impl FromStr for ObservationModel {
    type Err = GompertzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "poisson" | "0" => Ok(ObservationModel::Poisson),
            "poisson_lognormal" | "1" => Ok(ObservationModel::PoissonLognormal),
            _ => Err(GompertzError::UnknownObservationModel { value: s.to_string() }),
        }
    }
}

/// Per-record negative log-likelihood with derivatives.
///
/// - `nll`: `−log p(c_i | log_chat_i)`.
/// - `d1`, `d2`, `d3`: first three derivatives in `log_chat_i`.
/// - `d_log_sd`, `d_log_clustersize`: first derivatives in `theta_z`
///   (zero under Poisson).
/// - `d1_log_sd`, `d1_log_clustersize`, `d2_log_sd`, `d2_log_clustersize`:
///   derivatives of `d1` and `d2` in `theta_z` (zero under Poisson).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationTerms {
    pub nll: f64,
    pub d1: f64,
    pub d2: f64,
    pub d3: f64,
    pub d_log_sd: f64,
    pub d_log_clustersize: f64,
    pub d1_log_sd: f64,
    pub d1_log_clustersize: f64,
    pub d2_log_sd: f64,
    pub d2_log_clustersize: f64,
}

/// Poisson probability of `x` with rate `exp(log_lambda)`.
pub fn dpois(x: f64, log_lambda: f64, give_log: bool) -> f64 {
    let logp = x * log_lambda - log_lambda.exp() - ln_gamma(x + 1.0);
    if give_log { logp } else { logp.exp() }
}

/// Log-normal density: `Normal(ln x; log_mean, exp(log_sd)) / x`.
///
/// Returns `−∞` (or `0` on the natural scale) for `x ≤ 0`.
pub fn dlognorm(x: f64, log_mean: f64, log_sd: f64, give_log: bool) -> f64 {
    if x <= 0.0 {
        return if give_log { f64::NEG_INFINITY } else { 0.0 };
    }
    let ln_x = x.ln();
    let z = (ln_x - log_mean) / log_sd.exp();
    let logd = -log_sd - LN_SQRT_2PI - 0.5 * z * z - ln_x;
    if give_log { logd } else { logd.exp() }
}

/// Zero-inflated Poisson-lognormal density of `x`.
pub fn d_poisson_lognormal(
    x: f64, log_mean: f64, log_sd: f64, log_clustersize: f64, give_log: bool,
) -> f64 {
    let encounter_log_prob = -log_mean.exp() / log_clustersize.exp();
    let logd = if x == 0.0 {
        encounter_log_prob
    } else {
        let log_encounter_prob = (-encounter_log_prob.exp_m1()).ln();
        log_encounter_prob + dlognorm(x, log_mean - log_encounter_prob, log_sd, true)
    };
    if give_log { logd } else { logd.exp() }
}

// ---- Helper methods ----

fn poisson_terms(x: f64, log_mean: f64) -> ObservationTerms {
    let lambda = log_mean.exp();
    ObservationTerms {
        nll: -dpois(x, log_mean, true),
        d1: lambda - x,
        d2: lambda,
        d3: lambda,
        d_log_sd: 0.0,
        d_log_clustersize: 0.0,
        d1_log_sd: 0.0,
        d1_log_clustersize: 0.0,
        d2_log_sd: 0.0,
        d2_log_clustersize: 0.0,
    }
}

fn poisson_lognormal_terms(
    x: f64, log_mean: f64, log_sd: f64, log_clustersize: f64,
) -> ObservationTerms {
    let a = log_mean.exp() / log_clustersize.exp();
    if x == 0.0 {
        return ObservationTerms {
            nll: a,
            d1: a,
            d2: a,
            d3: a,
            d_log_sd: 0.0,
            d_log_clustersize: -a,
            d1_log_sd: 0.0,
            d1_log_clustersize: -a,
            d2_log_sd: 0.0,
            d2_log_clustersize: -a,
        };
    }
    let nll = -d_poisson_lognormal(x, log_mean, log_sd, log_clustersize, true);
    // g, h, k: successive derivatives of ln(1 − e^{−a}) in log_mean. All
    // three depend on log_mean − log_clustersize only, so their
    // log_clustersize derivatives are −h, −k and −∂k.
    let (g, h, k) = encounter_derivatives(a);
    let log_encounter_prob = (-(-a).exp_m1()).ln();
    let r = x.ln() - log_mean + log_encounter_prob;
    let inv_var = (-2.0 * log_sd).exp();
    let gm1 = g - 1.0;
    ObservationTerms {
        nll,
        d1: -(g - r * gm1 * inv_var),
        d2: -(h - (gm1 * gm1 + r * h) * inv_var),
        d3: -(k - (3.0 * gm1 * h + r * k) * inv_var),
        d_log_sd: -(-1.0 + r * r * inv_var),
        d_log_clustersize: -(-g + r * g * inv_var),
        d1_log_sd: -2.0 * r * gm1 * inv_var,
        d1_log_clustersize: h - (g * gm1 + r * h) * inv_var,
        d2_log_sd: -2.0 * (gm1 * gm1 + r * h) * inv_var,
        d2_log_clustersize: k - (2.0 * gm1 * h + g * h + r * k) * inv_var,
    }
}

/// First three derivatives of `ln(1 − e^{−a})` in `ln a`.
fn encounter_derivatives(a: f64) -> (f64, f64, f64) {
    if a < SMALL_ENCOUNTER_RATE {
        return (1.0 - 0.5 * a, -0.5 * a, -0.5 * a);
    }
    let g = a / a.exp_m1();
    let p = a / (-(-a).exp_m1());
    let h = g * (1.0 - p);
    let k = h * (1.0 - p) - g * p * (1.0 - g);
    (g, h, k)
}
