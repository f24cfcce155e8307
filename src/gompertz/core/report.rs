//! Named outputs of one joint evaluation.
//!
//! [`GompertzReport`] collects the objective components, the latent fields
//! and the SPDE summaries under their conventional names (`Range`,
//! `SigmaE`, `Epsilon_xt`, …) and serializes them to JSON.
use serde::Serialize;

use crate::gompertz::{
    core::{data::GompertzData, likelihood::JointEvaluation, params::FixedParams},
    errors::GompertzResult,
};

/// Report of a joint evaluation.
///
/// `Epsilon_xt` is stored row-major as `n_x` rows of `n_t` values.
/// Missing counts serialize as `null` in `c_i`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GompertzReport {
    pub jnll: f64,
    pub jnll_comp: [f64; 3],
    pub jnll_i: Vec<f64>,

    #[serde(rename = "Range")]
    pub range: f64,
    #[serde(rename = "SigmaE")]
    pub sigma_e: f64,
    #[serde(rename = "SigmaO")]
    pub sigma_o: f64,
    pub rho: f64,

    #[serde(rename = "Epsilon_xt")]
    pub epsilon_xt: Vec<Vec<f64>>,
    #[serde(rename = "Omega_x")]
    pub omega_x: Vec<f64>,
    #[serde(rename = "Equil_x")]
    pub equil_x: Vec<f64>,
    pub eta_x: Vec<f64>,
    #[serde(rename = "log_chat_i")]
    pub log_chat: Vec<f64>,

    pub theta_z: [f64; 2],
    pub alpha: Vec<f64>,
    pub phi: f64,
    #[serde(rename = "log_tau_E")]
    pub log_tau_e: f64,
    #[serde(rename = "log_tau_O")]
    pub log_tau_o: f64,
    pub log_kappa: f64,

    pub x_s: Vec<usize>,
    pub c_i: Vec<Option<f64>>,
    pub t_i: Vec<usize>,
}

impl GompertzReport {
    pub fn new(eval: &JointEvaluation, params: &FixedParams, data: &GompertzData) -> Self {
        let latent = &eval.latent;
        Self {
            jnll: eval.jnll,
            jnll_comp: eval.jnll_comp,
            jnll_i: eval.jnll_i.to_vec(),
            range: eval.derived.range,
            sigma_e: eval.derived.sigma_e,
            sigma_o: eval.derived.sigma_o,
            rho: params.rho,
            epsilon_xt: latent.epsilon_xt.rows().into_iter().map(|r| r.to_vec()).collect(),
            omega_x: latent.omega_x.to_vec(),
            equil_x: latent.equil_x.to_vec(),
            eta_x: latent.eta_x.to_vec(),
            log_chat: latent.log_chat.to_vec(),
            theta_z: params.theta_z,
            alpha: params.alpha.to_vec(),
            phi: params.phi,
            log_tau_e: params.log_tau_e,
            log_tau_o: params.log_tau_o,
            log_kappa: params.log_kappa,
            x_s: data.x_s.clone(),
            c_i: data.counts.clone(),
            t_i: data.t_i.clone(),
        }
    }

    /// Pretty-printed JSON.
    ///
    /// Non-finite numbers serialize as `null`, so an infinite `jnll` from a
    /// non-PD precision survives the round trip as `null`.
    ///
    /// # Errors
    /// - [`GompertzError::Serialization`](crate::gompertz::errors::GompertzError)
    ///   if `serde_json` fails.
    pub fn to_json(&self) -> GompertzResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
