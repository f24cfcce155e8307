//! Fixed parameters, random effects, and derived SPDE quantities.
//!
//! Purpose
//! -------
//! Own the model parameters and define the flat layouts shared with the
//! optimizer and the Python layer.
//!
//! Key behaviors
//! -------------
//! - [`FixedParams`]: `alpha`, `phi`, `log_tau_E`, `log_tau_O`, `log_kappa`,
//!   `rho`, `theta_z`. Flat layout of length `n_p + 7`:
//!   `[alpha…, phi, log_tau_E, log_tau_O, log_kappa, rho, theta_z0, theta_z1]`.
//! - Optimizer layout: the same positions with `rho` replaced by its
//!   unconstrained coordinate (`rho = (1 − 1e-6)·tanh(raw)`), truncated
//!   after `rho` when the observation model does not use `theta_z`.
//! - [`RandomEffects`]: `Epsilon_input` (`n_x × n_t`) and `Omega_input`
//!   (`n_x`). Flat layout of length `n_x(n_t + 1)`: year blocks of
//!   `Epsilon_input`, then `Omega_input`.
//! - [`DerivedQuantities`]: `Range`, `SigmaE`, `SigmaO` and their gradients.
//!
//! Invariants & assumptions
//! ------------------------
//! - Constructors reject non-finite entries and wrong lengths with
//!   [`ParamError`].
//! - `rho` is not range-checked here; `|rho| → 1` is a degenerate region of
//!   the likelihood, not a precondition.
use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView1, s};

use crate::{
    gompertz::{
        core::observation::ObservationModel,
        errors::{ParamError, ParamResult},
    },
    optimization::numerical_stability::transformations::{
        bounded_rho, bounded_rho_deriv, bounded_rho_inv,
    },
};

/// Number of scalar fixed parameters after `alpha`.
pub const N_SCALAR_FIXED: usize = 7;

/// `FixedParams` — fixed effects of the spatial Gompertz model.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedParams {
    /// Covariate coefficients, `eta_x = X_xp · alpha`.
    pub alpha: Array1<f64>,
    /// Offset of the first year from equilibrium.
    pub phi: f64,
    /// Log precision scale of the spatio-temporal field.
    pub log_tau_e: f64,
    /// Log precision scale of the spatial field.
    pub log_tau_o: f64,
    pub log_kappa: f64,
    /// Density dependence / autocorrelation.
    pub rho: f64,
    /// `[log_sd, log_clustersize]` of the Poisson-lognormal model.
    pub theta_z: [f64; 2],
}

impl FixedParams {
    /// Construct validated fixed parameters.
    ///
    /// # Errors
    /// - [`ParamError::NonFiniteTheta`] for any non-finite entry, indexed in
    ///   the flat layout.
    pub fn new(
        alpha: Array1<f64>, phi: f64, log_tau_e: f64, log_tau_o: f64, log_kappa: f64, rho: f64,
        theta_z: [f64; 2],
    ) -> ParamResult<Self> {
        let params = Self { alpha, phi, log_tau_e, log_tau_o, log_kappa, rho, theta_z };
        validate_finite(params.to_theta().view())?;
        Ok(params)
    }

    /// Flat length for `n_p` covariates.
    pub fn n_fixed(n_p: usize) -> usize {
        n_p + N_SCALAR_FIXED
    }

    /// Optimizer-space length for `n_p` covariates under `model`.
    pub fn n_optimizer(n_p: usize, model: ObservationModel) -> usize {
        if model.uses_theta_z() { n_p + N_SCALAR_FIXED } else { n_p + N_SCALAR_FIXED - 2 }
    }

    pub fn n_p(&self) -> usize {
        self.alpha.len()
    }

    /// Unpack the flat layout.
    ///
    /// # Errors
    /// - [`ParamError::ThetaLengthMismatch`] if `theta.len() != n_p + 7`.
    /// - [`ParamError::NonFiniteTheta`] for non-finite entries.
    pub fn from_theta(theta: ArrayView1<f64>, n_p: usize) -> ParamResult<Self> {
        let expected = Self::n_fixed(n_p);
        if theta.len() != expected {
            return Err(ParamError::ThetaLengthMismatch { expected, actual: theta.len() });
        }
        validate_finite(theta)?;
        Ok(Self {
            alpha: theta.slice(s![..n_p]).to_owned(),
            phi: theta[n_p],
            log_tau_e: theta[n_p + 1],
            log_tau_o: theta[n_p + 2],
            log_kappa: theta[n_p + 3],
            rho: theta[n_p + 4],
            theta_z: [theta[n_p + 5], theta[n_p + 6]],
        })
    }

    /// Pack into the flat layout.
    pub fn to_theta(&self) -> Array1<f64> {
        let mut theta = Vec::with_capacity(Self::n_fixed(self.n_p()));
        theta.extend(self.alpha.iter().copied());
        theta.extend([
            self.phi,
            self.log_tau_e,
            self.log_tau_o,
            self.log_kappa,
            self.rho,
            self.theta_z[0],
            self.theta_z[1],
        ]);
        Array1::from(theta)
    }

    /// Unpack an optimizer vector. Under a model without `theta_z`, the
    /// returned parameters carry `held_theta_z`.
    ///
    /// # Errors
    /// - [`ParamError::ThetaLengthMismatch`] / [`ParamError::NonFiniteTheta`].
    pub fn from_optimizer(
        opt: ArrayView1<f64>, n_p: usize, model: ObservationModel, held_theta_z: [f64; 2],
    ) -> ParamResult<Self> {
        let expected = Self::n_optimizer(n_p, model);
        if opt.len() != expected {
            return Err(ParamError::ThetaLengthMismatch { expected, actual: opt.len() });
        }
        validate_finite(opt)?;
        let theta_z =
            if model.uses_theta_z() { [opt[n_p + 5], opt[n_p + 6]] } else { held_theta_z };
        Ok(Self {
            alpha: opt.slice(s![..n_p]).to_owned(),
            phi: opt[n_p],
            log_tau_e: opt[n_p + 1],
            log_tau_o: opt[n_p + 2],
            log_kappa: opt[n_p + 3],
            rho: bounded_rho(opt[n_p + 4]),
            theta_z,
        })
    }

    /// Pack into the optimizer layout for `model`.
    pub fn to_optimizer(&self, model: ObservationModel) -> Array1<f64> {
        let n_p = self.n_p();
        let mut opt = self.to_theta();
        opt[n_p + 4] = bounded_rho_inv(self.rho);
        opt.slice(s![..Self::n_optimizer(n_p, model)]).to_owned()
    }

    /// Diagonal of `∂natural/∂optimizer` at optimizer point `opt`; every
    /// entry is 1 except the `rho` coordinate.
    pub fn optimizer_jacobian_diag(opt: ArrayView1<f64>, n_p: usize) -> Array1<f64> {
        let mut diag = Array1::ones(opt.len());
        if opt.len() > n_p + 4 {
            diag[n_p + 4] = bounded_rho_deriv(opt[n_p + 4]);
        }
        diag
    }

    /// Names in the flat layout, matching the report keys.
    pub fn param_names(n_p: usize) -> Vec<String> {
        let mut names: Vec<String> = (0..n_p).map(|k| format!("alpha[{k}]")).collect();
        names.extend(
            ["phi", "log_tau_E", "log_tau_O", "log_kappa", "rho", "theta_z[0]", "theta_z[1]"]
                .iter()
                .map(|s| s.to_string()),
        );
        names
    }

    pub fn kappa(&self) -> f64 {
        self.log_kappa.exp()
    }

    pub fn derived(&self) -> DerivedQuantities {
        DerivedQuantities::new(self.log_tau_e, self.log_tau_o, self.log_kappa)
    }
}

/// `RandomEffects` — unscaled spatial and spatio-temporal fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomEffects {
    /// `Epsilon_input`, `n_x × n_t`.
    pub epsilon_input: Array2<f64>,
    /// `Omega_input`, length `n_x`.
    pub omega_input: Array1<f64>,
}

impl RandomEffects {
    /// Construct validated random effects.
    ///
    /// # Errors
    /// - [`ParamError::OmegaLengthMismatch`] if `omega_input.len()` differs
    ///   from the rows of `epsilon_input`.
    /// - [`ParamError::NonFiniteRandom`] for non-finite entries (flat index).
    pub fn new(epsilon_input: Array2<f64>, omega_input: Array1<f64>) -> ParamResult<Self> {
        let n_x = epsilon_input.nrows();
        if omega_input.len() != n_x {
            return Err(ParamError::OmegaLengthMismatch { expected: n_x, actual: omega_input.len() });
        }
        let random = Self { epsilon_input, omega_input };
        validate_finite_random(random.to_flat().view())?;
        Ok(random)
    }

    pub fn zeros(n_x: usize, n_t: usize) -> Self {
        Self { epsilon_input: Array2::zeros((n_x, n_t)), omega_input: Array1::zeros(n_x) }
    }

    /// Flat length `n_x(n_t + 1)`.
    pub fn n_random(n_x: usize, n_t: usize) -> usize {
        n_x * (n_t + 1)
    }

    /// Flat index of `Epsilon_input[x, t]`.
    pub fn epsilon_index(x: usize, t: usize, n_x: usize) -> usize {
        t * n_x + x
    }

    /// Flat index of `Omega_input[x]`.
    pub fn omega_index(x: usize, n_x: usize, n_t: usize) -> usize {
        n_x * n_t + x
    }

    /// Unpack the flat layout.
    ///
    /// # Errors
    /// - [`ParamError::RandomLengthMismatch`] / [`ParamError::NonFiniteRandom`].
    pub fn from_flat(flat: ArrayView1<f64>, n_x: usize, n_t: usize) -> ParamResult<Self> {
        let expected = Self::n_random(n_x, n_t);
        if flat.len() != expected {
            return Err(ParamError::RandomLengthMismatch { expected, actual: flat.len() });
        }
        validate_finite_random(flat)?;
        let epsilon_input =
            Array2::from_shape_fn((n_x, n_t), |(x, t)| flat[Self::epsilon_index(x, t, n_x)]);
        let omega_input = flat.slice(s![n_x * n_t..]).to_owned();
        Ok(Self { epsilon_input, omega_input })
    }

    /// Pack into the flat layout.
    pub fn to_flat(&self) -> Array1<f64> {
        let (n_x, n_t) = self.epsilon_input.dim();
        let mut flat = Array1::zeros(Self::n_random(n_x, n_t));
        for ((x, t), &v) in self.epsilon_input.indexed_iter() {
            flat[Self::epsilon_index(x, t, n_x)] = v;
        }
        flat.slice_mut(s![n_x * n_t..]).assign(&self.omega_input);
        flat
    }

    /// Check dimensions against a mesh of `n_x` vertices and `n_t` years.
    ///
    /// # Errors
    /// - [`ParamError::EpsilonShapeMismatch`] / [`ParamError::OmegaLengthMismatch`].
    pub fn check_dims(&self, n_x: usize, n_t: usize) -> ParamResult<()> {
        if self.epsilon_input.dim() != (n_x, n_t) {
            return Err(ParamError::EpsilonShapeMismatch {
                expected: (n_x, n_t),
                actual: self.epsilon_input.dim(),
            });
        }
        if self.omega_input.len() != n_x {
            return Err(ParamError::OmegaLengthMismatch {
                expected: n_x,
                actual: self.omega_input.len(),
            });
        }
        Ok(())
    }
}

/// `DerivedQuantities` — SPDE summaries reported with standard errors.
///
/// - `range = √8 / κ`
/// - `sigma_e = 1 / √(4π e^{2 log_tau_E} κ²)`
/// - `sigma_o = 1 / √(4π e^{2 log_tau_O} κ²)`
///
/// `π` is `std::f64::consts::PI`. Outputs produced with `π` truncated to
/// `3.141592` (absolute difference ≈ 6.5e-7) carry `SigmaE` and `SigmaO`
/// about 1.04e-7 larger in relative terms; `Range` is unaffected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedQuantities {
    pub kappa: f64,
    pub range: f64,
    pub sigma_e: f64,
    pub sigma_o: f64,
}

impl DerivedQuantities {
    pub const NAMES: [&'static str; 3] = ["Range", "SigmaE", "SigmaO"];

    pub fn new(log_tau_e: f64, log_tau_o: f64, log_kappa: f64) -> Self {
        let kappa = log_kappa.exp();
        let marginal_sd = |log_tau: f64| {
            1.0 / (4.0 * PI * (2.0 * log_tau).exp() * (2.0 * log_kappa).exp()).sqrt()
        };
        Self {
            kappa,
            range: 8f64.sqrt() / kappa,
            sigma_e: marginal_sd(log_tau_e),
            sigma_o: marginal_sd(log_tau_o),
        }
    }

    pub fn values(&self) -> [f64; 3] {
        [self.range, self.sigma_e, self.sigma_o]
    }

    /// Gradients of `[Range, SigmaE, SigmaO]` in the flat fixed layout for
    /// `n_p` covariates.
    pub fn gradients(&self, n_p: usize) -> [Array1<f64>; 3] {
        let n = FixedParams::n_fixed(n_p);
        let (i_lte, i_lto, i_lk) = (n_p + 1, n_p + 2, n_p + 3);
        let mut g_range = Array1::zeros(n);
        g_range[i_lk] = -self.range;
        let mut g_sigma_e = Array1::zeros(n);
        g_sigma_e[i_lte] = -self.sigma_e;
        g_sigma_e[i_lk] = -self.sigma_e;
        let mut g_sigma_o = Array1::zeros(n);
        g_sigma_o[i_lto] = -self.sigma_o;
        g_sigma_o[i_lk] = -self.sigma_o;
        [g_range, g_sigma_e, g_sigma_o]
    }
}

// ---- Helper methods ----

fn validate_finite(theta: ArrayView1<f64>) -> ParamResult<()> {
    match theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        Some((index, &value)) => Err(ParamError::NonFiniteTheta { index, value }),
        None => Ok(()),
    }
}

fn validate_finite_random(flat: ArrayView1<f64>) -> ParamResult<()> {
    match flat.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        Some((index, &value)) => Err(ParamError::NonFiniteRandom { index, value }),
        None => Ok(()),
    }
}
