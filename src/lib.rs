//! spatial_gompertz — spatio-temporal Gompertz population model on an SPDE
//! mesh, with optional Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the model to Python via the `_spatial_gompertz` extension module
//! when the `python-bindings` feature is enabled.
//!
//! Key behaviors
//! -------------
//! - Re-export the core modules: `gompertz` (mesh, GMRF density, observation
//!   kernels, recursion, joint likelihood, Laplace marginal, model),
//!   `inference` (covariance and delta-method standard errors) and
//!   `optimization` (argmin-backed L-BFGS and numerical helpers).
//! - Define `#[pyclass]` wrappers and the `#[pymodule]` initializer for the
//!   `_spatial_gompertz` Python extension.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; this file performs only
//!   FFI glue, input conversion and error mapping.
//! - Errors from core Rust code are converted to `PyErr` at the PyO3
//!   boundary through the `From` impls of each error type.
//!
//! Conventions
//! -----------
//! - Python receives flat parameter vectors in the natural layout
//!   `[alpha…, phi, log_tau_E, log_tau_O, log_kappa, rho, theta_z…]` and the
//!   random layout `[Epsilon (year-major)…, Omega…]`.
//! - Missing counts are passed as `NaN`.
//! - Structured results (reports, standard errors) cross the boundary as
//!   JSON strings.
//!
//! Downstream usage
//! ----------------
//! - Native Rust code should depend on [`gompertz::SpatialGompertz`] and the
//!   [`inference`] types directly and ignore the PyO3 items.

pub mod gompertz;
pub mod inference;
pub mod optimization;
pub mod utils;

#[cfg(feature = "python-bindings")]
use ndarray::Array1;

#[cfg(feature = "python-bindings")]
use pyo3::{prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    gompertz::{
        core::{data::GompertzData, mesh::Triplet, params::FixedParams},
        errors::GompertzError,
        models::SpatialGompertz,
    },
    optimization::nll_optimizer::OptimOutcome,
    utils::{build_gompertz_options, build_mesh, extract_f64_vec, extract_gompertz_data},
};

/// GompertzDataset — validated observations passed to model methods.
///
/// Constructed from Python via
/// `GompertzDataset(counts, x_s, t_i, covariates, n_t, ordering=None)`:
/// - `counts`: array-like of `f64`, `NaN` for a missing record.
/// - `x_s`, `t_i`: vertex and year of each record.
/// - `covariates`: `n_x` rows of `n_p` values.
/// - `n_t`: number of modeled years.
/// - `ordering`: `"strict"` (default) or `"trusted"`.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "spatial_gompertz.models")]
pub struct GompertzDataset {
    pub inner: GompertzData,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl GompertzDataset {
    #[new]
    #[pyo3(
        signature = (counts, x_s, t_i, covariates, n_t, ordering = None),
        text_signature = "(counts, x_s, t_i, covariates, n_t, /, ordering='strict')"
    )]
    pub fn new<'py>(
        py: Python<'py>, counts: &Bound<'py, PyAny>, x_s: Vec<usize>, t_i: Vec<usize>,
        covariates: Vec<Vec<f64>>, n_t: usize, ordering: Option<&str>,
    ) -> PyResult<Self> {
        let inner = extract_gompertz_data(py, counts, x_s, t_i, covariates, n_t, ordering)?;
        Ok(GompertzDataset { inner })
    }

    #[getter]
    pub fn n_i(&self) -> usize {
        self.inner.n_i()
    }

    #[getter]
    pub fn n_x(&self) -> usize {
        self.inner.n_x()
    }

    #[getter]
    pub fn n_p(&self) -> usize {
        self.inner.n_p()
    }

    #[getter]
    pub fn n_t(&self) -> usize {
        self.inner.n_t()
    }
}

/// SpatialGompertzModel — Python-facing wrapper around [`SpatialGompertz`].
///
/// Purpose
/// -------
/// Build the SPDE mesh from triplet lists, evaluate the joint NLL with its
/// exact gradient, fit the fixed parameters on the Laplace marginal and
/// report delta-method standard errors.
///
/// Parameters
/// ----------
/// Constructed from Python via
/// `SpatialGompertzModel(n_x, g0, g1, g2, observation='poisson_lognormal', ...)`
/// where each `g*` is a list of `(row, col, value)` triplets; duplicates are
/// summed. Optimizer keywords mirror [`MLEOptions`](crate::optimization::nll_optimizer::MLEOptions);
/// `inner_max_iter` and `inner_tol_grad` control the Newton solve for the
/// random effects.
///
/// Notes
/// -----
/// - `unsendable`: the model keeps warm-start scratch behind `RefCell`.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "spatial_gompertz.models", unsendable)]
pub struct SpatialGompertzModel {
    pub inner: SpatialGompertz,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl SpatialGompertzModel {
    #[new]
    #[pyo3(
        signature = (
            n_x,
            g0,
            g1,
            g2,
            observation = None,
            tol_grad = None,
            tol_cost = None,
            max_iter = None,
            line_searcher = None,
            lbfgs_mem = None,
            inner_max_iter = None,
            inner_tol_grad = None,
        ),
        text_signature = "(n_x, g0, g1, g2, /, observation='poisson_lognormal', tol_grad=None, \
                          tol_cost=None, max_iter=None, line_searcher=None, lbfgs_mem=None, \
                          inner_max_iter=None, inner_tol_grad=None)"
    )]
    pub fn new(
        n_x: usize, g0: Vec<Triplet>, g1: Vec<Triplet>, g2: Vec<Triplet>,
        observation: Option<&str>, tol_grad: Option<f64>, tol_cost: Option<f64>,
        max_iter: Option<usize>, line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
        inner_max_iter: Option<usize>, inner_tol_grad: Option<f64>,
    ) -> PyResult<Self> {
        let mesh = build_mesh(n_x, g0, g1, g2)?;
        let options = build_gompertz_options(
            observation,
            tol_grad,
            tol_cost,
            max_iter,
            line_searcher,
            lbfgs_mem,
            inner_max_iter,
            inner_tol_grad,
        )?;
        Ok(SpatialGompertzModel { inner: SpatialGompertz::new(mesh, options) })
    }

    /// Joint NLL and its gradients `(jnll, grad_fixed, grad_random)`.
    #[pyo3(signature = (theta, random, data), text_signature = "(self, theta, random, data, /)")]
    pub fn evaluate<'py>(
        &self, py: Python<'py>, theta: &Bound<'py, PyAny>, random: &Bound<'py, PyAny>,
        data: PyRef<'py, GompertzDataset>,
    ) -> PyResult<(f64, Vec<f64>, Vec<f64>)> {
        let theta = Array1::from(extract_f64_vec(py, theta, "theta")?);
        let random = Array1::from(extract_f64_vec(py, random, "random")?);
        let (jnll, grad) = self.inner.evaluate_flat(theta.view(), random.view(), &data.inner)?;
        Ok((jnll, grad.fixed.to_vec(), grad.random.to_vec()))
    }

    /// Named report at `(theta, random)` as a JSON string.
    #[pyo3(signature = (theta, random, data), text_signature = "(self, theta, random, data, /)")]
    pub fn report_json<'py>(
        &self, py: Python<'py>, theta: &Bound<'py, PyAny>, random: &Bound<'py, PyAny>,
        data: PyRef<'py, GompertzDataset>,
    ) -> PyResult<String> {
        use crate::gompertz::core::params::RandomEffects;

        let d = &data.inner;
        let theta = Array1::from(extract_f64_vec(py, theta, "theta")?);
        let random = Array1::from(extract_f64_vec(py, random, "random")?);
        let params = FixedParams::from_theta(theta.view(), d.n_p()).map_err(GompertzError::from)?;
        let random =
            RandomEffects::from_flat(random.view(), d.n_x(), d.n_t()).map_err(GompertzError::from)?;
        let report = self.inner.report(&params, &random, d)?;
        Ok(report.to_json()?)
    }

    /// Laplace marginal NLL at `theta`.
    #[pyo3(signature = (theta, data), text_signature = "(self, theta, data, /)")]
    pub fn laplace_nll<'py>(
        &self, py: Python<'py>, theta: &Bound<'py, PyAny>, data: PyRef<'py, GompertzDataset>,
    ) -> PyResult<f64> {
        let theta = Array1::from(extract_f64_vec(py, theta, "theta")?);
        let params =
            FixedParams::from_theta(theta.view(), data.inner.n_p()).map_err(GompertzError::from)?;
        Ok(self.inner.laplace(&params, &data.inner)?.nll)
    }

    #[pyo3(signature = (theta0, data), text_signature = "(self, theta0, data, /)")]
    pub fn fit<'py>(
        &mut self, py: Python<'py>, theta0: &Bound<'py, PyAny>, data: PyRef<'py, GompertzDataset>,
    ) -> PyResult<()> {
        let theta0 = Array1::from(extract_f64_vec(py, theta0, "theta0")?);
        let params =
            FixedParams::from_theta(theta0.view(), data.inner.n_p()).map_err(GompertzError::from)?;
        self.inner.fit(params, &data.inner)?;
        Ok(())
    }

    /// Standard errors at the fitted optimum as a JSON string.
    #[pyo3(signature = (data), text_signature = "(self, data, /)")]
    pub fn sd_report(&self, data: PyRef<'_, GompertzDataset>) -> PyResult<String> {
        let report = self.inner.sd_report(&data.inner)?;
        Ok(report.to_json()?)
    }

    #[getter]
    pub fn results(&self) -> PyResult<GompertzOptimOutcome> {
        match &self.inner.results {
            Some(outcome) => Ok(GompertzOptimOutcome { inner: outcome.clone() }),
            None => Err(GompertzError::ModelNotFitted.into()),
        }
    }

    /// Fitted fixed parameters in the natural flat layout.
    #[getter]
    pub fn fitted_params(&self) -> PyResult<Vec<f64>> {
        Ok(self.inner.fitted_params()?.to_theta().to_vec())
    }

    /// Random-effects mode at the fitted parameters.
    #[getter]
    pub fn fitted_mode(&self) -> PyResult<Vec<f64>> {
        match &self.inner.fitted_mode {
            Some(mode) => Ok(mode.mode.to_vec()),
            None => Err(GompertzError::ModelNotFitted.into()),
        }
    }

    #[getter]
    pub fn fitted_report_json(&self) -> PyResult<String> {
        Ok(self.inner.fitted_report()?.to_json()?)
    }
}

/// GompertzOptimOutcome — read-only view of the outer optimizer result.
///
/// `theta_hat` is in optimizer space (`rho` on the raw tanh scale,
/// `theta_z` dropped under Poisson).
#[cfg(feature = "python-bindings")]
#[pyclass(module = "spatial_gompertz.models")]
pub struct GompertzOptimOutcome {
    pub inner: OptimOutcome,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl GompertzOptimOutcome {
    #[getter]
    pub fn theta_hat(&self) -> Vec<f64> {
        self.inner.theta_hat.to_vec()
    }

    #[getter]
    pub fn value(&self) -> f64 {
        self.inner.value
    }

    #[getter]
    pub fn converged(&self) -> bool {
        self.inner.converged
    }

    #[getter]
    pub fn status(&self) -> String {
        self.inner.status.clone()
    }

    #[getter]
    pub fn iterations(&self) -> usize {
        self.inner.iterations
    }

    #[getter]
    pub fn grad_norm(&self) -> Option<f64> {
        self.inner.grad_norm
    }

    #[getter]
    pub fn fn_evals(&self) -> Vec<(String, u64)> {
        self.inner.fn_evals.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }
}

/// Initialize the `_spatial_gompertz` extension module and register the
/// `models` submodule under `spatial_gompertz.models`.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _spatial_gompertz<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let models_mod = PyModule::new(_py, "models")?;
    models(_py, m, &models_mod)?;

    // Manually add the submodule into sys.modules to allow for dot notation.
    _py.import("sys")?.getattr("modules")?.set_item("spatial_gompertz.models", models_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn models<'py>(
    _py: Python, spatial_gompertz: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<GompertzDataset>()?;
    m.add_class::<SpatialGompertzModel>()?;
    m.add_class::<GompertzOptimOutcome>()?;
    spatial_gompertz.add_submodule(m)?;
    Ok(())
}
