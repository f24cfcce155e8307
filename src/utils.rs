//! utils — conversion helpers for the Python bindings.
//!
//! Everything here is compiled only with the `python-bindings` feature and
//! converts Python inputs into validated Rust types, mapping errors into
//! `PyErr` at the boundary.
#[cfg(feature = "python-bindings")]
use ndarray::Array2;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    gompertz::core::{
        data::{GompertzData, GompertzMeta, RecordOrdering},
        laplace::InnerOptions,
        mesh::{SpdeMesh, Triplet},
        observation::ObservationModel,
        options::GompertzOptions,
    },
    optimization::nll_optimizer::{LineSearcher, MLEOptions, Tolerances},
};

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1,
};

/// Accept a 1-D `numpy.ndarray`, a pandas `Series`, or any float sequence.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        pyo3::exceptions::PyTypeError::new_err(
            "expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64",
        )
    })?;
    Ok(vec.into_pyarray(py).readonly())
}

/// Copy an array-like into an owned `Vec<f64>`.
#[cfg(feature = "python-bindings")]
pub fn extract_f64_vec<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>, name: &str,
) -> PyResult<Vec<f64>> {
    let arr = extract_f64_array(py, raw_data)?;
    let slice = arr.as_slice().map_err(|_| {
        PyValueError::new_err(format!("{name} must be a 1-D contiguous float64 array or sequence"))
    })?;
    Ok(slice.to_vec())
}

/// Build an [`SpdeMesh`] from three `(row, col, value)` triplet lists.
#[cfg(feature = "python-bindings")]
pub fn build_mesh(
    n_x: usize, g0: Vec<Triplet>, g1: Vec<Triplet>, g2: Vec<Triplet>,
) -> PyResult<SpdeMesh> {
    Ok(SpdeMesh::from_triplets(n_x, &g0, &g1, &g2)?)
}

/// Assemble [`GompertzOptions`] from optional Python keyword arguments.
///
/// Defaults: Poisson-lognormal observations, More–Thuente line search and
/// [`InnerOptions::default`] for any inner setting left unset.
#[cfg(feature = "python-bindings")]
pub fn build_gompertz_options(
    observation: Option<&str>, tol_grad: Option<f64>, tol_cost: Option<f64>,
    max_iter: Option<usize>, line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
    inner_max_iter: Option<usize>, inner_tol_grad: Option<f64>,
) -> PyResult<GompertzOptions> {
    use std::str::FromStr;

    let observation = match observation {
        Some(name) => ObservationModel::from_str(name)?,
        None => ObservationModel::PoissonLognormal,
    };
    let mle_opts = extract_mle_opts(tol_grad, tol_cost, max_iter, line_searcher, lbfgs_mem)?;
    let defaults = InnerOptions::default();
    let inner = InnerOptions::new(
        inner_max_iter.unwrap_or(defaults.max_iter),
        inner_tol_grad.unwrap_or(defaults.tol_grad),
        defaults.max_halvings,
    )?;
    Ok(GompertzOptions::new(observation, mle_opts, inner))
}

#[cfg(feature = "python-bindings")]
fn extract_mle_opts(
    tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    line_searcher: Option<&str>, lbfgs_mem: Option<usize>,
) -> PyResult<MLEOptions> {
    use std::str::FromStr;

    let tols = Tolerances::new(tol_grad, tol_cost, max_iter)?;
    let ls = match line_searcher {
        Some(name) => LineSearcher::from_str(name)?,
        None => LineSearcher::MoreThuente,
    };
    Ok(MLEOptions::new(tols, ls, lbfgs_mem)?)
}

/// Build validated [`GompertzData`].
///
/// `counts` may contain `NaN` for missing records. `covariates` is given
/// row-major, one row per mesh vertex. `ordering` is `"strict"` (default) or
/// `"trusted"`.
#[cfg(feature = "python-bindings")]
pub fn extract_gompertz_data<'py>(
    py: Python<'py>, counts: &Bound<'py, PyAny>, x_s: Vec<usize>, t_i: Vec<usize>,
    covariates: Vec<Vec<f64>>, n_t: usize, ordering: Option<&str>,
) -> PyResult<GompertzData> {
    let counts: Vec<Option<f64>> = extract_f64_vec(py, counts, "counts")?
        .into_iter()
        .map(|c| if c.is_nan() { None } else { Some(c) })
        .collect();

    let n_rows = covariates.len();
    let n_cols = covariates.first().map_or(0, Vec::len);
    if covariates.iter().any(|row| row.len() != n_cols) {
        return Err(PyValueError::new_err("covariates rows must all have the same length"));
    }
    let flat: Vec<f64> = covariates.into_iter().flatten().collect();
    let covariates = Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let ordering = match ordering.map(|s| s.trim().to_lowercase()) {
        None => RecordOrdering::Strict,
        Some(s) if s == "strict" => RecordOrdering::Strict,
        Some(s) if s == "trusted" => RecordOrdering::Trusted,
        Some(other) => {
            return Err(PyValueError::new_err(format!(
                "ordering must be 'strict' or 'trusted', got '{other}'"
            )));
        }
    };

    Ok(GompertzData::new(counts, x_s, t_i, covariates, GompertzMeta::new(n_t, ordering))?)
}
