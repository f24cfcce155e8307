//! Error handling for standard-error computations.
//!
//! `InferenceError` collects the failures that can occur between a fitted
//! model and its [`SdReport`](super::SdReport): the model has not been
//! fitted, the finite-difference Hessian could not be built, or the inputs
//! handed to the delta method do not line up. `InferenceResult<T>` is the
//! return alias used across `inference`.
#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

use crate::{gompertz::errors::GompertzError, optimization::errors::OptError};

#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    // ---- Fit state ----
    /// Standard errors need a fitted model.
    ModelNotFitted,

    // ---- Hessian ----
    /// The finite-difference Hessian of the marginal NLL failed.
    Hessian(OptError),

    // ---- Delta method ----
    /// Covariance and gradient dimensions disagree.
    CovarianceDimMismatch { expected: usize, actual: usize },

    // ---- Model passthrough ----
    Model { text: String },

    // ---- Fallback ----
    UnknownError,
}

pub type InferenceResult<T> = Result<T, InferenceError>;

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Fit state ----
            InferenceError::ModelNotFitted => {
                write!(f, "Inference Error: model has not been fitted")
            }

            // ---- Hessian ----
            InferenceError::Hessian(err) => {
                write!(f, "Inference Error: Hessian computation failed: {err}")
            }

            // ---- Delta method ----
            InferenceError::CovarianceDimMismatch { expected, actual } => write!(
                f,
                "Inference Error: covariance dimension mismatch (expected {expected}, actual {actual})"
            ),

            // ---- Model passthrough ----
            InferenceError::Model { text } => write!(f, "Inference Error: {text}"),

            // ---- Fallback ----
            InferenceError::UnknownError => write!(f, "Inference Error: Unknown error occurred"),
        }
    }
}

impl std::error::Error for InferenceError {}

impl From<OptError> for InferenceError {
    fn from(err: OptError) -> Self {
        match err {
            OptError::ModelNotFitted => InferenceError::ModelNotFitted,
            other => InferenceError::Hessian(other),
        }
    }
}

impl From<GompertzError> for InferenceError {
    fn from(err: GompertzError) -> Self {
        match err {
            GompertzError::ModelNotFitted => InferenceError::ModelNotFitted,
            other => InferenceError::Model { text: other.to_string() },
        }
    }
}

#[cfg(feature = "python-bindings")]
impl From<InferenceError> for PyErr {
    fn from(err: InferenceError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
