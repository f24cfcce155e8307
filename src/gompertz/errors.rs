//! Errors for the spatial Gompertz model (mesh and data preconditions,
//! parameter layout, configuration, and fit state).
//!
//! This module defines the model error type, [`GompertzError`], and a
//! parameter error type, [`ParamError`]. Both implement `Display`/`Error` and,
//! with the `python-bindings` feature, convert to `PyErr`.
//!
//! ## Conventions
//! - **Indices are 0-based** (match Rust/NumPy).
//! - Everything here is a precondition failure. Numerical domain failures
//!   (non-positive-definite precision, `rho` near 1) are reported as a
//!   non-finite objective instead and never become an error.
#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*};

/// Crate-wide result alias for model operations that may produce
/// [`GompertzError`].
pub type GompertzResult<T> = Result<T, GompertzError>;

/// Result alias for parameter construction and unpacking.
pub type ParamResult<T> = Result<T, ParamError>;

/// Unified error type for the spatial Gompertz model.
#[derive(Debug, Clone, PartialEq)]
pub enum GompertzError {
    // ---- Mesh ----
    /// A structural matrix is not square.
    MeshNotSquare { name: &'static str, nrows: usize, ncols: usize },

    /// The three structural matrices disagree on size.
    MeshDimensionMismatch { name: &'static str, expected: usize, actual: usize },

    /// A structural matrix entry is NaN/±inf.
    NonFiniteMeshEntry { name: &'static str, row: usize, col: usize, value: f64 },

    /// A structural matrix is not numerically symmetric.
    MeshNotSymmetric { name: &'static str, row: usize, col: usize },

    /// A triplet points outside the mesh.
    TripletOutOfBounds { name: &'static str, row: usize, col: usize, n_x: usize },

    /// The mesh has no vertices.
    EmptyMesh,

    // ---- Observations ----
    /// `counts`, `x_s` and `t_i` must have the same length.
    ObservationLengthMismatch { counts: usize, x_s: usize, t_i: usize },

    /// At least one year is required.
    InvalidNumYears { n_t: usize },

    /// The covariate matrix must have at least one row (vertex).
    EmptyCovariates,

    /// A covariate entry is NaN/±inf.
    NonFiniteCovariate { row: usize, col: usize, value: f64 },

    /// `x_s[i]` is not a mesh vertex.
    SiteOutOfRange { index: usize, site: usize, n_x: usize },

    /// `t_i[i]` is not a modeled year.
    TimeOutOfRange { index: usize, time: usize, n_t: usize },

    /// Counts must be finite, non-negative integers.
    InvalidCount { index: usize, value: f64 },

    // ---- Record ordering ----
    /// Record `index` with `t > 0` is not preceded by the same vertex one
    /// year earlier.
    RecordOrderViolated {
        index: usize,
        site: usize,
        time: usize,
        prev_site: usize,
        prev_time: usize,
    },

    /// Record 0 has `t > 0`, so the recursion has nothing to read.
    MissingPredecessor { index: usize, time: usize },

    // ---- Dimensions across inputs ----
    /// Covariate rows must equal the mesh size.
    MeshDataMismatch { mesh_n_x: usize, data_n_x: usize },

    /// A field vector has the wrong length for the precision matrix.
    FieldLengthMismatch { expected: usize, actual: usize },

    // ---- Configuration ----
    /// Unknown observation-model code or name.
    UnknownObservationModel { value: String },

    /// Inner Newton settings must be positive and finite.
    InvalidInnerOptions { reason: &'static str },

    // ---- Reporting / fit state ----
    /// JSON serialization of the report failed.
    Serialization { text: String },

    /// Model hasn't been fitted yet.
    ModelNotFitted,

    // ---- Parameters ----
    InvalidParams(ParamError),
}

impl std::error::Error for GompertzError {}

impl std::fmt::Display for GompertzError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Mesh ----
            GompertzError::MeshNotSquare { name, nrows, ncols } => {
                write!(f, "Mesh matrix {name} must be square; got {nrows} x {ncols}")
            }
            GompertzError::MeshDimensionMismatch { name, expected, actual } => {
                write!(f, "Mesh matrix {name} has dimension {actual}, expected {expected}")
            }
            GompertzError::NonFiniteMeshEntry { name, row, col, value } => {
                write!(f, "Mesh matrix {name} has non-finite entry at ({row}, {col}): {value}")
            }
            GompertzError::MeshNotSymmetric { name, row, col } => {
                write!(f, "Mesh matrix {name} is not symmetric at ({row}, {col})")
            }
            GompertzError::TripletOutOfBounds { name, row, col, n_x } => {
                write!(f, "Triplet ({row}, {col}) for {name} is outside a mesh of {n_x} vertices")
            }
            GompertzError::EmptyMesh => write!(f, "Mesh must have at least one vertex."),

            // ---- Observations ----
            GompertzError::ObservationLengthMismatch { counts, x_s, t_i } => write!(
                f,
                "Observation arrays must have equal length; got c_i = {counts}, x_s = {x_s}, t_i = {t_i}"
            ),
            GompertzError::InvalidNumYears { n_t } => {
                write!(f, "Number of years must be >= 1; got {n_t}")
            }
            GompertzError::EmptyCovariates => {
                write!(f, "Covariate matrix X_xp must have one row per mesh vertex (n_x >= 1).")
            }
            GompertzError::NonFiniteCovariate { row, col, value } => {
                write!(f, "Covariate X_xp[{row}, {col}] is non-finite: {value}")
            }
            GompertzError::SiteOutOfRange { index, site, n_x } => {
                write!(f, "x_s[{index}] = {site} is out of range for n_x = {n_x}")
            }
            GompertzError::TimeOutOfRange { index, time, n_t } => {
                write!(f, "t_i[{index}] = {time} is out of range for n_t = {n_t}")
            }
            GompertzError::InvalidCount { index, value } => {
                write!(
                    f,
                    "Count c_i[{index}] must be a finite non-negative integer or missing; got {value}"
                )
            }

            // ---- Record ordering ----
            GompertzError::RecordOrderViolated { index, site, time, prev_site, prev_time } => {
                write!(
                    f,
                    "Record {index} (vertex {site}, year {time}) must follow vertex {site} year {}; \
                     previous record is vertex {prev_site} year {prev_time}",
                    time.saturating_sub(1)
                )
            }
            GompertzError::MissingPredecessor { index, time } => {
                write!(f, "Record {index} has year {time} > 0 but no preceding record")
            }

            // ---- Dimensions across inputs ----
            GompertzError::MeshDataMismatch { mesh_n_x, data_n_x } => write!(
                f,
                "Mesh has {mesh_n_x} vertices but covariates have {data_n_x} rows"
            ),
            GompertzError::FieldLengthMismatch { expected, actual } => {
                write!(f, "Field length mismatch: expected {expected}, got {actual}")
            }

            // ---- Configuration ----
            GompertzError::UnknownObservationModel { value } => write!(
                f,
                "Unknown observation model '{value}'; use 0/'poisson' or 1/'poisson_lognormal'"
            ),
            GompertzError::InvalidInnerOptions { reason } => {
                write!(f, "Invalid inner optimizer options: {reason}")
            }

            // ---- Reporting / fit state ----
            GompertzError::Serialization { text } => {
                write!(f, "Report serialization failed: {text}")
            }
            GompertzError::ModelNotFitted => write!(f, "Model hasn't been fitted yet."),

            // ---- Parameters ----
            GompertzError::InvalidParams(err) => write!(f, "Invalid parameters: {err}"),
        }
    }
}

impl From<ParamError> for GompertzError {
    fn from(err: ParamError) -> GompertzError {
        GompertzError::InvalidParams(err)
    }
}

impl From<serde_json::Error> for GompertzError {
    fn from(err: serde_json::Error) -> GompertzError {
        GompertzError::Serialization { text: err.to_string() }
    }
}

/// Convert a [`GompertzError`] into a Python `ValueError` with the error
/// message.
#[cfg(feature = "python-bindings")]
impl std::convert::From<GompertzError> for PyErr {
    fn from(err: GompertzError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Errors specific to parameter construction and flat-vector unpacking.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    /// Flat fixed-parameter vector has the wrong length.
    ThetaLengthMismatch { expected: usize, actual: usize },

    /// Flat random-effect vector has the wrong length.
    RandomLengthMismatch { expected: usize, actual: usize },

    /// Fixed parameters must be finite.
    NonFiniteTheta { index: usize, value: f64 },

    /// Random effects must be finite.
    NonFiniteRandom { index: usize, value: f64 },

    /// `Epsilon_input` must be `n_x × n_t`.
    EpsilonShapeMismatch { expected: (usize, usize), actual: (usize, usize) },

    /// `Omega_input` must have length `n_x`.
    OmegaLengthMismatch { expected: usize, actual: usize },

    /// `alpha` must have one coefficient per covariate column.
    AlphaLengthMismatch { expected: usize, actual: usize },
}

impl std::error::Error for ParamError {}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamError::ThetaLengthMismatch { expected, actual } => {
                write!(f, "Theta length mismatch: expected {expected}, got {actual}")
            }
            ParamError::RandomLengthMismatch { expected, actual } => {
                write!(f, "Random-effect length mismatch: expected {expected}, got {actual}")
            }
            ParamError::NonFiniteTheta { index, value } => {
                write!(f, "Fixed parameter at index {index} must be finite, got {value}")
            }
            ParamError::NonFiniteRandom { index, value } => {
                write!(f, "Random effect at index {index} must be finite, got {value}")
            }
            ParamError::EpsilonShapeMismatch { expected, actual } => {
                write!(f, "Epsilon_input shape mismatch: expected {expected:?}, got {actual:?}")
            }
            ParamError::OmegaLengthMismatch { expected, actual } => {
                write!(f, "Omega_input length mismatch: expected {expected}, got {actual}")
            }
            ParamError::AlphaLengthMismatch { expected, actual } => {
                write!(f, "Alpha length mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

/// Convert a [`ParamError`] into a Python `ValueError` with the error message.
#[cfg(feature = "python-bindings")]
impl std::convert::From<ParamError> for PyErr {
    fn from(err: ParamError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
