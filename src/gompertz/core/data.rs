//! Observation containers for the spatial Gompertz model.
//!
//! Purpose
//! -------
//! Validate count records, their vertex and year indices, and the per-vertex
//! covariate matrix once, at the boundary, so the recursion and likelihood
//! can index without re-checking.
//!
//! Key behaviors
//! -------------
//! - [`GompertzData::new`] enforces equal record lengths, index bounds,
//!   count validity and finite covariates.
//! - [`GompertzMeta`] carries the number of years and the
//!   [`RecordOrdering`] policy used to check that every record with `t > 0`
//!   follows its own vertex one year earlier.
//!
//! Invariants & assumptions
//! ------------------------
//! - `counts`, `x_s`, `t_i` have equal length `n_i` (possibly zero).
//! - `x_s[i] < n_x` where `n_x = covariates.nrows() ≥ 1`; `t_i[i] < n_t`,
//!   `n_t ≥ 1`.
//! - Counts are `None` (missing) or finite non-negative integers.
//! - Record `0` never has `t > 0`.
//!
//! Conventions
//! -----------
//! - The recursion reads the literal previous record for `t > 0`. Under
//!   [`RecordOrdering::Strict`] that record must be the same vertex one year
//!   earlier; under [`RecordOrdering::Trusted`] mismatches are logged at
//!   `warn` and accepted.
//!
//! Testing notes
//! -------------
//! - Unit tests cover each validation error and both ordering policies.
use ndarray::Array2;

use crate::gompertz::errors::{GompertzError, GompertzResult};

/// How strictly record order is checked against the recursion's
/// previous-record convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrdering {
    /// Record `i − 1` must be vertex `x_s[i]` at year `t_i[i] − 1`.
    #[default]
    Strict,
    /// Accept any order; mismatches are logged.
    Trusted,
}

/// `GompertzMeta` — dimensions and ordering policy of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GompertzMeta {
    /// Number of modeled years (columns of `Epsilon_input`).
    pub n_t: usize,
    pub ordering: RecordOrdering,
}

impl GompertzMeta {
    pub fn new(n_t: usize, ordering: RecordOrdering) -> Self {
        Self { n_t, ordering }
    }
}

/// `GompertzData` — validated counts, indices and covariates.
///
/// Fields
/// ------
/// - `counts`: `c_i`, `None` for a missing record.
/// - `x_s`: vertex of each record.
/// - `t_i`: year of each record.
/// - `covariates`: `X_xp`, one row per mesh vertex.
/// - `meta`: [`GompertzMeta`].
#[derive(Debug, Clone, PartialEq)]
pub struct GompertzData {
    pub counts: Vec<Option<f64>>,
    pub x_s: Vec<usize>,
    pub t_i: Vec<usize>,
    pub covariates: Array2<f64>,
    pub meta: GompertzMeta,
}

impl GompertzData {
    /// Construct validated observations.
    ///
    /// # Errors
    /// - [`GompertzError::ObservationLengthMismatch`],
    ///   [`GompertzError::InvalidNumYears`], [`GompertzError::EmptyCovariates`],
    ///   [`GompertzError::NonFiniteCovariate`], [`GompertzError::SiteOutOfRange`],
    ///   [`GompertzError::TimeOutOfRange`], [`GompertzError::InvalidCount`].
    /// - [`GompertzError::MissingPredecessor`] if record 0 has `t > 0`.
    /// - [`GompertzError::RecordOrderViolated`] under
    ///   [`RecordOrdering::Strict`].
    pub fn new(
        counts: Vec<Option<f64>>, x_s: Vec<usize>, t_i: Vec<usize>, covariates: Array2<f64>,
        meta: GompertzMeta,
    ) -> GompertzResult<Self> {
        if counts.len() != x_s.len() || counts.len() != t_i.len() {
            return Err(GompertzError::ObservationLengthMismatch {
                counts: counts.len(),
                x_s: x_s.len(),
                t_i: t_i.len(),
            });
        }
        if meta.n_t == 0 {
            return Err(GompertzError::InvalidNumYears { n_t: meta.n_t });
        }
        let n_x = covariates.nrows();
        if n_x == 0 {
            return Err(GompertzError::EmptyCovariates);
        }
        if let Some(((row, col), &value)) = covariates.indexed_iter().find(|(_, v)| !v.is_finite())
        {
            return Err(GompertzError::NonFiniteCovariate { row, col, value });
        }
        for (index, ((&site, &time), count)) in x_s.iter().zip(&t_i).zip(&counts).enumerate() {
            if site >= n_x {
                return Err(GompertzError::SiteOutOfRange { index, site, n_x });
            }
            if time >= meta.n_t {
                return Err(GompertzError::TimeOutOfRange { index, time, n_t: meta.n_t });
            }
            if let Some(value) = *count {
                if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                    return Err(GompertzError::InvalidCount { index, value });
                }
            }
        }
        validate_record_order(&x_s, &t_i, meta.ordering)?;
        Ok(Self { counts, x_s, t_i, covariates, meta })
    }

    /// Number of records.
    pub fn n_i(&self) -> usize {
        self.counts.len()
    }

    /// Number of mesh vertices.
    pub fn n_x(&self) -> usize {
        self.covariates.nrows()
    }

    /// Number of covariates.
    pub fn n_p(&self) -> usize {
        self.covariates.ncols()
    }

    /// Number of years.
    pub fn n_t(&self) -> usize {
        self.meta.n_t
    }

    /// Counts with missing records as `NaN`.
    pub fn counts_with_nan(&self) -> Vec<f64> {
        self.counts.iter().map(|c| c.unwrap_or(f64::NAN)).collect()
    }
}

fn validate_record_order(
    x_s: &[usize], t_i: &[usize], ordering: RecordOrdering,
) -> GompertzResult<()> {
    if let Some(&time) = t_i.first() {
        if time > 0 {
            return Err(GompertzError::MissingPredecessor { index: 0, time });
        }
    }
    for index in 1..t_i.len() {
        let (site, time) = (x_s[index], t_i[index]);
        if time == 0 {
            continue;
        }
        let (prev_site, prev_time) = (x_s[index - 1], t_i[index - 1]);
        if prev_site == site && prev_time + 1 == time {
            continue;
        }
        match ordering {
            RecordOrdering::Strict => {
                return Err(GompertzError::RecordOrderViolated {
                    index,
                    site,
                    time,
                    prev_site,
                    prev_time,
                });
            }
            RecordOrdering::Trusted => log::warn!(
                "record {index} (vertex {site}, year {time}) follows vertex {prev_site} year \
                 {prev_time}; recursion uses the previous record as given"
            ),
        }
    }
    Ok(())
}
