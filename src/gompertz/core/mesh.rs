//! SPDE mesh structural matrices and the precision builder.
//!
//! Purpose
//! -------
//! Hold the finite-element matrices `G0, G1, G2` of a triangulated mesh and
//! assemble the Matérn/SPDE precision `Q(κ) = κ⁴G0 + 2κ²G1 + G2` from them.
//!
//! Key behaviors
//! -------------
//! - [`SpdeMesh::new`] validates the matrices once (square, equal size,
//!   finite, numerically symmetric); afterwards the mesh is read-only.
//! - [`SpdeMesh::from_triplets`] builds the matrices from `(row, col, value)`
//!   triplets, summing duplicates.
//! - [`SpdeMesh::precision`] and [`SpdeMesh::precision_dlog_kappa`] return
//!   `Q` and `∂Q/∂log κ = 4κ⁴G0 + 4κ²G1`.
//!
//! Invariants & assumptions
//! ------------------------
//! - All three matrices are `n_x × n_x` with `n_x ≥ 1`.
//! - Positive-definiteness of `Q` is not checked here; the GMRF evaluator
//!   reports a non-PD `Q` as an infinite negative log-density.
//!
//! Testing notes
//! -------------
//! - Unit tests compare `Q` with a hand-computed dense matrix, check the
//!   `log κ` derivative against finite differences, and cover each
//!   validation failure.
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::gompertz::errors::{GompertzError, GompertzResult};

/// Relative tolerance for the symmetry check on `G0, G1, G2`.
const SYMMETRY_TOL: f64 = 1e-10;

/// `(row, col, value)` entry of a sparse structural matrix.
pub type Triplet = (usize, usize, f64);

/// `SpdeMesh` — validated finite-element matrices of a spatial mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SpdeMesh {
    g0: CscMatrix<f64>,
    g1: CscMatrix<f64>,
    g2: CscMatrix<f64>,
}

impl SpdeMesh {
    /// Validate and store the structural matrices.
    ///
    /// # Errors
    /// - [`GompertzError::EmptyMesh`] for a `0 × 0` `G0`.
    /// - [`GompertzError::MeshNotSquare`], [`GompertzError::MeshDimensionMismatch`],
    ///   [`GompertzError::NonFiniteMeshEntry`] or
    ///   [`GompertzError::MeshNotSymmetric`] for malformed matrices.
    pub fn new(
        g0: CscMatrix<f64>, g1: CscMatrix<f64>, g2: CscMatrix<f64>,
    ) -> GompertzResult<Self> {
        let n_x = g0.nrows();
        if n_x == 0 {
            return Err(GompertzError::EmptyMesh);
        }
        for (name, g) in [("G0", &g0), ("G1", &g1), ("G2", &g2)] {
            validate_structural(name, g, n_x)?;
        }
        Ok(Self { g0, g1, g2 })
    }

    /// Build the mesh from triplet lists; duplicate coordinates are summed.
    ///
    /// # Errors
    /// - [`GompertzError::EmptyMesh`] if `n_x == 0`.
    /// - [`GompertzError::TripletOutOfBounds`] for an index `≥ n_x`.
    /// - Any validation error of [`SpdeMesh::new`].
    pub fn from_triplets(
        n_x: usize, g0: &[Triplet], g1: &[Triplet], g2: &[Triplet],
    ) -> GompertzResult<Self> {
        if n_x == 0 {
            return Err(GompertzError::EmptyMesh);
        }
        let g0 = csc_from_triplets("G0", n_x, g0)?;
        let g1 = csc_from_triplets("G1", n_x, g1)?;
        let g2 = csc_from_triplets("G2", n_x, g2)?;
        Self::new(g0, g1, g2)
    }

    /// Number of mesh vertices.
    pub fn n_x(&self) -> usize {
        self.g0.nrows()
    }

    pub fn g0(&self) -> &CscMatrix<f64> {
        &self.g0
    }

    pub fn g1(&self) -> &CscMatrix<f64> {
        &self.g1
    }

    pub fn g2(&self) -> &CscMatrix<f64> {
        &self.g2
    }

    /// `Q = κ⁴G0 + 2κ²G1 + G2` with `κ = exp(log_kappa)`.
    pub fn precision(&self, log_kappa: f64) -> CscMatrix<f64> {
        let kappa2 = (2.0 * log_kappa).exp();
        self.combine(kappa2 * kappa2, 2.0 * kappa2, 1.0)
    }

    /// `∂Q/∂log κ = 4κ⁴G0 + 4κ²G1`.
    pub fn precision_dlog_kappa(&self, log_kappa: f64) -> CscMatrix<f64> {
        let kappa2 = (2.0 * log_kappa).exp();
        self.combine(4.0 * kappa2 * kappa2, 4.0 * kappa2, 0.0)
    }

    // ---- Helper methods ----

    fn combine(&self, c0: f64, c1: f64, c2: f64) -> CscMatrix<f64> {
        let n_x = self.n_x();
        let mut coo = CooMatrix::new(n_x, n_x);
        for (coef, g) in [(c0, &self.g0), (c1, &self.g1), (c2, &self.g2)] {
            if coef == 0.0 {
                continue;
            }
            for (i, j, v) in g.triplet_iter() {
                coo.push(i, j, coef * v);
            }
        }
        CscMatrix::from(&coo)
    }
}

fn csc_from_triplets(
    name: &'static str, n_x: usize, triplets: &[Triplet],
) -> GompertzResult<CscMatrix<f64>> {
    let mut coo = CooMatrix::new(n_x, n_x);
    for &(row, col, value) in triplets {
        if row >= n_x || col >= n_x {
            return Err(GompertzError::TripletOutOfBounds { name, row, col, n_x });
        }
        coo.push(row, col, value);
    }
    Ok(CscMatrix::from(&coo))
}

fn validate_structural(name: &'static str, g: &CscMatrix<f64>, n_x: usize) -> GompertzResult<()> {
    if g.nrows() != g.ncols() {
        return Err(GompertzError::MeshNotSquare { name, nrows: g.nrows(), ncols: g.ncols() });
    }
    if g.nrows() != n_x {
        return Err(GompertzError::MeshDimensionMismatch { name, expected: n_x, actual: g.nrows() });
    }
    for (row, col, &value) in g.triplet_iter() {
        if !value.is_finite() {
            return Err(GompertzError::NonFiniteMeshEntry { name, row, col, value });
        }
        let mirror = g.get_entry(col, row).map(|e| e.into_value()).unwrap_or(0.0);
        if (value - mirror).abs() > SYMMETRY_TOL * (1.0 + value.abs()) {
            return Err(GompertzError::MeshNotSymmetric { name, row, col });
        }
    }
    Ok(())
}
