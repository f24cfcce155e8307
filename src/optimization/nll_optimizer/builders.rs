//! nll_optimizer::builders — L-BFGS solver construction.
//!
//! Purpose
//! -------
//! Turn an [`MLEOptions`] into a configured argmin L-BFGS solver with the
//! requested line search. Initial parameters and the iteration cap are left
//! to the runner.
//!
//! Conventions
//! -----------
//! - Memory comes from `opts.lbfgs_mem`, falling back to
//!   [`DEFAULT_LBFGS_MEM`].
//! - Tolerances that are `None` keep argmin's defaults.
//! - argmin configuration errors surface as [`OptResult`] errors.
use argmin::solver::quasinewton::LBFGS;

use crate::optimization::{
    errors::OptResult,
    nll_optimizer::{
        traits::MLEOptions,
        types::{
            Cost, DEFAULT_LBFGS_MEM, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente,
            MoreThuenteLS, Theta,
        },
    },
};

/// L-BFGS with Hager–Zhang line search, configured from `opts`.
///
/// # Errors
/// Tolerance values argmin refuses.
pub fn build_optimizer_hager_zhang(opts: &MLEOptions) -> OptResult<LbfgsHagerZhang> {
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LbfgsHagerZhang::new(HagerZhangLS::new(), mem), opts)
}

/// L-BFGS with More–Thuente line search, configured from `opts`.
///
/// # Errors
/// Tolerance values argmin refuses.
pub fn build_optimizer_more_thuente(opts: &MLEOptions) -> OptResult<LbfgsMoreThuente> {
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LbfgsMoreThuente::new(MoreThuenteLS::new(), mem), opts)
}

/// Apply the optional gradient and cost-change tolerances to any L-BFGS
/// variant.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, opts: &MLEOptions,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::nll_optimizer::traits::{LineSearcher, Tolerances};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Construction with default and explicit memory for both line searches.
    // - Tolerance wiring with and without values.
    //
    // They intentionally DO NOT cover:
    // - Running the solver (api.rs and integration tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Both builders succeed with default memory.
    //
    // Given
    // -----
    // - Valid tolerances and lbfgs_mem = None.
    //
    // Expect
    // ------
    // - Ok for Hager–Zhang and More–Thuente.
    fn builders_accept_default_memory() {
        // Arrange
        let tols = Tolerances::new(Some(1e-6), Some(1e-9), Some(50)).expect("valid tolerances");
        let hz = MLEOptions::new(tols, LineSearcher::HagerZhang, None).expect("options");
        let mt = MLEOptions::new(tols, LineSearcher::MoreThuente, None).expect("options");

        // Act / Assert
        assert!(build_optimizer_hager_zhang(&hz).is_ok());
        assert!(build_optimizer_more_thuente(&mt).is_ok());
    }

    #[test]
    // Purpose
    // -------
    // Builders accept an explicit history size.
    //
    // Given
    // -----
    // - lbfgs_mem = Some(11).
    //
    // Expect
    // ------
    // - Ok for both line searches.
    fn builders_accept_explicit_memory() {
        // Arrange
        let tols = Tolerances::new(Some(1e-6), None, Some(25)).expect("valid tolerances");
        let opts = MLEOptions::new(tols, LineSearcher::MoreThuente, Some(11)).expect("options");

        // Act / Assert
        assert!(build_optimizer_more_thuente(&opts).is_ok());
        assert!(build_optimizer_hager_zhang(&opts).is_ok());
    }

    #[test]
    // Purpose
    // -------
    // configure_lbfgs works when both tolerances are absent.
    //
    // Given
    // -----
    // - Tolerances with only max_iter set.
    //
    // Expect
    // ------
    // - Ok(_), leaving argmin defaults in place.
    fn configure_lbfgs_respects_absent_tolerances() {
        // Arrange
        let raw = LBFGS::new(MoreThuenteLS::new(), DEFAULT_LBFGS_MEM);
        let tols = Tolerances::new(None, None, Some(50)).expect("valid tolerances");
        let opts = MLEOptions::new(tols, LineSearcher::MoreThuente, None).expect("options");

        // Act / Assert
        assert!(configure_lbfgs(raw, &opts).is_ok());
    }
}
