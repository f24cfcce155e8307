//! Adapter exposing a [`NegLogLikelihood`] as an argmin problem.
//!
//! The model already returns a cost (a negative log-likelihood), so the
//! adapter forwards values and analytic gradients unchanged. When the model
//! does not implement `grad`, the gradient is finite-differenced on the cost
//! closure: central differences first, forward differences if any cost
//! evaluation failed or the central result did not validate.
use std::cell::RefCell;

use crate::optimization::{
    errors::OptError,
    nll_optimizer::{
        finite_diff::run_fd_diff,
        traits::NegLogLikelihood,
        types::{Cost, Grad, Theta},
        validation::validate_grad,
    },
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// Bridges a model to argmin's `CostFunction` and `Gradient`.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: NegLogLikelihood> {
    pub f: &'a F,
    pub data: &'a F::Data,
}

impl<'a, F: NegLogLikelihood> ArgMinAdapter<'a, F> {
    pub fn new(f: &'a F, data: &'a F::Data) -> Self {
        Self { f, data }
    }
}

impl<'a, F: NegLogLikelihood> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate `J(θ)`.
    ///
    /// # Errors
    /// - Propagates model errors.
    /// - `OptError::NonFiniteCost` when the model returns `NaN` or `±∞`.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let output = self.f.value(theta, self.data)?;
        if !output.is_finite() {
            return Err((OptError::NonFiniteCost { value: output }).into());
        }
        Ok(output)
    }
}

impl<'a, F: NegLogLikelihood> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate `∇J(θ)`, analytically when available, otherwise by finite
    /// differences of [`CostFunction::cost`].
    ///
    /// The finite-difference closure must return `f64`, so the first cost
    /// error is parked in `closure_err` and the closure yields `NaN`; the
    /// forward-difference retry then turns the parked error back into `Err`.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let dim = theta.len();
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, dim)?;
                Ok(g)
            }
            Err(OptError::GradientNotImplemented) => {
                let closure_err: RefCell<Option<Error>> = RefCell::new(None);
                let cost_func = |theta: &Theta| -> f64 {
                    match self.cost(theta) {
                        Ok(val) => val,
                        Err(e) => {
                            let mut slot = closure_err.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            f64::NAN
                        }
                    }
                };
                let fd_grad = theta.central_diff(&cost_func);
                if closure_err.borrow().is_none() && validate_grad(&fd_grad, dim).is_ok() {
                    return Ok(fd_grad);
                }
                Ok(run_fd_diff(theta, &cost_func, &closure_err)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}
