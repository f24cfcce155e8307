//! Mutable scratch shared across outer evaluations of one model.
//!
//! The outer optimizer only hands the model `&self`, so state that must
//! survive between evaluations lives behind interior mutability:
//! - the last Laplace mode, used to warm-start the next inner solve;
//! - the `theta_z` pair held fixed while fitting a model that ignores it.
//!
//! The scratch is single-owner. A model holding it is not `Sync`.
use std::cell::{Cell, RefCell};

use ndarray::{Array1, ArrayView1};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GompertzScratch {
    mode: RefCell<Option<Array1<f64>>>,
    held_theta_z: Cell<[f64; 2]>,
}

impl GompertzScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the last stored mode, if its length is `n_u`.
    pub fn warm_start(&self, n_u: usize) -> Option<Array1<f64>> {
        self.mode.borrow().as_ref().filter(|m| m.len() == n_u).cloned()
    }

    /// Remember `mode` for the next solve. Non-finite modes are discarded.
    pub fn store_mode(&self, mode: ArrayView1<f64>) {
        let mut slot = self.mode.borrow_mut();
        *slot = mode.iter().all(|v| v.is_finite()).then(|| mode.to_owned());
    }

    pub fn clear_mode(&self) {
        self.mode.borrow_mut().take();
    }

    pub fn held_theta_z(&self) -> [f64; 2] {
        self.held_theta_z.get()
    }

    pub fn set_held_theta_z(&self, theta_z: [f64; 2]) {
        self.held_theta_z.set(theta_z);
    }
}
