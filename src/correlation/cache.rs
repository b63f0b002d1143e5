//! Per-particle partial sums shared by the Jastrow factors.

use nalgebra::Vector3;

use crate::wavefunction::{ComponentState, MoveState};

/// Distances below this are clamped before any functor is evaluated.
pub const DEFAULT_MIN_DISTANCE: f64 = 1e-10;

/// `uat[i]` is the sum of every term touching particle `i`; `duat[i]` and
/// `d2uat[i]` its gradient and Laplacian with respect to `r_i`.
#[derive(Debug, Clone)]
pub struct JastrowCache {
    pub uat: Vec<f64>,
    pub duat: Vec<Vector3<f64>>,
    pub d2uat: Vec<f64>,
    pub moves: MoveState,
}

impl JastrowCache {
    pub fn new(n: usize) -> Self {
        Self {
            uat: vec![0.0; n],
            duat: vec![Vector3::zeros(); n],
            d2uat: vec![0.0; n],
            moves: MoveState::default(),
        }
    }

    pub fn reset(&mut self) {
        self.uat.iter_mut().for_each(|u| *u = 0.0);
        self.duat.iter_mut().for_each(|g| *g = Vector3::zeros());
        self.d2uat.iter_mut().for_each(|l| *l = 0.0);
        self.moves.settle();
    }

    /// exp(new − old) for the terms touching `iat`.
    pub fn ratio(&self, iat: usize, cur_uat: f64) -> f64 {
        (cur_uat - self.uat[iat]).exp()
    }

    /// Replace the sums of `iat`; returns the change in ln J.
    pub fn replace(&mut self, iat: usize, u: f64, du: Vector3<f64>, d2u: f64) -> f64 {
        let delta = u - self.uat[iat];
        self.uat[iat] = u;
        self.duat[iat] = du;
        self.d2uat[iat] = d2u;
        delta
    }

    /// Copy gradients and Laplacians into the component buffers.
    pub fn publish(&self, state: &mut ComponentState, log_value: f64) {
        state.log_value = log_value;
        state.phase_value = 0.0;
        state.grad.copy_from_slice(&self.duat);
        state.lap.copy_from_slice(&self.d2uat);
    }
}

#[inline]
pub(crate) fn clamp(r: f64, min_distance: f64) -> f64 {
    r.max(min_distance)
}
