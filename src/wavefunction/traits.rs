//! The wavefunction component contract.
//!
//! A trial wavefunction is a product Ψ = Π_k ψ_k. Every factor ψ_k implements
//! [`WaveFunctionComponent`]: a full evaluation from the committed
//! configuration, plus the propose / accept / restore cycle used for
//! particle-by-particle Monte Carlo moves.

use nalgebra::Vector3;

use crate::error::{Result, WfnError};
use crate::particle::ParticleSet;

/// Log value, phase and per-particle ∇ln ψ / ∇²ln ψ of one component.
///
/// The buffers always describe the committed configuration as of the last
/// `evaluate_log` / `evaluate_gl`; tentative moves never touch them.
#[derive(Debug, Clone)]
pub struct ComponentState {
    pub log_value: f64,
    pub phase_value: f64,
    pub grad: Vec<Vector3<f64>>,
    pub lap: Vec<f64>,
}

impl ComponentState {
    pub fn new(n: usize) -> Self {
        Self {
            log_value: 0.0,
            phase_value: 0.0,
            grad: vec![Vector3::zeros(); n],
            lap: vec![0.0; n],
        }
    }

    pub fn reset(&mut self) {
        self.log_value = 0.0;
        self.phase_value = 0.0;
        self.grad.iter_mut().for_each(|g| *g = Vector3::zeros());
        self.lap.iter_mut().for_each(|l| *l = 0.0);
    }
}

/// Per-component move state: `Committed`, or `Tentative(iat)` between a
/// proposal for `iat` and the matching accept / restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveState {
    #[default]
    Committed,
    Tentative(usize),
}

impl MoveState {
    /// Enter (or stay in) `Tentative(iat)`.
    pub fn propose(&mut self, component: &str, iat: usize) -> Result<()> {
        match *self {
            MoveState::Tentative(a) if a != iat => Err(WfnError::ContractViolation(format!(
                "{component}: proposal for particle {iat} while particle {a} is tentative"
            ))),
            _ => {
                *self = MoveState::Tentative(iat);
                Ok(())
            }
        }
    }

    /// Check that the proposal being accepted belongs to `iat`.
    pub fn ensure_tentative(&self, component: &str, iat: usize) -> Result<()> {
        match *self {
            MoveState::Tentative(a) if a == iat => Ok(()),
            MoveState::Tentative(a) => Err(WfnError::ContractViolation(format!(
                "{component}: accept for particle {iat} while particle {a} is tentative"
            ))),
            MoveState::Committed => Err(WfnError::ContractViolation(format!(
                "{component}: accept for particle {iat} without a proposal"
            ))),
        }
    }

    pub fn settle(&mut self) {
        *self = MoveState::Committed;
    }

    /// Drop a pending proposal of `iat`; proposals for other particles stay.
    pub fn discard(&mut self, iat: usize) {
        if *self == MoveState::Tentative(iat) {
            *self = MoveState::Committed;
        }
    }
}

/// One multiplicative factor of the trial wavefunction.
///
/// Call sequence for a single-particle move of `iat`:
/// `ParticleSet::make_move` → `ratio` / `ratio_grad` (any number of times)
/// → either `accept_move` followed by `ParticleSet::accept_move`, or
/// `restore` followed by `ParticleSet::reject_move`.
pub trait WaveFunctionComponent: Send {
    fn name(&self) -> &str;

    fn state(&self) -> &ComponentState;

    /// Whether the component depends on the position of particle `iat`.
    fn owns(&self, iat: usize) -> bool;

    fn log_value(&self) -> f64 {
        self.state().log_value
    }

    fn phase_value(&self) -> f64 {
        self.state().phase_value
    }

    fn gradients(&self) -> &[Vector3<f64>] {
        &self.state().grad
    }

    fn laplacians(&self) -> &[f64] {
        &self.state().lap
    }

    /// Full recompute from the committed configuration. Returns ln|ψ_k|.
    fn evaluate_log(&mut self, p: &ParticleSet) -> Result<f64>;

    /// ∇_iat ln ψ_k from committed state.
    fn eval_grad(&self, p: &ParticleSet, iat: usize) -> Result<Vector3<f64>>;

    /// Ratio ψ_k(R')/ψ_k(R) for the pending move of `iat`; adds
    /// ∇_iat ln ψ_k at the proposed position into `grad`.
    fn ratio_grad(&mut self, p: &ParticleSet, iat: usize, grad: &mut Vector3<f64>) -> Result<f64>;

    /// Ratio ψ_k(R')/ψ_k(R) for the pending move of `iat`.
    fn ratio(&mut self, p: &ParticleSet, iat: usize) -> Result<f64>;

    /// Commit the pending move of `iat`. Must run before the particle set
    /// accepts the move.
    fn accept_move(&mut self, p: &ParticleSet, iat: usize) -> Result<()>;

    /// Discard the pending move of `iat`.
    fn restore(&mut self, iat: usize);

    /// Refresh log value, gradients and Laplacians for every particle.
    /// With `from_scratch` all internal data is rebuilt as well.
    fn evaluate_gl(&mut self, p: &ParticleSet, from_scratch: bool) -> Result<()>;

    /// Central-difference ∇ln ψ_k and ∇²ln ψ_k for every particle.
    ///
    /// Leaves the component evaluated at `p`.
    fn numerical_gl(&mut self, p: &ParticleSet, h: f64) -> Result<(Vec<Vector3<f64>>, Vec<f64>)> {
        let n = p.len();
        let log0 = self.evaluate_log(p)?;
        let mut shifted = p.clone();
        let mut grad = vec![Vector3::zeros(); n];
        let mut lap = vec![0.0; n];
        for i in 0..n {
            for axis in 0..3 {
                let mut r = p.positions().to_vec();
                r[i][axis] += h;
                shifted.set_positions(r.clone())?;
                let fwd = self.evaluate_log(&shifted)?;
                r[i][axis] -= 2.0 * h;
                shifted.set_positions(r)?;
                let bwd = self.evaluate_log(&shifted)?;
                grad[i][axis] = (fwd - bwd) / (2.0 * h);
                lap[i] += (fwd - 2.0 * log0 + bwd) / (h * h);
            }
        }
        self.evaluate_log(p)?;
        Ok((grad, lap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_state_transitions() {
        let mut s = MoveState::default();
        assert!(s.ensure_tentative("c", 0).is_err());
        s.propose("c", 2).unwrap();
        s.propose("c", 2).unwrap();
        assert!(matches!(s.propose("c", 3), Err(WfnError::ContractViolation(_))));
        assert!(s.ensure_tentative("c", 3).is_err());
        s.ensure_tentative("c", 2).unwrap();
        s.discard(3);
        assert_eq!(s, MoveState::Tentative(2));
        s.discard(2);
        assert_eq!(s, MoveState::Committed);
    }
}
