//! Reference module - from-scratch counterparts of every component.
//!
//! Each reference factor only knows how to evaluate itself over a full set of
//! positions. [`FromScratch`] turns such a factor into a
//! [`WaveFunctionComponent`]: a ratio is a quotient of two full evaluations
//! and accepting a move re-evaluates everything. They share functors and the
//! distance clamp with the incremental components, so both paths apply the
//! same numeric policy and can be compared move by move.

mod determinant;
mod jastrow;

pub use determinant::DiracDeterminantRef;
pub use jastrow::{OneBodyJastrowRef, ThreeBodyJastrowRef, TwoBodyJastrowRef};

use nalgebra::Vector3;
use tracing::trace;

use crate::error::Result;
use crate::particle::ParticleSet;
use crate::wavefunction::{ComponentState, MoveState, WaveFunctionComponent};

/// ln|ψ|, phase and per-particle ∇ln ψ / ∇²ln ψ over one configuration.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub log_value: f64,
    pub phase_value: f64,
    pub grad: Vec<Vector3<f64>>,
    pub lap: Vec<f64>,
}

impl Sweep {
    pub fn new(n: usize) -> Self {
        Self {
            log_value: 0.0,
            phase_value: 0.0,
            grad: vec![Vector3::zeros(); n],
            lap: vec![0.0; n],
        }
    }
}

/// A factor evaluated over whole configurations only.
pub trait ScratchFactor: Send {
    fn name(&self) -> &str;

    fn owns(&self, iat: usize) -> bool;

    /// (ln|ψ|, phase) at `r`; ln|ψ| is −∞ on a node.
    fn log_at(&self, r: &[Vector3<f64>]) -> (f64, f64);

    /// Full evaluation at `r`.
    fn sweep(&self, r: &[Vector3<f64>]) -> Result<Sweep>;
}

/// Component adapter that recomputes its factor from scratch on every call.
pub struct FromScratch<S: ScratchFactor> {
    factor: S,
    committed: Sweep,
    moves: MoveState,
    state: ComponentState,
}

impl<S: ScratchFactor> FromScratch<S> {
    pub fn new(factor: S, n: usize) -> Self {
        Self {
            factor,
            committed: Sweep::new(n),
            moves: MoveState::default(),
            state: ComponentState::new(n),
        }
    }

    pub fn factor(&self) -> &S {
        &self.factor
    }

    fn proposed(&mut self, p: &ParticleSet, iat: usize) -> Result<Vec<Vector3<f64>>> {
        let rnew = p.require_active(iat)?;
        self.moves.propose(self.factor.name(), iat)?;
        let mut r = p.positions().to_vec();
        r[iat] = rnew;
        Ok(r)
    }

    fn quotient(&self, log_value: f64, phase_value: f64) -> f64 {
        let magnitude = (log_value - self.state.log_value).exp();
        if (phase_value - self.state.phase_value).cos() < 0.0 {
            -magnitude
        } else {
            magnitude
        }
    }

    fn publish(&mut self) {
        self.state.log_value = self.committed.log_value;
        self.state.phase_value = self.committed.phase_value;
        self.state.grad.copy_from_slice(&self.committed.grad);
        self.state.lap.copy_from_slice(&self.committed.lap);
    }
}

impl<S: ScratchFactor> WaveFunctionComponent for FromScratch<S> {
    fn name(&self) -> &str {
        self.factor.name()
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn owns(&self, iat: usize) -> bool {
        self.factor.owns(iat)
    }

    fn evaluate_log(&mut self, p: &ParticleSet) -> Result<f64> {
        self.committed = self.factor.sweep(p.positions())?;
        self.moves.settle();
        self.publish();
        Ok(self.state.log_value)
    }

    fn eval_grad(&self, p: &ParticleSet, iat: usize) -> Result<Vector3<f64>> {
        p.check_index(iat)?;
        Ok(self.committed.grad[iat])
    }

    fn ratio_grad(&mut self, p: &ParticleSet, iat: usize, grad: &mut Vector3<f64>) -> Result<f64> {
        p.check_index(iat)?;
        if !self.owns(iat) {
            return Ok(1.0);
        }
        let r = self.proposed(p, iat)?;
        let (log_value, phase_value) = self.factor.log_at(&r);
        let ratio = self.quotient(log_value, phase_value);
        if ratio != 0.0 {
            *grad += self.factor.sweep(&r)?.grad[iat];
        }
        Ok(ratio)
    }

    fn ratio(&mut self, p: &ParticleSet, iat: usize) -> Result<f64> {
        p.check_index(iat)?;
        if !self.owns(iat) {
            return Ok(1.0);
        }
        let r = self.proposed(p, iat)?;
        let (log_value, phase_value) = self.factor.log_at(&r);
        let ratio = self.quotient(log_value, phase_value);
        trace!(component = %self.factor.name(), iat, ratio, "reference ratio");
        Ok(ratio)
    }

    fn accept_move(&mut self, p: &ParticleSet, iat: usize) -> Result<()> {
        p.check_index(iat)?;
        if !self.owns(iat) {
            return Ok(());
        }
        self.moves.ensure_tentative(self.factor.name(), iat)?;
        let mut r = p.positions().to_vec();
        r[iat] = p.require_active(iat)?;
        self.committed = self.factor.sweep(&r)?;
        self.state.log_value = self.committed.log_value;
        self.state.phase_value = self.committed.phase_value;
        self.moves.settle();
        Ok(())
    }

    fn restore(&mut self, iat: usize) {
        self.moves.discard(iat);
    }

    /// Always a full evaluation; there is no incremental data to reuse.
    fn evaluate_gl(&mut self, p: &ParticleSet, _from_scratch: bool) -> Result<()> {
        self.evaluate_log(p).map(|_| ())
    }
}
