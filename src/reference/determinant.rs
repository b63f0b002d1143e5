//! Dirac determinant recomputed by dense LU for every configuration.

use std::f64::consts::PI;

use nalgebra::{DMatrix, Vector3};

use super::{ScratchFactor, Sweep};
use crate::error::{Result, WfnError};
use crate::particle::ParticleSet;
use crate::wavefunction::Orbital;

/// det[φ_j(r_i)] over one species group, with no cached inverse.
pub struct DiracDeterminantRef<O: Orbital> {
    name: String,
    first: usize,
    last: usize,
    n: usize,
    orbitals: Vec<O>,
}

impl<O: Orbital> DiracDeterminantRef<O> {
    pub fn new(name: &str, p: &ParticleSet, group: usize, orbitals: Vec<O>) -> Result<Self> {
        let range = p
            .groups()
            .get(group)
            .ok_or_else(|| WfnError::InvalidConfig(format!("{name}: no species group {group}")))?
            .range
            .clone();
        if range.is_empty() {
            return Err(WfnError::InvalidConfig(format!("{name}: empty species group")));
        }
        if orbitals.len() != range.len() {
            return Err(WfnError::InvalidConfig(format!(
                "{name}: {} orbitals for {} particles",
                orbitals.len(),
                range.len()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            first: range.start,
            last: range.end,
            n: p.len(),
            orbitals,
        })
    }

    fn size(&self) -> usize {
        self.last - self.first
    }

    fn slater_matrix(&self, r: &[Vector3<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(self.size(), self.size(), |i, j| {
            self.orbitals[j].value(&r[self.first + i])
        })
    }
}

impl<O: Orbital + Send> ScratchFactor for DiracDeterminantRef<O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn owns(&self, iat: usize) -> bool {
        (self.first..self.last).contains(&iat)
    }

    fn log_at(&self, r: &[Vector3<f64>]) -> (f64, f64) {
        let det = self.slater_matrix(r).lu().determinant();
        (det.abs().ln(), if det < 0.0 { PI } else { 0.0 })
    }

    fn sweep(&self, r: &[Vector3<f64>]) -> Result<Sweep> {
        let lu = self.slater_matrix(r).lu();
        let det = lu.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(WfnError::singular(&self.name, format!("determinant is {det}")));
        }
        let inv = lu
            .try_inverse()
            .ok_or_else(|| WfnError::singular(&self.name, "LU inversion failed"))?;

        let mut sweep = Sweep::new(self.n);
        sweep.log_value = det.abs().ln();
        sweep.phase_value = if det < 0.0 { PI } else { 0.0 };
        for i in 0..self.size() {
            let ri = &r[self.first + i];
            let mut g = Vector3::zeros();
            let mut lap = 0.0;
            for (j, orb) in self.orbitals.iter().enumerate() {
                let (_, dphi, d2phi) = orb.vgl(ri);
                g += dphi * inv[(j, i)];
                lap += d2phi * inv[(j, i)];
            }
            sweep.grad[self.first + i] = g;
            sweep.lap[self.first + i] = lap - g.dot(&g);
        }
        Ok(sweep)
    }
}
