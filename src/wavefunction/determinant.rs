//! Slater determinant over one species group with rank-one inverse updates.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::orbitals::Orbital;
use super::traits::{ComponentState, MoveState, WaveFunctionComponent};
use crate::error::{Result, WfnError};
use crate::particle::ParticleSet;

/// How often the incrementally updated inverse is rebuilt by dense LU.
///
/// Each accepted move applies one Sherman–Morrison update; after
/// `refresh_interval` of them the inverse and the log value are recomputed
/// from the stored Slater matrix. `0` disables the cadence.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct UpdatePolicy {
    pub refresh_interval: usize,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self { refresh_interval: 64 }
    }
}

/// Dirac determinant det[φ_j(r_i)] for the particles of one species group.
///
/// Row `i` of the Slater matrix belongs to particle `first + i`, column `j`
/// to orbital `j`. The explicit inverse is kept so that a single-row
/// replacement costs O(N) for the ratio and O(N²) for the commit.
pub struct DiracDeterminant<O: Orbital> {
    name: String,
    first: usize,
    last: usize,
    orbitals: Vec<O>,
    policy: UpdatePolicy,
    psi_m: DMatrix<f64>,
    dpsi_m: Vec<Vector3<f64>>,
    d2psi_m: DMatrix<f64>,
    psi_minv: DMatrix<f64>,
    psi_v: DVector<f64>,
    dpsi_v: Vec<Vector3<f64>>,
    d2psi_v: DVector<f64>,
    vgl_ready: bool,
    cur_ratio: f64,
    updates_since_refresh: usize,
    moves: MoveState,
    state: ComponentState,
}

impl<O: Orbital> DiracDeterminant<O> {
    /// Build a determinant for species `group` of `p`; one orbital per particle.
    pub fn new(
        name: &str,
        p: &ParticleSet,
        group: usize,
        orbitals: Vec<O>,
        policy: UpdatePolicy,
    ) -> Result<Self> {
        let range = p
            .groups()
            .get(group)
            .ok_or_else(|| WfnError::InvalidConfig(format!("{name}: no species group {group}")))?
            .range
            .clone();
        let n = range.len();
        if n == 0 {
            return Err(WfnError::InvalidConfig(format!("{name}: empty species group")));
        }
        if orbitals.len() != n {
            return Err(WfnError::InvalidConfig(format!(
                "{name}: {} orbitals for {n} particles",
                orbitals.len()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            first: range.start,
            last: range.end,
            orbitals,
            policy,
            psi_m: DMatrix::zeros(n, n),
            dpsi_m: vec![Vector3::zeros(); n * n],
            d2psi_m: DMatrix::zeros(n, n),
            psi_minv: DMatrix::identity(n, n),
            psi_v: DVector::zeros(n),
            dpsi_v: vec![Vector3::zeros(); n],
            d2psi_v: DVector::zeros(n),
            vgl_ready: false,
            cur_ratio: 1.0,
            updates_since_refresh: 0,
            moves: MoveState::default(),
            state: ComponentState::new(p.len()),
        })
    }

    pub fn size(&self) -> usize {
        self.last - self.first
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.psi_m
    }

    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.psi_minv
    }

    pub fn updates_since_refresh(&self) -> usize {
        self.updates_since_refresh
    }

    /// max |M·M⁻¹ − I| over all entries.
    pub fn inverse_deviation(&self) -> f64 {
        let n = self.size();
        (&self.psi_m * &self.psi_minv - DMatrix::<f64>::identity(n, n)).amax()
    }

    /// Rebuild the inverse, log value and phase from the stored matrix.
    pub fn refresh_inverse(&mut self) -> Result<()> {
        let (inv, log_value, phase_value) = self.invert(&self.psi_m)?;
        debug!(
            component = %self.name,
            updates = self.updates_since_refresh,
            drift = self.inverse_deviation(),
            "refreshing determinant inverse"
        );
        self.psi_minv = inv;
        self.state.log_value = log_value;
        self.state.phase_value = phase_value;
        self.updates_since_refresh = 0;
        Ok(())
    }

    fn invert(&self, m: &DMatrix<f64>) -> Result<(DMatrix<f64>, f64, f64)> {
        let lu = m.clone().lu();
        let det = lu.determinant();
        if det == 0.0 || !det.is_finite() {
            warn!(component = %self.name, det, "singular Slater matrix");
            return Err(WfnError::singular(&self.name, format!("determinant is {det}")));
        }
        let inv = lu
            .try_inverse()
            .ok_or_else(|| WfnError::singular(&self.name, "LU inversion failed"))?;
        if inv.iter().any(|x| !x.is_finite()) {
            warn!(component = %self.name, "non-finite inverse");
            return Err(WfnError::singular(&self.name, "non-finite inverse"));
        }
        let phase = if det < 0.0 { PI } else { 0.0 };
        Ok((inv, det.abs().ln(), phase))
    }

    fn row_of(&self, iat: usize) -> usize {
        iat - self.first
    }

    fn fill_row_vgl(&mut self, r: &Vector3<f64>) {
        for (j, orb) in self.orbitals.iter().enumerate() {
            let (v, g, l) = orb.vgl(r);
            self.psi_v[j] = v;
            self.dpsi_v[j] = g;
            self.d2psi_v[j] = l;
        }
        self.vgl_ready = true;
    }

    fn fill_row_value(&mut self, r: &Vector3<f64>) {
        for (j, orb) in self.orbitals.iter().enumerate() {
            self.psi_v[j] = orb.value(r);
        }
        self.vgl_ready = false;
    }

    /// v · M⁻¹[:, row], the determinant ratio for a replaced row.
    fn row_ratio(&self, row: usize) -> f64 {
        self.psi_v.dot(&self.psi_minv.column(row))
    }

    /// Gradient and Laplacian of ln det from the committed matrices.
    fn compute_gl(&mut self) {
        let n = self.size();
        for i in 0..n {
            let mut g = Vector3::zeros();
            let mut lap = 0.0;
            for j in 0..n {
                let w = self.psi_minv[(j, i)];
                g += self.dpsi_m[i * n + j] * w;
                lap += self.d2psi_m[(i, j)] * w;
            }
            self.state.grad[self.first + i] = g;
            self.state.lap[self.first + i] = lap - g.dot(&g);
        }
    }

    fn check_owned(&self, p: &ParticleSet, iat: usize) -> Result<bool> {
        p.check_index(iat)?;
        Ok((self.first..self.last).contains(&iat))
    }
}

impl<O: Orbital + Send> WaveFunctionComponent for DiracDeterminant<O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn owns(&self, iat: usize) -> bool {
        (self.first..self.last).contains(&iat)
    }

    fn evaluate_log(&mut self, p: &ParticleSet) -> Result<f64> {
        let n = self.size();
        let mut psi_m = DMatrix::zeros(n, n);
        let mut dpsi_m = vec![Vector3::zeros(); n * n];
        let mut d2psi_m = DMatrix::zeros(n, n);
        for i in 0..n {
            let r = p.position(self.first + i);
            for (j, orb) in self.orbitals.iter().enumerate() {
                let (v, g, l) = orb.vgl(&r);
                psi_m[(i, j)] = v;
                dpsi_m[i * n + j] = g;
                d2psi_m[(i, j)] = l;
            }
        }
        let (inv, log_value, phase_value) = self.invert(&psi_m)?;
        self.psi_m = psi_m;
        self.dpsi_m = dpsi_m;
        self.d2psi_m = d2psi_m;
        self.psi_minv = inv;
        self.updates_since_refresh = 0;
        self.moves.settle();
        self.vgl_ready = false;

        self.state.reset();
        self.state.log_value = log_value;
        self.state.phase_value = phase_value;
        self.compute_gl();
        Ok(log_value)
    }

    fn eval_grad(&self, p: &ParticleSet, iat: usize) -> Result<Vector3<f64>> {
        if !self.check_owned(p, iat)? {
            return Ok(Vector3::zeros());
        }
        let n = self.size();
        let row = self.row_of(iat);
        Ok((0..n).fold(Vector3::zeros(), |g, j| {
            g + self.dpsi_m[row * n + j] * self.psi_minv[(j, row)]
        }))
    }

    fn ratio_grad(&mut self, p: &ParticleSet, iat: usize, grad: &mut Vector3<f64>) -> Result<f64> {
        if !self.check_owned(p, iat)? {
            return Ok(1.0);
        }
        let rnew = p.require_active(iat)?;
        self.moves.propose(&self.name, iat)?;
        let row = self.row_of(iat);
        self.fill_row_vgl(&rnew);
        let ratio = self.row_ratio(row);
        self.cur_ratio = ratio;
        if ratio != 0.0 {
            let g = self
                .dpsi_v
                .iter()
                .enumerate()
                .fold(Vector3::zeros(), |g, (j, d)| g + *d * self.psi_minv[(j, row)]);
            *grad += g / ratio;
        } else {
            trace!(component = %self.name, iat, "proposed move lands on a node");
        }
        Ok(ratio)
    }

    fn ratio(&mut self, p: &ParticleSet, iat: usize) -> Result<f64> {
        if !self.check_owned(p, iat)? {
            return Ok(1.0);
        }
        let rnew = p.require_active(iat)?;
        self.moves.propose(&self.name, iat)?;
        self.fill_row_value(&rnew);
        let ratio = self.row_ratio(self.row_of(iat));
        self.cur_ratio = ratio;
        Ok(ratio)
    }

    fn accept_move(&mut self, p: &ParticleSet, iat: usize) -> Result<()> {
        if !self.check_owned(p, iat)? {
            return Ok(());
        }
        self.moves.ensure_tentative(&self.name, iat)?;
        let ratio = self.cur_ratio;
        if ratio == 0.0 || !ratio.is_finite() {
            warn!(component = %self.name, iat, ratio, "accepting a move with a degenerate ratio");
            return Err(WfnError::singular(&self.name, format!("accepted ratio is {ratio}")));
        }
        if !self.vgl_ready {
            let rnew = p.require_active(iat)?;
            self.fill_row_vgl(&rnew);
        }

        // Sherman–Morrison for replacing row `row` by v:
        // M⁻¹ ← M⁻¹ − M⁻¹[:, row] (vᵀM⁻¹ − e_row)ᵀ / ratio
        let n = self.size();
        let row = self.row_of(iat);
        let mut w = self.psi_minv.tr_mul(&self.psi_v);
        w[row] -= 1.0;
        let col = self.psi_minv.column(row).clone_owned();
        self.psi_minv.ger(-1.0 / ratio, &col, &w, 1.0);

        self.psi_m.set_row(row, &self.psi_v.transpose());
        self.d2psi_m.set_row(row, &self.d2psi_v.transpose());
        self.dpsi_m[row * n..(row + 1) * n].copy_from_slice(&self.dpsi_v);

        self.state.log_value += ratio.abs().ln();
        if ratio < 0.0 {
            self.state.phase_value = (self.state.phase_value + PI) % (2.0 * PI);
        }
        self.moves.settle();
        self.vgl_ready = false;
        self.updates_since_refresh += 1;

        if self.policy.refresh_interval > 0 && self.updates_since_refresh >= self.policy.refresh_interval {
            self.refresh_inverse()?;
        }
        Ok(())
    }

    fn restore(&mut self, iat: usize) {
        if self.owns(iat) {
            self.moves.discard(iat);
            self.vgl_ready = false;
        }
    }

    fn evaluate_gl(&mut self, p: &ParticleSet, from_scratch: bool) -> Result<()> {
        if from_scratch {
            self.evaluate_log(p)?;
        } else {
            self.compute_gl();
        }
        Ok(())
    }
}
