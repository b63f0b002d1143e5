//! Two-body (electron-electron) Jastrow factor.

use nalgebra::Vector3;
use tracing::trace;

use super::cache::{clamp, JastrowCache, DEFAULT_MIN_DISTANCE};
use super::functor::RadialFunctor;
use crate::error::{Result, WfnError};
use crate::particle::ParticleSet;
use crate::wavefunction::{ComponentState, WaveFunctionComponent};

/// ln J₂ = Σ_{i<j} u_{s(i)s(j)}(r_ij), one functor per unordered pair of
/// species (e.g. parallel and antiparallel spins).
pub struct TwoBodyJastrow<F: RadialFunctor> {
    name: String,
    num_groups: usize,
    group_of: Vec<usize>,
    functors: Vec<F>,
    min_distance: f64,
    cache: JastrowCache,
    state: ComponentState,
}

impl<F: RadialFunctor + Clone> TwoBodyJastrow<F> {
    /// `make(a, b)` is called once for every species pair `a <= b`.
    pub fn new(p: &ParticleSet, make: impl Fn(usize, usize) -> F) -> Self {
        let ng = p.num_groups();
        let mut functors = Vec::with_capacity(ng * ng);
        for a in 0..ng {
            for b in 0..ng {
                functors.push(make(a.min(b), a.max(b)));
            }
        }
        Self {
            name: "J2".to_string(),
            num_groups: ng,
            group_of: (0..p.len()).map(|i| p.group_of(i)).collect(),
            functors,
            min_distance: DEFAULT_MIN_DISTANCE,
            cache: JastrowCache::new(p.len()),
            state: ComponentState::new(p.len()),
        }
    }

    /// Same functor for every species pair.
    pub fn uniform(p: &ParticleSet, f: F) -> Self {
        Self::new(p, |_, _| f.clone())
    }
}

impl<F: RadialFunctor> TwoBodyJastrow<F> {
    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    fn functor(&self, i: usize, j: usize) -> &F {
        &self.functors[self.group_of[i] * self.num_groups + self.group_of[j]]
    }

    fn n(&self) -> usize {
        self.group_of.len()
    }

    /// (u, du/r, d²u + 2du/r) of one pair at distance `r`.
    fn pair_terms(&self, i: usize, j: usize, r: f64) -> (f64, f64, f64) {
        let r = clamp(r, self.min_distance);
        let (u, du, d2u) = self.functor(i, j).evaluate_vgl(r);
        (u, du / r, d2u + 2.0 * du / r)
    }

    /// Sum over partners of `iat` at its proposed position.
    fn proposed_sums(&self, p: &ParticleSet, iat: usize) -> (f64, Vector3<f64>, f64) {
        let table = p.dist_ee();
        let mut sums = (0.0, Vector3::zeros(), 0.0);
        for j in (0..self.n()).filter(|&j| j != iat) {
            let (u, du_r, lap) = self.pair_terms(iat, j, table.temp_distance(j));
            sums.0 += u;
            sums.1 += table.temp_displacement(j) * du_r;
            sums.2 += lap;
        }
        sums
    }

    fn check(&self, p: &ParticleSet, iat: usize) -> Result<()> {
        p.check_index(iat)?;
        if p.len() != self.n() {
            return Err(WfnError::InvalidConfig(format!(
                "{} built for {} particles, got {}",
                self.name,
                self.n(),
                p.len()
            )));
        }
        Ok(())
    }
}

impl<F: RadialFunctor> WaveFunctionComponent for TwoBodyJastrow<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn owns(&self, iat: usize) -> bool {
        iat < self.n()
    }

    fn evaluate_log(&mut self, p: &ParticleSet) -> Result<f64> {
        if p.len() != self.n() {
            return Err(WfnError::InvalidConfig(format!(
                "{} built for {} particles, got {}",
                self.name,
                self.n(),
                p.len()
            )));
        }
        let table = p.dist_ee();
        let mut cache = JastrowCache::new(self.n());
        let mut log_value = 0.0;
        for i in 0..self.n() {
            for j in (i + 1)..self.n() {
                let (u, du_r, lap) = self.pair_terms(i, j, table.distance(i, j));
                let g = table.displacement(i, j) * du_r;
                log_value += u;
                cache.uat[i] += u;
                cache.uat[j] += u;
                cache.duat[i] += g;
                cache.duat[j] -= g;
                cache.d2uat[i] += lap;
                cache.d2uat[j] += lap;
            }
        }
        self.cache = cache;
        self.cache.publish(&mut self.state, log_value);
        Ok(log_value)
    }

    fn eval_grad(&self, p: &ParticleSet, iat: usize) -> Result<Vector3<f64>> {
        self.check(p, iat)?;
        Ok(self.cache.duat[iat])
    }

    fn ratio_grad(&mut self, p: &ParticleSet, iat: usize, grad: &mut Vector3<f64>) -> Result<f64> {
        self.check(p, iat)?;
        p.require_active(iat)?;
        self.cache.moves.propose(&self.name, iat)?;
        let (u, du, _) = self.proposed_sums(p, iat);
        *grad += du;
        Ok(self.cache.ratio(iat, u))
    }

    fn ratio(&mut self, p: &ParticleSet, iat: usize) -> Result<f64> {
        self.check(p, iat)?;
        p.require_active(iat)?;
        self.cache.moves.propose(&self.name, iat)?;
        let table = p.dist_ee();
        let cur: f64 = (0..self.n())
            .filter(|&j| j != iat)
            .map(|j| {
                let r = clamp(table.temp_distance(j), self.min_distance);
                self.functor(iat, j).evaluate(r)
            })
            .sum();
        let ratio = self.cache.ratio(iat, cur);
        trace!(component = %self.name, iat, ratio, "ratio");
        Ok(ratio)
    }

    fn accept_move(&mut self, p: &ParticleSet, iat: usize) -> Result<()> {
        self.check(p, iat)?;
        self.cache.moves.ensure_tentative(&self.name, iat)?;
        p.require_active(iat)?;
        let table = p.dist_ee();
        let mut new_sums = (0.0, Vector3::zeros(), 0.0);
        for j in (0..self.n()).filter(|&j| j != iat) {
            let (u_old, du_old, lap_old) = self.pair_terms(iat, j, table.distance(iat, j));
            let (u_new, du_new, lap_new) = self.pair_terms(iat, j, table.temp_distance(j));
            // Gradients on the partner point along r_j − r_iat.
            let dr_old = table.displacement(j, iat);
            let dr_new = -table.temp_displacement(j);
            self.cache.uat[j] += u_new - u_old;
            self.cache.duat[j] += dr_new * du_new - dr_old * du_old;
            self.cache.d2uat[j] += lap_new - lap_old;
            new_sums.0 += u_new;
            new_sums.1 += table.temp_displacement(j) * du_new;
            new_sums.2 += lap_new;
        }
        let delta = self.cache.replace(iat, new_sums.0, new_sums.1, new_sums.2);
        self.state.log_value += delta;
        self.cache.moves.settle();
        Ok(())
    }

    fn restore(&mut self, iat: usize) {
        self.cache.moves.discard(iat);
    }

    fn evaluate_gl(&mut self, p: &ParticleSet, from_scratch: bool) -> Result<()> {
        if from_scratch {
            self.evaluate_log(p)?;
        } else {
            let log_value = 0.5 * self.cache.uat.iter().sum::<f64>();
            self.cache.publish(&mut self.state, log_value);
        }
        Ok(())
    }
}
