//! One-body (electron-ion) Jastrow factor.

use nalgebra::Vector3;

use super::cache::{clamp, JastrowCache, DEFAULT_MIN_DISTANCE};
use super::functor::RadialFunctor;
use crate::error::{Result, WfnError};
use crate::particle::{DistanceTableAB, ParticleSet};
use crate::wavefunction::{ComponentState, WaveFunctionComponent};

/// ln J₁ = Σ_I Σ_i u_{s(I)}(r_iI), one functor per ion species.
///
/// Every electron term is independent of the others, so accepting a move
/// only replaces the moved electron's partial sum.
pub struct OneBodyJastrow<F: RadialFunctor> {
    name: String,
    n: usize,
    functors: Vec<F>,
    min_distance: f64,
    cache: JastrowCache,
    state: ComponentState,
}

fn ion_table<'a>(name: &str, p: &'a ParticleSet) -> Result<&'a DistanceTableAB> {
    p.dist_ie().ok_or_else(|| {
        WfnError::InvalidConfig(format!("{name}: particle set {} has no ion table", p.name()))
    })
}

impl<F: RadialFunctor> OneBodyJastrow<F> {
    pub fn new(p: &ParticleSet, functors: Vec<F>) -> Result<Self> {
        let name = "J1".to_string();
        let table = ion_table(&name, p)?;
        if functors.len() != table.num_source_groups() {
            return Err(WfnError::InvalidConfig(format!(
                "{name}: {} functors for {} ion species",
                functors.len(),
                table.num_source_groups()
            )));
        }
        Ok(Self {
            name,
            n: p.len(),
            functors,
            min_distance: DEFAULT_MIN_DISTANCE,
            cache: JastrowCache::new(p.len()),
            state: ComponentState::new(p.len()),
        })
    }

    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    /// (u, ∇u, ∇²u) for one electron against every ion; `at(s)` yields the
    /// distance and displacement r_i − R_s.
    fn sums(&self, table: &DistanceTableAB, at: impl Fn(usize) -> (f64, Vector3<f64>)) -> (f64, Vector3<f64>, f64) {
        let mut sums = (0.0, Vector3::zeros(), 0.0);
        for s in 0..table.num_sources() {
            let (r, dr) = at(s);
            let r = clamp(r, self.min_distance);
            let (u, du, d2u) = self.functors[table.source_group(s)].evaluate_vgl(r);
            sums.0 += u;
            sums.1 += dr * (du / r);
            sums.2 += d2u + 2.0 * du / r;
        }
        sums
    }
}

impl<F: RadialFunctor> WaveFunctionComponent for OneBodyJastrow<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn owns(&self, iat: usize) -> bool {
        iat < self.n
    }

    fn evaluate_log(&mut self, p: &ParticleSet) -> Result<f64> {
        let table = ion_table(&self.name, p)?;
        let mut cache = JastrowCache::new(self.n);
        for i in 0..self.n {
            let (u, du, d2u) = self.sums(table, |s| (table.distance(s, i), table.displacement(s, i)));
            cache.uat[i] = u;
            cache.duat[i] = du;
            cache.d2uat[i] = d2u;
        }
        let log_value = cache.uat.iter().sum();
        self.cache = cache;
        self.cache.publish(&mut self.state, log_value);
        Ok(log_value)
    }

    fn eval_grad(&self, p: &ParticleSet, iat: usize) -> Result<Vector3<f64>> {
        p.check_index(iat)?;
        Ok(self.cache.duat[iat])
    }

    fn ratio_grad(&mut self, p: &ParticleSet, iat: usize, grad: &mut Vector3<f64>) -> Result<f64> {
        p.require_active(iat)?;
        self.cache.moves.propose(&self.name, iat)?;
        let table = ion_table(&self.name, p)?;
        let (u, du, _) = self.sums(table, |s| (table.temp_distance(s), table.temp_displacement(s)));
        *grad += du;
        Ok(self.cache.ratio(iat, u))
    }

    fn ratio(&mut self, p: &ParticleSet, iat: usize) -> Result<f64> {
        p.require_active(iat)?;
        self.cache.moves.propose(&self.name, iat)?;
        let table = ion_table(&self.name, p)?;
        let cur: f64 = (0..table.num_sources())
            .map(|s| {
                let r = clamp(table.temp_distance(s), self.min_distance);
                self.functors[table.source_group(s)].evaluate(r)
            })
            .sum();
        Ok(self.cache.ratio(iat, cur))
    }

    fn accept_move(&mut self, p: &ParticleSet, iat: usize) -> Result<()> {
        p.check_index(iat)?;
        self.cache.moves.ensure_tentative(&self.name, iat)?;
        p.require_active(iat)?;
        let table = ion_table(&self.name, p)?;
        let (u, du, d2u) = self.sums(table, |s| (table.temp_distance(s), table.temp_displacement(s)));
        let delta = self.cache.replace(iat, u, du, d2u);
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
            let log_value = self.cache.uat.iter().sum();
            self.cache.publish(&mut self.state, log_value);
        }
        Ok(())
    }
}
