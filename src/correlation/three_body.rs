//! Three-body (electron-electron-ion) Jastrow factor.

use nalgebra::Vector3;
use tracing::trace;

use super::cache::{clamp, JastrowCache, DEFAULT_MIN_DISTANCE};
use super::functor::TripletFunctor;
use crate::error::{Result, WfnError};
use crate::particle::{DistanceTableAA, DistanceTableAB, ParticleSet};
use crate::wavefunction::{ComponentState, WaveFunctionComponent};

/// ln J₃ = Σ_I Σ_{i<j} g_{s(I)}(r_ij, r_iI, r_jI), one functor per ion species.
///
/// `uat[i]` holds every triplet that contains electron `i`, so
/// ln J₃ = ½ Σ_i uat[i]. A move of one electron changes the triplets of all
/// its partners, which are patched on accept.
pub struct ThreeBodyJastrow<G: TripletFunctor> {
    name: String,
    n: usize,
    functors: Vec<G>,
    min_distance: f64,
    cache: JastrowCache,
    state: ComponentState,
}

/// Geometry of one triplet seen from electron 1: the three distances and the
/// unit vectors (r_1 − r_2)/r_12 and (r_1 − R_I)/r_1I.
struct Triplet {
    r_12: f64,
    r_1i: f64,
    r_2i: f64,
    u_12: Vector3<f64>,
    u_1i: Vector3<f64>,
}

fn ion_table<'a>(name: &str, p: &'a ParticleSet) -> Result<&'a DistanceTableAB> {
    p.dist_ie().ok_or_else(|| {
        WfnError::InvalidConfig(format!("{name}: particle set {} has no ion table", p.name()))
    })
}

impl<G: TripletFunctor> ThreeBodyJastrow<G> {
    pub fn new(p: &ParticleSet, functors: Vec<G>) -> Result<Self> {
        let name = "J3".to_string();
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

    fn triplet(&self, r_12: f64, r_1i: f64, r_2i: f64, dr_12: Vector3<f64>, dr_1i: Vector3<f64>) -> Triplet {
        let r_12 = clamp(r_12, self.min_distance);
        let r_1i = clamp(r_1i, self.min_distance);
        Triplet {
            r_12,
            r_1i,
            r_2i: clamp(r_2i, self.min_distance),
            u_12: dr_12 / r_12,
            u_1i: dr_1i / r_1i,
        }
    }

    /// (g, ∇_1 g, ∇²_1 g) of one triplet.
    fn terms(&self, ion_group: usize, t: &Triplet) -> (f64, Vector3<f64>, f64) {
        let vgh = self.functors[ion_group].evaluate_vgh(t.r_12, t.r_1i, t.r_2i);
        let [g_s, g_a, _] = vgh.grad;
        let grad = t.u_12 * g_s + t.u_1i * g_a;
        let lap = vgh.hess[0][0]
            + 2.0 * g_s / t.r_12
            + vgh.hess[1][1]
            + 2.0 * g_a / t.r_1i
            + 2.0 * vgh.hess[0][1] * t.u_12.dot(&t.u_1i);
        (vgh.value, grad, lap)
    }

    /// Triplet (iat, j, I) with `iat` at its committed position.
    fn committed(&self, ee: &DistanceTableAA, ie: &DistanceTableAB, iat: usize, j: usize, s: usize) -> Triplet {
        self.triplet(
            ee.distance(iat, j),
            ie.distance(s, iat),
            ie.distance(s, j),
            ee.displacement(iat, j),
            ie.displacement(s, iat),
        )
    }

    /// Triplet (iat, j, I) with `iat` at its proposed position.
    fn proposed(&self, ee: &DistanceTableAA, ie: &DistanceTableAB, j: usize, s: usize) -> Triplet {
        self.triplet(
            ee.temp_distance(j),
            ie.temp_distance(s),
            ie.distance(s, j),
            ee.temp_displacement(j),
            ie.temp_displacement(s),
        )
    }

    /// Triplet (j, iat, I) seen from partner `j` while `iat` sits at its
    /// proposed position.
    fn partner_proposed(&self, ee: &DistanceTableAA, ie: &DistanceTableAB, j: usize, s: usize) -> Triplet {
        self.triplet(
            ee.temp_distance(j),
            ie.distance(s, j),
            ie.temp_distance(s),
            -ee.temp_displacement(j),
            ie.displacement(s, j),
        )
    }

    fn proposed_sums(&self, p: &ParticleSet, iat: usize) -> Result<(f64, Vector3<f64>, f64)> {
        let ee = p.dist_ee();
        let ie = ion_table(&self.name, p)?;
        let mut sums = (0.0, Vector3::zeros(), 0.0);
        for s in 0..ie.num_sources() {
            let group = ie.source_group(s);
            for j in (0..self.n).filter(|&j| j != iat) {
                let (g, dg, d2g) = self.terms(group, &self.proposed(ee, ie, j, s));
                sums.0 += g;
                sums.1 += dg;
                sums.2 += d2g;
            }
        }
        Ok(sums)
    }
}

impl<G: TripletFunctor> WaveFunctionComponent for ThreeBodyJastrow<G> {
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
        let ee = p.dist_ee();
        let ie = ion_table(&self.name, p)?;
        self.cache.reset();
        for s in 0..ie.num_sources() {
            let group = ie.source_group(s);
            for i in 0..self.n {
                for j in (0..self.n).filter(|&j| j != i) {
                    let (g, dg, d2g) = self.terms(group, &self.committed(ee, ie, i, j, s));
                    self.cache.uat[i] += g;
                    self.cache.duat[i] += dg;
                    self.cache.d2uat[i] += d2g;
                }
            }
        }
        let log_value = 0.5 * self.cache.uat.iter().sum::<f64>();
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
        let (u, du, _) = self.proposed_sums(p, iat)?;
        *grad += du;
        Ok(self.cache.ratio(iat, u))
    }

    fn ratio(&mut self, p: &ParticleSet, iat: usize) -> Result<f64> {
        p.require_active(iat)?;
        self.cache.moves.propose(&self.name, iat)?;
        let ee = p.dist_ee();
        let ie = ion_table(&self.name, p)?;
        let mut cur = 0.0;
        for s in 0..ie.num_sources() {
            let f = &self.functors[ie.source_group(s)];
            for j in (0..self.n).filter(|&j| j != iat) {
                cur += f.evaluate(
                    clamp(ee.temp_distance(j), self.min_distance),
                    clamp(ie.temp_distance(s), self.min_distance),
                    clamp(ie.distance(s, j), self.min_distance),
                );
            }
        }
        let ratio = self.cache.ratio(iat, cur);
        trace!(component = %self.name, iat, ratio, "ratio");
        Ok(ratio)
    }

    fn accept_move(&mut self, p: &ParticleSet, iat: usize) -> Result<()> {
        p.check_index(iat)?;
        self.cache.moves.ensure_tentative(&self.name, iat)?;
        p.require_active(iat)?;
        let ee = p.dist_ee();
        let ie = ion_table(&self.name, p)?;
        let mut new_sums = (0.0, Vector3::zeros(), 0.0);
        for s in 0..ie.num_sources() {
            let group = ie.source_group(s);
            for j in (0..self.n).filter(|&j| j != iat) {
                let (g_old, dg_old, d2g_old) = self.terms(group, &self.committed(ee, ie, j, iat, s));
                let (g_new, dg_new, d2g_new) = self.terms(group, &self.partner_proposed(ee, ie, j, s));
                self.cache.uat[j] += g_new - g_old;
                self.cache.duat[j] += dg_new - dg_old;
                self.cache.d2uat[j] += d2g_new - d2g_old;

                let (g, dg, d2g) = self.terms(group, &self.proposed(ee, ie, j, s));
                new_sums.0 += g;
                new_sums.1 += dg;
                new_sums.2 += d2g;
            }
        }
        // Partners gain exactly what iat gains, so ½Σuat moves by delta.
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
