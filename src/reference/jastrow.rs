//! Jastrow factors summed over every term for each configuration.

use nalgebra::Vector3;

use super::{ScratchFactor, Sweep};
use crate::correlation::{clamp, RadialFunctor, TripletFunctor, DEFAULT_MIN_DISTANCE};
use crate::error::{Result, WfnError};
use crate::particle::ParticleSet;

/// Ion positions and species copied out of the electron set's ion table.
struct Ions {
    positions: Vec<Vector3<f64>>,
    groups: Vec<usize>,
    num_groups: usize,
}

impl Ions {
    fn from_table(name: &str, p: &ParticleSet) -> Result<Self> {
        let table = p.dist_ie().ok_or_else(|| {
            WfnError::InvalidConfig(format!("{name}: particle set {} has no ion table", p.name()))
        })?;
        Ok(Self {
            positions: (0..table.num_sources()).map(|s| table.source_position(s)).collect(),
            groups: (0..table.num_sources()).map(|s| table.source_group(s)).collect(),
            num_groups: table.num_source_groups(),
        })
    }

    fn check_functors(&self, name: &str, count: usize) -> Result<()> {
        if count != self.num_groups {
            return Err(WfnError::InvalidConfig(format!(
                "{name}: {count} functors for {} ion species",
                self.num_groups
            )));
        }
        Ok(())
    }
}

/// ln J₁ = Σ_I Σ_i u_{s(I)}(|r_i − R_I|).
pub struct OneBodyJastrowRef<F: RadialFunctor> {
    n: usize,
    ions: Ions,
    functors: Vec<F>,
    min_distance: f64,
}

impl<F: RadialFunctor> OneBodyJastrowRef<F> {
    pub fn new(p: &ParticleSet, functors: Vec<F>) -> Result<Self> {
        let ions = Ions::from_table("J1", p)?;
        ions.check_functors("J1", functors.len())?;
        Ok(Self {
            n: p.len(),
            ions,
            functors,
            min_distance: DEFAULT_MIN_DISTANCE,
        })
    }

    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }
}

impl<F: RadialFunctor> ScratchFactor for OneBodyJastrowRef<F> {
    fn name(&self) -> &str {
        "J1"
    }

    fn owns(&self, iat: usize) -> bool {
        iat < self.n
    }

    fn log_at(&self, r: &[Vector3<f64>]) -> (f64, f64) {
        let mut log_value = 0.0;
        for (ion, &group) in self.ions.positions.iter().zip(&self.ions.groups) {
            for ri in r {
                log_value += self.functors[group].evaluate(clamp((ri - ion).norm(), self.min_distance));
            }
        }
        (log_value, 0.0)
    }

    fn sweep(&self, r: &[Vector3<f64>]) -> Result<Sweep> {
        let mut sweep = Sweep::new(self.n);
        for (ion, &group) in self.ions.positions.iter().zip(&self.ions.groups) {
            for (i, ri) in r.iter().enumerate() {
                let dr = ri - ion;
                let d = clamp(dr.norm(), self.min_distance);
                let (u, du, d2u) = self.functors[group].evaluate_vgl(d);
                sweep.log_value += u;
                sweep.grad[i] += dr * (du / d);
                sweep.lap[i] += d2u + 2.0 * du / d;
            }
        }
        Ok(sweep)
    }
}

/// ln J₂ = Σ_{i<j} u_{s(i)s(j)}(|r_i − r_j|).
pub struct TwoBodyJastrowRef<F: RadialFunctor> {
    group_of: Vec<usize>,
    num_groups: usize,
    functors: Vec<F>,
    min_distance: f64,
}

impl<F: RadialFunctor> TwoBodyJastrowRef<F> {
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
            group_of: (0..p.len()).map(|i| p.group_of(i)).collect(),
            num_groups: ng,
            functors,
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }

    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    fn functor(&self, i: usize, j: usize) -> &F {
        &self.functors[self.group_of[i] * self.num_groups + self.group_of[j]]
    }
}

impl<F: RadialFunctor> ScratchFactor for TwoBodyJastrowRef<F> {
    fn name(&self) -> &str {
        "J2"
    }

    fn owns(&self, iat: usize) -> bool {
        iat < self.group_of.len()
    }

    fn log_at(&self, r: &[Vector3<f64>]) -> (f64, f64) {
        let mut log_value = 0.0;
        for i in 0..r.len() {
            for j in (i + 1)..r.len() {
                log_value += self.functor(i, j).evaluate(clamp((r[i] - r[j]).norm(), self.min_distance));
            }
        }
        (log_value, 0.0)
    }

    fn sweep(&self, r: &[Vector3<f64>]) -> Result<Sweep> {
        let mut sweep = Sweep::new(r.len());
        for i in 0..r.len() {
            for j in (i + 1)..r.len() {
                let dr = r[i] - r[j];
                let d = clamp(dr.norm(), self.min_distance);
                let (u, du, d2u) = self.functor(i, j).evaluate_vgl(d);
                let g = dr * (du / d);
                let lap = d2u + 2.0 * du / d;
                sweep.log_value += u;
                sweep.grad[i] += g;
                sweep.grad[j] -= g;
                sweep.lap[i] += lap;
                sweep.lap[j] += lap;
            }
        }
        Ok(sweep)
    }
}

/// ln J₃ = Σ_I Σ_{i<j} g_{s(I)}(r_ij, r_iI, r_jI).
///
/// Each triplet is evaluated once and differentiated with respect to both
/// electrons, with b = r_jI as the third argument:
/// ∇_j g = −g_s û_ij + g_b û_jI and
/// ∇²_j g = g_ss + 2g_s/s + g_bb + 2g_b/b − 2g_sb (û_ij·û_jI).
pub struct ThreeBodyJastrowRef<G: TripletFunctor> {
    n: usize,
    ions: Ions,
    functors: Vec<G>,
    min_distance: f64,
}

impl<G: TripletFunctor> ThreeBodyJastrowRef<G> {
    pub fn new(p: &ParticleSet, functors: Vec<G>) -> Result<Self> {
        let ions = Ions::from_table("J3", p)?;
        ions.check_functors("J3", functors.len())?;
        Ok(Self {
            n: p.len(),
            ions,
            functors,
            min_distance: DEFAULT_MIN_DISTANCE,
        })
    }

    pub fn with_min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }
}

impl<G: TripletFunctor> ScratchFactor for ThreeBodyJastrowRef<G> {
    fn name(&self) -> &str {
        "J3"
    }

    fn owns(&self, iat: usize) -> bool {
        iat < self.n
    }

    fn log_at(&self, r: &[Vector3<f64>]) -> (f64, f64) {
        let md = self.min_distance;
        let mut log_value = 0.0;
        for (ion, &group) in self.ions.positions.iter().zip(&self.ions.groups) {
            for i in 0..r.len() {
                for j in (i + 1)..r.len() {
                    log_value += self.functors[group].evaluate(
                        clamp((r[i] - r[j]).norm(), md),
                        clamp((r[i] - ion).norm(), md),
                        clamp((r[j] - ion).norm(), md),
                    );
                }
            }
        }
        (log_value, 0.0)
    }

    fn sweep(&self, r: &[Vector3<f64>]) -> Result<Sweep> {
        let md = self.min_distance;
        let mut sweep = Sweep::new(r.len());
        for (ion, &group) in self.ions.positions.iter().zip(&self.ions.groups) {
            for i in 0..r.len() {
                for j in (i + 1)..r.len() {
                    let (dr_ij, dr_i, dr_j) = (r[i] - r[j], r[i] - ion, r[j] - ion);
                    let s = clamp(dr_ij.norm(), md);
                    let a = clamp(dr_i.norm(), md);
                    let b = clamp(dr_j.norm(), md);
                    let (u_ij, u_i, u_j) = (dr_ij / s, dr_i / a, dr_j / b);

                    let vgh = self.functors[group].evaluate_vgh(s, a, b);
                    let [g_s, g_a, g_b] = vgh.grad;
                    let h = vgh.hess;
                    let radial = h[0][0] + 2.0 * g_s / s;

                    sweep.log_value += vgh.value;
                    sweep.grad[i] += u_ij * g_s + u_i * g_a;
                    sweep.grad[j] += u_j * g_b - u_ij * g_s;
                    sweep.lap[i] += radial + h[1][1] + 2.0 * g_a / a + 2.0 * h[0][1] * u_ij.dot(&u_i);
                    sweep.lap[j] += radial + h[2][2] + 2.0 * g_b / b - 2.0 * h[0][2] * u_ij.dot(&u_j);
                }
            }
        }
        Ok(sweep)
    }
}
