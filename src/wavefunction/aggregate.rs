//! Product of wavefunction components, Ψ = Π_k ψ_k.

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, trace};

use super::determinant::{DiracDeterminant, UpdatePolicy};
use super::orbitals::GaussianOrbital;
use super::traits::{ComponentState, WaveFunctionComponent};
use crate::correlation::{
    BsplineFunctor, OneBodyJastrow, PadeFunctor, PolynomialFunctor3D, ThreeBodyJastrow,
    TwoBodyJastrow,
};
use crate::error::{Result, WfnError};
use crate::io::WaveFunctionConfig;
use crate::particle::ParticleSet;
use crate::reference::{
    DiracDeterminantRef, FromScratch, OneBodyJastrowRef, ThreeBodyJastrowRef, TwoBodyJastrowRef,
};

/// Trial wavefunction built from independent factors.
///
/// Log values and phases add, ratios multiply, and gradients and Laplacians
/// of ln Ψ add. Components that do not own a moved particle are skipped for
/// ratios, so they contribute exactly 1.
pub struct WaveFunction {
    components: Vec<Box<dyn WaveFunctionComponent>>,
    nelup: usize,
    first_time: bool,
    state: ComponentState,
}

impl WaveFunction {
    /// Wrap an arbitrary set of components acting on `p`.
    pub fn from_components(components: Vec<Box<dyn WaveFunctionComponent>>, p: &ParticleSet) -> Self {
        Self {
            components,
            nelup: p.groups()[0].len(),
            first_time: true,
            state: ComponentState::new(p.len()),
        }
    }

    /// Spin-up and spin-down determinants of Gaussian orbitals centred on
    /// the ions, times one-, two- and three-body Jastrow factors.
    ///
    /// Species groups 0 and 1 of `els` are the two spin channels; `els` must
    /// already carry the ion table (`ParticleSet::add_source`). The RNG only
    /// perturbs orbital centres and, when no explicit terms are configured,
    /// the three-body coefficients.
    pub fn slater_jastrow<R: Rng + ?Sized>(
        ions: &ParticleSet,
        els: &ParticleSet,
        config: &WaveFunctionConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let parts = SlaterJastrowParts::draw(ions, els, config, rng)?;
        let md = parts.min_distance;
        let mut components: Vec<Box<dyn WaveFunctionComponent>> = Vec::new();
        for (group, name, orbitals) in parts.determinants {
            components.push(Box::new(DiracDeterminant::new(name, els, group, orbitals, parts.policy)?));
        }
        components.push(Box::new(OneBodyJastrow::new(els, parts.splines)?.with_min_distance(md)));
        let (same, opposite) = parts.pair_functors;
        components.push(Box::new(
            TwoBodyJastrow::new(els, |a, b| if a == b { same } else { opposite }).with_min_distance(md),
        ));
        components.push(Box::new(ThreeBodyJastrow::new(els, parts.triplets)?.with_min_distance(md)));
        Ok(Self::from_components(components, els).announce(ions, "built Slater-Jastrow wavefunction"))
    }

    /// The same wavefunction as [`WaveFunction::slater_jastrow`] for the
    /// same RNG state, with every factor recomputed from scratch on each
    /// call. Slow; meant for cross-checking the incremental updates.
    pub fn slater_jastrow_reference<R: Rng + ?Sized>(
        ions: &ParticleSet,
        els: &ParticleSet,
        config: &WaveFunctionConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let parts = SlaterJastrowParts::draw(ions, els, config, rng)?;
        let (n, md) = (els.len(), parts.min_distance);
        let mut components: Vec<Box<dyn WaveFunctionComponent>> = Vec::new();
        for (group, name, orbitals) in parts.determinants {
            components.push(Box::new(FromScratch::new(DiracDeterminantRef::new(name, els, group, orbitals)?, n)));
        }
        components.push(Box::new(FromScratch::new(
            OneBodyJastrowRef::new(els, parts.splines)?.with_min_distance(md),
            n,
        )));
        let (same, opposite) = parts.pair_functors;
        components.push(Box::new(FromScratch::new(
            TwoBodyJastrowRef::new(els, |a, b| if a == b { same } else { opposite }).with_min_distance(md),
            n,
        )));
        components.push(Box::new(FromScratch::new(
            ThreeBodyJastrowRef::new(els, parts.triplets)?.with_min_distance(md),
            n,
        )));
        Ok(Self::from_components(components, els).announce(ions, "built reference Slater-Jastrow wavefunction"))
    }

    fn announce(self, ions: &ParticleSet, message: &str) -> Self {
        info!(
            electrons = self.state.grad.len(),
            nelup = self.nelup,
            ions = ions.len(),
            components = ?self.component_names(),
            "{message}"
        );
        self
    }

    pub fn components(&self) -> &[Box<dyn WaveFunctionComponent>] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [Box<dyn WaveFunctionComponent>] {
        &mut self.components
    }

    pub fn component(&self, name: &str) -> Option<&dyn WaveFunctionComponent> {
        self.components.iter().find(|c| c.name() == name).map(|c| &**c)
    }

    /// Number of particles in the first species group.
    pub fn nelup(&self) -> usize {
        self.nelup
    }

    fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    fn sum_logs(&mut self) {
        self.state.log_value = self.components.iter().map(|c| c.log_value()).sum();
        self.state.phase_value = self.components.iter().map(|c| c.phase_value()).sum();
    }

    fn sum_buffers(&mut self) {
        self.state.reset();
        for c in &self.components {
            for (g, cg) in self.state.grad.iter_mut().zip(c.gradients()) {
                *g += cg;
            }
            for (l, cl) in self.state.lap.iter_mut().zip(c.laplacians()) {
                *l += cl;
            }
        }
        self.sum_logs();
    }
}

impl WaveFunctionComponent for WaveFunction {
    fn name(&self) -> &str {
        "WaveFunction"
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn owns(&self, iat: usize) -> bool {
        self.components.iter().any(|c| c.owns(iat))
    }

    fn evaluate_log(&mut self, p: &ParticleSet) -> Result<f64> {
        if self.first_time {
            info!(
                nelup = self.nelup,
                components = ?self.component_names(),
                "first evaluation of the trial wavefunction"
            );
            self.first_time = false;
        }
        for c in self.components.iter_mut() {
            c.evaluate_log(p)?;
        }
        self.sum_buffers();
        Ok(self.state.log_value)
    }

    fn eval_grad(&self, p: &ParticleSet, iat: usize) -> Result<Vector3<f64>> {
        p.check_index(iat)?;
        let mut grad = Vector3::zeros();
        for c in self.components.iter().filter(|c| c.owns(iat)) {
            grad += c.eval_grad(p, iat)?;
        }
        Ok(grad)
    }

    /// Unlike the components, the product overwrites `grad` with
    /// ∇_iat ln Ψ at the proposed position.
    fn ratio_grad(&mut self, p: &ParticleSet, iat: usize, grad: &mut Vector3<f64>) -> Result<f64> {
        p.check_index(iat)?;
        *grad = Vector3::zeros();
        let mut ratio = 1.0;
        for c in self.components.iter_mut().filter(|c| c.owns(iat)) {
            ratio *= c.ratio_grad(p, iat, grad)?;
        }
        trace!(iat, ratio, "wavefunction ratio_grad");
        Ok(ratio)
    }

    fn ratio(&mut self, p: &ParticleSet, iat: usize) -> Result<f64> {
        p.check_index(iat)?;
        let mut ratio = 1.0;
        for c in self.components.iter_mut().filter(|c| c.owns(iat)) {
            ratio *= c.ratio(p, iat)?;
        }
        trace!(iat, ratio, "wavefunction ratio");
        Ok(ratio)
    }

    fn accept_move(&mut self, p: &ParticleSet, iat: usize) -> Result<()> {
        p.check_index(iat)?;
        for c in self.components.iter_mut() {
            c.accept_move(p, iat)?;
        }
        self.sum_logs();
        Ok(())
    }

    fn restore(&mut self, iat: usize) {
        for c in self.components.iter_mut() {
            c.restore(iat);
        }
    }

    fn evaluate_gl(&mut self, p: &ParticleSet, from_scratch: bool) -> Result<()> {
        for c in self.components.iter_mut() {
            c.evaluate_gl(p, from_scratch)?;
        }
        self.sum_buffers();
        Ok(())
    }
}

/// Everything random or configured about a Slater-Jastrow wavefunction,
/// drawn in a fixed order from the RNG.
struct SlaterJastrowParts {
    determinants: Vec<(usize, &'static str, Vec<GaussianOrbital>)>,
    policy: UpdatePolicy,
    splines: Vec<BsplineFunctor>,
    pair_functors: (PadeFunctor, PadeFunctor),
    triplets: Vec<PolynomialFunctor3D>,
    min_distance: f64,
}

impl SlaterJastrowParts {
    fn draw<R: Rng + ?Sized>(
        ions: &ParticleSet,
        els: &ParticleSet,
        config: &WaveFunctionConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if els.num_groups() < 2 {
            return Err(WfnError::InvalidConfig(format!(
                "{} needs two spin groups, found {}",
                els.name(),
                els.num_groups()
            )));
        }
        let ion_groups = els
            .dist_ie()
            .ok_or_else(|| {
                WfnError::InvalidConfig(format!("{} has no ion table attached", els.name()))
            })?
            .num_source_groups();
        let jitter = Normal::new(0.0, config.orbitals.center_jitter)
            .map_err(|e| WfnError::InvalidConfig(format!("bad orbital jitter: {e}")))?;

        let mut determinants = Vec::new();
        for (group, name) in [(0, "Det_up"), (1, "Det_dn")] {
            let n = els.groups()[group].len();
            if n == 0 {
                debug!(group, "skipping determinant of an empty spin group");
                continue;
            }
            // Orbital k sits on ion k (cyclically) with a widening exponent.
            let orbitals: Vec<GaussianOrbital> = (0..n)
                .map(|k| GaussianOrbital {
                    alpha: config.orbitals.alpha * (1.0 + 0.25 * k as f64),
                    center: ions.position(k % ions.len())
                        + Vector3::from_fn(|_, _| jitter.sample(rng)),
                })
                .collect();
            determinants.push((group, name, orbitals));
        }

        let j1 = &config.one_body;
        let spline = BsplineFunctor::new(j1.cutoff, j1.cusp, &j1.coefficients)?;

        let j3 = &config.three_body;
        let triplets = (0..ion_groups)
            .map(|_| {
                if j3.terms.is_empty() {
                    PolynomialFunctor3D::random(j3.cutoff, j3.cutoff_power, j3.max_order, j3.coefficient_scale, rng)
                } else {
                    Ok(PolynomialFunctor3D {
                        cutoff: j3.cutoff,
                        cutoff_power: j3.cutoff_power,
                        terms: j3.terms.clone(),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            determinants,
            policy: config.determinant,
            splines: vec![spline; ion_groups],
            pair_functors: (config.two_body.same_species, config.two_body.opposite_species),
            triplets,
            min_distance: config.min_distance,
        })
    }
}
