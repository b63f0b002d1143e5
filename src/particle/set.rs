//! Particle set: positions grouped by species plus the tentative-move channel.

use std::ops::Range;

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::warn;

use super::distance::{DistanceTableAA, DistanceTableAB};
use crate::error::{Result, WfnError};

/// Contiguous block of particles of one species (e.g. up-spin electrons).
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesGroup {
    pub name: String,
    pub range: Range<usize>,
}

impl SpeciesGroup {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Ordered particle positions partitioned into species groups.
///
/// Only one single-particle move can be pending at a time. `make_move`
/// fills the temporary rows of every distance table; `accept_move` promotes
/// them and `reject_move` drops them. Wavefunction components must accept a
/// move before the particle set does, since they read both the committed and
/// the temporary distances.
#[derive(Debug, Clone)]
pub struct ParticleSet {
    name: String,
    positions: Vec<Vector3<f64>>,
    groups: Vec<SpeciesGroup>,
    group_id: Vec<usize>,
    active: Option<usize>,
    active_pos: Vector3<f64>,
    ee: DistanceTableAA,
    ie: Option<DistanceTableAB>,
}

impl ParticleSet {
    /// Create a set with all particles at the origin.
    pub fn new(name: &str, groups: &[(&str, usize)]) -> Result<Self> {
        if groups.is_empty() {
            return Err(WfnError::InvalidConfig(format!(
                "particle set {name} has no species groups"
            )));
        }
        let mut start = 0;
        let mut species = Vec::with_capacity(groups.len());
        let mut group_id = Vec::new();
        for (g, (gname, count)) in groups.iter().enumerate() {
            species.push(SpeciesGroup {
                name: gname.to_string(),
                range: start..start + count,
            });
            group_id.extend(std::iter::repeat(g).take(*count));
            start += count;
        }
        if start == 0 {
            return Err(WfnError::InvalidConfig(format!(
                "particle set {name} has no particles"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            positions: vec![Vector3::zeros(); start],
            groups: species,
            group_id,
            active: None,
            active_pos: Vector3::zeros(),
            ee: DistanceTableAA::new(start),
            ie: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn groups(&self) -> &[SpeciesGroup] {
        &self.groups
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn group_of(&self, i: usize) -> usize {
        self.group_id[i]
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn position(&self, i: usize) -> Vector3<f64> {
        self.positions[i]
    }

    pub fn check_index(&self, iat: usize) -> Result<()> {
        if iat < self.len() {
            Ok(())
        } else {
            Err(WfnError::OutOfRangeParticleIndex {
                index: iat,
                len: self.len(),
            })
        }
    }

    /// Replace all committed positions and refresh the distance tables.
    pub fn set_positions(&mut self, positions: Vec<Vector3<f64>>) -> Result<()> {
        if positions.len() != self.len() {
            return Err(WfnError::InvalidConfig(format!(
                "{} expects {} positions, got {}",
                self.name,
                self.len(),
                positions.len()
            )));
        }
        self.positions = positions;
        self.update();
        Ok(())
    }

    /// Gaussian random positions of width `sigma` around the origin.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, sigma: f64) -> Result<()> {
        let dist = Normal::new(0.0, sigma)
            .map_err(|e| WfnError::InvalidConfig(format!("bad position spread: {e}")))?;
        for r in self.positions.iter_mut() {
            *r = Vector3::new(dist.sample(rng), dist.sample(rng), dist.sample(rng));
        }
        self.update();
        Ok(())
    }

    /// Attach a fixed source set (the ions) and build the source-target table.
    pub fn add_source(&mut self, sources: &ParticleSet) {
        let mut table = DistanceTableAB::new(
            sources.positions.clone(),
            sources.group_id.clone(),
            sources.num_groups(),
            self.len(),
        );
        table.evaluate(&self.positions);
        self.ie = Some(table);
    }

    /// Recompute every distance table from committed positions.
    pub fn update(&mut self) {
        self.active = None;
        self.ee.evaluate(&self.positions);
        if let Some(ie) = self.ie.as_mut() {
            ie.evaluate(&self.positions);
        }
    }

    pub fn dist_ee(&self) -> &DistanceTableAA {
        &self.ee
    }

    pub fn dist_ie(&self) -> Option<&DistanceTableAB> {
        self.ie.as_ref()
    }

    /// Propose moving particle `iat` by `dr`.
    ///
    /// Re-proposing for the same particle replaces the pending move; a
    /// proposal for another particle while one is pending is rejected.
    pub fn make_move(&mut self, iat: usize, dr: &Vector3<f64>) -> Result<()> {
        self.check_index(iat)?;
        if let Some(other) = self.active {
            if other != iat {
                return Err(WfnError::ContractViolation(format!(
                    "move of particle {iat} proposed while particle {other} is pending"
                )));
            }
        }
        let rnew = self.positions[iat] + dr;
        self.active = Some(iat);
        self.active_pos = rnew;
        self.ee.move_particle(&self.positions, iat, &rnew);
        if let Some(ie) = self.ie.as_mut() {
            ie.move_particle(&rnew);
        }
        Ok(())
    }

    pub fn active_particle(&self) -> Option<usize> {
        self.active
    }

    pub fn active_position(&self) -> Option<Vector3<f64>> {
        self.active.map(|_| self.active_pos)
    }

    /// Proposed position of `iat`, failing if no move of `iat` is pending.
    pub fn require_active(&self, iat: usize) -> Result<Vector3<f64>> {
        self.check_index(iat)?;
        match self.active {
            Some(a) if a == iat => Ok(self.active_pos),
            Some(a) => Err(WfnError::ContractViolation(format!(
                "particle {iat} queried while the pending move belongs to {a}"
            ))),
            None => Err(WfnError::ContractViolation(format!(
                "no pending move for particle {iat}"
            ))),
        }
    }

    pub fn accept_move(&mut self, iat: usize) -> Result<()> {
        let rnew = self.require_active(iat)?;
        self.positions[iat] = rnew;
        self.ee.commit(iat);
        if let Some(ie) = self.ie.as_mut() {
            ie.commit(iat);
        }
        self.active = None;
        Ok(())
    }

    pub fn reject_move(&mut self, iat: usize) {
        match self.active {
            Some(a) if a == iat => self.active = None,
            Some(a) => warn!(iat, pending = a, "reject_move for a particle that is not pending"),
            None => {}
        }
    }
}
