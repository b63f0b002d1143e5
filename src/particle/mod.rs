//! Particle module - positions, species groups and distance tables.
//!
//! This is the minimal geometric collaborator the wavefunction components
//! read from. All geometry queries made by a component go through the
//! tables owned by a `ParticleSet`.

mod distance;
mod set;

pub use distance::{DistanceTableAA, DistanceTableAB};
pub use set::{ParticleSet, SpeciesGroup};
