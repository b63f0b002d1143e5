//! Rust QMC wavefunctions - incremental Slater-Jastrow trial wavefunctions
//!
//! This crate provides the wavefunction side of particle-by-particle Quantum
//! Monte Carlo: Slater determinants with rank-one inverse updates, one-, two-
//! and three-body Jastrow factors, and their product. Every factor supports a
//! full evaluation plus the cheap propose / accept / restore cycle a sampler
//! drives for single-particle moves.

pub mod correlation;
pub mod error;
pub mod io;
pub mod particle;
pub mod reference;
pub mod wavefunction;

// Re-export commonly used types at crate root
pub use correlation::{
    BsplineFunctor, OneBodyJastrow, PadeFunctor, PolyTerm, PolynomialFunctor3D, RadialFunctor,
    ThreeBodyJastrow, TripletFunctor, TwoBodyJastrow,
};
pub use error::{Result, WfnError};
pub use io::{parse_config, read_config, WaveFunctionConfig};
pub use particle::{DistanceTableAA, DistanceTableAB, ParticleSet, SpeciesGroup};
pub use wavefunction::{
    AffineOrbital, DiracDeterminant, GaussianOrbital, Orbital, UpdatePolicy, WaveFunction,
    WaveFunctionComponent,
};

#[cfg(test)]
mod tests;
