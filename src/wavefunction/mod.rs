//! Wavefunction module - the component contract, Slater determinants and the
//! product wavefunction.

mod aggregate;
mod determinant;
mod orbitals;
mod traits;

pub use aggregate::WaveFunction;
pub use determinant::{DiracDeterminant, UpdatePolicy};
pub use orbitals::{AffineOrbital, GaussianOrbital, Orbital};
pub use traits::{ComponentState, MoveState, WaveFunctionComponent};
