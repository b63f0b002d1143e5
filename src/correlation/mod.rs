//! Correlation module - one-, two- and three-body Jastrow factors.
//!
//! Each factor is ln J = Σ (terms of inter-particle distances). They share
//! the same incremental scheme: per-particle partial sums over all terms
//! touching a particle, a ratio built from the terms of the moved particle
//! only, and an accept step that patches the partners' partial sums.

mod cache;
mod functor;
mod one_body;
mod three_body;
mod two_body;

pub(crate) use cache::clamp;
pub use cache::{JastrowCache, DEFAULT_MIN_DISTANCE};
pub use functor::{
    BsplineFunctor, PadeFunctor, PolyTerm, PolynomialFunctor3D, RadialFunctor, TripletFunctor,
    TripletVgh,
};
pub use one_body::OneBodyJastrow;
pub use three_body::ThreeBodyJastrow;
pub use two_body::TwoBodyJastrow;
