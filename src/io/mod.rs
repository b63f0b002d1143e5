//! IO module - YAML configuration for building trial wavefunctions.

mod config;

pub use config::{
    parse_config, read_config, to_yaml, OneBodyConfig, OrbitalConfig, ThreeBodyConfig,
    TwoBodyConfig, WaveFunctionConfig,
};
