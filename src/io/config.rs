use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::correlation::{PadeFunctor, PolyTerm, DEFAULT_MIN_DISTANCE};
use crate::error::Result;
use crate::wavefunction::UpdatePolicy;

/// Parameters of the Slater-Jastrow wavefunction built by
/// `WaveFunction::slater_jastrow`. Every field falls back to its default, so
/// a partial (or empty) YAML document is valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WaveFunctionConfig {
    pub determinant: UpdatePolicy,
    pub orbitals: OrbitalConfig,
    pub one_body: OneBodyConfig,
    pub two_body: TwoBodyConfig,
    pub three_body: ThreeBodyConfig,
    /// Distance clamp applied inside every Jastrow factor.
    pub min_distance: f64,
}

impl Default for WaveFunctionConfig {
    fn default() -> Self {
        Self {
            determinant: UpdatePolicy::default(),
            orbitals: OrbitalConfig::default(),
            one_body: OneBodyConfig::default(),
            two_body: TwoBodyConfig::default(),
            three_body: ThreeBodyConfig::default(),
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }
}

/// Gaussian orbitals centred on the ions, jittered by N(0, center_jitter).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OrbitalConfig {
    pub alpha: f64,
    pub center_jitter: f64,
}

impl Default for OrbitalConfig {
    fn default() -> Self {
        Self { alpha: 0.5, center_jitter: 0.5 }
    }
}

/// B-spline electron-ion functor, shared by every ion species.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OneBodyConfig {
    pub cutoff: f64,
    pub cusp: f64,
    pub coefficients: Vec<f64>,
}

impl Default for OneBodyConfig {
    fn default() -> Self {
        Self {
            cutoff: 4.0,
            cusp: 0.0,
            coefficients: vec![-0.4, -0.3, -0.2, -0.12, -0.06, -0.02, 0.0, 0.0],
        }
    }
}

/// Padé electron-electron functors; the `a` parameters are the cusps.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TwoBodyConfig {
    pub same_species: PadeFunctor,
    pub opposite_species: PadeFunctor,
}

impl Default for TwoBodyConfig {
    fn default() -> Self {
        Self {
            same_species: PadeFunctor { a: 0.25, b: 1.0 },
            opposite_species: PadeFunctor { a: 0.5, b: 1.0 },
        }
    }
}

/// Polynomial electron-electron-ion functor. When `terms` is empty the
/// coefficients are drawn at random up to `max_order`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ThreeBodyConfig {
    pub cutoff: f64,
    pub cutoff_power: u32,
    pub max_order: u32,
    pub coefficient_scale: f64,
    pub terms: Vec<PolyTerm>,
}

impl Default for ThreeBodyConfig {
    fn default() -> Self {
        Self {
            cutoff: 3.0,
            cutoff_power: 3,
            max_order: 2,
            coefficient_scale: 0.01,
            terms: Vec::new(),
        }
    }
}

/// Read a wavefunction configuration from a YAML file.
pub fn read_config(path: impl AsRef<Path>) -> Result<WaveFunctionConfig> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_yaml::from_reader(reader)?)
}

pub fn parse_config(yaml: &str) -> Result<WaveFunctionConfig> {
    Ok(serde_yaml::from_str(yaml)?)
}

pub fn to_yaml(config: &WaveFunctionConfig) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}

// example of yaml file
// determinant:
//   refresh_interval: 32
// two_body:
//   opposite_species: { a: 0.5, b: 1.2 }
// three_body:
//   cutoff: 2.5
