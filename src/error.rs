//! Error type shared by every wavefunction component.

use thiserror::Error;

/// Failures surfaced by the wavefunction and its components.
///
/// A small or negative ratio is never an error; only structural
/// impossibilities end up here. The sampler is expected to discard the
/// configuration when it sees one.
#[derive(Debug, Error)]
pub enum WfnError {
    /// The Slater matrix is not invertible (or produced non-finite values).
    #[error("singular wavefunction in {component}: {detail}")]
    SingularWavefunction { component: String, detail: String },

    /// A particle index outside of the particle set.
    #[error("particle index {index} out of range (0..{len})")]
    OutOfRangeParticleIndex { index: usize, len: usize },

    /// Propose / accept / restore called out of sequence.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Construction parameters that cannot describe a wavefunction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl WfnError {
    pub(crate) fn singular(component: &str, detail: impl Into<String>) -> Self {
        WfnError::SingularWavefunction {
            component: component.to_string(),
            detail: detail.into(),
        }
    }

    /// True for errors that only invalidate the current configuration.
    pub fn is_configuration_reject(&self) -> bool {
        matches!(self, WfnError::SingularWavefunction { .. })
    }
}

pub type Result<T> = std::result::Result<T, WfnError>;
