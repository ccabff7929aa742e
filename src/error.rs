//! Errors reported by reconstruction runs and their collaborators.

use std::fmt;
use thiserror::Error;

/// Result type for reconstruction operations
pub type Result<T> = std::result::Result<T, ReconError>;

/// Error types for reconstruction operations
#[derive(Error, Debug)]
pub enum ReconError {
    /// Unsupported or inconsistent projection mode, backend or iteration
    /// settings. Raised at construction, before any data is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Incompatible shapes or physical extents of images, LORs, listmode
    /// data or sensitivity maps. Raised before the first projection.
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// NaN or infinity appeared in an intermediate result
    #[error("numerical instability in {stage} of iteration {iteration}: element {element} is {value}")]
    NumericalInstability {
        iteration: usize,
        stage: Stage,
        element: usize,
        value: f32,
    },

    /// Input values which no reconstruction can use: negative or non-finite
    /// counts or sensitivities.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Failure while talking to the GPU
    #[error("device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// The step of an MLEM iteration in which a numerical problem was detected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// measured / projected
    Ratio,
    /// estimate * backprojection / sensitivity
    Update,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Ratio  => write!(f, "measured/projected ratio"),
            Stage::Update => write!(f, "image update"),
        }
    }
}

impl ReconError {
    pub fn configuration(msg: impl Into<String>) -> Self { Self::Configuration(msg.into()) }
    pub fn geometry     (msg: impl Into<String>) -> Self { Self::GeometryMismatch(msg.into()) }
    pub fn invalid_input(msg: impl Into<String>) -> Self { Self::InvalidInput(msg.into()) }
    pub fn device       (msg: impl Into<String>) -> Self { Self::Device(msg.into()) }
}
