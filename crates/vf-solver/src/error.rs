//! Error types for vf-solver

use thiserror::Error;

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, VfError>;

#[derive(Error, Debug)]
pub enum VfError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown boundary marker: {0}")]
    UnknownMarker(String),

    #[error("Field does not match grid topology: {0}")]
    Topology(String),

    #[error("Sparse format error: {0}")]
    Sparse(String),

    #[error("Linear backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VfError {
    /// True when the error comes from the case description rather than the numerics.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VfError::Config(_) | VfError::UnknownMarker(_) | VfError::Toml(_)
        )
    }
}
