//! Error types for Partmix.

use thiserror::Error;

/// Main error type for mixing and audio operations.
#[derive(Error, Debug)]
pub enum PartmixError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid mix description: {0}")]
    InvalidMixDescription(String),

    #[error("Invalid mix spec: {0}")]
    InvalidMixSpec(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Processing failure: {0}")]
    Processing(String),
}

impl PartmixError {
    /// Convert into an `io::Error` for use inside `Read` implementations.
    pub fn into_io(self) -> std::io::Error {
        match self {
            Self::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

/// Result type alias for Partmix operations.
pub type Result<T> = std::result::Result<T, PartmixError>;
