//! Error types for tessera-pipeline

use std::path::PathBuf;
use tessera_colormap::ColorError;
use thiserror::Error;

/// Errors raised while rendering layers or maintaining manifests.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] tessera_core::Error),

    #[error(transparent)]
    Color(#[from] ColorError),

    #[error("zoom {zoom}: {count} tiles exceeds the ceiling of {ceiling}")]
    TileCountExceeded { zoom: u8, count: u64, ceiling: u64 },

    #[error("failed to read manifest {}: {reason}", path.display())]
    ManifestRead { path: PathBuf, reason: String },

    #[error("failed to write manifest {}: {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the run must stop. Everything else is isolated to a layer
    /// or zoom level.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::ManifestWrite { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::Core(e) if e.is_timeout())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        PipelineError::Encode(e.to_string())
    }
}

/// Result type alias for tessera-pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
