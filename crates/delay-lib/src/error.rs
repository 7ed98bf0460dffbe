//! Error types for the delay model

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the delay model
#[derive(Debug, Error)]
pub enum ModelError {
    /// The artifact path does not exist. Kept distinct so the lazy-load
    /// fallback can recover from exactly this condition.
    #[error("model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// Neither a session, a classifier nor a loadable artifact is available
    #[error("no model loaded to serve predictions")]
    NoPredictionSource,

    /// No path was given and none is configured
    #[error("no artifact path given and MODEL_PATH is not configured")]
    NoArtifactPath,

    /// The artifact exists but could not be read or parsed
    #[error("failed to read model artifact {}: {source:#}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("feature width mismatch: model expects {expected} columns, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("training failed: {0}")]
    Training(String),

    #[error("inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// True for the missing-artifact condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::ArtifactNotFound(_))
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
