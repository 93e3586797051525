use thiserror::Error;

use crate::data::Split;

/// Result type for faceattr operations
pub type Result<T> = std::result::Result<T, FaceAttrError>;

/// Main error type for the faceattr library
#[derive(Debug, Clone, Error)]
pub enum FaceAttrError {
    /// Unsupported strategy name or invalid configuration value
    #[error("Invalid configuration '{name}': {reason}")]
    Config {
        name: String,
        reason: String,
    },

    /// Invalid dimensions for operations
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Malformed attribute or partition files
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A split yielded no samples
    #[error("Split '{0}' produced no samples")]
    EmptySplit(Split),

    /// Image decoding errors
    #[error("Image error: {0}")]
    ImageError(String),

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Prediction requested before a best model is available
    #[error("Model not ready: {0}")]
    ModelNotReady(String),

    /// Non-finite loss; the run is aborted
    #[error("Training diverged at epoch {epoch}, batch {batch}: loss = {loss}")]
    TrainingDiverged {
        epoch: usize,
        batch: usize,
        loss: f32,
    },

    /// Invalid training state transition
    #[error("Training error: {0}")]
    TrainingError(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for FaceAttrError {
    fn from(err: std::io::Error) -> Self {
        FaceAttrError::IoError(err.to_string())
    }
}

// Conversion from bincode::Error
impl From<bincode::Error> for FaceAttrError {
    fn from(err: bincode::Error) -> Self {
        FaceAttrError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for FaceAttrError {
    fn from(err: serde_json::Error) -> Self {
        FaceAttrError::SerializationError(err.to_string())
    }
}

impl From<image::ImageError> for FaceAttrError {
    fn from(err: image::ImageError) -> Self {
        FaceAttrError::ImageError(err.to_string())
    }
}

// Helper functions for common error patterns
impl FaceAttrError {
    pub fn config<S: Into<String>, R: Into<String>>(name: S, reason: R) -> Self {
        FaceAttrError::Config {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        FaceAttrError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// True for errors that must abort a run rather than be reported.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FaceAttrError::TrainingDiverged { .. })
    }
}
