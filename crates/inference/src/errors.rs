use preprocess::PreprocessError;
use schema::ImageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced to callers of `detect`.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Corrupt prediction: {0}")]
    CorruptPrediction(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Fieldless mirror of [`DetectError`] for matching and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidImage,
    ShapeMismatch,
    ModelNotLoaded,
    CorruptPrediction,
    InvalidConfiguration,
    Backend,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidImage => "invalid_image",
            ErrorKind::ShapeMismatch => "shape_mismatch",
            ErrorKind::ModelNotLoaded => "model_not_loaded",
            ErrorKind::CorruptPrediction => "corrupt_prediction",
            ErrorKind::InvalidConfiguration => "invalid_configuration",
            ErrorKind::Backend => "backend",
        }
    }
}

impl DetectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectError::InvalidImage(_) => ErrorKind::InvalidImage,
            DetectError::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
            DetectError::ModelNotLoaded => ErrorKind::ModelNotLoaded,
            DetectError::CorruptPrediction(_) => ErrorKind::CorruptPrediction,
            DetectError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            DetectError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Whether the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DetectError::ModelNotLoaded)
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        DetectError::ShapeMismatch(msg.into())
    }
}

impl From<PreprocessError> for DetectError {
    fn from(e: PreprocessError) -> Self {
        match e {
            PreprocessError::InvalidImage(inner) => DetectError::InvalidImage(inner),
            other => DetectError::ShapeMismatch(other.to_string()),
        }
    }
}

/// Failures while loading the model artifact.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed architecture config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("Missing model resource: {0}")]
    MissingResource(PathBuf),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = DetectError::ShapeMismatch("expected [3, 800, 1344], got [3, 10, 10]".into());
        assert_eq!(
            err.to_string(),
            "Shape mismatch: expected [3, 800, 1344], got [3, 10, 10]"
        );

        assert_eq!(DetectError::ModelNotLoaded.to_string(), "Model not loaded");

        let err = DetectError::InvalidImage(ImageError::UnsupportedChannels(4));
        assert_eq!(
            err.to_string(),
            "Invalid image: Unsupported channel depth 4 (expected 1 or 3)"
        );

        let err = LoadError::MissingResource(PathBuf::from("/models/stage0.onnx"));
        assert_eq!(
            err.to_string(),
            "Missing model resource: /models/stage0.onnx"
        );
    }

    #[test]
    fn test_preprocess_error_conversion() {
        let err: DetectError =
            PreprocessError::InvalidImage(ImageError::ZeroDimension { width: 0, height: 100 })
                .into();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);

        let err: DetectError = PreprocessError::Resize("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn test_only_model_not_loaded_is_retryable() {
        assert!(DetectError::ModelNotLoaded.is_retryable());
        assert!(!DetectError::CorruptPrediction("nan".into()).is_retryable());
        assert!(!DetectError::shape("x").is_retryable());
    }

    #[test]
    fn test_kind_labels_are_unique() {
        let kinds = [
            ErrorKind::InvalidImage,
            ErrorKind::ShapeMismatch,
            ErrorKind::ModelNotLoaded,
            ErrorKind::CorruptPrediction,
            ErrorKind::InvalidConfiguration,
            ErrorKind::Backend,
        ];
        let labels: std::collections::HashSet<_> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(labels.len(), kinds.len());
    }
}
