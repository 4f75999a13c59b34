//! Error types for Stat Studio

use thiserror::Error;

/// Result type alias for Stat Studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Main error type for the analysis and serving core
#[derive(Error, Debug)]
pub enum StudioError {
    #[error("No trained model found for dataset '{0}'. Run an analysis first.")]
    NoTrainedModel(String),

    #[error("Model type mismatch: dataset holds a {actual} model, request expects {expected}")]
    ModelTypeMismatch { expected: String, actual: String },

    #[error("Unknown label code {code}: codec was fitted on {n_classes} classes")]
    UnknownLabelCode { code: i64, n_classes: usize },

    #[error("Encoded vector has {actual} columns but the frozen feature schema has {expected}")]
    EncodingShapeMismatch { expected: usize, actual: usize },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StudioError {
    /// Whether the error is caused by the request rather than by an internal fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StudioError::NoTrainedModel(_)
                | StudioError::ModelTypeMismatch { .. }
                | StudioError::DataError(_)
                | StudioError::TrainingError(_)
                | StudioError::ConfigError(_)
                | StudioError::FeatureNotFound(_)
                | StudioError::InvalidParameter { .. }
                | StudioError::InvalidInput(_)
        )
    }
}

impl From<polars::error::PolarsError> for StudioError {
    fn from(err: polars::error::PolarsError) -> Self {
        StudioError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        StudioError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for StudioError {
    fn from(err: ndarray::ShapeError) -> Self {
        StudioError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StudioError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");

        let err = StudioError::EncodingShapeMismatch { expected: 4, actual: 3 };
        assert!(err.to_string().contains("4"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StudioError = io_err.into();
        assert!(matches!(err, StudioError::IoError(_)));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(StudioError::NoTrainedModel("default".into()).is_client_error());
        assert!(!StudioError::UnknownLabelCode { code: 9, n_classes: 2 }.is_client_error());
        assert!(!StudioError::EncodingShapeMismatch { expected: 2, actual: 1 }.is_client_error());
    }
}
