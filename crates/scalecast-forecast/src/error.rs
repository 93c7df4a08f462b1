//! Prediction error types.

use thiserror::Error;

/// Result type alias for prediction operations.
pub type PredictionResult<T> = Result<T, PredictionError>;

/// Reasons a prediction cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictionError {
    #[error("insufficient data for prediction: have {available} samples, need {required}")]
    InsufficientData { required: usize, available: usize },

    #[error("predictive scaling is not enabled for service type: {0}")]
    NotEnabled(String),
}
