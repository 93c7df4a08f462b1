//! Autoscaler error types.

use thiserror::Error;

use scalecast_core::PolicyError;
use scalecast_forecast::PredictionError;
use scalecast_registry::RegistryError;

use crate::executor::RegistryOperation;

/// Errors surfaced by the autoscaling controller.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("service type not configured: {0}")]
    NotConfigured(String),

    #[error("invalid scaling policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("registry {operation} failed for {service_type}: {message}")]
    RegistryCallFailed {
        service_type: String,
        operation: RegistryOperation,
        message: String,
    },
}

pub type AutoscaleResult<T> = Result<T, AutoscaleError>;
