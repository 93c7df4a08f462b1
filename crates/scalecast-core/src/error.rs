//! Policy validation errors.

use thiserror::Error;

/// Reasons a `ScalingPolicy` is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("service type must not be empty")]
    EmptyServiceType,

    #[error("min instances ({min}) exceeds max instances ({max})")]
    InstanceBounds { min: u32, max: u32 },

    #[error("{field} must be within [0, 1], got {value}")]
    Fraction { field: &'static str, value: f64 },

    #[error("spot and preemptible fractions sum to {sum}, which exceeds 1")]
    FractionSum { sum: f64 },

    #[error("threshold for {metric} must be positive, got {value}")]
    Threshold { metric: String, value: f64 },

    #[error("unit cost must be non-negative, got {0}")]
    UnitCost(f64),

    #[error("prediction horizon must be non-zero when predictive scaling is enabled")]
    ZeroHorizon,
}
