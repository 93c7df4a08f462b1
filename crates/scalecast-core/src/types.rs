//! Predictions and scaling actions exchanged between the engines.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metrics::MetricSample;
use crate::policy::ForecastModel;

/// Direction of a scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    ScaleUp,
    ScaleDown,
    NoAction,
}

impl fmt::Display for ScalingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalingDirection::ScaleUp => "scale_up",
            ScalingDirection::ScaleDown => "scale_down",
            ScalingDirection::NoAction => "no_action",
        })
    }
}

/// Estimated cost effect of a scaling action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostImpact {
    pub estimated_increase: f64,
    pub estimated_savings: f64,
}

/// A forecast of a service type's load at `generated_at_ms + horizon`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub service_type: String,
    /// Synthetic sample timestamped at the end of the horizon.
    pub predicted_metrics: MetricSample,
    /// Back-tested confidence in `[0, 1]`.
    pub confidence: f64,
    pub recommended_instances: u32,
    pub recommended_action: ScalingDirection,
    pub reasoning: String,
    #[serde(with = "crate::duration::serde_str")]
    pub horizon: Duration,
    pub model: ForecastModel,
    pub generated_at_ms: u64,
}

/// Outcome of one evaluation of a service type.
///
/// Produced once per evaluation and never retried; a failed evaluation
/// waits for the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingAction {
    pub service_type: String,
    pub action: ScalingDirection,
    pub current_instances: u32,
    pub target_instances: u32,
    /// Triggering conditions joined with "; ".
    pub reason: String,
    /// Window-averaged metrics the decision was based on.
    pub metrics: Option<MetricSample>,
    pub prediction: Option<Prediction>,
    pub cost_impact: CostImpact,
    pub timestamp_ms: u64,
}

impl ScalingAction {
    /// Whether this action leaves the instance count unchanged.
    pub fn is_no_op(&self) -> bool {
        self.action == ScalingDirection::NoAction
    }

    /// Signed instance delta (`target - current`).
    pub fn delta(&self) -> i64 {
        i64::from(self.target_instances) - i64::from(self.current_instances)
    }
}
