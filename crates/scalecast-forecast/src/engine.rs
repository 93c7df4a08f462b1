//! Prediction engine: forecasts, confidence, and instance recommendations.
//!
//! Produces a fresh [`Prediction`] per request and keeps a bounded history
//! per service type for inspection only; nothing reads the history back
//! into a decision.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use scalecast_core::duration::format_duration;
use scalecast_core::{Metric, MetricSample, Prediction, ScalingDirection, ScalingPolicy};

use crate::error::{PredictionError, PredictionResult};
use crate::{model, trend};

/// Confidence reported when there is too little data to back-test.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Minimum usable held-out points for a back-test.
const MIN_BACKTEST_POINTS: usize = 5;

/// Upper bound on held-out points.
const MAX_BACKTEST_POINTS: usize = 10;

/// Recommendations within this relative change of the current count are
/// reported as `no_action`.
const RECOMMENDATION_DEADBAND: f64 = 0.1;

/// Tunables for the prediction engine.
#[derive(Debug, Clone)]
pub struct PredictionSettings {
    /// Samples required before forecasting.
    pub min_samples: usize,
    /// How long generated predictions are kept.
    pub history_retention: Duration,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            min_samples: 10,
            history_retention: Duration::from_secs(3600),
        }
    }
}

/// Forecasts near-future load for service types.
pub struct PredictionEngine {
    settings: PredictionSettings,
    history: RwLock<HashMap<String, VecDeque<Prediction>>>,
}

impl PredictionEngine {
    pub fn new(settings: PredictionSettings) -> Self {
        Self {
            settings,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PredictionSettings {
        &self.settings
    }

    /// Forecast the service type's metrics `policy.predictive.horizon` ahead.
    ///
    /// `samples` are the retained samples of the service type (any order)
    /// and `current` its live instance count.
    pub fn forecast(
        &self,
        policy: &ScalingPolicy,
        samples: &[MetricSample],
        current: u32,
        now_ms: u64,
    ) -> PredictionResult<Prediction> {
        let predictive = &policy.predictive;
        if !predictive.enabled {
            return Err(PredictionError::NotEnabled(policy.service_type.clone()));
        }
        if samples.len() < self.settings.min_samples {
            return Err(PredictionError::InsufficientData {
                required: self.settings.min_samples,
                available: samples.len(),
            });
        }

        let mut ordered = samples.to_vec();
        ordered.sort_by_key(|s| s.timestamp_ms);

        let horizon_ms = predictive.horizon.as_millis() as f64;
        let steps = match average_interval_ms(&ordered) {
            interval if interval > 0.0 => horizon_ms / interval,
            _ => 0.0,
        };

        let mut predicted = MetricSample::new(
            policy.service_type.as_str(),
            now_ms.saturating_add(u64::try_from(predictive.horizon.as_millis()).unwrap_or(u64::MAX)),
        );
        for metric in Metric::ALL {
            let series = MetricSample::series(&ordered, metric);
            let value = model::forecast(predictive.model, &series, steps);
            predicted.set(metric, metric.clamp(value));
        }

        let confidence = confidence(&ordered);
        let (recommended_instances, recommended_action, reasons) =
            recommend(policy, &predicted, current);

        let outlook = if reasons.is_empty() {
            "predicted load within thresholds".to_string()
        } else {
            reasons.join("; ")
        };
        let reasoning = format!(
            "{} forecast over {}: {outlook} (confidence {confidence:.2})",
            predictive.model,
            format_duration(predictive.horizon),
        );

        debug!(
            service_type = %policy.service_type,
            model = %predictive.model,
            samples = ordered.len(),
            steps,
            confidence,
            recommended = recommended_instances,
            "prediction computed"
        );

        Ok(Prediction {
            service_type: policy.service_type.clone(),
            predicted_metrics: predicted,
            confidence,
            recommended_instances,
            recommended_action,
            reasoning,
            horizon: predictive.horizon,
            model: predictive.model,
            generated_at_ms: now_ms,
        })
    }

    /// Forecast and append the result to the service type's history.
    pub async fn generate(
        &self,
        policy: &ScalingPolicy,
        samples: &[MetricSample],
        current: u32,
        now_ms: u64,
    ) -> PredictionResult<Prediction> {
        let prediction = self.forecast(policy, samples, current, now_ms)?;

        let cutoff = now_ms.saturating_sub(self.settings.history_retention.as_millis() as u64);
        let mut history = self.history.write().await;
        let entries = history.entry(policy.service_type.clone()).or_default();
        entries.push_back(prediction.clone());
        while entries.front().is_some_and(|p| p.generated_at_ms < cutoff) {
            entries.pop_front();
        }

        Ok(prediction)
    }

    /// Retained predictions for a service type, oldest first.
    pub async fn history(&self, service_type: &str) -> Vec<Prediction> {
        self.history
            .read()
            .await
            .get(service_type)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recent prediction for a service type.
    pub async fn latest(&self, service_type: &str) -> Option<Prediction> {
        self.history
            .read()
            .await
            .get(service_type)
            .and_then(|entries| entries.back().cloned())
    }

    /// Drop the history of one service type.
    pub async fn forget(&self, service_type: &str) {
        self.history.write().await.remove(service_type);
    }

    /// Drop every history.
    pub async fn clear(&self) {
        self.history.write().await.clear();
    }
}

/// Mean spacing between consecutive samples, in milliseconds.
fn average_interval_ms(ordered: &[MetricSample]) -> f64 {
    match (ordered.first(), ordered.last()) {
        (Some(first), Some(last)) if ordered.len() > 1 => {
            (last.timestamp_ms - first.timestamp_ms) as f64 / (ordered.len() - 1) as f64
        }
        _ => 0.0,
    }
}

/// Back-test the linear model on the trailing samples.
///
/// The last `min(n / 3, 10)` CPU readings are held out; the rest train the
/// slope. Each held-out point contributes `|actual − predicted| / actual`.
/// Points whose actual value is exactly zero are skipped, since the
/// relative error is undefined there. With fewer than five usable points
/// the confidence is [`DEFAULT_CONFIDENCE`].
pub fn confidence(ordered: &[MetricSample]) -> f64 {
    let cpu = MetricSample::series(ordered, Metric::CpuUsage);
    let holdout = (cpu.len() / 3).min(MAX_BACKTEST_POINTS);
    if holdout < MIN_BACKTEST_POINTS {
        return DEFAULT_CONFIDENCE;
    }

    let (train, test) = cpu.split_at(cpu.len() - holdout);
    let slope = trend::slope(train);
    let Some(&last_trained) = train.last() else {
        return DEFAULT_CONFIDENCE;
    };

    let errors: Vec<f64> = test
        .iter()
        .enumerate()
        .filter(|(_, actual)| **actual != 0.0)
        .map(|(k, actual)| {
            let predicted = last_trained + slope * (k + 1) as f64;
            ((actual - predicted) / actual).abs()
        })
        .collect();

    if errors.len() < MIN_BACKTEST_POINTS {
        return DEFAULT_CONFIDENCE;
    }

    let mean_error = errors.iter().sum::<f64>() / errors.len() as f64;
    (1.0 - mean_error).clamp(0.0, 1.0)
}

/// Size the service type for the predicted load.
///
/// Every configured threshold the prediction exceeds contributes a
/// `predicted / threshold` ratio; the largest (default 1) scales the
/// current count, and the result is clamped to the policy bounds.
pub fn recommend(
    policy: &ScalingPolicy,
    predicted: &MetricSample,
    current: u32,
) -> (u32, ScalingDirection, Vec<String>) {
    let mut max_ratio: f64 = 1.0;
    let mut reasons = Vec::new();
    for (metric, threshold) in policy.thresholds.iter() {
        let value = predicted.get(metric);
        if value > threshold {
            max_ratio = max_ratio.max(value / threshold);
            reasons.push(format!(
                "predicted {metric} {value:.2} exceeds threshold {threshold:.2}"
            ));
        }
    }

    let scaled = (f64::from(current) * max_ratio).ceil();
    let recommended = policy.clamp_instances(scaled.min(f64::from(u32::MAX)) as u32);

    let action = if current == 0 {
        if recommended > 0 {
            ScalingDirection::ScaleUp
        } else {
            ScalingDirection::NoAction
        }
    } else {
        let change =
            (f64::from(recommended) - f64::from(current)).abs() / f64::from(current);
        if change < RECOMMENDATION_DEADBAND {
            ScalingDirection::NoAction
        } else if recommended > current {
            ScalingDirection::ScaleUp
        } else {
            ScalingDirection::ScaleDown
        }
    };

    (recommended, action, reasons)
}
