//! Decision engine: turns averaged metrics and an optional forecast into
//! a [`ScalingAction`].
//!
//! Evaluation order per service type:
//!
//! 1. cooldown gate
//! 2. no-data gate
//! 3. reactive thresholds against the window average
//! 4. predictive recommendation, if confident enough
//! 5. tie-break (scale up wins)
//! 6. min/max clamp
//! 7. sizing
//! 8. cost annotation
//!
//! The engine is pure apart from the caller-owned [`ServiceRuntime`]; the
//! caller serializes evaluations of one service type.

use tracing::debug;

use scalecast_core::{
    MetricSample, Prediction, ScalingAction, ScalingDirection, ScalingPolicy, SCALE_DOWN_FACTOR,
};

use crate::cost::{CostEstimator, CostSnapshot};

/// Reason reported while a service type is inside its cooldown window.
pub const COOLING_DOWN: &str = "cooling down";

/// Reason reported when the decision window holds no samples.
pub const INSUFFICIENT_METRICS: &str = "insufficient metrics";

/// Largest number of instances added in one evaluation.
pub const MAX_SCALE_STEP: u32 = 3;

/// Mutable per-service-type state carried between evaluations.
#[derive(Debug, Clone, Default)]
pub struct ServiceRuntime {
    /// Timestamp of the last executed (non-no-op) action.
    pub last_action_ms: Option<u64>,
    /// The last executed action.
    pub last_action: Option<ScalingAction>,
    /// The most recent evaluation, no-ops included.
    pub last_evaluation: Option<ScalingAction>,
    pub cost: CostSnapshot,
}

impl ServiceRuntime {
    pub fn in_cooldown(&self, policy: &ScalingPolicy, now_ms: u64) -> bool {
        self.last_action_ms.is_some_and(|last| {
            now_ms.saturating_sub(last) < policy.cool_down_period.as_millis() as u64
        })
    }
}

/// Inputs gathered by the caller for one evaluation.
#[derive(Debug, Clone)]
pub struct Observation<'a> {
    /// Live instance count, read from the registry for this evaluation.
    pub current_instances: u32,
    /// Samples inside the decision window.
    pub recent: &'a [MetricSample],
    pub prediction: Option<Prediction>,
    pub now_ms: u64,
}

/// Evaluates scaling rules for one service type at a time.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    cost: CostEstimator,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the action for this evaluation.
    ///
    /// Updates `runtime.last_action_ms` when the result is not `no_action`.
    pub fn evaluate(
        &self,
        policy: &ScalingPolicy,
        runtime: &mut ServiceRuntime,
        observation: Observation<'_>,
    ) -> ScalingAction {
        let Observation {
            current_instances: current,
            recent,
            prediction,
            now_ms,
        } = observation;

        if runtime.in_cooldown(policy, now_ms) {
            return self.hold(policy, current, COOLING_DOWN.to_string(), None, prediction, now_ms);
        }

        let Some(average) = MetricSample::average(recent, &policy.service_type, now_ms) else {
            return self.hold(policy, current, INSUFFICIENT_METRICS.to_string(), None, prediction, now_ms);
        };

        let mut scale_up = false;
        let mut scale_down = false;
        let mut up_reasons = Vec::new();
        let mut down_reasons = Vec::new();
        let mut max_ratio: f64 = 0.0;

        for (metric, threshold) in policy.thresholds.iter() {
            let value = average.get(metric);
            let floor = threshold * SCALE_DOWN_FACTOR;
            if value > threshold {
                scale_up = true;
                max_ratio = max_ratio.max(value / threshold);
                up_reasons.push(format!("{metric} {value:.2} above {threshold:.2}"));
            } else if value < floor {
                scale_down = true;
                down_reasons.push(format!("{metric} {value:.2} below {floor:.2}"));
            }
        }

        if let Some(p) = prediction.as_ref().filter(|_| policy.predictive.enabled)
            && p.confidence >= policy.predictive.confidence_threshold
        {
            match p.recommended_action {
                ScalingDirection::ScaleUp => {
                    scale_up = true;
                    up_reasons.push(p.reasoning.clone());
                }
                ScalingDirection::ScaleDown => {
                    scale_down = true;
                    down_reasons.push(p.reasoning.clone());
                }
                ScalingDirection::NoAction => {}
            }
        }

        let (direction, target, reasons) = if scale_up {
            if current >= policy.max_instances {
                let reason = format!("at maximum instances ({})", policy.max_instances);
                return self.hold(policy, current, reason, Some(average), prediction, now_ms);
            }
            let step = (max_ratio.ceil() as u32).clamp(1, MAX_SCALE_STEP);
            let target = policy.clamp_instances(current.saturating_add(step));
            (ScalingDirection::ScaleUp, target, up_reasons)
        } else if scale_down {
            if current <= policy.min_instances {
                let reason = format!("at minimum instances ({})", policy.min_instances);
                return self.hold(policy, current, reason, Some(average), prediction, now_ms);
            }
            let target = policy.clamp_instances(current - 1);
            (ScalingDirection::ScaleDown, target, down_reasons)
        } else {
            let reason = "metrics within thresholds".to_string();
            return self.hold(policy, current, reason, Some(average), prediction, now_ms);
        };

        debug!(
            service_type = %policy.service_type,
            action = %direction,
            from = current,
            to = target,
            "scaling decision"
        );

        runtime.last_action_ms = Some(now_ms);
        ScalingAction {
            service_type: policy.service_type.clone(),
            action: direction,
            current_instances: current,
            target_instances: target,
            reason: reasons.join("; "),
            metrics: Some(average),
            prediction,
            cost_impact: self.cost.estimate(direction, current, target, &policy.cost_mix),
            timestamp_ms: now_ms,
        }
    }

    fn hold(
        &self,
        policy: &ScalingPolicy,
        current: u32,
        reason: String,
        metrics: Option<MetricSample>,
        prediction: Option<Prediction>,
        now_ms: u64,
    ) -> ScalingAction {
        ScalingAction {
            service_type: policy.service_type.clone(),
            action: ScalingDirection::NoAction,
            current_instances: current,
            target_instances: policy.clamp_instances(current),
            reason,
            metrics,
            prediction,
            cost_impact: Default::default(),
            timestamp_ms: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use scalecast_core::{CostMix, ForecastModel, Metric, Thresholds};

    use super::*;

    const MINUTE: u64 = 60_000;
    const NOW: u64 = 1_000 * MINUTE;

    fn test_policy(min: u32, max: u32) -> ScalingPolicy {
        let mut policy = ScalingPolicy::new("api", min, max);
        policy.cool_down_period = Duration::from_secs(300);
        policy.thresholds = Thresholds::default()
            .with(Metric::CpuUsage, 80.0)
            .with(Metric::MemoryUsage, 80.0);
        policy
    }

    fn samples(cpu: f64, memory: f64) -> Vec<MetricSample> {
        (0..3)
            .map(|i| {
                MetricSample::new("api-1", NOW - i * MINUTE)
                    .with(Metric::CpuUsage, cpu)
                    .with(Metric::MemoryUsage, memory)
            })
            .collect()
    }

    fn observe(current: u32, recent: &[MetricSample]) -> Observation<'_> {
        Observation {
            current_instances: current,
            recent,
            prediction: None,
            now_ms: NOW,
        }
    }

    fn test_prediction(action: ScalingDirection, confidence: f64) -> Prediction {
        Prediction {
            service_type: "api".to_string(),
            predicted_metrics: MetricSample::new("api", NOW + 5 * MINUTE),
            confidence,
            recommended_instances: 6,
            recommended_action: action,
            reasoning: "forecast says so".to_string(),
            horizon: Duration::from_secs(300),
            model: ForecastModel::Linear,
            generated_at_ms: NOW,
        }
    }

    #[test]
    fn high_cpu_scales_up_proportionally() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        // 170 / 80 = 2.125, ceil = 3.
        let recent = samples(170.0, 60.0);
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(2, &recent));

        assert_eq!(action.action, ScalingDirection::ScaleUp);
        assert_eq!(action.target_instances, 5);
        assert!(action.reason.contains("cpu_usage"));
        assert_eq!(runtime.last_action_ms, Some(NOW));
    }

    #[test]
    fn scale_up_step_is_capped() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let recent = samples(800.0, 60.0);
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(2, &recent));
        assert_eq!(action.target_instances, 2 + MAX_SCALE_STEP);
    }

    #[test]
    fn scale_up_never_exceeds_max() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let recent = samples(200.0, 60.0);
        let action = engine.evaluate(&test_policy(1, 4), &mut runtime, observe(3, &recent));
        assert_eq!(action.action, ScalingDirection::ScaleUp);
        assert_eq!(action.target_instances, 4);
    }

    #[test]
    fn at_max_degrades_to_no_action() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let recent = samples(200.0, 60.0);
        let action = engine.evaluate(&test_policy(1, 4), &mut runtime, observe(4, &recent));
        assert!(action.is_no_op());
        assert_eq!(action.target_instances, 4);
        assert!(runtime.last_action_ms.is_none());
    }

    #[test]
    fn scale_down_is_single_step() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let recent = samples(5.0, 5.0);
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(8, &recent));
        assert_eq!(action.action, ScalingDirection::ScaleDown);
        assert_eq!(action.target_instances, 7);
    }

    #[test]
    fn at_min_does_not_scale_down() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let recent = samples(5.0, 5.0);
        let action = engine.evaluate(&test_policy(2, 10), &mut runtime, observe(2, &recent));
        assert!(action.is_no_op());
    }

    #[test]
    fn scale_up_wins_tie_break() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        // cpu above its threshold, memory below its scale-down floor.
        let recent = samples(90.0, 10.0);
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(3, &recent));
        assert_eq!(action.action, ScalingDirection::ScaleUp);
        assert!(!action.reason.contains("memory_usage"));
    }

    #[test]
    fn cooldown_blocks_any_action() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime {
            last_action_ms: Some(NOW - 2 * MINUTE),
            ..Default::default()
        };
        let recent = samples(300.0, 300.0);
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(3, &recent));
        assert!(action.is_no_op());
        assert_eq!(action.reason, COOLING_DOWN);
        assert_eq!(runtime.last_action_ms, Some(NOW - 2 * MINUTE));
    }

    #[test]
    fn cooldown_expires() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime {
            last_action_ms: Some(NOW - 5 * MINUTE),
            ..Default::default()
        };
        let recent = samples(90.0, 60.0);
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(3, &recent));
        assert_eq!(action.action, ScalingDirection::ScaleUp);
    }

    #[test]
    fn empty_window_is_insufficient() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(3, &[]));
        assert!(action.is_no_op());
        assert_eq!(action.reason, INSUFFICIENT_METRICS);
        assert!(action.metrics.is_none());
    }

    #[test]
    fn between_thresholds_is_no_op() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        // Both metrics between 56 (80 × 0.7) and 80.
        let recent = samples(70.0, 60.0);
        let action = engine.evaluate(&test_policy(1, 10), &mut runtime, observe(3, &recent));
        assert!(action.is_no_op());
        assert_eq!(action.target_instances, 3);
        assert_eq!(action.cost_impact, Default::default());
        assert!(runtime.last_action_ms.is_none());
    }

    #[test]
    fn no_action_target_is_clamped() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let action = engine.evaluate(&test_policy(2, 10), &mut runtime, observe(0, &[]));
        assert_eq!(action.target_instances, 2);
    }

    #[test]
    fn confident_prediction_triggers_scale_up() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let mut policy = test_policy(1, 10);
        policy.predictive.enabled = true;
        policy.predictive.confidence_threshold = 0.7;

        let recent = samples(70.0, 60.0);
        let mut observation = observe(3, &recent);
        observation.prediction = Some(test_prediction(ScalingDirection::ScaleUp, 0.9));
        let action = engine.evaluate(&policy, &mut runtime, observation);

        assert_eq!(action.action, ScalingDirection::ScaleUp);
        assert_eq!(action.target_instances, 4);
        assert!(action.reason.contains("forecast says so"));
        assert!(action.prediction.is_some());
    }

    #[test]
    fn unconfident_prediction_is_ignored() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let mut policy = test_policy(1, 10);
        policy.predictive.enabled = true;
        policy.predictive.confidence_threshold = 0.7;

        let recent = samples(70.0, 60.0);
        let mut observation = observe(3, &recent);
        observation.prediction = Some(test_prediction(ScalingDirection::ScaleUp, 0.5));
        let action = engine.evaluate(&policy, &mut runtime, observation);
        assert!(action.is_no_op());
    }

    #[test]
    fn scale_up_carries_cost() {
        let engine = DecisionEngine::new();
        let mut runtime = ServiceRuntime::default();
        let mut policy = test_policy(1, 10);
        policy.cost_mix = CostMix {
            enabled: true,
            spot_fraction: 0.0,
            preemptible_fraction: 0.0,
            unit_cost: 0.1,
        };
        // 90 / 80 rounds up to two new on-demand instances.
        let recent = samples(90.0, 60.0);
        let action = engine.evaluate(&policy, &mut runtime, observe(3, &recent));
        assert_eq!(action.target_instances, 5);
        assert!((action.cost_impact.estimated_increase - 0.2).abs() < 1e-9);
    }

    #[test]
    fn targets_stay_within_bounds() {
        let engine = DecisionEngine::new();
        for (min, max) in [(0, 0), (0, 3), (2, 5), (4, 4)] {
            let policy = test_policy(min, max);
            for current in 0..8 {
                for (cpu, memory) in [(500.0, 10.0), (5.0, 5.0), (70.0, 70.0)] {
                    let mut runtime = ServiceRuntime::default();
                    let recent = samples(cpu, memory);
                    let action = engine.evaluate(&policy, &mut runtime, observe(current, &recent));
                    assert!(
                        (min..=max).contains(&action.target_instances),
                        "{min}..={max} current={current} -> {}",
                        action.target_instances
                    );
                }
            }
        }
    }
}
