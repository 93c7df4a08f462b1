//! scalecast.toml controller configuration.
//!
//! ```toml
//! evaluation_interval = "30s"
//! retention = "30m"
//!
//! [[policy]]
//! service_type = "api"
//! min_instances = 2
//! max_instances = 20
//! cool_down_period = "5m"
//!
//! [policy.thresholds]
//! cpu_usage = 75.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::ScalingPolicy;

/// Controller-wide settings plus the initial set of policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Period of each service type's evaluation loop.
    #[serde(with = "crate::duration::serde_str", default = "default_evaluation_interval")]
    pub evaluation_interval: Duration,
    /// Samples older than this are pruned on every write.
    #[serde(with = "crate::duration::serde_str", default = "default_retention")]
    pub retention: Duration,
    /// Window averaged by the reactive threshold rules.
    #[serde(with = "crate::duration::serde_str", default = "default_decision_window")]
    pub decision_window: Duration,
    /// How long generated predictions are kept for inspection.
    #[serde(with = "crate::duration::serde_str", default = "default_prediction_history")]
    pub prediction_history: Duration,
    /// Samples required before a prediction is attempted.
    #[serde(default = "default_min_prediction_samples")]
    pub min_prediction_samples: usize,
    #[serde(default, rename = "policy")]
    pub policies: Vec<ScalingPolicy>,
}

fn default_evaluation_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_retention() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_decision_window() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_prediction_history() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_min_prediction_samples() -> usize {
    10
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: default_evaluation_interval(),
            retention: default_retention(),
            decision_window: default_decision_window(),
            prediction_history: default_prediction_history(),
            min_prediction_samples: default_min_prediction_samples(),
            policies: Vec::new(),
        }
    }
}

impl ControllerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a TOML document and validate every policy in it.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ControllerConfig = toml::from_str(content)?;
        for policy in &config.policies {
            policy
                .validate()
                .map_err(|e| anyhow::anyhow!("policy {:?}: {e}", policy.service_type))?;
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metric;
    use crate::policy::ForecastModel;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ControllerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.evaluation_interval, Duration::from_secs(30));
        assert_eq!(config.retention, Duration::from_secs(1800));
        assert_eq!(config.min_prediction_samples, 10);
    }

    #[test]
    fn parses_policies() {
        let config = ControllerConfig::from_toml_str(
            r#"
            evaluation_interval = "10s"

            [[policy]]
            service_type = "api"
            min_instances = 2
            max_instances = 20
            cool_down_period = "2m"

            [policy.thresholds]
            cpu_usage = 75.0
            queue_length = 100.0

            [policy.predictive]
            enabled = true
            horizon = "10m"
            confidence_threshold = 0.6
            model = "neural"

            [policy.cost_mix]
            enabled = true
            spot_fraction = 0.3
            preemptible_fraction = 0.2

            [policy.tags]
            team = "payments"

            [[policy]]
            service_type = "worker"
            min_instances = 0
            max_instances = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.evaluation_interval, Duration::from_secs(10));
        assert_eq!(config.policies.len(), 2);

        let api = &config.policies[0];
        assert_eq!(api.cool_down_period, Duration::from_secs(120));
        assert_eq!(api.thresholds.get(Metric::CpuUsage), Some(75.0));
        assert_eq!(api.thresholds.get(Metric::QueueLength), Some(100.0));
        assert!(api.predictive.enabled);
        assert_eq!(api.predictive.horizon, Duration::from_secs(600));
        assert_eq!(api.predictive.model, ForecastModel::Momentum);
        assert_eq!(api.cost_mix.unit_cost, 0.1);
        assert_eq!(api.tags.get("team").map(String::as_str), Some("payments"));

        let worker = &config.policies[1];
        assert!(worker.thresholds.is_empty());
        assert!(!worker.predictive.enabled);
        assert_eq!(worker.instance_config.port, 8080);
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let err = ControllerConfig::from_toml_str(
            r#"
            [[policy]]
            service_type = "api"
            min_instances = 5
            max_instances = 1
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min instances"));
    }

    #[test]
    fn invalid_duration_is_rejected() {
        assert!(ControllerConfig::from_toml_str("retention = \"forever\"").is_err());
    }

    #[test]
    fn oversized_duration_is_rejected() {
        assert!(ControllerConfig::from_toml_str("retention = \"999999999999999999m\"").is_err());
    }

    #[test]
    fn toml_output_parses_back() {
        let mut config = ControllerConfig::default();
        config.policies.push(ScalingPolicy::new("api", 1, 5));
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(ControllerConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
