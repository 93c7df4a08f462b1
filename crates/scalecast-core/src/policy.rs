//! Per-service-type scaling policies.
//!
//! A policy is created by operator configuration and treated as
//! immutable until replaced wholesale through `configure`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::metrics::Metric;

/// Scale-down threshold = scale-up threshold × this factor.
pub const SCALE_DOWN_FACTOR: f64 = 0.7;

/// Scaling rules for one service type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub service_type: String,
    pub min_instances: u32,
    pub max_instances: u32,
    /// No new scaling action within this period of the last executed one.
    #[serde(with = "crate::duration::serde_str", default = "default_cool_down")]
    pub cool_down_period: Duration,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub predictive: PredictiveConfig,
    #[serde(default)]
    pub cost_mix: CostMix,
    /// Resource hints attached to auto-registered instances.
    #[serde(default)]
    pub instance_config: InstanceConfig,
    /// Tags copied onto every auto-registered instance.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_cool_down() -> Duration {
    Duration::from_secs(300)
}

impl ScalingPolicy {
    /// A policy with no thresholds, prediction or cost mix.
    pub fn new(service_type: impl Into<String>, min_instances: u32, max_instances: u32) -> Self {
        Self {
            service_type: service_type.into(),
            min_instances,
            max_instances,
            cool_down_period: default_cool_down(),
            thresholds: Thresholds::default(),
            predictive: PredictiveConfig::default(),
            cost_mix: CostMix::default(),
            instance_config: InstanceConfig::default(),
            tags: BTreeMap::new(),
        }
    }

    /// Clamp an instance count into `[min_instances, max_instances]`.
    pub fn clamp_instances(&self, count: u32) -> u32 {
        count.clamp(self.min_instances, self.max_instances)
    }

    /// Check the policy for internally inconsistent settings.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.service_type.trim().is_empty() {
            return Err(PolicyError::EmptyServiceType);
        }
        if self.min_instances > self.max_instances {
            return Err(PolicyError::InstanceBounds {
                min: self.min_instances,
                max: self.max_instances,
            });
        }

        for (metric, value) in self.thresholds.iter() {
            if value.is_nan() || value <= 0.0 {
                return Err(PolicyError::Threshold {
                    metric: metric.to_string(),
                    value,
                });
            }
        }

        check_fraction("predictive.confidence_threshold", self.predictive.confidence_threshold)?;
        if self.predictive.enabled && self.predictive.horizon.is_zero() {
            return Err(PolicyError::ZeroHorizon);
        }

        check_fraction("cost_mix.spot_fraction", self.cost_mix.spot_fraction)?;
        check_fraction("cost_mix.preemptible_fraction", self.cost_mix.preemptible_fraction)?;
        let sum = self.cost_mix.spot_fraction + self.cost_mix.preemptible_fraction;
        if sum > 1.0 {
            return Err(PolicyError::FractionSum { sum });
        }
        if self.cost_mix.unit_cost.is_nan() || self.cost_mix.unit_cost < 0.0 {
            return Err(PolicyError::UnitCost(self.cost_mix.unit_cost));
        }

        Ok(())
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), PolicyError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PolicyError::Fraction { field, value })
    }
}

/// Optional scale-up thresholds, one per scalable metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_io: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_io: Option<f64>,
}

impl Thresholds {
    /// Scale-up threshold for `metric`, if one is configured.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::CpuUsage => self.cpu_usage,
            Metric::MemoryUsage => self.memory_usage,
            Metric::RequestRate => self.request_rate,
            Metric::ResponseTime => self.response_time,
            Metric::ErrorRate => self.error_rate,
            Metric::QueueLength => self.queue_length,
            Metric::DiskIo => self.disk_io,
            Metric::NetworkIo => self.network_io,
            Metric::Throughput | Metric::ActiveConnections | Metric::CacheHitRate => None,
        }
    }

    /// Builder-style setter. Metrics without a threshold slot are ignored.
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        let slot = match metric {
            Metric::CpuUsage => &mut self.cpu_usage,
            Metric::MemoryUsage => &mut self.memory_usage,
            Metric::RequestRate => &mut self.request_rate,
            Metric::ResponseTime => &mut self.response_time,
            Metric::ErrorRate => &mut self.error_rate,
            Metric::QueueLength => &mut self.queue_length,
            Metric::DiskIo => &mut self.disk_io,
            Metric::NetworkIo => &mut self.network_io,
            Metric::Throughput | Metric::ActiveConnections | Metric::CacheHitRate => {
                return self;
            }
        };
        *slot = Some(value);
        self
    }

    /// Configured `(metric, scale-up threshold)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(|metric| self.get(metric).map(|t| (metric, t)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Forecasting model used by the prediction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    Linear,
    Polynomial,
    /// Moving-average momentum heuristic.
    #[serde(alias = "neural")]
    Momentum,
    /// Fixed-weight blend of the other three.
    #[default]
    Ensemble,
}

impl fmt::Display for ForecastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ForecastModel::Linear => "linear",
            ForecastModel::Polynomial => "polynomial",
            ForecastModel::Momentum => "momentum",
            ForecastModel::Ensemble => "ensemble",
        })
    }
}

/// Forecast-driven scaling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveConfig {
    #[serde(default)]
    pub enabled: bool,
    /// How far ahead to forecast.
    #[serde(with = "crate::duration::serde_str", default = "default_horizon")]
    pub horizon: Duration,
    /// Predictions below this confidence are ignored by the decision engine.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub model: ForecastModel,
}

fn default_horizon() -> Duration {
    Duration::from_secs(300)
}

fn default_confidence_threshold() -> f64 {
    0.7
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            horizon: default_horizon(),
            confidence_threshold: default_confidence_threshold(),
            model: ForecastModel::default(),
        }
    }
}

/// Share of newly added instances assumed to run on discounted capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMix {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub spot_fraction: f64,
    #[serde(default)]
    pub preemptible_fraction: f64,
    /// Cost of one on-demand instance over the accounting period.
    #[serde(default = "default_unit_cost")]
    pub unit_cost: f64,
}

fn default_unit_cost() -> f64 {
    0.1
}

impl Default for CostMix {
    fn default() -> Self {
        Self {
            enabled: false,
            spot_fraction: 0.0,
            preemptible_fraction: 0.0,
            unit_cost: default_unit_cost(),
        }
    }
}

/// Resource hints for instances registered by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: u64,
    #[serde(default = "default_cpu_weight")]
    pub cpu_weight: u32,
}

fn default_port() -> u16 {
    8080
}

fn default_memory_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_cpu_weight() -> u32 {
    100
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            memory_bytes: default_memory_bytes(),
            cpu_weight: default_cpu_weight(),
        }
    }
}
