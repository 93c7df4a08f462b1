//! Per-instance load metrics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the load metrics every instance reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuUsage,
    MemoryUsage,
    RequestRate,
    ResponseTime,
    ErrorRate,
    DiskIo,
    NetworkIo,
    QueueLength,
    Throughput,
    ActiveConnections,
    CacheHitRate,
}

impl Metric {
    /// Every metric, in reporting order.
    pub const ALL: [Metric; 11] = [
        Metric::CpuUsage,
        Metric::MemoryUsage,
        Metric::RequestRate,
        Metric::ResponseTime,
        Metric::ErrorRate,
        Metric::DiskIo,
        Metric::NetworkIo,
        Metric::QueueLength,
        Metric::Throughput,
        Metric::ActiveConnections,
        Metric::CacheHitRate,
    ];

    /// Whether the metric is a percentage bounded to `[0, 100]`.
    pub fn is_percentage(self) -> bool {
        matches!(
            self,
            Metric::CpuUsage
                | Metric::MemoryUsage
                | Metric::ErrorRate
                | Metric::DiskIo
                | Metric::NetworkIo
                | Metric::CacheHitRate
        )
    }

    /// Clamp a value into the metric's valid range.
    ///
    /// Percentages land in `[0, 100]`, rates and counts are floored at zero.
    pub fn clamp(self, value: f64) -> f64 {
        if self.is_percentage() {
            value.clamp(0.0, 100.0)
        } else {
            value.max(0.0)
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::CpuUsage => "cpu_usage",
            Metric::MemoryUsage => "memory_usage",
            Metric::RequestRate => "request_rate",
            Metric::ResponseTime => "response_time",
            Metric::ErrorRate => "error_rate",
            Metric::DiskIo => "disk_io",
            Metric::NetworkIo => "network_io",
            Metric::QueueLength => "queue_length",
            Metric::Throughput => "throughput",
            Metric::ActiveConnections => "active_connections",
            Metric::CacheHitRate => "cache_hit_rate",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time load snapshot reported by one service instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSample {
    /// Reporting instance (or service type, for synthetic samples).
    pub service_id: String,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// CPU usage (0–100).
    pub cpu_usage: f64,
    /// Memory usage (0–100).
    pub memory_usage: f64,
    /// Requests per second.
    pub request_rate: f64,
    /// Mean response time in milliseconds.
    pub response_time: f64,
    /// Error rate (0–100).
    pub error_rate: f64,
    /// Disk I/O utilisation (0–100).
    pub disk_io: f64,
    /// Network I/O utilisation (0–100).
    pub network_io: f64,
    pub queue_length: f64,
    pub throughput: f64,
    pub active_connections: f64,
    /// Cache hit rate (0–100).
    pub cache_hit_rate: f64,
}

impl MetricSample {
    /// A zeroed sample for `service_id` at `timestamp_ms`.
    pub fn new(service_id: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            service_id: service_id.into(),
            timestamp_ms,
            ..Self::default()
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::CpuUsage => self.cpu_usage,
            Metric::MemoryUsage => self.memory_usage,
            Metric::RequestRate => self.request_rate,
            Metric::ResponseTime => self.response_time,
            Metric::ErrorRate => self.error_rate,
            Metric::DiskIo => self.disk_io,
            Metric::NetworkIo => self.network_io,
            Metric::QueueLength => self.queue_length,
            Metric::Throughput => self.throughput,
            Metric::ActiveConnections => self.active_connections,
            Metric::CacheHitRate => self.cache_hit_rate,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::CpuUsage => &mut self.cpu_usage,
            Metric::MemoryUsage => &mut self.memory_usage,
            Metric::RequestRate => &mut self.request_rate,
            Metric::ResponseTime => &mut self.response_time,
            Metric::ErrorRate => &mut self.error_rate,
            Metric::DiskIo => &mut self.disk_io,
            Metric::NetworkIo => &mut self.network_io,
            Metric::QueueLength => &mut self.queue_length,
            Metric::Throughput => &mut self.throughput,
            Metric::ActiveConnections => &mut self.active_connections,
            Metric::CacheHitRate => &mut self.cache_hit_rate,
        };
        *slot = value;
    }

    /// Builder-style setter.
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, value);
        self
    }

    /// Extract one metric across a slice of samples, preserving order.
    pub fn series(samples: &[MetricSample], metric: Metric) -> Vec<f64> {
        samples.iter().map(|s| s.get(metric)).collect()
    }

    /// Average every metric across `samples`.
    ///
    /// Returns `None` for an empty slice.
    pub fn average(
        samples: &[MetricSample],
        service_id: &str,
        timestamp_ms: u64,
    ) -> Option<MetricSample> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let mut avg = MetricSample::new(service_id, timestamp_ms);
        for metric in Metric::ALL {
            let sum: f64 = samples.iter().map(|s| s.get(metric)).sum();
            avg.set(metric, sum / n);
        }
        Some(avg)
    }
}
