//! Metrics window: bounded-time sample store per service type.
//!
//! Each registered service type owns a timestamp-ordered series guarded by
//! its own mutex, so concurrent reporters only contend with writers of the
//! same type. Every write prunes samples that fell out of the retention
//! horizon.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use scalecast_core::MetricSample;

type Series = Arc<Mutex<Vec<MetricSample>>>;

/// Snapshot of a service type's stored metrics for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Samples currently retained.
    pub sample_count: usize,
    pub oldest_ms: Option<u64>,
    pub newest_ms: Option<u64>,
    /// Per-metric average over the requested window.
    pub window_average: Option<MetricSample>,
}

/// Append-only, time-bounded metric storage keyed by service type.
pub struct MetricsWindow {
    series: RwLock<HashMap<String, Series>>,
    retention: Duration,
}

impl MetricsWindow {
    /// Create a window that keeps samples for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Start accepting samples for a service type.
    pub async fn register(&self, service_type: &str) {
        let mut series = self.series.write().await;
        series
            .entry(service_type.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())));
        debug!(%service_type, "registered for metrics");
    }

    /// Drop a service type and every sample stored for it.
    pub async fn unregister(&self, service_type: &str) {
        let mut series = self.series.write().await;
        series.remove(service_type);
        debug!(%service_type, "unregistered from metrics");
    }

    /// Drop every service type.
    pub async fn clear(&self) {
        self.series.write().await.clear();
    }

    /// Append a sample and prune anything older than the retention horizon.
    ///
    /// Recording for an unregistered service type is a no-op and returns
    /// false.
    pub async fn record(&self, service_type: &str, sample: MetricSample, now_ms: u64) -> bool {
        let Some(series) = self.get(service_type).await else {
            debug!(%service_type, service_id = %sample.service_id, "sample for unknown service type ignored");
            return false;
        };

        let cutoff = now_ms.saturating_sub(self.retention.as_millis() as u64);
        let mut samples = series.lock().await;

        let pos = samples.partition_point(|s| s.timestamp_ms <= sample.timestamp_ms);
        samples.insert(pos, sample);

        let expired = samples.partition_point(|s| s.timestamp_ms < cutoff);
        if expired > 0 {
            samples.drain(..expired);
        }
        true
    }

    /// Samples with `timestamp >= now - window`, oldest first.
    pub async fn recent(&self, service_type: &str, window: Duration, now_ms: u64) -> Vec<MetricSample> {
        let Some(series) = self.get(service_type).await else {
            return Vec::new();
        };
        let since = now_ms.saturating_sub(window.as_millis() as u64);
        let samples = series.lock().await;
        let start = samples.partition_point(|s| s.timestamp_ms < since);
        samples[start..].to_vec()
    }

    /// Every retained sample, oldest first.
    pub async fn samples(&self, service_type: &str) -> Vec<MetricSample> {
        match self.get(service_type).await {
            Some(series) => series.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Number of retained samples for a service type.
    pub async fn len(&self, service_type: &str) -> usize {
        match self.get(service_type).await {
            Some(series) => series.lock().await.len(),
            None => 0,
        }
    }

    /// Summarise a service type's samples. `None` if it is not registered.
    pub async fn summary(
        &self,
        service_type: &str,
        window: Duration,
        now_ms: u64,
    ) -> Option<MetricsSummary> {
        let series = self.get(service_type).await?;
        let since = now_ms.saturating_sub(window.as_millis() as u64);
        let samples = series.lock().await;
        let start = samples.partition_point(|s| s.timestamp_ms < since);

        Some(MetricsSummary {
            sample_count: samples.len(),
            oldest_ms: samples.first().map(|s| s.timestamp_ms),
            newest_ms: samples.last().map(|s| s.timestamp_ms),
            window_average: MetricSample::average(&samples[start..], service_type, now_ms),
        })
    }

    /// List all registered service types.
    pub async fn registered(&self) -> Vec<String> {
        self.series.read().await.keys().cloned().collect()
    }

    async fn get(&self, service_type: &str) -> Option<Series> {
        self.series.read().await.get(service_type).cloned()
    }
}
