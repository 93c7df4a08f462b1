//! Autoscaling controller: per-service-type policies, evaluation loops,
//! and the public control surface.
//!
//! Each configured service type gets a slot holding its policy, its
//! runtime state behind a dedicated mutex, and a background loop that
//! evaluates it every `evaluation_interval`. Timer ticks and manual
//! triggers both take the slot mutex, so evaluations of one service type
//! never overlap while different types proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use scalecast_core::{
    ControllerConfig, MetricSample, Prediction, ScalingAction, ScalingDirection, ScalingPolicy,
    epoch_millis,
};
use scalecast_forecast::{PredictionEngine, PredictionSettings};
use scalecast_metrics::{MetricsSummary, MetricsWindow};
use scalecast_registry::ServiceRegistry;

use crate::cost::CostSnapshot;
use crate::decision::{DecisionEngine, Observation, ServiceRuntime};
use crate::error::{AutoscaleError, AutoscaleResult};
use crate::events::{AutoscaleEvent, EventBus, EventKind, SubscriptionId};
use crate::executor::ScalingExecutor;

/// Point-in-time view of one service type.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service_type: String,
    pub configured: bool,
    pub policy: Option<ScalingPolicy>,
    pub current_instances: Option<u32>,
    pub metrics: Option<MetricsSummary>,
    pub last_action: Option<ScalingAction>,
    /// The most recent evaluation, no-ops included.
    pub last_evaluation: Option<ScalingAction>,
    pub prediction: Option<Prediction>,
    pub cost: CostSnapshot,
}

impl ServiceStatus {
    fn unconfigured(service_type: &str) -> Self {
        Self {
            service_type: service_type.to_string(),
            configured: false,
            policy: None,
            current_instances: None,
            metrics: None,
            last_action: None,
            last_evaluation: None,
            prediction: None,
            cost: CostSnapshot::default(),
        }
    }
}

/// Per-service-type state owned by the controller.
struct ServiceSlot {
    policy: ScalingPolicy,
    /// Shared with the slot's replacement when the policy is reconfigured.
    runtime: Arc<Mutex<ServiceRuntime>>,
    /// Handle to the evaluation loop.
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ServiceSlot {
    fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

struct Inner {
    evaluation_interval: Duration,
    decision_window: Duration,
    registry: Arc<dyn ServiceRegistry>,
    metrics: MetricsWindow,
    predictor: PredictionEngine,
    decisions: DecisionEngine,
    executor: ScalingExecutor,
    events: EventBus,
    services: RwLock<HashMap<String, Arc<ServiceSlot>>>,
}

/// Predictive autoscaler for a fleet of service types.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct AutoscalingController {
    inner: Arc<Inner>,
}

impl AutoscalingController {
    /// Build a controller. Policies in `config` are not applied; see
    /// [`AutoscalingController::from_config`].
    pub fn new(config: &ControllerConfig, registry: Arc<dyn ServiceRegistry>) -> Self {
        let settings = PredictionSettings {
            min_samples: config.min_prediction_samples,
            history_retention: config.prediction_history,
        };
        Self {
            inner: Arc::new(Inner {
                evaluation_interval: config.evaluation_interval,
                decision_window: config.decision_window,
                executor: ScalingExecutor::new(registry.clone()),
                registry,
                metrics: MetricsWindow::new(config.retention),
                predictor: PredictionEngine::new(settings),
                decisions: DecisionEngine::new(),
                events: EventBus::new(),
                services: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Build a controller and configure every policy in `config`.
    pub async fn from_config(
        config: &ControllerConfig,
        registry: Arc<dyn ServiceRegistry>,
    ) -> AutoscaleResult<Self> {
        let controller = Self::new(config, registry);
        for policy in &config.policies {
            controller.configure(policy.clone()).await?;
        }
        Ok(controller)
    }

    /// Store a policy and start its evaluation loop.
    ///
    /// Replacing an existing policy restarts the loop but keeps the
    /// service type's samples, cooldown state and cost totals.
    pub async fn configure(&self, policy: ScalingPolicy) -> AutoscaleResult<()> {
        policy.validate()?;
        let service_type = policy.service_type.clone();

        self.inner.metrics.register(&service_type).await;

        // Holding the old runtime lock keeps in-flight evaluations out until
        // the replacement slot is in place.
        let existing = self.inner.lock_runtime(&service_type).await.ok();
        let runtime = match &existing {
            Some((old, _)) => old.runtime.clone(),
            None => Arc::default(),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_evaluation_loop(
            Arc::downgrade(&self.inner),
            service_type.clone(),
            self.inner.evaluation_interval,
            shutdown_rx,
        ));

        let replaced = self.inner.services.write().await.insert(
            service_type.clone(),
            Arc::new(ServiceSlot {
                policy: policy.clone(),
                runtime,
                handle,
                shutdown_tx,
            }),
        );
        if let Some(old) = replaced {
            old.stop();
        }
        drop(existing);

        info!(
            %service_type,
            min = policy.min_instances,
            max = policy.max_instances,
            predictive = policy.predictive.enabled,
            "scaling policy configured"
        );
        self.inner.events.emit(AutoscaleEvent::Configured { policy });
        Ok(())
    }

    /// Stop a service type's loop and discard its state. Returns false if
    /// it was not configured.
    pub async fn remove_policy(&self, service_type: &str) -> bool {
        let Ok((_, guard)) = self.inner.lock_runtime(service_type).await else {
            return false;
        };
        let Some(slot) = self.inner.services.write().await.remove(service_type) else {
            return false;
        };
        slot.stop();
        drop(guard);
        self.inner.metrics.unregister(service_type).await;
        self.inner.predictor.forget(service_type).await;

        info!(%service_type, "scaling policy removed");
        self.inner.events.emit(AutoscaleEvent::Removed {
            service_type: service_type.to_string(),
        });
        true
    }

    /// Route a sample to its service type's window.
    ///
    /// Returns the resolved service type, or `None` when the sample's
    /// service id maps to no configured type (the sample is dropped).
    pub async fn record_metrics(&self, sample: MetricSample) -> Option<String> {
        let service_type = self.resolve_service_type(&sample.service_id).await?;
        let recorded = self
            .inner
            .metrics
            .record(&service_type, sample.clone(), epoch_millis())
            .await;
        if !recorded {
            return None;
        }

        self.inner.events.emit(AutoscaleEvent::MetricsRecorded {
            service_type: service_type.clone(),
            sample,
        });
        Some(service_type)
    }

    /// Run one evaluation now, outside the timer. Still subject to cooldown.
    pub async fn trigger_scaling(&self, service_type: &str) -> AutoscaleResult<ScalingAction> {
        self.inner.evaluate(service_type).await
    }

    /// Forecast a service type from its retained samples.
    pub async fn generate_prediction(&self, service_type: &str) -> AutoscaleResult<Prediction> {
        let slot = self.inner.slot(service_type).await?;
        let current = self.inner.registry.discover(service_type)?.len() as u32;
        self.inner.predict(&slot.policy, current, epoch_millis()).await
    }

    /// Retained predictions for a service type, oldest first.
    pub async fn prediction_history(&self, service_type: &str) -> Vec<Prediction> {
        self.inner.predictor.history(service_type).await
    }

    /// Status of a service type. Unknown types report `configured: false`.
    pub async fn status(&self, service_type: &str) -> AutoscaleResult<ServiceStatus> {
        let Ok(slot) = self.inner.slot(service_type).await else {
            return Ok(ServiceStatus::unconfigured(service_type));
        };

        let current = self.inner.registry.discover(service_type)?.len() as u32;
        let metrics = self
            .inner
            .metrics
            .summary(service_type, self.inner.decision_window, epoch_millis())
            .await;
        let prediction = self.inner.predictor.latest(service_type).await;
        let runtime = slot.runtime.lock().await;

        Ok(ServiceStatus {
            service_type: service_type.to_string(),
            configured: true,
            policy: Some(slot.policy.clone()),
            current_instances: Some(current),
            metrics,
            last_action: runtime.last_action.clone(),
            last_evaluation: runtime.last_evaluation.clone(),
            prediction,
            cost: runtime.cost,
        })
    }

    /// Status of every configured service type, sorted by name.
    pub async fn all_statuses(&self) -> AutoscaleResult<Vec<ServiceStatus>> {
        let mut statuses = Vec::new();
        for service_type in self.configured_services().await {
            statuses.push(self.status(&service_type).await?);
        }
        Ok(statuses)
    }

    /// Configured service types, sorted.
    pub async fn configured_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.services.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&AutoscaleEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    /// Register a handler for every event kind.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&AutoscaleEvent) + Send + Sync + 'static,
    {
        self.inner.events.on_any(handler)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.off(id)
    }

    /// Stop every evaluation loop and discard all state.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, Arc<ServiceSlot>)> =
            self.inner.services.write().await.drain().collect();
        for (service_type, slot) in &slots {
            slot.stop();
            debug!(%service_type, "evaluation loop stopped");
        }
        self.inner.metrics.clear().await;
        self.inner.predictor.clear().await;
        info!(services = slots.len(), "autoscaling controller shut down");
    }

    /// Map an instance id to its configured service type.
    ///
    /// Asks the registry first; otherwise the id must equal a configured
    /// type or start with `"{type}-"`, the longest such type winning.
    async fn resolve_service_type(&self, service_id: &str) -> Option<String> {
        let services = self.inner.services.read().await;

        match self.inner.registry.lookup(service_id) {
            Ok(Some(record)) if services.contains_key(&record.service_type) => {
                return Some(record.service_type);
            }
            Ok(_) => {}
            Err(e) => debug!(%service_id, error = %e, "registry lookup failed, falling back to prefix"),
        }

        let resolved = services
            .keys()
            .filter(|t| {
                service_id == t.as_str()
                    || service_id
                        .strip_prefix(t.as_str())
                        .is_some_and(|rest| rest.starts_with('-'))
            })
            .max_by_key(|t| t.len())
            .cloned();
        if resolved.is_none() {
            debug!(%service_id, "sample for unknown service ignored");
        }
        resolved
    }
}

impl Inner {
    async fn slot(&self, service_type: &str) -> AutoscaleResult<Arc<ServiceSlot>> {
        self.services
            .read()
            .await
            .get(service_type)
            .cloned()
            .ok_or_else(|| AutoscaleError::NotConfigured(service_type.to_string()))
    }

    /// Lock the runtime of the slot currently configured for `service_type`.
    ///
    /// The map is checked again once the lock is held, so a caller never
    /// acts on a slot removed while it waited. Returns the current slot,
    /// which may carry a newer policy than the one first looked up.
    async fn lock_runtime(
        &self,
        service_type: &str,
    ) -> AutoscaleResult<(Arc<ServiceSlot>, OwnedMutexGuard<ServiceRuntime>)> {
        let mut slot = self.slot(service_type).await?;
        loop {
            let guard = slot.runtime.clone().lock_owned().await;
            let current = self.slot(service_type).await?;
            if Arc::ptr_eq(&current.runtime, &slot.runtime) {
                return Ok((current, guard));
            }
            slot = current;
        }
    }

    async fn predict(
        &self,
        policy: &ScalingPolicy,
        current: u32,
        now_ms: u64,
    ) -> AutoscaleResult<Prediction> {
        let samples = self.metrics.samples(&policy.service_type).await;
        let prediction = self.predictor.generate(policy, &samples, current, now_ms).await?;
        self.events.emit(AutoscaleEvent::PredictionGenerated {
            prediction: prediction.clone(),
        });
        Ok(prediction)
    }

    /// One full evaluation: decide, apply, record, emit.
    async fn evaluate(&self, service_type: &str) -> AutoscaleResult<ScalingAction> {
        let (slot, mut runtime) = self.lock_runtime(service_type).await?;
        let policy = &slot.policy;
        let now_ms = epoch_millis();

        let current = self.registry.discover(service_type)?.len() as u32;
        let recent = self.metrics.recent(service_type, self.decision_window, now_ms).await;

        let prediction = if policy.predictive.enabled && !runtime.in_cooldown(policy, now_ms) {
            match self.predict(policy, current, now_ms).await {
                Ok(prediction) => Some(prediction),
                Err(e) => {
                    debug!(%service_type, error = %e, "prediction skipped");
                    None
                }
            }
        } else {
            None
        };

        let action = self.decisions.evaluate(
            policy,
            &mut runtime,
            Observation {
                current_instances: current,
                recent: &recent,
                prediction,
                now_ms,
            },
        );
        runtime.last_evaluation = Some(action.clone());
        self.events.emit(AutoscaleEvent::ScalingEvaluated {
            action: action.clone(),
        });

        if action.is_no_op() {
            debug!(%service_type, reason = %action.reason, "no scaling needed");
            return Ok(action);
        }

        let report = self.executor.apply(&action, policy);
        for failure in &report.failures {
            let err = AutoscaleError::RegistryCallFailed {
                service_type: service_type.to_string(),
                operation: failure.operation,
                message: failure.message.clone(),
            };
            warn!(%service_type, instance_id = ?failure.instance_id, error = %err, "registry call failed");
            self.events.emit(AutoscaleEvent::Error {
                service_type: service_type.to_string(),
                message: err.to_string(),
            });
        }

        runtime.cost.record(&action.cost_impact);
        runtime.last_action = Some(action.clone());

        info!(
            %service_type,
            action = %action.action,
            from = action.current_instances,
            to = action.target_instances,
            added = report.added.len(),
            removed = report.removed.len(),
            reason = %action.reason,
            "scaling action applied"
        );

        let event = match action.action {
            ScalingDirection::ScaleUp => AutoscaleEvent::ScaledUp {
                action: action.clone(),
                report,
            },
            _ => AutoscaleEvent::ScaledDown {
                action: action.clone(),
                report,
            },
        };
        self.events.emit(event);
        Ok(action)
    }
}

/// Evaluation loop for one service type. Errors are logged and emitted,
/// never propagated.
async fn run_evaluation_loop(
    inner: Weak<Inner>,
    service_type: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(%service_type, interval_ms = interval.as_millis() as u64, "evaluation loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if let Err(e) = inner.evaluate(&service_type).await {
                    error!(%service_type, error = %e, "scheduled evaluation failed");
                    inner.events.emit(AutoscaleEvent::Error {
                        service_type: service_type.clone(),
                        message: e.to_string(),
                    });
                }
            }
            _ = shutdown.changed() => {
                debug!(%service_type, "evaluation loop shutting down");
                break;
            }
        }
    }
}
