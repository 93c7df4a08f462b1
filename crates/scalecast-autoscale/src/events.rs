//! Lifecycle events and callback registration.
//!
//! Handlers are plain callbacks registered per [`EventKind`] (or for every
//! kind). They run synchronously on the emitting task, outside the
//! subscriber lock, so a handler may subscribe or unsubscribe.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use scalecast_core::{MetricSample, Prediction, ScalingAction, ScalingPolicy};

use crate::executor::ScalingReport;

/// Lifecycle points at which the controller emits an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Configured,
    Removed,
    MetricsRecorded,
    PredictionGenerated,
    ScalingEvaluated,
    ScaledUp,
    ScaledDown,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Configured => "configured",
            EventKind::Removed => "removed",
            EventKind::MetricsRecorded => "metricsRecorded",
            EventKind::PredictionGenerated => "predictionGenerated",
            EventKind::ScalingEvaluated => "scalingEvaluated",
            EventKind::ScaledUp => "scaledUp",
            EventKind::ScaledDown => "scaledDown",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An emitted event with its payload.
#[derive(Debug, Clone)]
pub enum AutoscaleEvent {
    Configured { policy: ScalingPolicy },
    Removed { service_type: String },
    MetricsRecorded { service_type: String, sample: MetricSample },
    PredictionGenerated { prediction: Prediction },
    ScalingEvaluated { action: ScalingAction },
    ScaledUp { action: ScalingAction, report: ScalingReport },
    ScaledDown { action: ScalingAction, report: ScalingReport },
    Error { service_type: String, message: String },
}

impl AutoscaleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AutoscaleEvent::Configured { .. } => EventKind::Configured,
            AutoscaleEvent::Removed { .. } => EventKind::Removed,
            AutoscaleEvent::MetricsRecorded { .. } => EventKind::MetricsRecorded,
            AutoscaleEvent::PredictionGenerated { .. } => EventKind::PredictionGenerated,
            AutoscaleEvent::ScalingEvaluated { .. } => EventKind::ScalingEvaluated,
            AutoscaleEvent::ScaledUp { .. } => EventKind::ScaledUp,
            AutoscaleEvent::ScaledDown { .. } => EventKind::ScaledDown,
            AutoscaleEvent::Error { .. } => EventKind::Error,
        }
    }

    /// The service type the event concerns.
    pub fn service_type(&self) -> &str {
        match self {
            AutoscaleEvent::Configured { policy } => &policy.service_type,
            AutoscaleEvent::PredictionGenerated { prediction } => &prediction.service_type,
            AutoscaleEvent::ScalingEvaluated { action }
            | AutoscaleEvent::ScaledUp { action, .. }
            | AutoscaleEvent::ScaledDown { action, .. } => &action.service_type,
            AutoscaleEvent::Removed { service_type }
            | AutoscaleEvent::MetricsRecorded { service_type, .. }
            | AutoscaleEvent::Error { service_type, .. } => service_type,
        }
    }
}

/// Callback invoked for matching events.
pub type EventHandler = Arc<dyn Fn(&AutoscaleEvent) + Send + Sync>;

/// Handle returned by a registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` matches every kind.
    kind: Option<EventKind>,
    handler: EventHandler,
}

/// Registry of event callbacks.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&AutoscaleEvent) + Send + Sync + 'static,
    {
        self.subscribe(Some(kind), Arc::new(handler))
    }

    /// Register a handler for every event kind.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&AutoscaleEvent) + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(handler))
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Deliver an event to every matching handler.
    pub fn emit(&self, event: AutoscaleEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = {
            let subscriptions = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
            subscriptions
                .iter()
                .filter(|s| s.kind.is_none_or(|k| k == kind))
                .map(|s| s.handler.clone())
                .collect()
        };

        trace!(event = %kind, service_type = %event.service_type(), handlers = handlers.len(), "emit");
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn subscribe(&self, kind: Option<EventKind>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription { id, kind, handler });
        id
    }
}
