//! scalecast-autoscale: the predictive autoscaling control loop.
//!
//! Wires the metrics window, the prediction engine and the service
//! registry together behind [`AutoscalingController`]:
//!
//! ```text
//! record_metrics ──► MetricsWindow
//!                         │
//!   timer tick / trigger ─┴─► DecisionEngine ──► ScalingExecutor ──► ServiceRegistry
//!                              ▲        │
//!              PredictionEngine┘        └─► CostEstimator
//! ```
//!
//! Every lifecycle point emits an [`AutoscaleEvent`]; register callbacks
//! with [`AutoscalingController::on`].

pub mod controller;
pub mod cost;
pub mod decision;
pub mod error;
pub mod events;
pub mod executor;

pub use controller::{AutoscalingController, ServiceStatus};
pub use cost::{CostEstimator, CostSnapshot};
pub use decision::{DecisionEngine, Observation, ServiceRuntime};
pub use error::{AutoscaleError, AutoscaleResult};
pub use events::{AutoscaleEvent, EventBus, EventHandler, EventKind, SubscriptionId};
pub use executor::{RegistryCallFailure, RegistryOperation, ScalingExecutor, ScalingReport};
