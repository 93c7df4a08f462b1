//! scalecast-core: shared domain types for the Scalecast autoscaler.
//!
//! Holds the types every other crate in the workspace exchanges:
//! metric samples, per-service scaling policies, predictions, and the
//! scaling actions produced by the decision engine. Also parses the
//! controller's TOML configuration.

pub mod config;
pub mod duration;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod types;

pub use config::ControllerConfig;
pub use error::PolicyError;
pub use metrics::{Metric, MetricSample};
pub use policy::*;
pub use types::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
