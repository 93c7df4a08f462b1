//! scalecast-metrics: per-service-type metric sample storage.
//!
//! ```text
//! MetricsWindow
//!   ├── register()/unregister() ← service type lifecycle
//!   ├── record()  ← append + prune samples older than the retention horizon
//!   ├── recent()  → samples inside a trailing window
//!   └── summary() → counts and window averages for status reporting
//! ```

pub mod window;

pub use window::{MetricsSummary, MetricsWindow};
