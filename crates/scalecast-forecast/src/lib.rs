//! scalecast-forecast: near-future load forecasting.
//!
//! Turns the retained metric samples of a service type into a
//! [`Prediction`](scalecast_core::Prediction) for a configurable horizon.
//!
//! # Models
//!
//! ```text
//! linear     = latest + slope × (horizon / avg_sample_interval)
//! polynomial = degree-2 least-squares fit over the last 20 samples,
//!              evaluated at the extrapolated index
//! momentum   = latest × (1 + momentum / (volatility + 1) × 0.1)
//!              from the 5/10/20-sample moving averages
//! ensemble   = 0.3 × linear + 0.3 × polynomial + 0.4 × momentum
//! ```
//!
//! Percentages are clamped to `[0, 100]`, everything else to `>= 0`.
//! Confidence comes from back-testing the linear model on the trailing
//! samples.

pub mod engine;
pub mod error;
pub mod model;
pub mod trend;

pub use engine::{PredictionEngine, PredictionSettings};
pub use error::{PredictionError, PredictionResult};
