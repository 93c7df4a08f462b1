//! Per-metric forecast models.
//!
//! Each function takes one metric's time-ordered series and the number of
//! sample intervals to look ahead, and returns the raw (unclamped)
//! forecast.

use scalecast_core::ForecastModel;

use crate::trend;

/// Samples considered by the polynomial model.
pub const POLYNOMIAL_WINDOW: usize = 20;

/// Ensemble weights for (linear, polynomial, momentum).
pub const ENSEMBLE_WEIGHTS: (f64, f64, f64) = (0.3, 0.3, 0.4);

/// Forecast `values` `steps` intervals ahead with the chosen model.
pub fn forecast(model: ForecastModel, values: &[f64], steps: f64) -> f64 {
    match model {
        ForecastModel::Linear => linear(values, steps),
        ForecastModel::Polynomial => polynomial(values, steps),
        ForecastModel::Momentum => momentum(values),
        ForecastModel::Ensemble => {
            let (wl, wp, wm) = ENSEMBLE_WEIGHTS;
            wl * linear(values, steps) + wp * polynomial(values, steps) + wm * momentum(values)
        }
    }
}

/// `latest + slope × steps`.
pub fn linear(values: &[f64], steps: f64) -> f64 {
    latest(values) + trend::slope(values) * steps
}

/// Degree-2 fit over the last [`POLYNOMIAL_WINDOW`] samples, evaluated at
/// the extrapolated index. Falls back to the latest value if the fit fails.
pub fn polynomial(values: &[f64], steps: f64) -> f64 {
    let tail = &values[values.len().saturating_sub(POLYNOMIAL_WINDOW)..];
    match trend::poly_fit(tail, 2) {
        Some(coeffs) => trend::evaluate(&coeffs, (tail.len() - 1) as f64 + steps),
        None => latest(values),
    }
}

/// Moving-average momentum heuristic.
///
/// ```text
/// momentum   = (2·Δma5 + Δma10 + 0.5·Δma20) / 3.5
/// volatility = |Δma5 − Δma10| + |Δma10 − Δma20|
/// predicted  = latest × (1 + momentum / (volatility + 1) × 0.1)
/// ```
pub fn momentum(values: &[f64]) -> f64 {
    let d5 = last_delta(&trend::moving_average(values, 5));
    let d10 = last_delta(&trend::moving_average(values, 10));
    let d20 = last_delta(&trend::moving_average(values, 20));

    let momentum = (2.0 * d5 + d10 + 0.5 * d20) / 3.5;
    let volatility = (d5 - d10).abs() + (d10 - d20).abs();
    let factor = 1.0 + (momentum / (volatility + 1.0)) * 0.1;
    latest(values) * factor
}

/// Change between the last two points of a series; 0 if it has fewer.
fn last_delta(series: &[f64]) -> f64 {
    match series {
        [.., prev, last] => last - prev,
        _ => 0.0,
    }
}

fn latest(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    fn ramp(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn linear_extrapolates_slope() {
        let values = ramp(15, 10.0, 2.0);
        assert_close(linear(&values, 5.0), 38.0 + 10.0);
    }

    #[test]
    fn polynomial_follows_a_line() {
        let values = ramp(30, 0.0, 1.0);
        // Fit covers values 10..=29, so index 19 + 3 maps to value 32.
        assert_close(polynomial(&values, 3.0), 32.0);
    }

    #[test]
    fn polynomial_with_short_series_falls_back() {
        assert_eq!(polynomial(&[4.0, 5.0], 1.0), 5.0);
    }

    #[test]
    fn momentum_on_flat_series_is_latest() {
        assert_close(momentum(&[50.0; 25]), 50.0);
    }

    #[test]
    fn momentum_on_unit_ramp() {
        // Each moving average also rises by exactly 1 per step, so every
        // delta is 1: momentum = 3.5 / 3.5 = 1, volatility = 0, factor = 1.1.
        let values = ramp(25, 1.0, 1.0);
        assert_close(momentum(&values), 25.0 * 1.1);
    }

    #[test]
    fn momentum_ignores_missing_long_average() {
        // 10 points: ma10 has a single value and ma20 none, so both deltas are 0.
        let values = ramp(10, 1.0, 1.0);
        let momentum_term: f64 = 2.0 / 3.5;
        let volatility = 1.0;
        let expected = 10.0 * (1.0 + momentum_term / (volatility + 1.0) * 0.1);
        assert_close(momentum(&values), expected);
    }

    #[test]
    fn ensemble_blends_fixed_weights() {
        let values = ramp(25, 1.0, 1.0);
        let expected = 0.3 * linear(&values, 2.0) + 0.3 * polynomial(&values, 2.0) + 0.4 * momentum(&values);
        assert_close(forecast(ForecastModel::Ensemble, &values, 2.0), expected);
        assert_close(expected, 0.3 * 27.0 + 0.3 * 27.0 + 0.4 * 27.5);
    }

    #[test]
    fn empty_series_forecasts_zero() {
        for model in [
            ForecastModel::Linear,
            ForecastModel::Polynomial,
            ForecastModel::Momentum,
            ForecastModel::Ensemble,
        ] {
            assert_eq!(forecast(model, &[], 3.0), 0.0);
        }
    }
}
