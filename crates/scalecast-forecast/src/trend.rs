//! Trend estimation over evenly indexed series.
//!
//! All routines treat `values[i]` as the observation at `x = i`. They are
//! pure and allocation-light; series are capped by the metrics retention
//! horizon, so sizes stay in the hundreds.

/// Ordinary least-squares slope of `values` against `0..n`.
///
/// `slope = (nΣxy − ΣxΣy) / (nΣx² − (Σx)²)`. Returns 0 for fewer than two
/// points.
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n_f * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n_f * sum_xy - sum_x * sum_y) / denominator
}

/// Least-squares polynomial fit of the given degree.
///
/// Builds the `(degree+1)×(degree+1)` normal-equations matrix from power
/// sums of the indices and solves it. Returns coefficients lowest power
/// first, or `None` when there are too few points or the system is
/// singular.
pub fn poly_fit(values: &[f64], degree: usize) -> Option<Vec<f64>> {
    let size = degree + 1;
    if values.len() < size {
        return None;
    }

    // power_sums[k] = Σ x^k for k in 0..=2·degree
    let mut power_sums = vec![0.0; 2 * degree + 1];
    let mut rhs = vec![0.0; size];
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        let mut xk = 1.0;
        for (k, sum) in power_sums.iter_mut().enumerate() {
            *sum += xk;
            if k < size {
                rhs[k] += y * xk;
            }
            xk *= x;
        }
    }

    let matrix: Vec<Vec<f64>> = (0..size)
        .map(|row| (0..size).map(|col| power_sums[row + col]).collect())
        .collect();

    solve(matrix, rhs)
}

/// Evaluate `Σ cᵢ·xⁱ`.
pub fn evaluate(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Trailing simple moving average.
///
/// Element `i` of the result averages `values[i..i + window]`, so the
/// series has `n − window + 1` points; empty if `window` is zero or larger
/// than the input.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }

    let w = window as f64;
    let mut sum: f64 = values[..window].iter().sum();
    let mut out = Vec::with_capacity(values.len() - window + 1);
    out.push(sum / w);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / w);
    }
    out
}

/// Solve `A·x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    const PIVOT_EPSILON: f64 = 1e-12;
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
