// Statistics Helpers
// Shared numeric routines for the scoring engine: guarded division,
// descriptive statistics, the normal CDF and the Wilson score interval.

use serde::{Deserialize, Serialize};

/// Z value for a 95% two-sided interval.
pub const Z_95: f64 = 1.96;

/// Divide `num` by `den`, returning `fallback` instead of a non-finite result.
///
/// Zero policy: a zero, NaN or infinite denominator yields `fallback`, and so
/// does a quotient that comes out NaN. Callers choose the fallback that keeps
/// their formula conservative (usually `0.0`).
pub fn safe_div(num: f64, den: f64, fallback: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        return fallback;
    }
    let q = num / den;
    if q.is_nan() {
        fallback
    } else {
        q
    }
}

pub fn mean(values: &[f64]) -> f64 {
    safe_div(values.iter().sum::<f64>(), values.len() as f64, 0.0)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let squared: Vec<f64> = values.iter().map(|v| (v - avg).powi(2)).collect();
    mean(&squared).sqrt()
}

/// Coefficient of variation (`std / mean`), `0.0` for an empty or zero-mean sample.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    safe_div(std_dev(values), mean(values), 0.0)
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted_copy(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Nearest-rank percentile, `p` in `[0, 1]`.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted_copy(values);
    let rank = (sorted.len() as f64 * p).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Standard normal CDF, Abramowitz & Stegun 26.2.17 polynomial form.
///
/// The coefficients are fixed so percentiles printed in deviation
/// descriptions are reproducible across runs and platforms.
pub fn normal_cdf(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * z.abs());
    let d = 0.3989423 * (-z * z / 2.0).exp();
    let p = d
        * t
        * (0.3193815 + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274))));
    if z > 0.0 {
        1.0 - p
    } else {
        p
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub const FULL: Interval = Interval { lower: 0.0, upper: 1.0 };
}

/// Wilson score interval for proportion `p` over `n` trials at the given `z`.
/// `n == 0` collapses to `[0, 1]`.
pub fn wilson_interval(p: f64, n: f64, z: f64) -> Interval {
    if n <= 0.0 {
        return Interval::FULL;
    }
    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let margin = z * ((p * (1.0 - p)) / n + z2 / (4.0 * n * n)).sqrt();

    Interval {
        lower: ((center - margin) / denominator).max(0.0),
        upper: ((center + margin) / denominator).min(1.0),
    }
}
