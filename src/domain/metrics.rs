//! Fit-quality metrics reported by training.

use serde::{Deserialize, Serialize};

/// Smallest denominator used by [`mape`]; keeps zero actuals finite.
const MAPE_EPSILON: f64 = f64::EPSILON;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// `1 - mape`. Not clamped: a MAPE above 1 yields a negative accuracy.
    /// Seasonal-trend fits measure this in-sample, so it is optimistic.
    pub accuracy: f64,
    pub mape: f64,
    pub rmse: f64,
}

impl TrainingMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        Self::from_errors(mape(actual, predicted), rmse(actual, predicted))
    }

    pub fn from_errors(mape: f64, rmse: f64) -> Self {
        Self {
            accuracy: 1.0 - mape,
            mape,
            rmse,
        }
    }
}

/// Mean absolute percentage error as a fraction (0.1 == 10%).
///
/// Each term is `|a - p| / max(|a|, eps)`. Returns 0 for empty input.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs() / a.abs().max(MAPE_EPSILON))
        .sum();
    total / n as f64
}

/// Root-mean-square error. Returns 0 for empty input.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sse / n as f64).sqrt()
}
