//! Forecast accuracy metrics.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("length mismatch: {truth} true values vs {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },

    #[error("no values to score")]
    Empty,
}

/// Symmetric mean absolute percentage error, in percent (0 to 200).
///
/// `200 * mean(|y - ŷ| / (|y| + |ŷ|))`. A pair with `y = ŷ = 0` contributes 0.
pub fn smape(truth: &[f64], predicted: &[f64]) -> Result<f64, MetricError> {
    if truth.len() != predicted.len() {
        return Err(MetricError::LengthMismatch {
            truth: truth.len(),
            predicted: predicted.len(),
        });
    }
    if truth.is_empty() {
        return Err(MetricError::Empty);
    }

    let total: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(&y, &yhat)| {
            let denominator = y.abs() + yhat.abs();
            if denominator == 0.0 {
                0.0
            } else {
                (y - yhat).abs() / denominator
            }
        })
        .sum();

    Ok(200.0 * total / truth.len() as f64)
}
