//! Regression metrics

use std::collections::BTreeMap;

use crate::error::{HousecastError, Result};

/// Mean absolute error, root mean squared error and R².
///
/// Empty, mismatched or non-finite inputs are rejected, as is a constant
/// `y_true` for which R² is undefined.
pub fn evaluate_regression(y_true: &[f64], y_pred: &[f64]) -> Result<BTreeMap<String, f64>> {
    if y_true.is_empty() {
        return Err(HousecastError::validation(
            "Cannot evaluate regression metrics on an empty set",
        ));
    }
    if y_true.len() != y_pred.len() {
        return Err(HousecastError::validation(format!(
            "y_true has {} values but y_pred has {}",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.iter().chain(y_pred).any(|v| !v.is_finite()) {
        return Err(HousecastError::validation(
            "Regression metrics require finite values",
        ));
    }

    let n = y_true.len() as f64;
    let mean_true = y_true.iter().sum::<f64>() / n;

    let (abs_sum, sq_sum, total_sq) = y_true.iter().zip(y_pred).fold(
        (0.0, 0.0, 0.0),
        |(abs_sum, sq_sum, total_sq), (t, p)| {
            let residual = t - p;
            let centered = t - mean_true;
            (
                abs_sum + residual.abs(),
                sq_sum + residual * residual,
                total_sq + centered * centered,
            )
        },
    );

    if total_sq == 0.0 {
        return Err(HousecastError::validation(
            "R² is undefined when y_true is constant",
        ));
    }

    let mut metrics = BTreeMap::new();
    metrics.insert("mae".to_string(), abs_sum / n);
    metrics.insert("rmse".to_string(), (sq_sum / n).sqrt());
    metrics.insert("r2".to_string(), 1.0 - sq_sum / total_sq);
    Ok(metrics)
}
