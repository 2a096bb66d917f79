//! Median imputation fitted on the training split

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::schema::numeric_values;
use crate::error::{HousecastError, Result};

/// Learned fill value for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    pub column: String,
    pub value: f64,
}

/// Median of the non-null, finite values of a slice.
///
/// Even-length inputs average the two middle values.
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 0 {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    } else {
        Some(sorted[n / 2])
    }
}

/// Learn the median of `column` over the training rows that have a value
pub fn fit_median_imputer(x_train: &DataFrame, column: &str) -> Result<MedianImputer> {
    let observed: Vec<f64> = numeric_values(x_train, column)?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();

    let value = median(&observed).ok_or_else(|| {
        HousecastError::validation(format!(
            "Cannot fit median imputer: column '{}' has no non-null values",
            column
        ))
    })?;

    Ok(MedianImputer {
        column: column.to_string(),
        value,
    })
}

/// Return a copy of `df` with nulls in `column` replaced by the learned value.
///
/// The column is written back as Float64; present values are untouched.
pub fn apply_imputer_transformation(
    df: &DataFrame,
    column: &str,
    imputer: &MedianImputer,
) -> Result<DataFrame> {
    let filled: Vec<f64> = numeric_values(df, column)?
        .into_iter()
        .map(|v| v.unwrap_or(imputer.value))
        .collect();

    let mut out = df.clone();
    out.with_column(Column::new(column.into(), filled))?;
    Ok(out)
}
