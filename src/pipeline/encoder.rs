//! One-hot encoding of the categorical proximity column
//!
//! The vocabulary is fixed at fit time. A category that was not observed during
//! fit (or a null) encodes to an all-zero indicator row rather than an error, so
//! rare new values at inference time still score. The same rule applies when
//! the training run encodes its own test split.

use std::collections::BTreeSet;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::schema::string_values;
use crate::error::{HousecastError, Result};

/// Learned category vocabulary and indicator column layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub column: String,
    /// Categories in output order (sorted)
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    /// Indicator column names, one per category, in output order
    pub fn output_columns(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|category| format!("{}_{}", self.column, category))
            .collect()
    }

    /// Position of a category in the vocabulary, if known
    pub fn category_index(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
    }
}

/// Learn the distinct non-null categories of `column`
pub fn fit_one_hot_encoder(x_train: &DataFrame, column: &str) -> Result<OneHotEncoder> {
    let vocabulary: BTreeSet<String> = string_values(x_train, column)?
        .into_iter()
        .flatten()
        .collect();

    if vocabulary.is_empty() {
        return Err(HousecastError::validation(format!(
            "Cannot fit one-hot encoder: column '{}' has no non-null values",
            column
        )));
    }

    Ok(OneHotEncoder {
        column: column.to_string(),
        categories: vocabulary.into_iter().collect(),
    })
}

/// Replace `column` with one Float64 indicator column per learned category
pub fn apply_one_hot_encoder(
    df: &DataFrame,
    column: &str,
    encoder: &OneHotEncoder,
) -> Result<DataFrame> {
    let values = string_values(df, column)?;
    let height = values.len();
    let width = encoder.categories.len();

    let mut indicators = vec![vec![0.0f64; height]; width];
    for (row, value) in values.iter().enumerate() {
        if let Some(idx) = value.as_deref().and_then(|v| encoder.category_index(v)) {
            indicators[idx][row] = 1.0;
        }
    }

    let mut out = df.drop(column)?;
    for (name, values) in encoder.output_columns().into_iter().zip(indicators) {
        out.with_column(Column::new(name.into(), values))?;
    }
    Ok(out)
}
