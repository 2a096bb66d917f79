//! Dense column-major feature matrix extracted from a transformed frame

use polars::prelude::*;

use crate::error::{HousecastError, Result};
use crate::pipeline::schema::numeric_values;

/// Column-major f64 matrix with named features. Nulls become NaN.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Use every column of `df`, in frame order. All columns must be numeric.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self::select(df, &names)
    }

    /// Use the named columns of `df`, in the given order.
    pub fn select(df: &DataFrame, names: &[String]) -> Result<Self> {
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        crate::pipeline::schema::require_columns(df, &refs)?;

        let columns = names
            .iter()
            .map(|name| {
                numeric_values(df, name).map(|values| {
                    values
                        .into_iter()
                        .map(|v| v.unwrap_or(f64::NAN))
                        .collect::<Vec<f64>>()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            names: names.to_vec(),
            columns,
            n_rows: df.height(),
        })
    }

    /// Build directly from columns, used by tests and benchmarks
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(HousecastError::schema(format!(
                "{} feature names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        let n_rows = columns.first().map(Vec::len).unwrap_or(0);
        if columns.iter().any(|c| c.len() != n_rows) {
            return Err(HousecastError::schema("feature columns differ in length"));
        }
        Ok(Self {
            names,
            columns,
            n_rows,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, feature: usize) -> &[f64] {
        &self.columns[feature]
    }

    #[inline]
    pub fn get(&self, row: usize, feature: usize) -> f64 {
        self.columns[feature][row]
    }
}
