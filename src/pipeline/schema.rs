//! Raw housing record layout and typed column access helpers

use polars::prelude::*;

use crate::error::{HousecastError, Result};

/// Regression target, optional in inference input
pub const TARGET_COLUMN: &str = "median_house_value";

/// Numeric column that may contain nulls and is median-imputed
pub const IMPUTED_COLUMN: &str = "total_bedrooms";

/// Categorical column that is one-hot encoded
pub const CATEGORICAL_COLUMN: &str = "ocean_proximity";

/// Raw numeric features in canonical order
pub const NUMERIC_COLUMNS: [&str; 8] = [
    "longitude",
    "latitude",
    "housing_median_age",
    "total_rooms",
    "total_bedrooms",
    "population",
    "households",
    "median_income",
];

/// Every raw feature column a record must carry before it can be scored
pub fn required_feature_columns() -> Vec<&'static str> {
    let mut cols = NUMERIC_COLUMNS.to_vec();
    cols.push(CATEGORICAL_COLUMN);
    cols
}

/// Fail with a schema error naming every column from `required` that `df` lacks
pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    let present: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let missing: Vec<String> = required
        .iter()
        .filter(|col| !present.iter().any(|p| p == *col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HousecastError::MissingColumns { missing })
    }
}

/// Keep only the raw feature columns, in canonical order.
///
/// Anything else in the frame (the target, ids, notes) is dropped so it can
/// never become a model input.
pub fn select_feature_columns(df: &DataFrame) -> Result<DataFrame> {
    let required = required_feature_columns();
    require_columns(df, &required)?;
    Ok(df.select(required)?)
}

fn lookup<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name).map_err(|_| HousecastError::MissingColumns {
        missing: vec![name.to_string()],
    })
}

/// Read a column as nullable f64 values.
///
/// Numeric dtypes are cast to Float64. A CSV column with no values at all is
/// inferred as String by the reader, so an entirely null String column is
/// accepted as an all-null numeric column.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = lookup(df, name)?;
    let dtype = column.dtype();
    let all_null = column.null_count() == column.len();

    let castable = dtype.is_primitive_numeric()
        || matches!(dtype, DataType::Null)
        || (matches!(dtype, DataType::String) && all_null);

    if !castable {
        return Err(HousecastError::schema(format!(
            "column '{}' must be numeric, found {}",
            name, dtype
        )));
    }

    let float_col = column.cast(&DataType::Float64)?;
    Ok(float_col.f64()?.into_iter().collect())
}

/// Read a column as nullable owned strings
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = lookup(df, name)?;
    let string_col = column.cast(&DataType::String)?;
    let values = string_col
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}
