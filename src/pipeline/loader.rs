//! Dataset loader for CSV and Parquet files

use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{HousecastError, Result};

/// Load a dataset from a file (CSV or Parquet based on extension)
pub fn load_dataset(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if !path.exists() {
        return Err(HousecastError::artifact_io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "dataset file not found"),
        ));
    }

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path).finish()?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())?,
        _ => {
            return Err(HousecastError::validation(format!(
                "Unsupported file format: {}. Supported formats: csv, parquet",
                extension
            )))
        }
    };

    Ok(lf.collect()?)
}

/// Description of a training input, logged alongside the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub name: String,
    pub context: String,
    pub rows: usize,
    pub columns: usize,
    /// Column name and dtype pairs in frame order
    pub schema: Vec<(String, String)>,
    pub estimated_size_mb: f64,
}

impl DatasetSummary {
    pub fn describe(df: &DataFrame, name: &str, context: &str) -> Self {
        let (rows, columns) = df.shape();
        let schema = df
            .get_columns()
            .iter()
            .map(|col| (col.name().to_string(), col.dtype().to_string()))
            .collect();

        Self {
            name: name.to_string(),
            context: context.to_string(),
            rows,
            columns,
            schema,
            estimated_size_mb: df.estimated_size() as f64 / (1024.0 * 1024.0),
        }
    }
}
