//! Batch scoring: CSV in, JSON predictions out

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::schema::PredictionResponse;
use crate::error::{HousecastError, Result};
use crate::inference::HousingPipeline;
use crate::lineage::{ModelReference, ModelRegistry};
use crate::pipeline::{load_dataset, TARGET_COLUMN};

/// Where to read rows, where to write scores and which bundle to use
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub reference: ModelReference,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data/inference/sample_input.csv"),
            output_path: PathBuf::from("outputs/batch_run_001.json"),
            reference: ModelReference::new("CaliforniaHousingRegressor", "production"),
        }
    }
}

/// Result of a batch run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub rows: usize,
    pub output_path: PathBuf,
}

/// Resolve the bundle, score every input row and write the predictions
pub fn run_batch_inference(config: &BatchConfig, registry: &dyn ModelRegistry) -> Result<BatchReport> {
    let pipeline = registry.load_bundle(&config.reference)?;
    score_file(&pipeline, &config.input_path, &config.output_path)
}

/// Score a CSV with an already loaded bundle.
///
/// A target column in the input is dropped before scoring. Parent
/// directories of `output_path` are created as needed.
pub fn score_file(pipeline: &HousingPipeline, input_path: &Path, output_path: &Path) -> Result<BatchReport> {
    let mut df = load_dataset(input_path)?;
    if df.column(TARGET_COLUMN).is_ok() {
        df = df.drop(TARGET_COLUMN)?;
    }

    let predictions = pipeline.predict(&df)?;
    let rows = predictions.len();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| HousecastError::artifact_io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(&PredictionResponse { predictions })?;
    fs::write(output_path, json).map_err(|e| HousecastError::artifact_io(output_path, e))?;

    info!(rows, input = %input_path.display(), output = %output_path.display(), "Batch predictions written");
    Ok(BatchReport {
        rows,
        output_path: output_path.to_path_buf(),
    })
}
