//! Command-line argument definitions using clap

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::lineage::{ModelReference, TrainConfig};
use crate::model::{EarlyStopping, HgbParams};
use crate::serving::{BatchConfig, ServeConfig};

/// Housecast - train, register and serve California housing price models
#[derive(Parser, Debug)]
#[command(name = "housecast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Tracking and registry root directory
    #[arg(long, global = true, default_value = "mlruns", env = "HOUSECAST_TRACKING_ROOT")]
    pub tracking_root: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit the pipeline, log the run, register a version and promote the alias
    Train(TrainArgs),

    /// Score a CSV file with the aliased bundle
    Predict(PredictArgs),

    /// Serve the aliased bundle over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Raw training data (CSV or Parquet)
    #[arg(long, default_value = "data/raw/housing.csv")]
    pub data: PathBuf,

    /// DVC pointer file for the training data
    #[arg(long, default_value = "data/raw/housing.csv.dvc")]
    pub dvc_file: PathBuf,

    #[arg(long, default_value = "california_housing_price")]
    pub experiment: String,

    #[arg(long, default_value = "hist_gradient_boosting")]
    pub run_name: String,

    /// Registered model name
    #[arg(long, default_value = "CaliforniaHousingRegressor")]
    pub model_name: String,

    /// Alias pointed at the new version once the run succeeds
    #[arg(long, default_value = "production")]
    pub alias: String,

    /// Fraction of rows held out for testing
    #[arg(long, default_value = "0.2", value_parser = validate_open_fraction)]
    pub test_size: f64,

    /// Seed for the train/test split and the model
    #[arg(long, default_value = "42")]
    pub random_state: u64,

    /// Maximum tree depth (0 for unlimited)
    #[arg(long, default_value = "8")]
    pub max_depth: usize,

    /// Shrinkage applied to each tree's leaf values
    #[arg(long, default_value = "0.1", value_parser = validate_learning_rate)]
    pub learning_rate: f64,

    /// Maximum boosting iterations
    #[arg(long, default_value = "200", value_parser = validate_positive)]
    pub max_iter: usize,

    #[arg(long, default_value = "31", value_parser = validate_max_leaf_nodes)]
    pub max_leaf_nodes: usize,

    #[arg(long, default_value = "20", value_parser = validate_positive)]
    pub min_samples_leaf: usize,

    /// L2 penalty on leaf values
    #[arg(long, default_value = "0.0", value_parser = validate_non_negative)]
    pub l2_regularization: f64,

    /// Histogram bins per feature (2 to 255)
    #[arg(long, default_value = "255", value_parser = validate_max_bins)]
    pub max_bins: usize,

    /// Early stopping: "auto" (only above 10000 rows), "on" or "off"
    #[arg(long, default_value = "auto")]
    pub early_stopping: EarlyStopping,

    /// Holdout fraction used for early stopping
    #[arg(long, default_value = "0.1", value_parser = validate_open_fraction)]
    pub validation_fraction: f64,

    #[arg(long, default_value = "10", value_parser = validate_positive)]
    pub n_iter_no_change: usize,

    #[arg(long, default_value = "1e-7", value_parser = validate_non_negative)]
    pub tol: f64,
}

impl TrainArgs {
    pub fn to_config(&self) -> TrainConfig {
        TrainConfig {
            data_path: self.data.clone(),
            dvc_path: self.dvc_file.clone(),
            experiment: self.experiment.clone(),
            run_name: self.run_name.clone(),
            model_name: self.model_name.clone(),
            alias: self.alias.clone(),
            test_size: self.test_size,
            random_state: self.random_state,
            params: HgbParams {
                max_depth: (self.max_depth > 0).then_some(self.max_depth),
                learning_rate: self.learning_rate,
                max_iter: self.max_iter,
                random_state: self.random_state,
                max_leaf_nodes: self.max_leaf_nodes,
                min_samples_leaf: self.min_samples_leaf,
                l2_regularization: self.l2_regularization,
                max_bins: self.max_bins,
                early_stopping: self.early_stopping,
                validation_fraction: self.validation_fraction,
                n_iter_no_change: self.n_iter_no_change,
                tol: self.tol,
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Rows to score (CSV)
    #[arg(long, default_value = "data/inference/sample_input.csv")]
    pub input: PathBuf,

    /// Where to write the predictions JSON
    #[arg(long, default_value = "outputs/batch_run_001.json")]
    pub output: PathBuf,

    /// Registry reference, models:/<name>@<alias>
    #[arg(long, default_value = "models:/CaliforniaHousingRegressor@production")]
    pub model: ModelReference,
}

impl PredictArgs {
    pub fn to_config(&self) -> BatchConfig {
        BatchConfig {
            input_path: self.input.clone(),
            output_path: self.output.clone(),
            reference: self.model.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Registry reference, models:/<name>@<alias>
    #[arg(long, default_value = "models:/CaliforniaHousingRegressor@production")]
    pub model: ModelReference,
}

impl ServeArgs {
    pub fn to_config(&self) -> ServeConfig {
        ServeConfig {
            addr: self.bind,
            reference: self.model.clone(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(s: &str) -> Result<T, String> {
    s.parse()
        .map_err(|_| format!("'{}' is not a valid number", s))
}

/// Validator for fractions strictly between 0 and 1
fn validate_open_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = parse_number(s)?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!("value must be between 0.0 and 1.0 (exclusive), got {}", value))
    }
}

fn validate_learning_rate(s: &str) -> Result<f64, String> {
    let value: f64 = parse_number(s)?;
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(format!("learning_rate must be in (0.0, 1.0], got {}", value))
    }
}

fn validate_non_negative(s: &str) -> Result<f64, String> {
    let value: f64 = parse_number(s)?;
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("value must be a finite number >= 0, got {}", value))
    }
}

fn validate_positive(s: &str) -> Result<usize, String> {
    let value: usize = parse_number(s)?;
    if value >= 1 {
        Ok(value)
    } else {
        Err("value must be at least 1".to_string())
    }
}

fn validate_max_leaf_nodes(s: &str) -> Result<usize, String> {
    let value: usize = parse_number(s)?;
    if value >= 2 {
        Ok(value)
    } else {
        Err(format!("max_leaf_nodes must be at least 2, got {}", value))
    }
}

fn validate_max_bins(s: &str) -> Result<usize, String> {
    let value: usize = parse_number(s)?;
    if (2..=255).contains(&value) {
        Ok(value)
    } else {
        Err(format!("max_bins must be between 2 and 255, got {}", value))
    }
}
