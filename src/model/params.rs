//! Validated hyperparameters for the histogram gradient-boosting regressor

use serde::{Deserialize, Serialize};

use crate::error::{HousecastError, Result};

/// When to hold out a validation slice and stop on a loss plateau
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyStopping {
    /// Enabled when the training set has more than 10 000 rows
    #[default]
    Auto,
    On,
    Off,
}

/// Row count above which `EarlyStopping::Auto` turns early stopping on
pub const AUTO_EARLY_STOPPING_ROWS: usize = 10_000;

impl EarlyStopping {
    pub fn enabled_for(&self, n_rows: usize) -> bool {
        match self {
            EarlyStopping::Auto => n_rows > AUTO_EARLY_STOPPING_ROWS,
            EarlyStopping::On => true,
            EarlyStopping::Off => false,
        }
    }
}

impl std::fmt::Display for EarlyStopping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EarlyStopping::Auto => write!(f, "auto"),
            EarlyStopping::On => write!(f, "on"),
            EarlyStopping::Off => write!(f, "off"),
        }
    }
}

impl std::str::FromStr for EarlyStopping {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(EarlyStopping::Auto),
            "on" | "true" => Ok(EarlyStopping::On),
            "off" | "false" => Ok(EarlyStopping::Off),
            _ => Err(format!(
                "Unknown early stopping mode: '{}'. Use 'auto', 'on' or 'off'.",
                s
            )),
        }
    }
}

/// Hyperparameters recognized by `fit_hgb_model`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HgbParams {
    /// Maximum edges from root to leaf. `None` means unlimited.
    pub max_depth: Option<usize>,
    /// Shrinkage applied to every leaf value
    pub learning_rate: f64,
    /// Maximum boosting iterations (one tree each)
    pub max_iter: usize,
    /// Seed for the early-stopping holdout
    pub random_state: u64,
    pub max_leaf_nodes: usize,
    pub min_samples_leaf: usize,
    pub l2_regularization: f64,
    /// Upper bound on histogram bins per feature
    pub max_bins: usize,
    pub early_stopping: EarlyStopping,
    pub validation_fraction: f64,
    pub n_iter_no_change: usize,
    pub tol: f64,
}

impl Default for HgbParams {
    fn default() -> Self {
        Self {
            max_depth: Some(8),
            learning_rate: 0.1,
            max_iter: 200,
            random_state: 42,
            max_leaf_nodes: 31,
            min_samples_leaf: 20,
            l2_regularization: 0.0,
            max_bins: 255,
            early_stopping: EarlyStopping::Auto,
            validation_fraction: 0.1,
            n_iter_no_change: 10,
            tol: 1e-7,
        }
    }
}

fn invalid(field: &str, constraint: &str, got: impl std::fmt::Display) -> HousecastError {
    HousecastError::validation(format!("{} must be {}, got {}", field, constraint, got))
}

impl HgbParams {
    /// Range-check every option
    pub fn validate(&self) -> Result<()> {
        if let Some(depth) = self.max_depth {
            if depth < 1 {
                return Err(invalid("max_depth", ">= 1", depth));
            }
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(invalid("learning_rate", "in (0, 1]", self.learning_rate));
        }
        if self.max_iter < 1 {
            return Err(invalid("max_iter", ">= 1", self.max_iter));
        }
        if self.max_leaf_nodes < 2 {
            return Err(invalid("max_leaf_nodes", ">= 2", self.max_leaf_nodes));
        }
        if self.min_samples_leaf < 1 {
            return Err(invalid("min_samples_leaf", ">= 1", self.min_samples_leaf));
        }
        if !(self.l2_regularization >= 0.0 && self.l2_regularization.is_finite()) {
            return Err(invalid(
                "l2_regularization",
                "a finite value >= 0",
                self.l2_regularization,
            ));
        }
        if !(2..=255).contains(&self.max_bins) {
            return Err(invalid("max_bins", "in 2..=255", self.max_bins));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(invalid(
                "validation_fraction",
                "in (0, 1)",
                self.validation_fraction,
            ));
        }
        if self.n_iter_no_change < 1 {
            return Err(invalid("n_iter_no_change", ">= 1", self.n_iter_no_change));
        }
        if !(self.tol >= 0.0 && self.tol.is_finite()) {
            return Err(invalid("tol", "a finite value >= 0", self.tol));
        }
        Ok(())
    }

    /// Flat string view for run parameter logging
    pub fn as_param_map(&self) -> Vec<(String, String)> {
        vec![
            (
                "max_depth".to_string(),
                self.max_depth
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "None".to_string()),
            ),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            ("max_iter".to_string(), self.max_iter.to_string()),
            ("random_state".to_string(), self.random_state.to_string()),
            ("max_leaf_nodes".to_string(), self.max_leaf_nodes.to_string()),
            ("min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
            (
                "l2_regularization".to_string(),
                self.l2_regularization.to_string(),
            ),
            ("max_bins".to_string(), self.max_bins.to_string()),
            ("early_stopping".to_string(), self.early_stopping.to_string()),
            (
                "validation_fraction".to_string(),
                self.validation_fraction.to_string(),
            ),
            (
                "n_iter_no_change".to_string(),
                self.n_iter_no_change.to_string(),
            ),
            ("tol".to_string(), self.tol.to_string()),
        ]
    }
}
