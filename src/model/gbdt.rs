//! Histogram gradient-boosted regression trees (least squares)
//!
//! Training bins each feature once, then repeatedly fits a tree to the
//! residual gradients and adds its shrunken leaf values to the running
//! prediction. With early stopping, a seeded holdout slice is scored after
//! every iteration and training ends once the holdout loss stops improving.

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::binning::BinMapper;
use super::matrix::FeatureMatrix;
use super::params::HgbParams;
use super::tree::{GrowerParams, Tree, TreeGrower};
use crate::error::{HousecastError, Result};

/// A fitted ensemble. Immutable; knows nothing about preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtRegressor {
    /// Training columns in the order the trees index them
    pub feature_names: Vec<String>,
    pub baseline: f64,
    pub trees: Vec<Tree>,
    pub params: HgbParams,
    /// Holdout scores (negative MSE) per iteration, starting with the baseline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_scores: Vec<f64>,
}

impl GbdtRegressor {
    /// Boosting iterations actually run
    pub fn n_iter(&self) -> usize {
        self.trees.len()
    }

    /// Score a transformed frame. Columns are looked up by name.
    pub fn predict(&self, x: &DataFrame) -> Result<Vec<f64>> {
        let matrix = FeatureMatrix::select(x, &self.feature_names)?;
        Ok(self.predict_matrix(&matrix))
    }

    /// Score a matrix whose columns follow `feature_names`
    pub fn predict_matrix(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        (0..matrix.n_rows())
            .into_par_iter()
            .map(|row| {
                self.trees.iter().fold(self.baseline, |acc, tree| {
                    acc + tree.predict_row(|f| matrix.get(row, f))
                })
            })
            .collect()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Negative mean squared error over `rows`
fn holdout_score(rows: &[u32], y: &[f64], raw: &[f64]) -> f64 {
    -mean(rows.iter().map(|&r| {
        let diff = raw[r as usize] - y[r as usize];
        diff * diff
    }))
}

/// True once none of the last `n_iter_no_change` scores beat the score just
/// before them by more than `tol`
fn should_stop(scores: &[f64], n_iter_no_change: usize, tol: f64) -> bool {
    let reference_position = n_iter_no_change + 1;
    if scores.len() < reference_position {
        return false;
    }
    let reference = scores[scores.len() - reference_position];
    !scores[scores.len() - n_iter_no_change..]
        .iter()
        .any(|&s| s > reference + tol)
}

/// Split row indices into (train, holdout) for early stopping
fn holdout_split(n: usize, fraction: f64, seed: u64) -> (Vec<u32>, Vec<u32>) {
    let mut rows: Vec<u32> = (0..n as u32).collect();
    let n_val = ((fraction * n as f64).ceil() as usize).clamp(1, n.saturating_sub(1));
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    let train = rows.split_off(n_val);
    (train, rows)
}

/// Fit a gradient-boosted regressor on a numeric feature frame
pub fn fit_hgb_model(x_train: &DataFrame, y_train: &[f64], params: &HgbParams) -> Result<GbdtRegressor> {
    let matrix = FeatureMatrix::from_frame(x_train)?;
    fit_hgb_matrix(&matrix, y_train, params)
}

/// Fit on an already extracted matrix
pub fn fit_hgb_matrix(
    matrix: &FeatureMatrix,
    y: &[f64],
    params: &HgbParams,
) -> Result<GbdtRegressor> {
    params.validate()?;

    let n = matrix.n_rows();
    if n == 0 {
        return Err(HousecastError::validation("Cannot fit model on zero rows"));
    }
    if y.len() != n {
        return Err(HousecastError::validation(format!(
            "Feature rows ({}) and target values ({}) differ in length",
            n,
            y.len()
        )));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(HousecastError::validation(
            "Target contains missing or non-finite values",
        ));
    }
    if matrix.n_features() == 0 {
        return Err(HousecastError::schema("Cannot fit model without features"));
    }

    let early_stopping = params.early_stopping.enabled_for(n) && n >= 2;
    let (train_rows, val_rows) = if early_stopping {
        holdout_split(n, params.validation_fraction, params.random_state)
    } else {
        ((0..n as u32).collect(), Vec::new())
    };

    let mapper = BinMapper::fit(matrix, &train_rows, params.max_bins);
    let binned = mapper.transform(matrix);

    let baseline = mean(train_rows.iter().map(|&r| y[r as usize]));
    let mut raw = vec![baseline; n];
    let mut gradients = vec![0.0; n];

    let grower_params = GrowerParams {
        max_leaf_nodes: params.max_leaf_nodes,
        max_depth: params.max_depth,
        min_samples_leaf: params.min_samples_leaf,
        l2_regularization: params.l2_regularization,
        learning_rate: params.learning_rate,
    };

    let mut trees = Vec::with_capacity(params.max_iter);
    let mut scores = Vec::new();
    if early_stopping {
        scores.push(holdout_score(&val_rows, y, &raw));
    }

    for _ in 0..params.max_iter {
        for &r in &train_rows {
            let r = r as usize;
            gradients[r] = raw[r] - y[r];
        }

        let (tree, assignments) = TreeGrower::new(&binned, &mapper, &gradients, &grower_params)
            .grow(train_rows.clone(), train_rows.len());

        for (row, value) in assignments {
            raw[row as usize] += value;
        }
        for &r in &val_rows {
            raw[r as usize] += tree.predict_binned(&binned, r as usize);
        }
        trees.push(tree);

        if early_stopping {
            scores.push(holdout_score(&val_rows, y, &raw));
            if should_stop(&scores, params.n_iter_no_change, params.tol) {
                break;
            }
        }
    }

    Ok(GbdtRegressor {
        feature_names: matrix.names().to_vec(),
        baseline,
        trees,
        params: params.clone(),
        validation_scores: scores,
    })
}
