//! Feature/target separation and reproducible train/test splitting

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::schema::numeric_values;
use crate::error::{HousecastError, Result};

/// Train and test partitions of the feature frame and target
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub x_train: DataFrame,
    pub x_test: DataFrame,
    pub y_train: Vec<f64>,
    pub y_test: Vec<f64>,
}

/// Separate the target column from the features.
///
/// Returns the frame without `target_col` and the target as dense f64 values.
/// Null or non-finite target values are rejected.
pub fn split_features(df: &DataFrame, target_col: &str) -> Result<(DataFrame, Vec<f64>)> {
    if df.column(target_col).is_err() {
        return Err(HousecastError::MissingColumns {
            missing: vec![target_col.to_string()],
        });
    }

    let y = numeric_values(df, target_col)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(value) if value.is_finite() => Ok(value),
            _ => Err(HousecastError::validation(format!(
                "Target column '{}' has a missing or non-finite value at row {}",
                target_col, row
            ))),
        })
        .collect::<Result<Vec<f64>>>()?;

    let x = df.drop(target_col)?;
    Ok((x, y))
}

/// Number of test rows for a fraction, rounded up
fn test_row_count(n_rows: usize, test_size: f64) -> usize {
    (test_size * n_rows as f64).ceil() as usize
}

/// Shuffle-split rows into train and test partitions.
///
/// The permutation comes from a `StdRng` seeded with `random_state`; the first
/// `ceil(test_size * n)` permuted indices form the test partition and the rest
/// the train partition. Both keep the permuted order.
pub fn train_test_split_data(
    x: &DataFrame,
    y: &[f64],
    test_size: f64,
    random_state: u64,
) -> Result<SplitDataset> {
    let n = x.height();

    if n != y.len() {
        return Err(HousecastError::validation(format!(
            "Feature rows ({}) and target values ({}) differ in length",
            n,
            y.len()
        )));
    }

    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(HousecastError::validation(format!(
            "test_size must be between 0.0 and 1.0 (exclusive), got {}",
            test_size
        )));
    }

    let n_test = test_row_count(n, test_size);
    if n_test == 0 || n_test >= n {
        return Err(HousecastError::validation(format!(
            "test_size {} on {} rows leaves an empty partition",
            test_size, n
        )));
    }

    let mut indices: Vec<IdxSize> = (0..n as IdxSize).collect();
    let mut rng = StdRng::seed_from_u64(random_state);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);

    let take_rows = |idx: &[IdxSize]| -> Result<DataFrame> {
        let ca = IdxCa::from_vec("idx".into(), idx.to_vec());
        Ok(x.take(&ca)?)
    };
    let take_targets =
        |idx: &[IdxSize]| -> Vec<f64> { idx.iter().map(|&i| y[i as usize]).collect() };

    Ok(SplitDataset {
        x_train: take_rows(train_idx)?,
        x_test: take_rows(test_idx)?,
        y_train: take_targets(train_idx),
        y_test: take_targets(test_idx),
    })
}
