//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tempfile::TempDir;

use housecast::model::{EarlyStopping, HgbParams};

pub const PROXIMITY: [&str; 5] = ["<1H OCEAN", "INLAND", "ISLAND", "NEAR BAY", "NEAR OCEAN"];

/// Deterministic housing-like rows.
///
/// Every 9th row has no `total_bedrooms`. The target rises with income and
/// is lower inland, so a fitted model has real signal to find.
pub fn housing_frame(rows: usize) -> DataFrame {
    let idx: Vec<usize> = (0..rows).collect();
    let f = |g: fn(usize) -> f64| idx.iter().map(|&i| g(i)).collect::<Vec<f64>>();

    let proximity: Vec<&str> = idx.iter().map(|&i| PROXIMITY[(i * 7) % 5]).collect();
    let target: Vec<f64> = idx
        .iter()
        .zip(&proximity)
        .map(|(&i, p)| {
            let income = 1.0 + ((i * 13) % 80) as f64 / 10.0;
            let inland = if *p == "INLAND" { -60_000.0 } else { 0.0 };
            80_000.0 + 40_000.0 * income + inland + ((i * 31) % 17) as f64 * 500.0
        })
        .collect();

    df! {
        "longitude" => f(|i| -124.0 + ((i * 3) % 100) as f64 / 10.0),
        "latitude" => f(|i| 32.5 + ((i * 11) % 90) as f64 / 10.0),
        "housing_median_age" => f(|i| 1.0 + ((i * 5) % 52) as f64),
        "total_rooms" => f(|i| 400.0 + ((i * 37) % 3000) as f64),
        "total_bedrooms" => idx.iter().map(|&i| if i % 9 == 0 { None } else { Some(80.0 + ((i * 17) % 600) as f64) }).collect::<Vec<Option<f64>>>(),
        "population" => f(|i| 200.0 + ((i * 23) % 2500) as f64),
        "households" => f(|i| 60.0 + ((i * 19) % 700) as f64),
        "median_income" => f(|i| 1.0 + ((i * 13) % 80) as f64 / 10.0),
        "ocean_proximity" => proximity,
        "median_house_value" => target,
    }
    .unwrap()
}

/// Raw feature rows without the target
pub fn feature_frame(rows: usize) -> DataFrame {
    housing_frame(rows).drop("median_house_value").unwrap()
}

pub fn write_csv(df: &DataFrame, path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = fs::File::create(path).unwrap();
    let mut df = df.clone();
    CsvWriter::new(&mut file).finish(&mut df).unwrap();
}

pub fn write_dvc_file(path: &Path, md5: &str) {
    fs::write(
        path,
        format!("outs:\n- md5: {}\n  size: 1423529\n  hash: md5\n  path: housing.csv\n", md5),
    )
    .unwrap();
}

/// Temp workspace holding a training CSV, its DVC file and a tracking root
pub struct Workspace {
    pub dir: TempDir,
    pub data: PathBuf,
    pub dvc: PathBuf,
    pub tracking: PathBuf,
}

pub fn workspace(rows: usize) -> Workspace {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data").join("raw").join("housing.csv");
    write_csv(&housing_frame(rows), &data);
    let dvc = dir.path().join("data").join("raw").join("housing.csv.dvc");
    write_dvc_file(&dvc, "0f3c2a9e8d7b6a5f4e3d2c1b0a998877");
    let tracking = dir.path().join("mlruns");
    Workspace {
        dir,
        data,
        dvc,
        tracking,
    }
}

/// Small, fast hyperparameters for tests
pub fn quick_params() -> HgbParams {
    HgbParams {
        max_iter: 40,
        min_samples_leaf: 5,
        early_stopping: EarlyStopping::Off,
        ..Default::default()
    }
}
