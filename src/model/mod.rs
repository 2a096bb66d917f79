//! Model stage - gradient-boosted regression trees and their metrics

pub mod binning;
pub mod gbdt;
pub mod matrix;
pub mod metrics;
pub mod params;
pub mod tree;

pub use gbdt::{fit_hgb_matrix, fit_hgb_model, GbdtRegressor};
pub use matrix::FeatureMatrix;
pub use metrics::evaluate_regression;
pub use params::{EarlyStopping, HgbParams};
