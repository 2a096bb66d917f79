//! Housecast: California housing price models
//!
//! Fits a median imputer, a one-hot encoder and a histogram gradient-boosted
//! regressor as one unified bundle, tracks each training run with dataset
//! lineage, promotes registered versions through an alias, and serves the
//! aliased bundle in batch or over HTTP.

pub mod cli;
pub mod error;
pub mod inference;
pub mod lineage;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod serving;
pub mod utils;

pub use error::{HousecastError, Result};
