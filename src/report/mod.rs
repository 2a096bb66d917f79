//! Report module - summarizing training runs

pub mod summary;

pub use summary::*;
