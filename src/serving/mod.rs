//! Serving adapters - batch files and the HTTP endpoint

pub mod batch;
pub mod http;
pub mod schema;

pub use batch::{run_batch_inference, score_file, BatchConfig, BatchReport};
pub use http::{load_pipeline, router, serve, ServeConfig};
pub use schema::{ErrorDetail, HealthStatus, PredictionRequest, PredictionResponse};
