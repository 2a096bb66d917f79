//! Error types shared by the training pipeline, the registry and the serving adapters.

use std::io;
use std::path::PathBuf;

use polars::prelude::PolarsError;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, HousecastError>;

/// Errors that can occur while fitting, persisting, resolving or serving a bundle.
#[derive(Debug, thiserror::Error)]
pub enum HousecastError {
    /// Raw input is missing required columns.
    #[error("missing required column(s): {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    /// Raw input has a column of the wrong kind or an unexpected layout.
    #[error("schema error: {0}")]
    Schema(String),

    /// Degenerate statistical input (all-null column, empty evaluation set, bad parameter).
    #[error("validation error: {0}")]
    Validation(String),

    /// No registry version could be matched to the current run.
    #[error("registration error: {0}")]
    Registration(String),

    /// Persistence or read failure against the artifact store.
    #[error("artifact I/O error at {}: {source}", .path.display())]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The model bundle cannot be resolved or loaded.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("data error: {0}")]
    Data(#[from] PolarsError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HousecastError {
    pub fn schema(message: impl Into<String>) -> Self {
        HousecastError::Schema(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        HousecastError::Validation(message.into())
    }

    pub fn registration(message: impl Into<String>) -> Self {
        HousecastError::Registration(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        HousecastError::UpstreamUnavailable(message.into())
    }

    /// Wrap an I/O error with the artifact path it happened on.
    pub fn artifact_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HousecastError::ArtifactIo {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_missing_columns_display_lists_every_column() {
        let err = HousecastError::MissingColumns {
            missing: vec!["latitude".to_string(), "households".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "missing required column(s): latitude, households"
        );
    }

    #[test]
    fn test_artifact_io_display_and_source() {
        let err = HousecastError::artifact_io(
            "mlruns/registry/x/aliases/production.json",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("production.json"));
        assert!(err.to_string().contains("file not found"));
        assert!(err.source().is_some());
    }
}
