//! Tracking and registry contracts shared by training and serving

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HousecastError, Result};
use crate::inference::HousingPipeline;

/// Terminal or in-flight status of a tracked run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Handle to a started run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment: String,
    pub run_name: String,
}

/// One registered version of a named model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u32,
    pub run_id: String,
    /// Where the bundle was logged in the run that produced it
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Per-run record keeping: parameters, metrics, tags and artifacts
pub trait TrackingStore {
    fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunInfo>;

    fn log_params(&self, run: &RunInfo, params: &[(String, String)]) -> Result<()>;

    fn log_metric(&self, run: &RunInfo, key: &str, value: f64) -> Result<()>;

    fn set_tag(&self, run: &RunInfo, key: &str, value: &str) -> Result<()>;

    /// Store `bytes` under the run's artifact root and return its location
    fn log_artifact(&self, run: &RunInfo, rel_path: &str, bytes: &[u8]) -> Result<PathBuf>;

    fn end_run(&self, run: &RunInfo, status: RunStatus, message: Option<&str>) -> Result<()>;
}

/// Named, versioned bundles with movable aliases
pub trait ModelRegistry {
    /// Register the bundle at `source` as the next version of `name`
    fn create_version(&self, name: &str, run_id: &str, source: &str) -> Result<ModelVersion>;

    /// All versions of `name`, oldest first
    fn search_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;

    /// Point `alias` at `version`, replacing any previous target in one step
    fn set_alias(&self, name: &str, alias: &str, version: u32) -> Result<()>;

    fn resolve_alias(&self, name: &str, alias: &str) -> Result<ModelVersion>;

    fn load_bundle(&self, reference: &ModelReference) -> Result<HousingPipeline>;
}

const MODELS_SCHEME: &str = "models:/";

/// `models:/<name>@<alias>` or bare `<name>@<alias>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReference {
    pub name: String,
    pub alias: String,
}

impl ModelReference {
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }
}

impl FromStr for ModelReference {
    type Err = HousecastError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s.strip_prefix(MODELS_SCHEME).unwrap_or(s);
        let (name, alias) = body.split_once('@').ok_or_else(|| {
            HousecastError::validation(format!(
                "Invalid model reference '{}': expected models:/<name>@<alias>",
                s
            ))
        })?;

        if name.is_empty() || alias.is_empty() || name.contains('/') || alias.contains('@') {
            return Err(HousecastError::validation(format!(
                "Invalid model reference '{}': expected models:/<name>@<alias>",
                s
            )));
        }
        Ok(Self::new(name, alias))
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}@{}", MODELS_SCHEME, self.name, self.alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_reference() {
        let full: ModelReference = "models:/CaliforniaHousingRegressor@production".parse().unwrap();
        assert_eq!(full.name, "CaliforniaHousingRegressor");
        assert_eq!(full.alias, "production");

        let bare: ModelReference = "CaliforniaHousingRegressor@production".parse().unwrap();
        assert_eq!(bare, full);
        assert_eq!(full.to_string(), "models:/CaliforniaHousingRegressor@production");
    }

    #[test]
    fn test_reject_malformed_reference() {
        for bad in ["models:/NoAlias", "@production", "Model@", "a/b@prod", "a@b@c"] {
            assert!(bad.parse::<ModelReference>().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_run_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Failed).unwrap(), "\"FAILED\"");
        assert_eq!(RunStatus::Finished.to_string(), "FINISHED");
    }
}
