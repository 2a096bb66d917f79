//! Dataset version lookup from a DVC pointer file

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{HousecastError, Result};

/// Tag value recorded when the dataset hash cannot be determined
pub const UNKNOWN_HASH: &str = "unknown";

/// Run tag carrying the dataset hash
pub const DATA_HASH_TAG: &str = "data_dvc_md5";

/// Source of a content hash for the training dataset.
///
/// Lookup never fails a run; implementations fall back to [`UNKNOWN_HASH`].
pub trait DatasetHashProvider {
    fn dataset_hash(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct DvcFile {
    #[serde(default)]
    outs: Vec<DvcOut>,
}

#[derive(Debug, Deserialize)]
struct DvcOut {
    md5: Option<String>,
}

/// Reads `outs[0].md5` from a `.dvc` YAML file
#[derive(Debug, Clone)]
pub struct DvcFileHash {
    path: PathBuf,
}

impl DvcFileHash {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict lookup; errors describe why no hash was found
    pub fn read_hash(&self) -> Result<String> {
        let text =
            fs::read_to_string(&self.path).map_err(|e| HousecastError::artifact_io(&self.path, e))?;
        let parsed: DvcFile = serde_yaml::from_str(&text).map_err(|e| {
            HousecastError::validation(format!("Invalid DVC file {}: {}", self.path.display(), e))
        })?;

        parsed
            .outs
            .into_iter()
            .next()
            .and_then(|out| out.md5)
            .filter(|md5| !md5.trim().is_empty())
            .ok_or_else(|| {
                HousecastError::validation(format!(
                    "DVC file {} has no outs[0].md5",
                    self.path.display()
                ))
            })
    }
}

impl DatasetHashProvider for DvcFileHash {
    fn dataset_hash(&self) -> String {
        match self.read_hash() {
            Ok(hash) => hash,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Dataset hash unavailable");
                UNKNOWN_HASH.to_string()
            }
        }
    }
}
