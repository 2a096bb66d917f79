//! Filesystem-backed tracking store and model registry
//!
//! Layout under the tracking root:
//!
//! ```text
//! experiments/<experiment>/<run_id>/{meta,params,metrics,tags}.json
//! experiments/<experiment>/<run_id>/artifacts/...
//! registry/<name>/versions/<n>/{version,bundle}.json
//! registry/<name>/aliases/<alias>.json
//! ```
//!
//! Every JSON record is replaced through a temp file that is fsynced and
//! renamed, so readers never observe a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::tracking::{
    ModelReference, ModelRegistry, ModelVersion, RunInfo, RunStatus, TrackingStore,
};
use crate::error::{HousecastError, Result};
use crate::inference::HousingPipeline;

const BUNDLE_FILE: &str = "bundle.json";
const VERSION_FILE: &str = "version.json";

/// Run metadata persisted as `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub run_name: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AliasRecord {
    version: u32,
    updated_at: DateTime<Utc>,
}

/// Tracking store and registry rooted at one directory
#[derive(Debug, Clone)]
pub struct FsTracking {
    root: PathBuf,
}

impl FsTracking {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run: &RunInfo) -> PathBuf {
        self.root
            .join("experiments")
            .join(&run.experiment)
            .join(&run.run_id)
    }

    pub fn read_run_meta(&self, run: &RunInfo) -> Result<RunMeta> {
        read_json(&self.run_dir(run).join("meta.json"))
    }

    pub fn read_params(&self, run: &RunInfo) -> Result<BTreeMap<String, String>> {
        read_json(&self.run_dir(run).join("params.json"))
    }

    pub fn read_metrics(&self, run: &RunInfo) -> Result<BTreeMap<String, f64>> {
        read_json(&self.run_dir(run).join("metrics.json"))
    }

    pub fn read_tags(&self, run: &RunInfo) -> Result<BTreeMap<String, String>> {
        read_json(&self.run_dir(run).join("tags.json"))
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join("registry").join(name)
    }

    fn version_dir(&self, name: &str, version: u32) -> PathBuf {
        self.model_dir(name).join("versions").join(version.to_string())
    }

    fn alias_path(&self, name: &str, alias: &str) -> PathBuf {
        self.model_dir(name)
            .join("aliases")
            .join(format!("{}.json", alias))
    }

    fn update_map<V>(&self, path: &Path, apply: impl FnOnce(&mut BTreeMap<String, V>)) -> Result<()>
    where
        V: Serialize + DeserializeOwned,
    {
        let mut map: BTreeMap<String, V> = read_json(path)?;
        apply(&mut map);
        write_json_atomic(path, &map)
    }
}

/// Reject names that could escape their directory
fn validate_segment(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
        && !value.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(HousecastError::validation(format!(
            "Invalid {} '{}'",
            kind, value
        )))
    }
}

/// Artifact paths must stay inside the run's artifact directory
fn validate_artifact_path(rel_path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(rel_path);
    let normal = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if rel_path.is_empty() || !normal {
        return Err(HousecastError::validation(format!(
            "Invalid artifact path '{}'",
            rel_path
        )));
    }
    Ok(path)
}

fn new_run_id() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}{:08x}", Utc::now().format("%Y%m%d%H%M%S%3f"), suffix)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| HousecastError::artifact_io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| HousecastError::artifact_io(parent, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp = parent.join(format!(".{}.{:08x}.tmp", file_name, rand::thread_rng().gen::<u32>()));

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        fs::remove_file(&tmp).ok();
        HousecastError::artifact_io(path, e)
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_bytes_atomic(path, &serde_json::to_vec_pretty(value)?)
}

impl TrackingStore for FsTracking {
    fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunInfo> {
        validate_segment("experiment name", experiment)?;

        let run = RunInfo {
            run_id: new_run_id(),
            experiment: experiment.to_string(),
            run_name: run_name.to_string(),
        };
        let dir = self.run_dir(&run);
        let artifacts = dir.join("artifacts");
        fs::create_dir_all(&artifacts).map_err(|e| HousecastError::artifact_io(&artifacts, e))?;

        let meta = RunMeta {
            run_id: run.run_id.clone(),
            run_name: run.run_name.clone(),
            experiment: run.experiment.clone(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            message: None,
        };
        write_json_atomic(&dir.join("meta.json"), &meta)?;
        write_json_atomic(&dir.join("params.json"), &BTreeMap::<String, String>::new())?;
        write_json_atomic(&dir.join("metrics.json"), &BTreeMap::<String, f64>::new())?;
        write_json_atomic(&dir.join("tags.json"), &BTreeMap::<String, String>::new())?;

        info!(run_id = %run.run_id, experiment, run_name, "Started run");
        Ok(run)
    }

    fn log_params(&self, run: &RunInfo, params: &[(String, String)]) -> Result<()> {
        self.update_map(&self.run_dir(run).join("params.json"), |map| {
            for (key, value) in params {
                map.insert(key.clone(), value.clone());
            }
        })
    }

    fn log_metric(&self, run: &RunInfo, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(HousecastError::validation(format!(
                "Metric '{}' is not finite: {}",
                key, value
            )));
        }
        debug!(run_id = %run.run_id, key, value, "Logged metric");
        self.update_map(&self.run_dir(run).join("metrics.json"), |map| {
            map.insert(key.to_string(), value);
        })
    }

    fn set_tag(&self, run: &RunInfo, key: &str, value: &str) -> Result<()> {
        self.update_map(&self.run_dir(run).join("tags.json"), |map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn log_artifact(&self, run: &RunInfo, rel_path: &str, bytes: &[u8]) -> Result<PathBuf> {
        let rel = validate_artifact_path(rel_path)?;
        let path = self.run_dir(run).join("artifacts").join(rel);
        write_bytes_atomic(&path, bytes)?;
        debug!(run_id = %run.run_id, artifact = rel_path, bytes = bytes.len(), "Logged artifact");
        Ok(path)
    }

    fn end_run(&self, run: &RunInfo, status: RunStatus, message: Option<&str>) -> Result<()> {
        let path = self.run_dir(run).join("meta.json");
        let mut meta: RunMeta = read_json(&path)?;
        meta.status = status;
        meta.end_time = Some(Utc::now());
        meta.message = message.map(str::to_string);
        write_json_atomic(&path, &meta)?;

        info!(run_id = %run.run_id, status = %status, "Ended run");
        Ok(())
    }
}

impl ModelRegistry for FsTracking {
    fn create_version(&self, name: &str, run_id: &str, source: &str) -> Result<ModelVersion> {
        validate_segment("model name", name)?;

        let source_path = Path::new(source);
        let bundle = fs::read(source_path).map_err(|e| HousecastError::artifact_io(source_path, e))?;
        // Refuse to register something that will not load
        HousingPipeline::from_json_slice(&bundle)?;

        let next = self
            .search_versions(name)?
            .last()
            .map_or(1, |v| v.version + 1);
        let record = ModelVersion {
            name: name.to_string(),
            version: next,
            run_id: run_id.to_string(),
            source: source.to_string(),
            created_at: Utc::now(),
        };

        let versions = self.model_dir(name).join("versions");
        let staging = self
            .model_dir(name)
            .join(format!(".staging-{}-{:08x}", next, rand::thread_rng().gen::<u32>()));
        write_bytes_atomic(&staging.join(BUNDLE_FILE), &bundle)?;
        write_json_atomic(&staging.join(VERSION_FILE), &record)?;

        let target = self.version_dir(name, next);
        if target.exists() {
            fs::remove_dir_all(&staging).ok();
            return Err(HousecastError::registration(format!(
                "Version {} of '{}' already exists",
                next, name
            )));
        }
        fs::create_dir_all(&versions).map_err(|e| HousecastError::artifact_io(&versions, e))?;
        fs::rename(&staging, &target).map_err(|e| {
            fs::remove_dir_all(&staging).ok();
            HousecastError::artifact_io(&target, e)
        })?;

        info!(model = name, version = next, run_id, "Registered model version");
        Ok(record)
    }

    fn search_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        validate_segment("model name", name)?;

        let versions = self.model_dir(name).join("versions");
        if !versions.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&versions).map_err(|e| HousecastError::artifact_io(&versions, e))?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HousecastError::artifact_io(&versions, e))?;
            let record_path = entry.path().join(VERSION_FILE);
            if record_path.is_file() {
                found.push(read_json::<ModelVersion>(&record_path)?);
            }
        }
        found.sort_by_key(|v| v.version);
        Ok(found)
    }

    fn set_alias(&self, name: &str, alias: &str, version: u32) -> Result<()> {
        validate_segment("model name", name)?;
        validate_segment("alias", alias)?;

        if !self.version_dir(name, version).join(VERSION_FILE).is_file() {
            return Err(HousecastError::registration(format!(
                "Cannot set alias '{}': version {} of '{}' does not exist",
                alias, version, name
            )));
        }

        let record = AliasRecord {
            version,
            updated_at: Utc::now(),
        };
        write_json_atomic(&self.alias_path(name, alias), &record)?;
        info!(model = name, alias, version, "Promoted alias");
        Ok(())
    }

    fn resolve_alias(&self, name: &str, alias: &str) -> Result<ModelVersion> {
        validate_segment("model name", name)?;
        validate_segment("alias", alias)?;

        let path = self.alias_path(name, alias);
        if !path.is_file() {
            return Err(HousecastError::upstream(format!(
                "No version of '{}' carries alias '{}' under {}",
                name,
                alias,
                self.root.display()
            )));
        }
        let record: AliasRecord = read_json(&path)?;
        read_json(&self.version_dir(name, record.version).join(VERSION_FILE))
    }

    fn load_bundle(&self, reference: &ModelReference) -> Result<HousingPipeline> {
        let version = self.resolve_alias(&reference.name, &reference.alias)?;
        let path = self.version_dir(&version.name, version.version).join(BUNDLE_FILE);
        let bundle = HousingPipeline::load(&path)?;
        info!(reference = %reference, version = version.version, "Loaded bundle");
        Ok(bundle)
    }
}
