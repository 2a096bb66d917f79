//! One end-to-end training run with lineage and alias promotion
//!
//! The run advances through a fixed sequence of [`RunState`]s. Any error ends
//! the tracked run as failed and is returned unchanged; the registry alias is
//! only written as the last step, so a failed run never moves it.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::dataset_hash::{DatasetHashProvider, DATA_HASH_TAG};
use super::tracking::{ModelRegistry, ModelVersion, RunInfo, RunStatus, TrackingStore};
use crate::error::{HousecastError, Result};
use crate::inference::HousingPipeline;
use crate::model::{evaluate_regression, fit_hgb_model, HgbParams};
use crate::pipeline::{
    add_engineered_features, apply_imputer_transformation, apply_one_hot_encoder,
    fit_median_imputer, fit_one_hot_encoder, load_dataset, select_feature_columns,
    split_features, train_test_split_data, DatasetSummary, CATEGORICAL_COLUMN, IMPUTED_COLUMN, TARGET_COLUMN,
};

pub const DATASET_NAME: &str = "california_housing_raw";
pub const BUNDLE_ARTIFACT: &str = "model/bundle.json";
pub const INPUT_EXAMPLE_ARTIFACT: &str = "model/input_example.json";
pub const COMPONENTS_ARCHIVE: &str = "components.zip";
pub const REGISTERED_VERSION_TAG: &str = "registered_version";

/// Progress of a training run. Transitions only move forward, except into
/// `Failed` which is reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Started,
    DataLogged,
    SplitDone,
    TransformsFit,
    ModelTrained,
    Evaluated,
    ArtifactLogged,
    Registered,
    AliasPromoted,
    Completed,
    Failed,
}

impl RunState {
    /// The state that must follow this one on success
    pub fn next(self) -> Option<RunState> {
        use RunState::*;
        match self {
            Started => Some(DataLogged),
            DataLogged => Some(SplitDone),
            SplitDone => Some(TransformsFit),
            TransformsFit => Some(ModelTrained),
            ModelTrained => Some(Evaluated),
            Evaluated => Some(ArtifactLogged),
            ArtifactLogged => Some(Registered),
            Registered => Some(AliasPromoted),
            AliasPromoted => Some(Completed),
            Completed | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Move to `to`, rejecting skips, repeats and exits from terminal states
    pub fn advance(&mut self, to: RunState) -> Result<()> {
        let allowed = if to == RunState::Failed {
            !self.is_terminal()
        } else {
            self.next() == Some(to)
        };
        if !allowed {
            return Err(HousecastError::validation(format!(
                "Illegal run state transition {} -> {}",
                self, to
            )));
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Started => "started",
            RunState::DataLogged => "data_logged",
            RunState::SplitDone => "split_done",
            RunState::TransformsFit => "transforms_fit",
            RunState::ModelTrained => "model_trained",
            RunState::Evaluated => "evaluated",
            RunState::ArtifactLogged => "artifact_logged",
            RunState::Registered => "registered",
            RunState::AliasPromoted => "alias_promoted",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Inputs and identifiers for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_path: PathBuf,
    pub dvc_path: PathBuf,
    pub experiment: String,
    pub run_name: String,
    pub model_name: String,
    pub alias: String,
    pub test_size: f64,
    pub random_state: u64,
    pub params: HgbParams,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/raw/housing.csv"),
            dvc_path: PathBuf::from("data/raw/housing.csv.dvc"),
            experiment: "california_housing_price".to_string(),
            run_name: "hist_gradient_boosting".to_string(),
            model_name: "CaliforniaHousingRegressor".to_string(),
            alias: "production".to_string(),
            test_size: 0.2,
            random_state: 42,
            params: HgbParams::default(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(HousecastError::validation(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        for (field, value) in [
            ("experiment", &self.experiment),
            ("run_name", &self.run_name),
            ("model_name", &self.model_name),
            ("alias", &self.alias),
        ] {
            if value.trim().is_empty() {
                return Err(HousecastError::validation(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        self.params.validate()
    }

    /// Run parameters in logging order
    fn as_param_map(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("data_path".to_string(), self.data_path.display().to_string()),
            ("test_size".to_string(), self.test_size.to_string()),
            ("split_random_state".to_string(), self.random_state.to_string()),
            ("model_name".to_string(), self.model_name.clone()),
        ];
        params.extend(self.params.as_param_map());
        params
    }
}

/// Wall time spent reaching one state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub state: RunState,
    pub seconds: f64,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub state: RunState,
    pub model_name: String,
    pub alias: String,
    pub version: u32,
    pub metrics: BTreeMap<String, f64>,
    pub data_hash: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub n_iter: usize,
    pub timings: Vec<StageTiming>,
}

type StageObserver<'a> = Box<dyn FnMut(RunState, Duration) + 'a>;

/// A single training run against a tracking store and registry
pub struct TrainingRun<'a> {
    config: TrainConfig,
    tracking: &'a dyn TrackingStore,
    registry: &'a dyn ModelRegistry,
    hasher: &'a dyn DatasetHashProvider,
    state: RunState,
    timings: Vec<StageTiming>,
    stage_started: Instant,
    observer: Option<StageObserver<'a>>,
}

/// Values carried between stages
struct Outcome {
    metrics: BTreeMap<String, f64>,
    data_hash: String,
    version: ModelVersion,
    train_rows: usize,
    test_rows: usize,
    n_iter: usize,
}

impl<'a> TrainingRun<'a> {
    pub fn new(
        config: TrainConfig,
        tracking: &'a dyn TrackingStore,
        registry: &'a dyn ModelRegistry,
        hasher: &'a dyn DatasetHashProvider,
    ) -> Self {
        Self {
            config,
            tracking,
            registry,
            hasher,
            state: RunState::Started,
            timings: Vec::new(),
            stage_started: Instant::now(),
            observer: None,
        }
    }

    /// Called after each state is reached with the time the stage took
    pub fn on_stage(mut self, observer: impl FnMut(RunState, Duration) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn reach(&mut self, to: RunState) -> Result<()> {
        self.state.advance(to)?;
        let elapsed = self.stage_started.elapsed();
        self.stage_started = Instant::now();
        self.timings.push(StageTiming {
            state: to,
            seconds: elapsed.as_secs_f64(),
        });
        info!(state = %to, elapsed_ms = elapsed.as_millis() as u64, "Run stage reached");
        if let Some(observer) = self.observer.as_mut() {
            observer(to, elapsed);
        }
        Ok(())
    }

    /// Run every stage. On failure the tracked run is ended as failed and
    /// the original error is returned.
    pub fn execute(mut self) -> Result<RunSummary> {
        self.config.validate()?;
        let run = self
            .tracking
            .start_run(&self.config.experiment, &self.config.run_name)?;
        self.stage_started = Instant::now();

        match self.run_stages(&run) {
            Ok(outcome) => {
                // The alias already serves this version, so a failure to
                // close the run cannot turn it into a failed run
                if let Err(end_err) = self.tracking.end_run(&run, RunStatus::Finished, None) {
                    warn!(run_id = %run.run_id, error = %end_err, "Could not mark promoted run as finished");
                }
                self.reach(RunState::Completed)?;
                info!(
                    run_id = %run.run_id,
                    model = %self.config.model_name,
                    version = outcome.version.version,
                    alias = %self.config.alias,
                    "Training run completed"
                );
                Ok(RunSummary {
                    run_id: run.run_id,
                    state: self.state,
                    model_name: self.config.model_name,
                    alias: self.config.alias,
                    version: outcome.version.version,
                    metrics: outcome.metrics,
                    data_hash: outcome.data_hash,
                    train_rows: outcome.train_rows,
                    test_rows: outcome.test_rows,
                    n_iter: outcome.n_iter,
                    timings: self.timings,
                })
            }
            Err(e) => {
                let failed_at = self.state;
                self.state.advance(RunState::Failed).ok();
                error!(run_id = %run.run_id, state = %failed_at, error = %e, "Training run failed");
                if let Err(end_err) =
                    self.tracking
                        .end_run(&run, RunStatus::Failed, Some(&e.to_string()))
                {
                    warn!(run_id = %run.run_id, error = %end_err, "Could not mark run as failed");
                }
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, run: &RunInfo) -> Result<Outcome> {
        let config = self.config.clone();

        // Data
        let raw = load_dataset(&config.data_path)?;
        let summary = DatasetSummary::describe(&raw, DATASET_NAME, "training");
        self.tracking.log_params(run, &config.as_param_map())?;
        self.tracking.log_artifact(
            run,
            &format!("datasets/{}.json", DATASET_NAME),
            &serde_json::to_vec_pretty(&summary)?,
        )?;
        let data_hash = self.hasher.dataset_hash();
        self.tracking.set_tag(run, DATA_HASH_TAG, &data_hash)?;
        info!(rows = summary.rows, columns = summary.columns, data_hash = %data_hash, "Dataset logged");
        self.reach(RunState::DataLogged)?;

        // Split
        let (x, y) = split_features(&raw, TARGET_COLUMN)?;
        let x = select_feature_columns(&x)?;
        let split = train_test_split_data(&x, &y, config.test_size, config.random_state)?;
        let train_rows = split.x_train.height();
        let test_rows = split.x_test.height();
        self.tracking.log_params(
            run,
            &[
                ("train_rows".to_string(), train_rows.to_string()),
                ("test_rows".to_string(), test_rows.to_string()),
            ],
        )?;
        self.reach(RunState::SplitDone)?;

        // Transforms, fitted on the training split only
        let imputer = fit_median_imputer(&split.x_train, IMPUTED_COLUMN)?;
        let imputed = apply_imputer_transformation(&split.x_train, IMPUTED_COLUMN, &imputer)?;
        let encoder = fit_one_hot_encoder(&imputed, CATEGORICAL_COLUMN)?;
        let encoded = apply_one_hot_encoder(&imputed, CATEGORICAL_COLUMN, &encoder)?;
        let train_features = add_engineered_features(&encoded)?;
        self.reach(RunState::TransformsFit)?;

        // Model
        let model = fit_hgb_model(&train_features, &split.y_train, &config.params)?;
        let n_iter = model.n_iter();
        self.tracking.log_metric(run, "n_iter", n_iter as f64)?;
        let pipeline = HousingPipeline::new(imputer, encoder, model);
        self.reach(RunState::ModelTrained)?;

        // Evaluation through the same path serving uses
        let mut metrics = BTreeMap::new();
        for (prefix, x_part, y_part) in [
            ("train", &split.x_train, &split.y_train),
            ("test", &split.x_test, &split.y_test),
        ] {
            let predictions = pipeline.predict(x_part)?;
            for (name, value) in evaluate_regression(y_part, &predictions)? {
                let key = format!("{}_{}", prefix, name);
                self.tracking.log_metric(run, &key, value)?;
                metrics.insert(key, value);
            }
        }
        info!(
            test_rmse = metrics.get("test_rmse").copied().unwrap_or(f64::NAN),
            test_r2 = metrics.get("test_r2").copied().unwrap_or(f64::NAN),
            "Model evaluated"
        );
        self.reach(RunState::Evaluated)?;

        // Artifacts
        let bundle_path =
            self.tracking
                .log_artifact(run, BUNDLE_ARTIFACT, &pipeline.to_json_bytes()?)?;
        let example = pipeline.input_example(&split.x_train)?;
        self.tracking.log_artifact(
            run,
            INPUT_EXAMPLE_ARTIFACT,
            &serde_json::to_vec_pretty(&example)?,
        )?;
        let components = component_files(&pipeline)?;
        for (name, bytes) in &components {
            self.tracking
                .log_artifact(run, &format!("components/{}", name), bytes)?;
        }
        self.tracking
            .log_artifact(run, COMPONENTS_ARCHIVE, &package_components(&components)?)?;
        self.reach(RunState::ArtifactLogged)?;

        // Registration
        let source = bundle_path.display().to_string();
        self.registry
            .create_version(&config.model_name, &run.run_id, &source)?;
        let version = version_for_run(
            &self.registry.search_versions(&config.model_name)?,
            &config.model_name,
            &run.run_id,
        )?;
        self.tracking
            .set_tag(run, REGISTERED_VERSION_TAG, &version.version.to_string())?;
        self.reach(RunState::Registered)?;

        // Promotion is the last write that can fail before the run is done
        self.registry
            .set_alias(&config.model_name, &config.alias, version.version)?;
        self.reach(RunState::AliasPromoted)?;

        Ok(Outcome {
            metrics,
            data_hash,
            version,
            train_rows,
            test_rows,
            n_iter,
        })
    }
}

/// The newest version produced by `run_id`; never falls back to another run's
pub fn version_for_run(versions: &[ModelVersion], name: &str, run_id: &str) -> Result<ModelVersion> {
    versions
        .iter()
        .filter(|v| v.run_id == run_id)
        .max_by_key(|v| v.version)
        .cloned()
        .ok_or_else(|| {
            HousecastError::registration(format!(
                "No version of '{}' was registered by run {}",
                name, run_id
            ))
        })
}

/// Fitted components as standalone JSON documents, for inspection only
fn component_files(pipeline: &HousingPipeline) -> Result<Vec<(&'static str, Vec<u8>)>> {
    Ok(vec![
        ("imputer.json", serde_json::to_vec_pretty(pipeline.imputer())?),
        ("encoder.json", serde_json::to_vec_pretty(pipeline.encoder())?),
        ("model.json", serde_json::to_vec_pretty(pipeline.model())?),
    ])
}

/// Zip the component documents into one archive
fn package_components(files: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let zip_err = |e: zip::result::ZipError| {
        HousecastError::artifact_io(Path::new(COMPONENTS_ARCHIVE), std::io::Error::other(e))
    };

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for (name, bytes) in files {
        zip.start_file(*name, options).map_err(zip_err)?;
        zip.write_all(bytes)
            .map_err(|e| HousecastError::artifact_io(Path::new(COMPONENTS_ARCHIVE), e))?;
    }

    Ok(zip.finish().map_err(zip_err)?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;

    #[test]
    fn test_states_advance_in_order() {
        let mut state = RunState::Started;
        while let Some(next) = state.next() {
            state.advance(next).unwrap();
        }
        assert_eq!(state, RunState::Completed);
        assert!(state.advance(RunState::Failed).is_err());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut state = RunState::Started;
        assert!(state.advance(RunState::ModelTrained).is_err());
        assert!(state.advance(RunState::Started).is_err());
        assert_eq!(state, RunState::Started);

        state.advance(RunState::Failed).unwrap();
        assert!(state.advance(RunState::DataLogged).is_err());
    }

    fn version(n: u32, run_id: &str) -> ModelVersion {
        ModelVersion {
            name: "Model".to_string(),
            version: n,
            run_id: run_id.to_string(),
            source: format!("runs/{}/bundle.json", run_id),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_version_matched_by_run_id() {
        let versions = vec![version(1, "a"), version(2, "b"), version(3, "c")];
        assert_eq!(version_for_run(&versions, "Model", "b").unwrap().version, 2);
        assert!(matches!(
            version_for_run(&versions, "Model", "zzz"),
            Err(HousecastError::Registration(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainConfig::default();
        config.validate().unwrap();

        let bad = TrainConfig {
            test_size: 1.0,
            ..TrainConfig::default()
        };
        assert!(bad.validate().is_err());

        let blank = TrainConfig {
            alias: " ".to_string(),
            ..TrainConfig::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_components_archive_lists_all_files() {
        let files = vec![
            ("imputer.json", b"{\"value\": 1}".to_vec()),
            ("encoder.json", b"{}".to_vec()),
        ];
        let bytes = package_components(&files).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("imputer.json")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "{\"value\": 1}");
    }
}
