//! Lineage - run tracking, dataset hashing, model registry and promotion

pub mod dataset_hash;
pub mod fs_store;
pub mod tracking;
pub mod training;

pub use dataset_hash::{DatasetHashProvider, DvcFileHash, DATA_HASH_TAG, UNKNOWN_HASH};
pub use fs_store::{FsTracking, RunMeta};
pub use tracking::{ModelReference, ModelRegistry, ModelVersion, RunInfo, RunStatus, TrackingStore};
pub use training::{
    RunState, RunSummary, StageTiming, TrainConfig, TrainingRun, REGISTERED_VERSION_TAG,
};
