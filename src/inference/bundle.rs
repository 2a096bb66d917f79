//! The unified inference bundle: fitted transforms plus model, scored as one

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::record::{frame_to_records, records_to_frame, HousingFeatures};
use crate::error::{HousecastError, Result};
use crate::model::GbdtRegressor;
use crate::pipeline::{
    add_engineered_features, apply_imputer_transformation, apply_one_hot_encoder,
    select_feature_columns, MedianImputer, OneHotEncoder, CATEGORICAL_COLUMN, NUMERIC_COLUMNS,
};

/// Serialized layout version understood by this build
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Rows kept as the logged input example
pub const INPUT_EXAMPLE_ROWS: usize = 3;

/// Expected kind of one raw input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureField {
    pub name: String,
    /// "double" or "string"
    pub kind: String,
}

/// Required raw input columns, in canonical order
pub fn input_signature() -> Vec<SignatureField> {
    NUMERIC_COLUMNS
        .iter()
        .map(|name| SignatureField {
            name: name.to_string(),
            kind: "double".to_string(),
        })
        .chain(std::iter::once(SignatureField {
            name: CATEGORICAL_COLUMN.to_string(),
            kind: "string".to_string(),
        }))
        .collect()
}

/// A handful of raw rows with the scores the bundle gave them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputExample {
    pub inputs: Vec<HousingFeatures>,
    pub predictions: Vec<f64>,
}

/// Imputer, encoder and regressor fitted in one training run.
///
/// Immutable once built. Every scoring path (training evaluation, batch and
/// online serving) goes through [`HousingPipeline::predict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousingPipeline {
    format_version: u32,
    created_at: DateTime<Utc>,
    signature: Vec<SignatureField>,
    imputer: MedianImputer,
    encoder: OneHotEncoder,
    model: GbdtRegressor,
}

impl HousingPipeline {
    pub fn new(imputer: MedianImputer, encoder: OneHotEncoder, model: GbdtRegressor) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            created_at: Utc::now(),
            signature: input_signature(),
            imputer,
            encoder,
            model,
        }
    }

    pub fn imputer(&self) -> &MedianImputer {
        &self.imputer
    }

    pub fn encoder(&self) -> &OneHotEncoder {
        &self.encoder
    }

    pub fn model(&self) -> &GbdtRegressor {
        &self.model
    }

    pub fn signature(&self) -> &[SignatureField] {
        &self.signature
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Project to the raw feature columns, then impute, one-hot encode and
    /// engineer ratios, in that order
    pub fn preprocess(&self, raw: &DataFrame) -> Result<DataFrame> {
        let raw = select_feature_columns(raw)?;
        let imputed = apply_imputer_transformation(&raw, &self.imputer.column, &self.imputer)?;
        let encoded = apply_one_hot_encoder(&imputed, &self.encoder.column, &self.encoder)?;
        add_engineered_features(&encoded)
    }

    /// Score raw feature rows, one prediction per row in input order.
    ///
    /// All required raw columns must be present; any other column, the
    /// target included, is ignored.
    pub fn predict(&self, raw: &DataFrame) -> Result<Vec<f64>> {
        let features = self.preprocess(raw)?;
        self.model.predict(&features)
    }

    /// The first few complete rows of `raw` together with their predictions
    pub fn input_example(&self, raw: &DataFrame) -> Result<InputExample> {
        let mut inputs = frame_to_records(raw)?;
        inputs.truncate(INPUT_EXAMPLE_ROWS);
        let predictions = self.predict(&records_to_frame(&inputs)?)?;
        Ok(InputExample {
            inputs,
            predictions,
        })
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a serialized bundle, rejecting layouts this build cannot read
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        #[derive(Deserialize)]
        struct Header {
            format_version: u32,
        }

        let header: Header = serde_json::from_slice(bytes)?;
        if header.format_version != BUNDLE_FORMAT_VERSION {
            return Err(HousecastError::ArtifactIo {
                path: "bundle.json".into(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "unsupported bundle format version {} (expected {})",
                        header.format_version, BUNDLE_FORMAT_VERSION
                    ),
                ),
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| HousecastError::artifact_io(path, e))?;
        Self::from_json_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fit_hgb_model, EarlyStopping, HgbParams};
    use crate::pipeline::{fit_median_imputer, fit_one_hot_encoder, IMPUTED_COLUMN};

    fn raw_frame() -> DataFrame {
        let n = 60;
        let idx: Vec<f64> = (0..n).map(|i| i as f64).collect();
        df! {
            "longitude" => idx.iter().map(|i| -122.0 + i / 100.0).collect::<Vec<f64>>(),
            "latitude" => idx.iter().map(|i| 37.0 + i / 200.0).collect::<Vec<f64>>(),
            "housing_median_age" => idx.iter().map(|i| 10.0 + (i % 30.0)).collect::<Vec<f64>>(),
            "total_rooms" => idx.iter().map(|i| 500.0 + i * 10.0).collect::<Vec<f64>>(),
            "total_bedrooms" => idx.iter().map(|i| if *i as usize % 7 == 0 { None } else { Some(100.0 + i) }).collect::<Vec<Option<f64>>>(),
            "population" => idx.iter().map(|i| 300.0 + i * 4.0).collect::<Vec<f64>>(),
            "households" => idx.iter().map(|i| 100.0 + i).collect::<Vec<f64>>(),
            "median_income" => idx.iter().map(|i| 1.0 + i / 10.0).collect::<Vec<f64>>(),
            "ocean_proximity" => idx.iter().map(|i| if *i as usize % 2 == 0 { "INLAND" } else { "NEAR BAY" }).collect::<Vec<&str>>(),
        }
        .unwrap()
    }

    fn fitted() -> HousingPipeline {
        let raw = raw_frame();
        let y: Vec<f64> = (0..raw.height()).map(|i| 100_000.0 + 1_000.0 * i as f64).collect();
        let imputer = fit_median_imputer(&raw, IMPUTED_COLUMN).unwrap();
        let imputed = apply_imputer_transformation(&raw, IMPUTED_COLUMN, &imputer).unwrap();
        let encoder = fit_one_hot_encoder(&imputed, CATEGORICAL_COLUMN).unwrap();
        let encoded = apply_one_hot_encoder(&imputed, CATEGORICAL_COLUMN, &encoder).unwrap();
        let features = add_engineered_features(&encoded).unwrap();
        let params = HgbParams {
            max_iter: 20,
            min_samples_leaf: 5,
            early_stopping: EarlyStopping::Off,
            ..Default::default()
        };
        let model = fit_hgb_model(&features, &y, &params).unwrap();
        HousingPipeline::new(imputer, encoder, model)
    }

    #[test]
    fn test_predict_matches_manual_transform_chain() {
        let pipeline = fitted();
        let raw = raw_frame();

        let manual = pipeline.model().predict(&pipeline.preprocess(&raw).unwrap()).unwrap();
        assert_eq!(pipeline.predict(&raw).unwrap(), manual);
    }

    #[test]
    fn test_missing_columns_are_all_listed() {
        let pipeline = fitted();
        let raw = raw_frame().drop("households").unwrap().drop("latitude").unwrap();

        match pipeline.predict(&raw) {
            Err(HousecastError::MissingColumns { missing }) => {
                assert!(missing.contains(&"households".to_string()));
                assert!(missing.contains(&"latitude".to_string()));
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_category_still_scores() {
        let pipeline = fitted();
        let mut raw = raw_frame().head(Some(2));
        raw.with_column(Column::new(
            CATEGORICAL_COLUMN.into(),
            vec!["UNKNOWN_CATEGORY", "ISLAND"],
        ))
        .unwrap();

        let preds = pipeline.predict(&raw).unwrap();
        assert_eq!(preds.len(), 2);
        assert!(preds.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_json_reload_scores_identically() {
        let pipeline = fitted();
        let bytes = pipeline.to_json_bytes().unwrap();
        let reloaded = HousingPipeline::from_json_slice(&bytes).unwrap();

        assert_eq!(reloaded, pipeline);
        let raw = raw_frame();
        assert_eq!(reloaded.predict(&raw).unwrap(), pipeline.predict(&raw).unwrap());
    }

    #[test]
    fn test_unknown_format_version_rejected() {
        let pipeline = fitted();
        let mut value: serde_json::Value =
            serde_json::from_slice(&pipeline.to_json_bytes().unwrap()).unwrap();
        value["format_version"] = serde_json::json!(99);
        let bytes = serde_json::to_vec(&value).unwrap();

        assert!(matches!(
            HousingPipeline::from_json_slice(&bytes),
            Err(HousecastError::ArtifactIo { .. })
        ));
    }

    #[test]
    fn test_input_example_has_three_rows() {
        let pipeline = fitted();
        let example = pipeline.input_example(&raw_frame()).unwrap();
        assert_eq!(example.inputs.len(), INPUT_EXAMPLE_ROWS);
        assert_eq!(example.predictions.len(), INPUT_EXAMPLE_ROWS);
        // Row 0 had no bedroom count
        assert_eq!(example.inputs[0].total_bedrooms, None);
        assert_eq!(
            example.predictions,
            pipeline.predict(&raw_frame().head(Some(INPUT_EXAMPLE_ROWS))).unwrap()
        );
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let pipeline = fitted();
        let mut raw = raw_frame();
        let n = raw.height();
        raw.with_column(Column::new("row_id".into(), (0..n as i64).collect::<Vec<i64>>()))
            .unwrap();
        raw.with_column(Column::new("note".into(), vec!["corner lot"; n]))
            .unwrap();

        let features = pipeline.preprocess(&raw).unwrap();
        assert!(features.column("row_id").is_err());
        assert!(features.column("note").is_err());
        assert_eq!(pipeline.predict(&raw).unwrap(), pipeline.predict(&raw_frame()).unwrap());
    }
}
