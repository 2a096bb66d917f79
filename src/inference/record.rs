//! Typed raw housing records and their conversion to and from frames

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::schema::{numeric_values, string_values, CATEGORICAL_COLUMN};

/// One raw feature record as submitted for scoring.
///
/// `total_bedrooms` may be null or omitted; it is imputed by the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HousingFeatures {
    pub longitude: f64,
    pub latitude: f64,
    pub housing_median_age: f64,
    pub total_rooms: f64,
    pub total_bedrooms: Option<f64>,
    pub population: f64,
    pub households: f64,
    pub median_income: f64,
    pub ocean_proximity: String,
}

/// Build a frame with one row per record, in submission order
pub fn records_to_frame(records: &[HousingFeatures]) -> Result<DataFrame> {
    let numeric = |f: fn(&HousingFeatures) -> f64| -> Vec<f64> { records.iter().map(f).collect() };

    let df = df! {
        "longitude" => numeric(|r| r.longitude),
        "latitude" => numeric(|r| r.latitude),
        "housing_median_age" => numeric(|r| r.housing_median_age),
        "total_rooms" => numeric(|r| r.total_rooms),
        "total_bedrooms" => records.iter().map(|r| r.total_bedrooms).collect::<Vec<Option<f64>>>(),
        "population" => numeric(|r| r.population),
        "households" => numeric(|r| r.households),
        "median_income" => numeric(|r| r.median_income),
        CATEGORICAL_COLUMN => records.iter().map(|r| r.ocean_proximity.clone()).collect::<Vec<String>>(),
    }?;
    Ok(df)
}

/// Read raw records back out of a frame (used for logged input examples).
///
/// Rows missing a required value have no record form and are skipped; only
/// `total_bedrooms` may be null.
pub fn frame_to_records(df: &DataFrame) -> Result<Vec<HousingFeatures>> {
    let column = |name: &str| numeric_values(df, name);
    let longitude = column("longitude")?;
    let latitude = column("latitude")?;
    let age = column("housing_median_age")?;
    let rooms = column("total_rooms")?;
    let bedrooms = column("total_bedrooms")?;
    let population = column("population")?;
    let households = column("households")?;
    let income = column("median_income")?;
    let proximity = string_values(df, CATEGORICAL_COLUMN)?;

    Ok((0..df.height())
        .filter_map(|i| {
            Some(HousingFeatures {
                longitude: longitude[i]?,
                latitude: latitude[i]?,
                housing_median_age: age[i]?,
                total_rooms: rooms[i]?,
                total_bedrooms: bedrooms[i],
                population: population[i]?,
                households: households[i]?,
                median_income: income[i]?,
                ocean_proximity: proximity[i].clone()?,
            })
        })
        .collect())
}
