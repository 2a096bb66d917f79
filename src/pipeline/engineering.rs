//! Derived ratio features computed from the raw numeric columns

use polars::prelude::*;

use super::schema::numeric_values;
use crate::error::Result;

/// Derived column name, numerator, denominator
pub const ENGINEERED_FEATURES: [(&str, &str, &str); 3] = [
    ("rooms_per_household", "total_rooms", "households"),
    ("bedrooms_per_room", "total_bedrooms", "total_rooms"),
    ("population_per_household", "population", "households"),
];

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Add the ratio features, replacing any previous derived columns.
///
/// Only the raw columns are read, so reapplying to the output gives the same
/// frame. A zero or missing denominator yields a null.
pub fn add_engineered_features(df: &DataFrame) -> Result<DataFrame> {
    let mut out = df.clone();

    for (name, numerator, denominator) in ENGINEERED_FEATURES {
        let num = numeric_values(df, numerator)?;
        let den = numeric_values(df, denominator)?;
        let values: Vec<Option<f64>> = num
            .into_iter()
            .zip(den)
            .map(|(n, d)| ratio(n, d))
            .collect();
        out.with_column(Column::new(name.into(), values))?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> DataFrame {
        df! {
            "total_rooms" => [880.0f64, 100.0],
            "total_bedrooms" => [129.0f64, 20.0],
            "population" => [322.0f64, 50.0],
            "households" => [126.0f64, 0.0],
        }
        .unwrap()
    }

    #[test]
    fn test_ratios() {
        let out = add_engineered_features(&raw()).unwrap();

        let rooms = numeric_values(&out, "rooms_per_household").unwrap();
        let bedrooms = numeric_values(&out, "bedrooms_per_room").unwrap();
        let population = numeric_values(&out, "population_per_household").unwrap();

        assert!((rooms[0].unwrap() - 880.0 / 126.0).abs() < 1e-12);
        assert!((bedrooms[0].unwrap() - 129.0 / 880.0).abs() < 1e-12);
        assert!((population[0].unwrap() - 322.0 / 126.0).abs() < 1e-12);
        assert_eq!(bedrooms[1], Some(0.2));
    }

    #[test]
    fn test_zero_denominator_is_null() {
        let out = add_engineered_features(&raw()).unwrap();
        let rooms = numeric_values(&out, "rooms_per_household").unwrap();
        assert_eq!(rooms[1], None);
    }

    #[test]
    fn test_reapplying_does_not_double_derive() {
        let once = add_engineered_features(&raw()).unwrap();
        let twice = add_engineered_features(&once).unwrap();

        assert_eq!(once.width(), 7);
        assert_eq!(twice.width(), 7);
        assert!(once.equals_missing(&twice));
    }
}
