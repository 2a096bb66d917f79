//! Quantile binning of raw feature values into histogram bins
//!
//! Bin `b` holds values in `(thresholds[b - 1], thresholds[b]]`, so a split
//! "bin <= b" is the same predicate as "value <= thresholds[b]" on raw values.
//! NaN always lands in bin 0 and therefore follows the left branch.

use serde::{Deserialize, Serialize};

use super::matrix::FeatureMatrix;

/// Per-feature upper bin edges learned from training rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinMapper {
    thresholds: Vec<Vec<f64>>,
}

/// Upper edges for one feature.
///
/// Few distinct values get midpoints between neighbours; otherwise edges are
/// taken at evenly spaced ranks of the sorted values.
fn feature_thresholds(mut values: Vec<f64>, max_bins: usize) -> Vec<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return Vec::new();
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let mut distinct = values.clone();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct
            .windows(2)
            .map(|pair| pair[0] + (pair[1] - pair[0]) / 2.0)
            .collect();
    }

    let n = values.len();
    let mut edges: Vec<f64> = (1..max_bins)
        .map(|k| values[k * (n - 1) / max_bins])
        .collect();
    edges.dedup();
    // The largest value must stay in the last bin
    if edges.last().copied() == values.last().copied() {
        edges.pop();
    }
    edges
}

impl BinMapper {
    /// Learn edges for every feature from the given rows only
    pub fn fit(matrix: &FeatureMatrix, rows: &[u32], max_bins: usize) -> Self {
        let thresholds = (0..matrix.n_features())
            .map(|f| {
                let column = matrix.column(f);
                let values: Vec<f64> = rows.iter().map(|&r| column[r as usize]).collect();
                feature_thresholds(values, max_bins)
            })
            .collect();
        Self { thresholds }
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    /// Upper edge of bin `bin` for `feature`
    pub fn threshold(&self, feature: usize, bin: u8) -> f64 {
        self.thresholds[feature][bin as usize]
    }

    #[inline]
    pub fn bin(&self, feature: usize, value: f64) -> u8 {
        if value.is_nan() {
            return 0;
        }
        self.thresholds[feature].partition_point(|t| *t < value) as u8
    }

    /// Bin every value of the matrix, column-major
    pub fn transform(&self, matrix: &FeatureMatrix) -> Vec<Vec<u8>> {
        (0..matrix.n_features())
            .map(|f| matrix.column(f).iter().map(|&v| self.bin(f, v)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(values: Vec<f64>) -> FeatureMatrix {
        FeatureMatrix::from_columns(vec!["x".to_string()], vec![values]).unwrap()
    }

    #[test]
    fn test_few_distinct_values_use_midpoints() {
        let m = matrix(vec![1.0, 2.0, 2.0, 4.0]);
        let rows: Vec<u32> = (0..4).collect();
        let mapper = BinMapper::fit(&m, &rows, 255);

        assert_eq!(mapper.n_bins(0), 3);
        assert_eq!(mapper.threshold(0, 0), 1.5);
        assert_eq!(mapper.threshold(0, 1), 3.0);
        assert_eq!(mapper.bin(0, 1.0), 0);
        assert_eq!(mapper.bin(0, 1.5), 0);
        assert_eq!(mapper.bin(0, 2.0), 1);
        assert_eq!(mapper.bin(0, 100.0), 2);
    }

    #[test]
    fn test_nan_goes_to_first_bin() {
        let m = matrix(vec![1.0, 2.0, 3.0]);
        let mapper = BinMapper::fit(&m, &[0, 1, 2], 255);
        assert_eq!(mapper.bin(0, f64::NAN), 0);
    }

    #[test]
    fn test_many_values_respect_max_bins() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let m = matrix(values);
        let rows: Vec<u32> = (0..1000).collect();
        let mapper = BinMapper::fit(&m, &rows, 16);

        assert!(mapper.n_bins(0) <= 16);
        assert!(mapper.n_bins(0) > 1);
        assert_eq!(mapper.bin(0, 999.0) as usize, mapper.n_bins(0) - 1);
    }

    #[test]
    fn test_constant_feature_has_single_bin() {
        let m = matrix(vec![5.0; 10]);
        let rows: Vec<u32> = (0..10).collect();
        let mapper = BinMapper::fit(&m, &rows, 255);
        assert_eq!(mapper.n_bins(0), 1);
    }

    #[test]
    fn test_bin_matches_threshold_predicate() {
        let values: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64 * 0.5).collect();
        let m = matrix(values.clone());
        let rows: Vec<u32> = (0..500).collect();
        let mapper = BinMapper::fit(&m, &rows, 32);

        for b in 0..(mapper.n_bins(0) - 1) as u8 {
            let t = mapper.threshold(0, b);
            for &v in &values {
                assert_eq!(mapper.bin(0, v) <= b, v <= t);
            }
        }
    }
}
