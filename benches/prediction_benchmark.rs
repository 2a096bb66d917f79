//! Benchmark for model fitting and unified-bundle prediction throughput
//!
//! Run with: cargo bench --bench prediction_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polars::prelude::*;
use rand::prelude::*;
use rand::SeedableRng;

use housecast::inference::HousingPipeline;
use housecast::model::{fit_hgb_model, EarlyStopping, HgbParams};
use housecast::pipeline::{
    add_engineered_features, apply_imputer_transformation, apply_one_hot_encoder,
    fit_median_imputer, fit_one_hot_encoder, CATEGORICAL_COLUMN, IMPUTED_COLUMN,
};

const PROXIMITY: [&str; 5] = ["<1H OCEAN", "INLAND", "ISLAND", "NEAR BAY", "NEAR OCEAN"];

/// Random raw housing rows plus a target correlated with income
fn generate_housing(n_rows: usize, seed: u64) -> (DataFrame, Vec<f64>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut uniform = |lo: f64, hi: f64, n: usize| -> Vec<f64> {
        (0..n).map(|_| rng.gen_range(lo..hi)).collect()
    };

    let income = uniform(0.5, 15.0, n_rows);
    let rooms = uniform(100.0, 6000.0, n_rows);
    let households = uniform(50.0, 1500.0, n_rows);
    let longitude = uniform(-124.3, -114.3, n_rows);
    let latitude = uniform(32.5, 42.0, n_rows);
    let age = uniform(1.0, 52.0, n_rows);
    let population = uniform(100.0, 5000.0, n_rows);
    let bedroom_draw = uniform(0.0, 1.0, n_rows);

    let bedrooms: Vec<Option<f64>> = rooms
        .iter()
        .zip(&bedroom_draw)
        .map(|(r, d)| if *d < 0.01 { None } else { Some(r * 0.2) })
        .collect();
    let proximity: Vec<&str> = (0..n_rows).map(|i| PROXIMITY[i % 5]).collect();
    let target: Vec<f64> = income.iter().map(|i| 50_000.0 + 40_000.0 * i).collect();

    let df = df! {
        "longitude" => longitude,
        "latitude" => latitude,
        "housing_median_age" => age,
        "total_rooms" => rooms,
        "total_bedrooms" => bedrooms,
        "population" => population,
        "households" => households,
        "median_income" => income,
        "ocean_proximity" => proximity,
    }
    .expect("Failed to create DataFrame");
    (df, target)
}

fn fit_bundle(raw: &DataFrame, y: &[f64], params: &HgbParams) -> HousingPipeline {
    let imputer = fit_median_imputer(raw, IMPUTED_COLUMN).expect("imputer");
    let imputed = apply_imputer_transformation(raw, IMPUTED_COLUMN, &imputer).expect("impute");
    let encoder = fit_one_hot_encoder(&imputed, CATEGORICAL_COLUMN).expect("encoder");
    let encoded = apply_one_hot_encoder(&imputed, CATEGORICAL_COLUMN, &encoder).expect("encode");
    let features = add_engineered_features(&encoded).expect("engineer");
    let model = fit_hgb_model(&features, y, params).expect("fit");
    HousingPipeline::new(imputer, encoder, model)
}

fn bench_params() -> HgbParams {
    HgbParams {
        max_iter: 100,
        early_stopping: EarlyStopping::Off,
        ..Default::default()
    }
}

fn benchmark_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_bundle");
    group.sample_size(10);

    for n_rows in [2_000usize, 20_000] {
        let (raw, y) = generate_housing(n_rows, 42);
        group.throughput(Throughput::Elements(n_rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_rows), &n_rows, |b, _| {
            b.iter(|| fit_bundle(black_box(&raw), black_box(&y), &bench_params()))
        });
    }
    group.finish();
}

fn benchmark_predict(c: &mut Criterion) {
    let (train, y) = generate_housing(20_000, 7);
    let bundle = fit_bundle(&train, &y, &bench_params());

    let mut group = c.benchmark_group("bundle_predict");
    for n_rows in [1usize, 100, 10_000] {
        let (raw, _) = generate_housing(n_rows, 99);
        group.throughput(Throughput::Elements(n_rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_rows), &n_rows, |b, _| {
            b.iter(|| bundle.predict(black_box(&raw)).expect("predict"))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_fit, benchmark_predict);
criterion_main!(benches);
