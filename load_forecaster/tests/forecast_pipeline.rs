//! End-to-end training run over a synthetic tidy parquet file.

use load_forecaster::{train_all, ForecastConfig};
use polars::prelude::*;
use std::fs::File;

const MS_PER_HOUR: i64 = 3_600_000;
const START_MS: i64 = 1_672_531_200_000; // 2023-01-01T00:00Z

fn load_at(i: usize) -> f64 {
    let daily = ((i % 24) as f64 / 24.0 * std::f64::consts::TAU).sin() * 150.0;
    let weekly = ((i % 168) as f64 / 168.0 * std::f64::consts::TAU).cos() * 40.0;
    1000.0 + daily + weekly + (i as f64 * 0.41).sin() * 12.0
}

/// Tidy frame with one healthy region, one undersized region, and one
/// non-alphabetic artifact label that must never be modeled.
fn synthetic_long() -> DataFrame {
    let mut timestamps = Vec::new();
    let mut regions = Vec::new();
    let mut loads = Vec::new();

    for (region, hours) in [("North", 1500usize), ("Tiny", 300), ("DT_MST", 1500)] {
        for i in 0..hours {
            timestamps.push(START_MS + i as i64 * MS_PER_HOUR);
            regions.push(region);
            loads.push(load_at(i));
        }
    }

    let ts = Series::new("timestamp", timestamps)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .unwrap();
    DataFrame::new(vec![
        ts,
        Series::new("region", regions),
        Series::new("load_MW", loads),
    ])
    .unwrap()
}

fn quick_config() -> ForecastConfig {
    ForecastConfig {
        num_rounds: 40,
        num_leaves: 16,
        ..ForecastConfig::default()
    }
}

#[test]
fn train_all_writes_predictions_for_valid_regions_only() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("load_long.parquet");
    let output = dir.path().join("preds.parquet");

    let mut long = synthetic_long();
    ParquetWriter::new(File::create(&input).unwrap())
        .finish(&mut long)
        .unwrap();

    let summary = train_all(&input, &output, &quick_config(), false).unwrap();
    assert_eq!(summary.regions_modeled, 1);
    assert_eq!(summary.regions_skipped, 1);

    let preds = ParquetReader::new(File::open(&output).unwrap())
        .finish()
        .unwrap();

    // 1500 observations -> 1332 feature rows -> 30% test window.
    let feature_rows = 1500 - 168;
    let test_rows = feature_rows - (feature_rows as f64 * 0.7) as usize;
    assert_eq!(preds.height(), test_rows);
    assert_eq!(summary.prediction_rows, test_rows);

    let pred_regions: Vec<String> = preds
        .column("region")
        .unwrap()
        .utf8()
        .unwrap()
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect();
    assert!(pred_regions.iter().all(|r| r == "North"));

    // Predicted regions are a subset of the regions in the input series,
    // and the undersized/artifact labels never appear.
    let long_regions: Vec<String> = long
        .column("region")
        .unwrap()
        .utf8()
        .unwrap()
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect();
    assert!(pred_regions.iter().all(|r| long_regions.contains(r)));
    assert!(!pred_regions.iter().any(|r| r == "Tiny" || r == "DT_MST"));

    for col in ["actual", "p10", "p50", "p90"] {
        let vals = preds.column(col).unwrap().f64().unwrap();
        assert_eq!(vals.null_count(), 0);
        assert!(vals.into_no_null_iter().all(|v| v.is_finite()));
    }

    let anomalies = preds.column("anomaly").unwrap().bool().unwrap();
    let flagged = anomalies.into_no_null_iter().filter(|&b| b).count();
    assert!(flagged <= test_rows / 20, "flagged {flagged} of {test_rows}");
}

#[test]
fn rerunning_training_replaces_the_artifact_identically() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("load_long.parquet");
    let output = dir.path().join("preds.parquet");

    let mut long = synthetic_long();
    ParquetWriter::new(File::create(&input).unwrap())
        .finish(&mut long)
        .unwrap();

    train_all(&input, &output, &quick_config(), false).unwrap();
    let first = std::fs::read(&output).unwrap();

    train_all(&input, &output, &quick_config(), true).unwrap();
    let second = std::fs::read(&output).unwrap();

    // Deterministic models + seeded detector + canonical sort: parallel or
    // not, the artifact is byte-identical.
    assert_eq!(first, second);
}
