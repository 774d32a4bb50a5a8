//! Per-region training pipeline and the multi-region driver.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::Path;

use crate::anomaly::{self, IsolationForestParams};
use crate::data_loader::{self, DataLoader};
use crate::error::{ForecastError, Result};
use crate::features::{build_features, LoadSeries};
use crate::gbdt::{GbdtParams, Matrix, QuantileGbdt};
use crate::models::{ForecastConfig, RegionForecast, RegionOutcome, TrainSummary};

/// Run the full pipeline for one region: features, chronological split,
/// one quantile model per level, residual anomaly flags.
pub fn forecast_region(
    region: &str,
    series: &LoadSeries,
    cfg: &ForecastConfig,
) -> Result<RegionOutcome> {
    if cfg.quantiles.len() != 3 {
        return Err(ForecastError::InvalidParameter(format!(
            "expected exactly three quantile levels, got {}",
            cfg.quantiles.len()
        )));
    }

    if series.is_empty() {
        return Ok(RegionOutcome::Skipped {
            region: region.to_string(),
            feature_rows: 0,
        });
    }

    let table = build_features(series)?;
    if table.len() < cfg.min_feature_rows {
        return Ok(RegionOutcome::Skipped {
            region: region.to_string(),
            feature_rows: table.len(),
        });
    }

    // Chronological split; shuffling would leak future hours into training.
    let split = cfg.train_rows(table.len());
    let x_train = Matrix::from_rows(&table.rows[..split])?;
    let x_test = Matrix::from_rows(&table.rows[split..])?;
    let y_train = &table.targets[..split];
    let y_test = &table.targets[split..];

    let mut level_preds = Vec::with_capacity(cfg.quantiles.len());
    for &alpha in &cfg.quantiles {
        let params = GbdtParams {
            quantile: alpha,
            learning_rate: cfg.learning_rate,
            num_leaves: cfg.num_leaves,
            num_rounds: cfg.num_rounds,
            ..GbdtParams::for_quantile(alpha)
        };
        let model = QuantileGbdt::fit(params, &x_train, y_train)?;
        level_preds.push(model.predict(&x_test)?);
    }
    let p10 = level_preds.remove(0);
    let p50 = level_preds.remove(0);
    let p90 = level_preds.remove(0);

    let residuals: Vec<f64> = y_test.iter().zip(&p50).map(|(a, p)| a - p).collect();
    let flags = anomaly::detect(
        &residuals,
        &IsolationForestParams::with_contamination(cfg.contamination, cfg.seed),
    )?
    .flags;

    Ok(RegionOutcome::Modeled(RegionForecast {
        region: region.to_string(),
        timestamps_ms: table.timestamps_ms[split..].to_vec(),
        actual: y_test.to_vec(),
        p10,
        p50,
        p90,
        anomaly: flags,
    }))
}

/// Train every modelable region in the tidy parquet at `input` and write
/// the merged predictions artifact to `output`.
pub fn train_all(
    input: &Path,
    output: &Path,
    cfg: &ForecastConfig,
    parallel: bool,
) -> Result<TrainSummary> {
    println!("🔄 loading long parquet …");
    let df = DataLoader::new(input).load_long()?;

    let regions = DataLoader::modelable_regions(&df)?;
    println!("✅ Regions to model: {}", regions.join(", "));

    let mut jobs = Vec::with_capacity(regions.len());
    for region in &regions {
        jobs.push((region.clone(), DataLoader::region_series(&df, region)?));
    }

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap(),
    );

    let run = |(region, series): &(String, LoadSeries)| -> Result<RegionOutcome> {
        pb.println(format!("🛠  training {:15} …", region));
        let outcome = forecast_region(region, series, cfg);
        pb.inc(1);
        outcome
    };

    let outcomes: Result<Vec<RegionOutcome>> = if parallel {
        jobs.par_iter().map(run).collect()
    } else {
        jobs.iter().map(run).collect()
    };
    let outcomes = outcomes?;
    pb.finish_with_message("training complete");

    let mut modeled = Vec::new();
    let mut skipped = 0usize;
    for outcome in outcomes {
        match outcome {
            RegionOutcome::Modeled(fc) => modeled.push(fc),
            RegionOutcome::Skipped {
                region,
                feature_rows,
            } => {
                skipped += 1;
                println!("⚠️ skipping {} (only {} rows)", region, feature_rows);
                log::warn!(
                    "region {} skipped: {} feature rows below minimum {}",
                    region,
                    feature_rows,
                    cfg.min_feature_rows
                );
            }
        }
    }

    let preds = data_loader::write_predictions(output, &modeled)?;
    let summary = TrainSummary {
        regions_modeled: modeled.len(),
        regions_skipped: skipped,
        prediction_rows: preds.height(),
    };
    println!(
        "🎉 wrote {}   ({} rows  ·  {} regions)",
        output.display(),
        summary.prediction_rows,
        summary.regions_modeled
    );
    Ok(summary)
}
