//! Driver for the `--train` step: quantile models + anomaly flags per region.

use anyhow::Result;
use load_forecaster::{train_all, ForecastConfig};

use crate::dataset_builder::DataPaths;

pub fn train_models(sequential: bool) -> Result<()> {
    let paths = DataPaths::from_env();

    println!("🚀 AESO Hourly Load - Quantile Forecast Training");
    println!("Using {} CPU cores", rayon::current_num_threads());
    println!("{}", "=".repeat(60));

    let summary = train_all(
        &paths.load_long(),
        &paths.preds(),
        &ForecastConfig::default(),
        !sequential,
    )?;

    if summary.regions_skipped > 0 {
        println!(
            "⚠️  {} region(s) skipped for insufficient history",
            summary.regions_skipped
        );
    }
    Ok(())
}
