//! Data-quality verification of the pipeline artifacts.
//!
//! Hard violations (duplicates, out-of-order rows, prediction regions with
//! no source series) fail the run; soft findings (hourly gaps, quantile
//! crossings) are reported and tolerated.

use anyhow::{bail, Result};
use glob::glob;
use load_forecaster::features::MS_PER_HOUR;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::dataset_builder::DataPaths;

pub fn verify_artifacts() -> Result<()> {
    let paths = DataPaths::from_env();

    println!("\n🔍 Data Quality Verification");
    println!("{}", "=".repeat(60));

    list_artifacts(&paths)?;

    let mut hard_issues = 0;

    let long = read_parquet(&paths.load_long())?;
    println!("\n📁 Checking {}", paths.load_long().display());
    println!("    📊 Total records: {}", long.height());
    println!("    📊 Unique regions: {}", long.column("region")?.n_unique()?);
    hard_issues += check_duplicates(&long)?;
    hard_issues += check_sorted(&long)?;
    check_hourly_gaps(&long)?;

    let preds_path = paths.preds();
    if preds_path.exists() {
        let preds = read_parquet(&preds_path)?;
        println!("\n📁 Checking {}", preds_path.display());
        println!("    📊 Total records: {}", preds.height());
        hard_issues += check_regions_subset(&long, &preds)?;
        check_quantile_crossing(&preds)?;
        check_anomaly_rate(&preds)?;
    } else {
        println!("\n⚠️  {} not found - run --train first", preds_path.display());
    }

    println!("\n{}", "=".repeat(60));
    if hard_issues == 0 {
        println!("✅ Data quality verification passed!");
        Ok(())
    } else {
        bail!("data quality verification found {} hard issue(s)", hard_issues);
    }
}

fn list_artifacts(paths: &DataPaths) -> Result<()> {
    for dir in [&paths.raw_dir, &paths.clean_dir] {
        let pattern = dir.join("*.parquet");
        let files: Vec<_> = glob(&pattern.to_string_lossy())?
            .filter_map(std::result::Result::ok)
            .collect();
        println!(
            "📁 {} parquet artifact(s) under {}",
            files.len(),
            dir.display()
        );
        for file in files {
            let size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            println!("    {} ({} bytes)", file.display(), size);
        }
    }
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    Ok(ParquetReader::new(std::fs::File::open(path)?).finish()?)
}

fn check_duplicates(long: &DataFrame) -> Result<usize> {
    let duplicate_check = long
        .clone()
        .lazy()
        .group_by([col("timestamp"), col("region")])
        .agg([col("timestamp").count().alias("count")])
        .filter(col("count").gt(1))
        .collect()?;

    if duplicate_check.height() > 0 {
        println!(
            "    ❌ Found {} duplicate (timestamp, region) pairs",
            duplicate_check.height()
        );
        Ok(duplicate_check.height())
    } else {
        println!("    ✅ No duplicate (timestamp, region) pairs");
        Ok(0)
    }
}

fn check_sorted(long: &DataFrame) -> Result<usize> {
    let sorted = long
        .clone()
        .lazy()
        .sort_by_exprs([col("timestamp"), col("region")], [false, false], false, false)
        .collect()?;

    if long.frame_equal(&sorted) {
        println!("    ✅ Canonically sorted by (timestamp, region)");
        Ok(0)
    } else {
        println!("    ❌ Not sorted by (timestamp, region)");
        Ok(1)
    }
}

fn per_region_timestamps(df: &DataFrame) -> Result<HashMap<String, Vec<i64>>> {
    let regions = df.column("region")?.utf8()?;
    let timestamps = df.column("timestamp")?.datetime()?;

    let mut map: HashMap<String, Vec<i64>> = HashMap::new();
    for (region, ts) in regions.into_iter().zip(timestamps.into_iter()) {
        if let (Some(region), Some(ts)) = (region, ts) {
            map.entry(region.to_string()).or_default().push(ts);
        }
    }
    for series in map.values_mut() {
        series.sort_unstable();
    }
    Ok(map)
}

fn check_hourly_gaps(long: &DataFrame) -> Result<()> {
    let mut gaps = 0usize;
    for (_, series) in per_region_timestamps(long)? {
        for pair in series.windows(2) {
            if pair[1] - pair[0] > MS_PER_HOUR {
                gaps += 1;
            }
        }
    }
    if gaps > 0 {
        println!("    ⚠️  Found {} gaps in hourly series", gaps);
    } else {
        println!("    ✅ No gaps in hourly series");
    }
    Ok(())
}

fn check_regions_subset(long: &DataFrame, preds: &DataFrame) -> Result<usize> {
    let long_regions: HashSet<String> = long
        .column("region")?
        .unique()?
        .utf8()?
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect();

    let orphaned: Vec<String> = preds
        .column("region")?
        .unique()?
        .utf8()?
        .into_iter()
        .flatten()
        .filter(|r| !long_regions.contains(*r))
        .map(|s| s.to_string())
        .collect();

    if orphaned.is_empty() {
        println!("    ✅ Prediction regions are a subset of the load series");
        Ok(0)
    } else {
        println!("    ❌ Regions with predictions but no source data: {:?}", orphaned);
        Ok(orphaned.len())
    }
}

/// Quantile crossing is possible (the three models are independent) and is
/// only surfaced, never repaired.
fn check_quantile_crossing(preds: &DataFrame) -> Result<()> {
    let crossed = preds
        .clone()
        .lazy()
        .filter(
            col("p10")
                .gt(col("p50"))
                .or(col("p50").gt(col("p90"))),
        )
        .collect()?;

    if crossed.height() > 0 {
        println!(
            "    ⚠️  {} rows with quantile crossing (p10 > p50 or p50 > p90)",
            crossed.height()
        );
    } else {
        println!("    ✅ No quantile crossing");
    }
    Ok(())
}

fn check_anomaly_rate(preds: &DataFrame) -> Result<()> {
    let anomalies = preds.column("anomaly")?.bool()?;
    let flagged = anomalies.into_iter().flatten().filter(|&b| b).count();
    let rate = 100.0 * flagged as f64 / preds.height().max(1) as f64;
    println!("    📊 Anomalies flagged: {} ({:.2}%)", flagged, rate);
    Ok(())
}
