//! Merge the per-era tables into the canonical wide and tidy artifacts.
//!
//! Pipeline: align columns across eras → concat → drop empty columns →
//! numeric coercion → `load_raw` checkpoint → timestamp derivation →
//! `load_wide_clean` → melt → `load_long`.

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use load_forecaster::features::MS_PER_HOUR;
use polars::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::workbook_reader::{read_era, SourceOutcome, ERA_SCHEMAS};

/// Columns consumed by timestamp derivation; they never survive into the
/// wide table, so they can never melt into fake regions.
pub const TIME_SOURCE_COLUMNS: [&str; 3] = ["DT_MST", "DATE", "HOUR ENDING"];

/// Source and artifact directories, overridable via environment.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub raw_dir: PathBuf,
    pub clean_dir: PathBuf,
}

impl DataPaths {
    pub fn from_env() -> Self {
        let raw_dir = std::env::var("AESO_DATA_DIR").unwrap_or_else(|_| "data/raw".to_string());
        let clean_dir =
            std::env::var("AESO_CLEAN_DIR").unwrap_or_else(|_| "data/clean".to_string());
        Self {
            raw_dir: raw_dir.into(),
            clean_dir: clean_dir.into(),
        }
    }

    pub fn load_raw(&self) -> PathBuf {
        self.raw_dir.join("load_raw.parquet")
    }

    pub fn load_wide_clean(&self) -> PathBuf {
        self.clean_dir.join("load_wide_clean.parquet")
    }

    pub fn load_long(&self) -> PathBuf {
        self.clean_dir.join("load_long.parquet")
    }

    pub fn preds(&self) -> PathBuf {
        self.clean_dir.join("preds.parquet")
    }
}

#[derive(Debug, Clone)]
pub struct EtlReport {
    pub sources_loaded: usize,
    pub sources_skipped: usize,
    pub raw_rows: usize,
    pub long_rows: usize,
    pub regions: usize,
}

pub fn build_dataset() -> Result<EtlReport> {
    run_etl(&DataPaths::from_env())
}

pub fn run_etl(paths: &DataPaths) -> Result<EtlReport> {
    println!("🚀 AESO Hourly Load - ETL");
    println!("{}", "=".repeat(60));
    std::fs::create_dir_all(&paths.raw_dir)?;
    std::fs::create_dir_all(&paths.clean_dir)?;

    let pb = ProgressBar::new(ERA_SCHEMAS.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap(),
    );

    let mut frames = Vec::new();
    let mut skipped = 0;
    for era in &ERA_SCHEMAS {
        pb.set_message(era.file_name);
        match read_era(&paths.raw_dir, era) {
            SourceOutcome::Loaded { era, frame } => {
                pb.println(format!(
                    "✅ {} → {} rows x {} columns",
                    era,
                    frame.height(),
                    frame.width()
                ));
                frames.push(frame);
            }
            SourceOutcome::Skipped { era, reason } => {
                pb.println(format!("⚠️ {} skipped → {}", era, reason));
                log::warn!("source {} skipped: {}", era, reason);
                skipped += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("workbooks read");

    if frames.is_empty() {
        bail!("nothing could be read – check file names & location");
    }

    let merged = merge_frames(&frames)?;
    write_parquet(&paths.load_raw(), &merged)?;
    println!("✅ wrote {}", paths.load_raw().display());

    let wide = derive_wide(&merged)?;
    write_parquet(&paths.load_wide_clean(), &wide)?;

    let long = to_long(&wide)?;
    write_parquet(&paths.load_long(), &long)?;

    let regions = long.column("region")?.n_unique()?;
    println!(
        "✅ wrote {} — ETL complete! ({} rows · {} regions)",
        paths.load_long().display(),
        long.height(),
        regions
    );

    Ok(EtlReport {
        sources_loaded: frames.len(),
        sources_skipped: skipped,
        raw_rows: merged.height(),
        long_rows: long.height(),
        regions,
    })
}

/// Concatenate the era tables over the union of their columns, drop columns
/// with no data at all, and coerce everything that is not a time source to
/// numeric (unparseable cells become null).
pub fn merge_frames(frames: &[DataFrame]) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for frame in frames {
        for name in frame.get_column_names() {
            if seen.insert(name.to_string()) {
                order.push(name.to_string());
            }
        }
    }

    let aligned: Vec<LazyFrame> = frames
        .iter()
        .map(|frame| {
            let have: HashSet<String> = frame
                .get_column_names()
                .iter()
                .map(|s| s.to_string())
                .collect();
            let mut lf = frame.clone().lazy();
            for name in &order {
                if !have.contains(name) {
                    lf = lf.with_column(lit(NULL).alias(name));
                }
            }
            lf.select(order.iter().map(|c| col(c)).collect::<Vec<_>>())
        })
        .collect();

    let combined = concat(
        aligned,
        UnionArgs {
            parallel: true,
            rechunk: true,
            to_supertypes: true,
            ..Default::default()
        },
    )?
    .collect()?;

    let keep: Vec<String> = combined
        .get_column_names()
        .iter()
        .filter(|name| {
            combined
                .column(name)
                .map(|c| c.null_count() < combined.height())
                .unwrap_or(false)
        })
        .map(|s| s.to_string())
        .collect();
    let trimmed = combined.select(keep)?;

    let mut lf = trimmed.clone().lazy();
    for name in trimmed.get_column_names() {
        let dtype = trimmed.column(name)?.dtype().clone();
        let is_date_source = name == "DT_MST" || name == "DATE";
        if !is_date_source && !dtype.is_temporal() {
            lf = lf.with_column(col(name).cast(DataType::Float64));
        }
    }
    Ok(lf.collect()?)
}

/// Accept both full datetimes and bare dates, in the formats the source
/// workbooks have used over the years.
fn parse_any_timestamp(s: &str) -> Option<i64> {
    const DATETIME_FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

    let s = s.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
        }
    }
    None
}

fn column_as_ms(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df.column(name)?;
    match column.dtype() {
        DataType::Utf8 => Ok(column
            .utf8()?
            .into_iter()
            .map(|v| v.and_then(parse_any_timestamp))
            .collect()),
        _ => {
            let cast = column.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            Ok(cast.datetime()?.into_iter().collect())
        }
    }
}

/// Derive the `timestamp` column and reduce to `timestamp` + one column per
/// region: time-source columns and purely numeric header artifacts go.
pub fn derive_wide(df: &DataFrame) -> Result<DataFrame> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let has_direct = names.iter().any(|n| n == "DT_MST");
    let has_derived =
        names.iter().any(|n| n == "DATE") && names.iter().any(|n| n == "HOUR ENDING");
    if !has_direct && !has_derived {
        bail!("no timestamp source column (DT_MST, or DATE + HOUR ENDING)");
    }

    let direct: Vec<Option<i64>> = if has_direct {
        column_as_ms(df, "DT_MST")?
    } else {
        vec![None; df.height()]
    };
    let derived: Vec<Option<i64>> = if has_derived {
        let dates = column_as_ms(df, "DATE")?;
        let hours = df.column("HOUR ENDING")?.cast(&DataType::Float64)?;
        let hours = hours.f64()?;
        dates
            .iter()
            .zip(hours.into_iter())
            .map(|(date, hour)| match (date, hour) {
                // Hour-ending convention: hour value 1 is the 00:00-01:00 hour.
                (Some(d), Some(h)) => Some(d + (h as i64 - 1) * MS_PER_HOUR),
                _ => None,
            })
            .collect()
    } else {
        vec![None; df.height()]
    };

    // The direct datetime wins for the rows that carry it; rows from the
    // date + hour-ending eras fall back to the derived value.
    let timestamps: Vec<Option<i64>> = direct
        .into_iter()
        .zip(derived)
        .map(|(d, f)| d.or(f))
        .collect();

    let ts_series = Series::new("timestamp", timestamps)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

    let numeric_name = Regex::new(r"^\d+(\.\d+)?$").expect("static regex");
    let mut columns = vec![ts_series];
    for name in &names {
        if TIME_SOURCE_COLUMNS.contains(&name.as_str()) || numeric_name.is_match(name) {
            continue;
        }
        columns.push(df.column(name)?.clone());
    }
    Ok(DataFrame::new(columns)?)
}

/// Un-pivot the wide table into tidy `(timestamp, region, load_MW)` rows:
/// observed pairs only, deduplicated, canonically sorted.
pub fn to_long(wide: &DataFrame) -> Result<DataFrame> {
    let args = MeltArgs {
        id_vars: vec!["timestamp".into()],
        variable_name: Some("region".into()),
        value_name: Some("load_MW".into()),
        ..Default::default()
    };

    let long = wide
        .clone()
        .lazy()
        .melt(args)
        .drop_nulls(Some(vec![col("timestamp"), col("load_MW")]))
        .unique_stable(
            Some(vec!["timestamp".to_string(), "region".to_string()]),
            UniqueKeepStrategy::First,
        )
        .sort_by_exprs([col("timestamp"), col("region")], [false, false], false, false)
        .collect()?;
    Ok(long)
}

fn write_parquet(path: &Path, df: &DataFrame) -> Result<()> {
    ParquetWriter::new(File::create(path)?).finish(&mut df.clone())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn era_2011() -> DataFrame {
        DataFrame::new(vec![
            Series::new("DATE", vec!["2011-01-01", "2011-01-01", "2011-01-01"]),
            Series::new("HOUR ENDING", vec![1.0, 2.0, 24.0]),
            Series::new("Calgary", vec![Some(1000.0), Some(1010.0), Some(1020.0)]),
            Series::new("Notes", vec![None::<&str>, None, None]),
        ])
        .unwrap()
    }

    fn era_2020() -> DataFrame {
        let dt = Series::new(
            "DT_MST",
            vec![1_588_291_200_000i64, 1_588_294_800_000],
        )
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .unwrap();
        DataFrame::new(vec![
            dt,
            Series::new("Calgary", vec![Some(1200.0), None]),
            Series::new("Edmonton", vec![Some(900.0), Some(905.0)]),
            Series::new("3.0", vec![Some(5.0), Some(6.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn merge_unions_columns_and_drops_empty_ones() {
        let merged = merge_frames(&[era_2011(), era_2020()]).unwrap();

        assert_eq!(merged.height(), 5);
        let names = merged.get_column_names();
        assert!(names.contains(&"Calgary"));
        assert!(names.contains(&"Edmonton"));
        // All-null column is gone entirely.
        assert!(!names.contains(&"Notes"));
        // Mismatched columns became nulls.
        assert_eq!(merged.column("Edmonton").unwrap().null_count(), 3);
    }

    #[test]
    fn merge_coerces_text_cells_to_null() {
        let messy = DataFrame::new(vec![
            Series::new("DATE", vec!["2011-01-01"]),
            Series::new("HOUR ENDING", vec![1.0]),
            Series::new("Calgary", vec!["n/a"]),
        ])
        .unwrap();
        let merged = merge_frames(&[messy]).unwrap();

        assert_eq!(merged.column("Calgary").unwrap().dtype(), &DataType::Float64);
        assert_eq!(merged.column("Calgary").unwrap().null_count(), 1);
    }

    #[test]
    fn hour_ending_one_maps_to_midnight() {
        let merged = merge_frames(&[era_2011()]).unwrap();
        let wide = derive_wide(&merged).unwrap();

        let ts: Vec<i64> = wide
            .column("timestamp")
            .unwrap()
            .datetime()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        let midnight = NaiveDate::from_ymd_opt(2011, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis();
        assert_eq!(ts[0], midnight);
        assert_eq!(ts[1], midnight + MS_PER_HOUR);
        // Hour ending 24 is the last hour of the same day.
        assert_eq!(ts[2], midnight + 23 * MS_PER_HOUR);
    }

    #[test]
    fn wide_is_timestamp_plus_regions_only() {
        let merged = merge_frames(&[era_2011(), era_2020()]).unwrap();
        let wide = derive_wide(&merged).unwrap();

        let names = wide.get_column_names();
        assert_eq!(names[0], "timestamp");
        for artifact in ["DT_MST", "DATE", "HOUR ENDING", "3.0"] {
            assert!(!names.contains(&artifact), "{artifact} leaked into wide");
        }
        assert!(names.contains(&"Calgary"));
        assert!(names.contains(&"Edmonton"));
    }

    #[test]
    fn direct_datetime_column_wins() {
        let merged = merge_frames(&[era_2020()]).unwrap();
        let wide = derive_wide(&merged).unwrap();

        let ts: Vec<i64> = wide
            .column("timestamp")
            .unwrap()
            .datetime()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(ts, vec![1_588_291_200_000, 1_588_294_800_000]);
    }

    #[test]
    fn mixed_eras_derive_every_timestamp() {
        let merged = merge_frames(&[era_2011(), era_2020()]).unwrap();
        let wide = derive_wide(&merged).unwrap();
        // Era-2011 rows come from DATE + HOUR ENDING, era-2020 rows from
        // DT_MST; nobody is left without a timestamp.
        assert_eq!(wide.column("timestamp").unwrap().null_count(), 0);
    }

    #[test]
    fn long_drops_unobserved_pairs_and_sorts() {
        let merged = merge_frames(&[era_2011(), era_2020()]).unwrap();
        let wide = derive_wide(&merged).unwrap();
        let long = to_long(&wide).unwrap();

        assert_eq!(long.get_column_names(), &["timestamp", "region", "load_MW"]);
        // 5 Calgary cells (one null) + 5 Edmonton cells (three null).
        assert_eq!(long.height(), 6);
        assert_eq!(long.column("load_MW").unwrap().null_count(), 0);

        let ts: Vec<i64> = long
            .column("timestamp")
            .unwrap()
            .datetime()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn duplicate_pairs_keep_first_occurrence() {
        let ts = Series::new("timestamp", vec![0i64, 0])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let wide_dup = DataFrame::new(vec![ts, Series::new("Calgary", vec![1.0, 2.0])]).unwrap();
        let long = to_long(&wide_dup).unwrap();

        assert_eq!(long.height(), 1);
        let load = long.column("load_MW").unwrap().f64().unwrap();
        assert_eq!(load.get(0), Some(1.0));
    }

    #[test]
    fn long_is_idempotent() {
        let merged = merge_frames(&[era_2011(), era_2020()]).unwrap();
        let wide = derive_wide(&merged).unwrap();

        let a = to_long(&wide).unwrap();
        let b = to_long(&wide).unwrap();
        assert!(a.frame_equal(&b));
    }

    #[test]
    fn rebuilt_long_artifact_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let merged = merge_frames(&[era_2011(), era_2020()]).unwrap();
        let wide = derive_wide(&merged).unwrap();

        let path_a = dir.path().join("a.parquet");
        let path_b = dir.path().join("b.parquet");
        write_parquet(&path_a, &to_long(&wide).unwrap()).unwrap();
        write_parquet(&path_b, &to_long(&wide).unwrap()).unwrap();

        assert_eq!(
            std::fs::read(&path_a).unwrap(),
            std::fs::read(&path_b).unwrap()
        );
    }

    #[test]
    fn zero_region_frame_errors_on_missing_time_source() {
        let df = DataFrame::new(vec![Series::new("Calgary", vec![1.0])]).unwrap();
        assert!(derive_wide(&df).is_err());
    }
}
