//! Parquet I/O for the tidy load series and the predictions artifact.

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{ForecastError, Result};
use crate::features::LoadSeries;
use crate::models::RegionForecast;

/// Loader for the tidy `(timestamp, region, load_MW)` parquet table.
pub struct DataLoader {
    path: PathBuf,
}

impl DataLoader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn load_long(&self) -> Result<DataFrame> {
        let df = ParquetReader::new(File::open(&self.path)?).finish()?;
        for required in ["timestamp", "region", "load_MW"] {
            if !df.get_column_names().contains(&required) {
                return Err(ForecastError::MissingColumn(required.to_string()));
            }
        }
        Ok(df)
    }

    /// All distinct region labels, sorted.
    pub fn regions(df: &DataFrame) -> Result<Vec<String>> {
        let unique = df.column("region")?.unique()?;
        let mut out: Vec<String> = unique
            .utf8()?
            .into_iter()
            .flatten()
            .map(|s| s.to_string())
            .collect();
        out.sort();
        Ok(out)
    }

    /// Region labels that look like real area names rather than melted
    /// schema artifacts: letters and spaces only.
    pub fn modelable_regions(df: &DataFrame) -> Result<Vec<String>> {
        Ok(Self::regions(df)?
            .into_iter()
            .filter(|r| is_region_label(r))
            .collect())
    }

    /// Extract one region's observations as a sorted hourly series.
    pub fn region_series(df: &DataFrame, region: &str) -> Result<LoadSeries> {
        let mask = df.column("region")?.utf8()?.equal(region);
        let sub = df.filter(&mask)?;

        let timestamps = sub.column("timestamp")?.datetime()?;
        let loads = sub.column("load_MW")?.f64()?;

        let mut points: Vec<(i64, f64)> = timestamps
            .into_iter()
            .zip(loads.into_iter())
            .filter_map(|(ts, load)| match (ts, load) {
                (Some(ts), Some(load)) if load.is_finite() => Some((ts, load)),
                _ => None,
            })
            .collect();
        points.sort_by_key(|(ts, _)| *ts);
        points.dedup_by_key(|(ts, _)| *ts);

        let (timestamps_ms, loads): (Vec<i64>, Vec<f64>) = points.into_iter().unzip();
        LoadSeries::new(timestamps_ms, loads)
    }
}

/// A label names a region when it is non-empty letters and spaces.
pub fn is_region_label(name: &str) -> bool {
    let squeezed: String = name.chars().filter(|c| *c != ' ').collect();
    !squeezed.is_empty() && squeezed.chars().all(char::is_alphabetic)
}

/// Assemble the per-region forecasts into one table, sorted by
/// `(region, timestamp)`, and write it to parquet (wholesale replace).
pub fn write_predictions(path: &Path, forecasts: &[RegionForecast]) -> Result<DataFrame> {
    let total: usize = forecasts.iter().map(|f| f.len()).sum();
    let mut timestamps = Vec::with_capacity(total);
    let mut regions = Vec::with_capacity(total);
    let mut actual = Vec::with_capacity(total);
    let mut p10 = Vec::with_capacity(total);
    let mut p50 = Vec::with_capacity(total);
    let mut p90 = Vec::with_capacity(total);
    let mut anomaly = Vec::with_capacity(total);

    for fc in forecasts {
        timestamps.extend_from_slice(&fc.timestamps_ms);
        regions.extend(std::iter::repeat(fc.region.clone()).take(fc.len()));
        actual.extend_from_slice(&fc.actual);
        p10.extend_from_slice(&fc.p10);
        p50.extend_from_slice(&fc.p50);
        p90.extend_from_slice(&fc.p90);
        anomaly.extend_from_slice(&fc.anomaly);
    }

    let ts_series = Series::new("timestamp", timestamps)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    let df = DataFrame::new(vec![
        ts_series,
        Series::new("region", regions),
        Series::new("actual", actual),
        Series::new("p10", p10),
        Series::new("p50", p50),
        Series::new("p90", p90),
        Series::new("anomaly", anomaly),
    ])?;

    let mut sorted = df
        .lazy()
        .sort_by_exprs([col("region"), col("timestamp")], [false, false], false, false)
        .collect()?;

    ParquetWriter::new(File::create(path)?).finish(&mut sorted)?;
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_labels_accept_letters_and_spaces_only() {
        assert!(is_region_label("Calgary"));
        assert!(is_region_label("South Edmonton"));
        assert!(!is_region_label("DT_MST"));
        assert!(!is_region_label("3"));
        assert!(!is_region_label("3.0"));
        assert!(!is_region_label(""));
        assert!(!is_region_label("   "));
        assert!(!is_region_label("Area 17"));
    }

    fn long_frame() -> DataFrame {
        let ts = Series::new("timestamp", vec![0i64, 3_600_000, 7_200_000, 0, 3_600_000])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        DataFrame::new(vec![
            ts,
            Series::new(
                "region",
                vec!["Calgary", "Calgary", "Calgary", "DT_MST", "DT_MST"],
            ),
            Series::new("load_MW", vec![Some(10.0), None, Some(12.0), Some(1.0), Some(2.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn modelable_regions_drop_artifacts() {
        let df = long_frame();
        assert_eq!(DataLoader::modelable_regions(&df).unwrap(), vec!["Calgary"]);
        assert_eq!(
            DataLoader::regions(&df).unwrap(),
            vec!["Calgary", "DT_MST"]
        );
    }

    #[test]
    fn region_series_drops_nulls_and_sorts() {
        let df = long_frame();
        let series = DataLoader::region_series(&df, "Calgary").unwrap();
        assert_eq!(series.timestamps_ms, vec![0, 7_200_000]);
        assert_eq!(series.loads, vec![10.0, 12.0]);
    }

    #[test]
    fn predictions_round_trip_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preds.parquet");

        let fc = |region: &str, start: i64| RegionForecast {
            region: region.to_string(),
            timestamps_ms: vec![start + 3_600_000, start],
            actual: vec![2.0, 1.0],
            p10: vec![1.5, 0.5],
            p50: vec![2.1, 1.1],
            p90: vec![2.9, 1.9],
            anomaly: vec![false, true],
        };
        // Regions given out of order; the artifact must come back canonical.
        let written = write_predictions(&path, &[fc("Zone B", 0), fc("Zone A", 0)]).unwrap();
        assert_eq!(written.height(), 4);

        let read = ParquetReader::new(File::open(&path).unwrap()).finish().unwrap();
        let regions: Vec<String> = read
            .column("region")
            .unwrap()
            .utf8()
            .unwrap()
            .into_iter()
            .flatten()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(regions, vec!["Zone A", "Zone A", "Zone B", "Zone B"]);

        let ts: Vec<i64> = read
            .column("timestamp")
            .unwrap()
            .datetime()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(ts, vec![0, 3_600_000, 0, 3_600_000]);
    }
}
