//! Supervised-learning feature construction for a single region's load series.
//!
//! Turns a univariate hourly series into calendar + lag + rolling-mean
//! features with the same-hour load as the target. Rows are keyed by time,
//! not by position: a feature is defined only if the value at the exact
//! offset timestamp exists, so gaps in the series never silently shift lags.

use chrono::{DateTime, Datelike, Timelike};
use std::collections::HashMap;

use crate::error::{ForecastError, Result};

pub const MS_PER_HOUR: i64 = 3_600_000;

/// Lag offsets in hours: previous hour, previous day, previous week.
pub const LAG_HOURS: [i64; 3] = [1, 24, 168];

/// Trailing rolling-mean window in hours.
pub const ROLL_WINDOW: i64 = 24;

/// Feature column order used throughout the crate.
pub const FEATURE_NAMES: [&str; 7] = [
    "hour", "dow", "month", "lag_1", "lag_24", "lag_168", "roll_24",
];

pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// One region's chronologically ordered load observations.
#[derive(Debug, Clone)]
pub struct LoadSeries {
    /// Millisecond timestamps, strictly ascending.
    pub timestamps_ms: Vec<i64>,
    /// Load in megawatts, same length as `timestamps_ms`.
    pub loads: Vec<f64>,
}

impl LoadSeries {
    pub fn new(timestamps_ms: Vec<i64>, loads: Vec<f64>) -> Result<Self> {
        if timestamps_ms.len() != loads.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps_ms.len(),
                got: loads.len(),
            });
        }
        if timestamps_ms.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ForecastError::InvalidParameter(
                "series timestamps must be strictly ascending".to_string(),
            ));
        }
        Ok(Self { timestamps_ms, loads })
    }

    /// Build an hourly series starting at `start_ms` from consecutive values.
    pub fn hourly(start_ms: i64, loads: Vec<f64>) -> Self {
        let timestamps_ms = (0..loads.len() as i64)
            .map(|i| start_ms + i * MS_PER_HOUR)
            .collect();
        Self { timestamps_ms, loads }
    }

    pub fn len(&self) -> usize {
        self.timestamps_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_ms.is_empty()
    }
}

/// Feature table for one region: one fully populated row per usable timestamp.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub timestamps_ms: Vec<i64>,
    /// Row-major feature values in `FEATURE_NAMES` order.
    pub rows: Vec<[f64; NUM_FEATURES]>,
    /// Target: the load at the row's own timestamp.
    pub targets: Vec<f64>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = FEATURE_NAMES.iter().position(|&n| n == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }
}

/// Build the feature table for one region's series.
///
/// A row is emitted only when every lag and the full 24-hour trailing window
/// are present; on a gap-free hourly series this is exactly the rows with at
/// least 168 hours of prior history.
pub fn build_features(series: &LoadSeries) -> Result<FeatureTable> {
    if series.is_empty() {
        return Err(ForecastError::EmptySeries);
    }

    let by_time: HashMap<i64, f64> = series
        .timestamps_ms
        .iter()
        .copied()
        .zip(series.loads.iter().copied())
        .collect();

    let mut table = FeatureTable {
        timestamps_ms: Vec::new(),
        rows: Vec::new(),
        targets: Vec::new(),
    };

    'rows: for (&ts, &load) in series.timestamps_ms.iter().zip(&series.loads) {
        if !load.is_finite() {
            continue;
        }

        let mut lags = [0.0; LAG_HOURS.len()];
        for (slot, &hours) in lags.iter_mut().zip(&LAG_HOURS) {
            match by_time.get(&(ts - hours * MS_PER_HOUR)) {
                Some(v) if v.is_finite() => *slot = *v,
                _ => continue 'rows,
            }
        }

        // Trailing mean over the closed window [ts - 23h, ts].
        let mut sum = 0.0;
        for back in 0..ROLL_WINDOW {
            match by_time.get(&(ts - back * MS_PER_HOUR)) {
                Some(v) if v.is_finite() => sum += *v,
                _ => continue 'rows,
            }
        }
        let roll = sum / ROLL_WINDOW as f64;

        let dt = match DateTime::from_timestamp_millis(ts) {
            Some(dt) => dt.naive_utc(),
            None => continue,
        };

        table.timestamps_ms.push(ts);
        table.rows.push([
            dt.hour() as f64,
            dt.weekday().num_days_from_monday() as f64,
            dt.month() as f64,
            lags[0],
            lags[1],
            lags[2],
            roll,
        ]);
        table.targets.push(load);
    }

    Ok(table)
}
