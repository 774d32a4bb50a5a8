use serde::{Deserialize, Serialize};

/// Training configuration for the per-region forecasting pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Quantile levels to fit, one independent model per level.
    pub quantiles: Vec<f64>,
    pub learning_rate: f64,
    pub num_leaves: usize,
    pub num_rounds: usize,
    /// Fraction of feature rows used for training; the rest is the test window.
    pub train_frac: f64,
    /// Regions with fewer valid feature rows than this are skipped.
    pub min_feature_rows: usize,
    /// Assumed outlier fraction for the residual anomaly detector.
    pub contamination: f64,
    /// RNG seed for the anomaly detector.
    pub seed: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            quantiles: vec![0.10, 0.50, 0.90],
            learning_rate: 0.05,
            num_leaves: 64,
            num_rounds: 400,
            train_frac: 0.7,
            min_feature_rows: 500,
            contamination: 0.01,
            seed: 42,
        }
    }
}

impl ForecastConfig {
    pub fn train_rows(&self, total: usize) -> usize {
        (total as f64 * self.train_frac) as usize
    }
}

/// Test-window forecast for one region, columnar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionForecast {
    pub region: String,
    /// Millisecond timestamps of the test window, ascending.
    pub timestamps_ms: Vec<i64>,
    pub actual: Vec<f64>,
    pub p10: Vec<f64>,
    pub p50: Vec<f64>,
    pub p90: Vec<f64>,
    pub anomaly: Vec<bool>,
}

impl RegionForecast {
    pub fn len(&self) -> usize {
        self.timestamps_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_ms.is_empty()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomaly.iter().filter(|&&a| a).count()
    }
}

/// Outcome of running the pipeline on a single region.
#[derive(Debug, Clone)]
pub enum RegionOutcome {
    Modeled(RegionForecast),
    /// Region had too few valid feature rows to train reliably.
    Skipped { region: String, feature_rows: usize },
}

/// End-of-run summary across all regions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    pub regions_modeled: usize,
    pub regions_skipped: usize,
    pub prediction_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_fixed_hyperparameters() {
        let cfg = ForecastConfig::default();
        assert_eq!(cfg.quantiles, vec![0.10, 0.50, 0.90]);
        assert!((cfg.learning_rate - 0.05).abs() < 1e-12);
        assert_eq!(cfg.num_leaves, 64);
        assert_eq!(cfg.num_rounds, 400);
        assert!((cfg.train_frac - 0.7).abs() < 1e-12);
        assert_eq!(cfg.min_feature_rows, 500);
        assert!((cfg.contamination - 0.01).abs() < 1e-12);
        assert_eq!(cfg.seed, 42);
    }

    #[test]
    fn train_split_floors() {
        let cfg = ForecastConfig::default();
        assert_eq!(cfg.train_rows(10), 7);
        assert_eq!(cfg.train_rows(1332), 932);
        assert_eq!(cfg.train_rows(0), 0);
    }
}
