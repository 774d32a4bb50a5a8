pub mod anomaly;
pub mod data_loader;
pub mod error;
pub mod features;
pub mod forecaster;
pub mod gbdt;
pub mod models;
pub mod stats;

pub use anomaly::{AnomalyResult, IsolationForest, IsolationForestParams};
pub use data_loader::{is_region_label, write_predictions, DataLoader};
pub use error::{ForecastError, Result};
pub use features::{build_features, FeatureTable, LoadSeries, FEATURE_NAMES};
pub use forecaster::{forecast_region, train_all};
pub use gbdt::{FeatureBinner, GbdtParams, Matrix, QuantileGbdt};
pub use models::{ForecastConfig, RegionForecast, RegionOutcome, TrainSummary};
