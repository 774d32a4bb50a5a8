//! Error types for the load_forecaster library.

use thiserror::Error;

/// Result type alias for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while building features, training, or scoring.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Input series is empty.
    #[error("empty input series")]
    EmptySeries,

    /// Not enough data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Mismatched lengths between paired inputs.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A required column is missing from an input table.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// Underlying dataframe error.
    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),

    /// Filesystem error while reading or writing artifacts.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
