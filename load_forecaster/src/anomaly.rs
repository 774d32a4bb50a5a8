//! Residual anomaly flagging via a seeded isolation forest.
//!
//! Operates on the one-dimensional distribution of median-forecast
//! residuals for a single region. The decision boundary is calibrated from
//! the assumed contamination rate: the flag threshold is the
//! (1 − contamination) quantile of the fitted scores.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::stats::quantile;

/// Configuration for the residual outlier detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestParams {
    pub n_trees: usize,
    /// Subsample size per tree (capped at the sample count).
    pub max_samples: usize,
    /// Assumed outlier fraction, used to place the decision threshold.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.01,
            seed: 42,
        }
    }
}

impl IsolationForestParams {
    pub fn with_contamination(contamination: f64, seed: u64) -> Self {
        Self {
            contamination,
            seed,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination < 0.5) {
            return Err(ForecastError::InvalidParameter(format!(
                "contamination must be in (0, 0.5), got {}",
                self.contamination
            )));
        }
        if self.n_trees == 0 || self.max_samples < 2 {
            return Err(ForecastError::InvalidParameter(
                "n_trees must be positive and max_samples at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Detection output: per-point flags plus the scores behind them.
#[derive(Debug, Clone)]
pub struct AnomalyResult {
    pub flags: Vec<bool>,
    /// Isolation scores in (0, 1); higher is more anomalous.
    pub scores: Vec<f64>,
    pub threshold: f64,
}

impl AnomalyResult {
    pub fn anomaly_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}

enum IsoNode {
    Split { value: f64, left: usize, right: usize },
    Leaf { size: usize },
}

struct IsoTree {
    nodes: Vec<IsoNode>,
}

impl IsoTree {
    fn path_length(&self, v: f64) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[idx] {
                IsoNode::Leaf { size } => return depth + average_path(*size),
                IsoNode::Split { value, left, right } => {
                    depth += 1.0;
                    idx = if v < *value { *left } else { *right };
                }
            }
        }
    }
}

/// Average unsuccessful-search path length in a binary search tree of `n`
/// nodes, the standard isolation-forest normalizer.
fn average_path(n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let n = n as f64;
    let harmonic = (n - 1.0).ln() + 0.577_215_664_901_532_9;
    2.0 * harmonic - 2.0 * (n - 1.0) / n
}

/// A fitted isolation forest over a one-dimensional sample.
pub struct IsolationForest {
    trees: Vec<IsoTree>,
    normalizer: f64,
}

impl IsolationForest {
    pub fn fit(values: &[f64], params: &IsolationForestParams) -> Result<Self> {
        params.validate()?;
        if values.is_empty() {
            return Err(ForecastError::EmptySeries);
        }

        let psi = params.max_samples.min(values.len());
        let height_limit = (psi as f64).log2().ceil().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut trees = Vec::with_capacity(params.n_trees);
        for _ in 0..params.n_trees {
            let subsample: Vec<f64> = sample(&mut rng, values.len(), psi)
                .into_iter()
                .map(|i| values[i])
                .collect();
            let mut nodes = Vec::new();
            build_node(&mut nodes, subsample, 0, height_limit, &mut rng);
            trees.push(IsoTree { nodes });
        }

        Ok(Self {
            trees,
            normalizer: average_path(psi),
        })
    }

    /// Isolation score in (0, 1); higher means more isolated.
    pub fn score(&self, v: f64) -> f64 {
        if self.normalizer <= 0.0 {
            return 0.5;
        }
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| t.path_length(v))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / self.normalizer)
    }
}

fn build_node(
    nodes: &mut Vec<IsoNode>,
    values: Vec<f64>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> usize {
    let idx = nodes.len();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if depth >= height_limit || values.len() <= 1 || !(max > min) {
        nodes.push(IsoNode::Leaf { size: values.len() });
        return idx;
    }

    let split = rng.gen_range(min..max);
    nodes.push(IsoNode::Leaf { size: 0 }); // placeholder until children exist
    let (lo, hi): (Vec<f64>, Vec<f64>) = values.into_iter().partition(|&v| v < split);
    let left = build_node(nodes, lo, depth + 1, height_limit, rng);
    let right = build_node(nodes, hi, depth + 1, height_limit, rng);
    nodes[idx] = IsoNode::Split {
        value: split,
        left,
        right,
    };
    idx
}

/// Fit on `values` and flag the points the detector isolates fastest.
pub fn detect(values: &[f64], params: &IsolationForestParams) -> Result<AnomalyResult> {
    let forest = IsolationForest::fit(values, params)?;
    let scores: Vec<f64> = values.iter().map(|&v| forest.score(v)).collect();
    let threshold = quantile(&scores, 1.0 - params.contamination);
    let flags = scores.iter().map(|&s| s > threshold).collect();
    Ok(AnomalyResult {
        flags,
        scores,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residuals_with_outlier() -> Vec<f64> {
        let mut vals: Vec<f64> = (0..500)
            .map(|i| (i as f64 * 0.37).sin() * 2.0)
            .collect();
        vals[250] = 80.0;
        vals
    }

    #[test]
    fn planted_outlier_is_flagged() {
        let vals = residuals_with_outlier();
        let result = detect(&vals, &IsolationForestParams::default()).unwrap();
        assert!(result.flags[250]);
        assert!(result.scores[250] > result.threshold);
    }

    #[test]
    fn flag_fraction_tracks_contamination() {
        let vals: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.61).sin() * 3.0).collect();
        let result = detect(&vals, &IsolationForestParams::default()).unwrap();
        // 1% contamination on 1000 points: a handful of flags, never a flood.
        assert!(result.anomaly_count() <= 30);
    }

    #[test]
    fn deterministic_under_fixed_seed() {
        let vals = residuals_with_outlier();
        let params = IsolationForestParams::default();
        let a = detect(&vals, &params).unwrap();
        let b = detect(&vals, &params).unwrap();
        assert_eq!(a.flags, b.flags);
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn constant_residuals_yield_no_flags() {
        let vals = vec![0.25; 400];
        let result = detect(&vals, &IsolationForestParams::default()).unwrap();
        assert_eq!(result.anomaly_count(), 0);
    }

    #[test]
    fn outliers_score_higher_than_inliers() {
        let vals = residuals_with_outlier();
        let forest = IsolationForest::fit(&vals, &IsolationForestParams::default()).unwrap();
        assert!(forest.score(80.0) > forest.score(0.0));
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = detect(&[], &IsolationForestParams::default()).unwrap_err();
        assert!(matches!(err, crate::error::ForecastError::EmptySeries));
    }

    #[test]
    fn invalid_contamination_rejected() {
        let params = IsolationForestParams::with_contamination(0.9, 1);
        assert!(detect(&[1.0, 2.0], &params).is_err());
    }
}
