//! Gradient-boosted regression trees with a pinball (quantile) objective.
//!
//! Each model targets a single quantile level: boosting proceeds on the
//! pinball-loss subgradient, trees grow best-first over histogram-binned
//! features up to a leaf cap, and leaf values are set by a quantile line
//! search over the in-leaf residuals before learning-rate shrinkage.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::stats::quantile;

/// Hyperparameters for one quantile model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtParams {
    /// Target quantile level in (0, 1).
    pub quantile: f64,
    pub learning_rate: f64,
    pub num_leaves: usize,
    pub num_rounds: usize,
    /// Minimum rows on each side of a split.
    pub min_leaf: usize,
    /// Histogram bin cap per feature.
    pub max_bins: usize,
}

impl GbdtParams {
    /// Fixed production configuration at the given quantile level.
    pub fn for_quantile(alpha: f64) -> Self {
        Self {
            quantile: alpha,
            learning_rate: 0.05,
            num_leaves: 64,
            num_rounds: 400,
            min_leaf: 20,
            max_bins: 255,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.quantile > 0.0 && self.quantile < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "quantile must be in (0, 1), got {}",
                self.quantile
            )));
        }
        if self.learning_rate <= 0.0 {
            return Err(ForecastError::InvalidParameter(
                "learning_rate must be positive".to_string(),
            ));
        }
        if self.num_leaves < 2 || self.max_bins < 2 {
            return Err(ForecastError::InvalidParameter(
                "num_leaves and max_bins must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dense row-major feature matrix.
#[derive(Debug, Clone)]
pub struct Matrix {
    values: Vec<f64>,
    ncols: usize,
}

impl Matrix {
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let ncols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * ncols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != ncols {
                return Err(ForecastError::DimensionMismatch {
                    expected: ncols,
                    got: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        Ok(Self { values, ncols })
    }

    pub fn nrows(&self) -> usize {
        if self.ncols == 0 {
            0
        } else {
            self.values.len() / self.ncols
        }
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.ncols..(i + 1) * self.ncols]
    }
}

/// Per-feature histogram edges fitted on training data.
///
/// `bin(x)` is the count of edges ≤ x, so identical raw values always land
/// in the same bin for train and test rows alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBinner {
    edges: Vec<Vec<f64>>,
}

impl FeatureBinner {
    pub fn fit(x: &Matrix, max_bins: usize) -> Self {
        let mut edges = Vec::with_capacity(x.ncols());
        for col in 0..x.ncols() {
            let mut vals: Vec<f64> = (0..x.nrows())
                .map(|i| x.row(i)[col])
                .filter(|v| v.is_finite())
                .collect();
            vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let mut col_edges = Vec::new();
            if !vals.is_empty() {
                for k in 1..max_bins {
                    let idx = (k * vals.len()) / max_bins;
                    col_edges.push(vals[idx.min(vals.len() - 1)]);
                }
                col_edges.dedup_by(|a, b| a == b);
            }
            edges.push(col_edges);
        }
        Self { edges }
    }

    pub fn bin(&self, col: usize, value: f64) -> u16 {
        self.edges[col].partition_point(|e| *e <= value) as u16
    }

    pub fn n_bins(&self, col: usize) -> usize {
        self.edges[col].len() + 1
    }

    fn transform(&self, x: &Matrix) -> Vec<u16> {
        let mut bins = Vec::with_capacity(x.nrows() * x.ncols());
        for i in 0..x.nrows() {
            let row = x.row(i);
            for (col, &v) in row.iter().enumerate() {
                bins.push(self.bin(col, v));
            }
        }
        bins
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        thresh: u16,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn leaf_value(&self, binner: &FeatureBinner, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    thresh,
                    left,
                    right,
                } => {
                    idx = if binner.bin(*feature, row[*feature]) <= *thresh {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    gain: f64,
    feature: usize,
    thresh: u16,
}

struct Frontier {
    node: usize,
    rows: Vec<u32>,
    split: Option<BestSplit>,
}

const MIN_GAIN: f64 = 1e-12;

fn best_split(
    bins: &[u16],
    ncols: usize,
    binner: &FeatureBinner,
    rows: &[u32],
    grads: &[f64],
    min_leaf: usize,
) -> Option<BestSplit> {
    if rows.len() < 2 * min_leaf {
        return None;
    }

    let total_n = rows.len() as f64;
    let total_s: f64 = rows.iter().map(|&r| grads[r as usize]).sum();
    let parent_score = total_s * total_s / total_n;

    let mut best: Option<BestSplit> = None;
    for feature in 0..ncols {
        let n_bins = binner.n_bins(feature);
        if n_bins < 2 {
            continue;
        }
        let mut counts = vec![0usize; n_bins];
        let mut sums = vec![0.0f64; n_bins];
        for &r in rows {
            let b = bins[r as usize * ncols + feature] as usize;
            counts[b] += 1;
            sums[b] += grads[r as usize];
        }

        let mut left_n = 0usize;
        let mut left_s = 0.0f64;
        for thresh in 0..n_bins - 1 {
            left_n += counts[thresh];
            left_s += sums[thresh];
            let right_n = rows.len() - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let right_s = total_s - left_s;
            let gain = left_s * left_s / left_n as f64
                + right_s * right_s / right_n as f64
                - parent_score;
            if gain > MIN_GAIN && best.map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    gain,
                    feature,
                    thresh: thresh as u16,
                });
            }
        }
    }
    best
}

/// Grow one tree best-first; returns the tree skeleton (zero-valued leaves)
/// and the row membership of each leaf.
fn grow_tree(
    bins: &[u16],
    ncols: usize,
    binner: &FeatureBinner,
    grads: &[f64],
    params: &GbdtParams,
) -> (Vec<TreeNode>, Vec<(usize, Vec<u32>)>) {
    let all_rows: Vec<u32> = (0..grads.len() as u32).collect();
    let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
    let root_split = best_split(bins, ncols, binner, &all_rows, grads, params.min_leaf);
    let mut frontier = vec![Frontier {
        node: 0,
        rows: all_rows,
        split: root_split,
    }];
    let mut leaves = 1;

    while leaves < params.num_leaves {
        let pick = frontier
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.split.map(|s| (i, s.gain)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i);
        let Some(pick) = pick else { break };

        let fr = frontier.swap_remove(pick);
        let split = fr.split.expect("picked frontier entry has a split");
        let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = fr.rows.iter().copied().partition(|&r| {
            bins[r as usize * ncols + split.feature] <= split.thresh
        });

        let left = nodes.len();
        nodes.push(TreeNode::Leaf { value: 0.0 });
        let right = nodes.len();
        nodes.push(TreeNode::Leaf { value: 0.0 });
        nodes[fr.node] = TreeNode::Split {
            feature: split.feature,
            thresh: split.thresh,
            left,
            right,
        };

        let left_split = best_split(bins, ncols, binner, &left_rows, grads, params.min_leaf);
        let right_split = best_split(bins, ncols, binner, &right_rows, grads, params.min_leaf);
        frontier.push(Frontier {
            node: left,
            rows: left_rows,
            split: left_split,
        });
        frontier.push(Frontier {
            node: right,
            rows: right_rows,
            split: right_split,
        });
        leaves += 1;
    }

    let leaf_rows = frontier.into_iter().map(|f| (f.node, f.rows)).collect();
    (nodes, leaf_rows)
}

/// A fitted gradient-boosted quantile model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantileGbdt {
    params: GbdtParams,
    binner: FeatureBinner,
    base_score: f64,
    trees: Vec<RegressionTree>,
}

impl QuantileGbdt {
    /// Fit on a feature matrix and target vector.
    pub fn fit(params: GbdtParams, x: &Matrix, y: &[f64]) -> Result<Self> {
        params.validate()?;
        if y.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        if x.nrows() != y.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }

        let alpha = params.quantile;
        let binner = FeatureBinner::fit(x, params.max_bins);
        let bins = binner.transform(x);
        let ncols = x.ncols();

        let base_score = quantile(y, alpha);
        let mut scores = vec![base_score; y.len()];
        let mut trees = Vec::with_capacity(params.num_rounds);

        for _ in 0..params.num_rounds {
            let grads: Vec<f64> = y
                .iter()
                .zip(&scores)
                .map(|(&yi, &fi)| if yi > fi { alpha } else { alpha - 1.0 })
                .collect();

            let (mut nodes, leaf_rows) = grow_tree(&bins, ncols, &binner, &grads, &params);

            let mut max_step = 0.0f64;
            for (node, rows) in &leaf_rows {
                let residuals: Vec<f64> = rows
                    .iter()
                    .map(|&r| y[r as usize] - scores[r as usize])
                    .collect();
                let mut value = params.learning_rate * quantile(&residuals, alpha);
                if !value.is_finite() {
                    value = 0.0;
                }
                nodes[*node] = TreeNode::Leaf { value };
                for &r in rows {
                    scores[r as usize] += value;
                }
                max_step = max_step.max(value.abs());
            }

            let is_stump = leaf_rows.len() == 1;
            trees.push(RegressionTree { nodes });
            if is_stump && max_step < 1e-10 {
                break;
            }
        }

        Ok(Self {
            params,
            binner,
            base_score,
            trees,
        })
    }

    /// Predict the fitted quantile for each row of `x`.
    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        if x.ncols() != self.binner.edges.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.binner.edges.len(),
                got: x.ncols(),
            });
        }
        let mut out = Vec::with_capacity(x.nrows());
        for i in 0..x.nrows() {
            let row = x.row(i);
            let sum: f64 = self
                .trees
                .iter()
                .map(|t| t.leaf_value(&self.binner, row))
                .sum();
            out.push(self.base_score + sum);
        }
        Ok(out)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn quantile_level(&self) -> f64 {
        self.params.quantile
    }
}
