//! Gradient boosted decision stumps
//!
//! Second-order boosting on the logistic loss, one depth-1 tree per round.
//! Splits are searched over per-feature histograms of the distinct input
//! values, so one-hot inputs cost a single bucket pass per feature. Positive
//! rows are up-weighted by `negatives / positives`.

use super::{
    check_width, scale_pos_weight, sigmoid, validate_training_input, Classifier, ScoreGraph,
};
use crate::config::ClassifierKind;
use crate::error::Result;
use crate::predictor::FeatureMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Floor for per-row hessians
const HESS_MIN: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// Minimum hessian sum on each side of a split
    pub min_child_weight: f64,
    /// Fraction of features considered per round
    pub colsample: f64,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            colsample: 1.0,
            seed: 1,
        }
    }
}

/// A depth-1 tree: rows with `x[feature] < threshold` take `left`
#[derive(Debug, Clone, PartialEq)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f32,
    pub left: f64,
    pub right: f64,
}

impl Stump {
    fn value(&self, row: &[f32]) -> f64 {
        if row[self.feature] < self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Clone)]
pub struct GradientBoostedStumps {
    n_features: usize,
    base_score: f64,
    stumps: Vec<Stump>,
    scale_pos_weight: f64,
}

/// Sorted distinct values of one feature and each row's bucket index
struct FeatureBins {
    values: Vec<f32>,
    row_bins: Vec<usize>,
}

impl FeatureBins {
    fn build(column: &[f32]) -> Self {
        let mut values = column.to_vec();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        let row_bins = column
            .iter()
            .map(|v| values.partition_point(|u| u < v))
            .collect();
        Self { values, row_bins }
    }

    /// Split between bucket `k` and `k + 1`
    fn threshold(&self, k: usize) -> f32 {
        (self.values[k] + self.values[k + 1]) / 2.0
    }
}

struct Split {
    feature: usize,
    bucket: usize,
    gain: f64,
    left: (f64, f64),
    right: (f64, f64),
}

impl GradientBoostedStumps {
    pub fn fit(config: &BoostingConfig, features: &FeatureMatrix, labels: &[i64]) -> Result<Self> {
        validate_training_input(features, labels)?;
        let n_rows = features.n_rows();
        let n_features = features.n_cols();
        let spw = scale_pos_weight(labels);

        let weights: Vec<f64> = labels
            .iter()
            .map(|&y| if y == 1 { spw } else { 1.0 })
            .collect();
        let targets: Vec<f64> = labels.iter().map(|&y| y as f64).collect();

        let total_weight: f64 = weights.iter().sum();
        let weighted_pos: f64 = weights.iter().zip(&targets).map(|(w, y)| w * y).sum();
        let p = (weighted_pos / total_weight).clamp(1e-7, 1.0 - 1e-7);
        let base_score = (p / (1.0 - p)).ln();

        let values = features.values();
        let bins: Vec<FeatureBins> = (0..n_features)
            .map(|j| FeatureBins::build(&values.column(j).to_vec()))
            .collect();
        let rows: Vec<Vec<f32>> = features.to_rows();

        let mut rng = StdRng::seed_from_u64(config.seed);
        let n_sampled = ((n_features as f64 * config.colsample).round() as usize).clamp(1, n_features);

        let mut scores = vec![base_score; n_rows];
        let mut gradients = vec![0.0f64; n_rows];
        let mut hessians = vec![0.0f64; n_rows];
        let mut stumps = Vec::with_capacity(config.n_estimators);

        for round in 0..config.n_estimators {
            for i in 0..n_rows {
                let prob = sigmoid(scores[i]);
                gradients[i] = weights[i] * (prob - targets[i]);
                hessians[i] = (weights[i] * prob * (1.0 - prob)).max(HESS_MIN);
            }

            let candidates: Vec<usize> = if n_sampled < n_features {
                let mut picked = rand::seq::index::sample(&mut rng, n_features, n_sampled).into_vec();
                picked.sort_unstable();
                picked
            } else {
                (0..n_features).collect()
            };

            let Some(split) = best_split(config, &bins, &candidates, &gradients, &hessians) else {
                debug!(round = round, "No split improves the loss, stopping early");
                break;
            };

            let leaf = |(g, h): (f64, f64)| -config.learning_rate * g / (h + config.reg_lambda);
            let stump = Stump {
                feature: split.feature,
                threshold: bins[split.feature].threshold(split.bucket),
                left: leaf(split.left),
                right: leaf(split.right),
            };
            debug!(
                round = round,
                feature = stump.feature,
                threshold = stump.threshold,
                gain = split.gain,
                "Added stump"
            );

            for (score, row) in scores.iter_mut().zip(&rows) {
                *score += stump.value(row);
            }
            stumps.push(stump);
        }

        Ok(Self {
            n_features,
            base_score,
            stumps,
            scale_pos_weight: spw,
        })
    }

    pub fn stumps(&self) -> &[Stump] {
        &self.stumps
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn scale_pos_weight(&self) -> f64 {
        self.scale_pos_weight
    }
}

fn best_split(
    config: &BoostingConfig,
    bins: &[FeatureBins],
    candidates: &[usize],
    gradients: &[f64],
    hessians: &[f64],
) -> Option<Split> {
    let g_total: f64 = gradients.iter().sum();
    let h_total: f64 = hessians.iter().sum();
    let lambda = config.reg_lambda;
    let parent = g_total * g_total / (h_total + lambda);

    let mut best: Option<Split> = None;
    for &feature in candidates {
        let fb = &bins[feature];
        if fb.values.len() < 2 {
            continue;
        }

        let mut histogram = vec![(0.0f64, 0.0f64); fb.values.len()];
        for (i, &bin) in fb.row_bins.iter().enumerate() {
            histogram[bin].0 += gradients[i];
            histogram[bin].1 += hessians[i];
        }

        let (mut g_left, mut h_left) = (0.0, 0.0);
        for (bucket, &(g, h)) in histogram.iter().enumerate().take(fb.values.len() - 1) {
            g_left += g;
            h_left += h;
            let g_right = g_total - g_left;
            let h_right = h_total - h_left;
            if h_left < config.min_child_weight || h_right < config.min_child_weight {
                continue;
            }

            let gain = 0.5
                * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                    - parent);
            if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(Split {
                    feature,
                    bucket,
                    gain,
                    left: (g_left, h_left),
                    right: (g_right, h_right),
                });
            }
        }
    }
    best
}

impl Classifier for GradientBoostedStumps {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::GradientBoosting
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn decision_function(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        check_width(self.n_features, features)?;
        Ok(features
            .values()
            .outer_iter()
            .map(|row| {
                let row = row.to_vec();
                self.base_score + self.stumps.iter().map(|s| s.value(&row)).sum::<f64>()
            })
            .collect())
    }

    fn score_graph(&self) -> ScoreGraph {
        // bias + Σ [x < t]·(left − right) == base + Σ stump(x)
        let right_sum: f64 = self.stumps.iter().map(|s| s.right).sum();
        ScoreGraph::Stumps {
            features: self.stumps.iter().map(|s| s.feature as i64).collect(),
            thresholds: self.stumps.iter().map(|s| s.threshold).collect(),
            deltas: self.stumps.iter().map(|s| (s.left - s.right) as f32).collect(),
            bias: (self.base_score + right_sum) as f32,
        }
    }
}
