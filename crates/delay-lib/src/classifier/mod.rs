//! Binary classifiers for delay prediction
//!
//! Two interchangeable families sit behind the [`Classifier`] trait:
//! - L2-regularised logistic regression with balanced class weights
//! - Gradient boosted decision stumps with a positive-class scale factor
//!
//! Both correct for class imbalance; delays are the minority class and an
//! uncorrected fit predicts "on time" for everything.

mod boosting;
mod logistic;

pub use boosting::{BoostingConfig, GradientBoostedStumps, Stump};
pub use logistic::{LogisticConfig, LogisticRegression};

use crate::config::{ClassifierKind, ModelConfig};
use crate::error::{ModelError, Result};
use crate::predictor::FeatureMatrix;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Score computation of a trained classifier, in export-ready form.
/// The decision is `score > 0`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreGraph {
    /// `score = x · coefficients + intercept`
    Linear {
        coefficients: Vec<f32>,
        intercept: f32,
    },
    /// `score = bias + Σ deltas[s] · [x[features[s]] < thresholds[s]]`
    Stumps {
        features: Vec<i64>,
        thresholds: Vec<f32>,
        deltas: Vec<f32>,
        bias: f32,
    },
}

/// Trait for trained binary classifiers
pub trait Classifier: Send + Sync + fmt::Debug {
    fn kind(&self) -> ClassifierKind;

    /// Input width the classifier was fitted on
    fn n_features(&self) -> usize;

    /// Raw log-odds per row
    fn decision_function(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Class labels (0 or 1) per row
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>> {
        Ok(self
            .decision_function(features)?
            .into_iter()
            .map(|score| i64::from(score > 0.0))
            .collect())
    }

    /// Export form of the decision function
    fn score_graph(&self) -> ScoreGraph;
}

/// Training parameters shared by both families
#[derive(Debug, Clone)]
pub struct TrainParams {
    pub kind: ClassifierKind,
    pub random_state: u64,
    pub learning_rate: f64,
    pub n_estimators: usize,
}

impl TrainParams {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            kind: config.classifier,
            random_state: config.random_state,
            learning_rate: config.learning_rate,
            n_estimators: config.n_estimators,
        }
    }
}

/// Fit a fresh classifier of the configured family
pub fn train(
    params: &TrainParams,
    features: &FeatureMatrix,
    labels: &[i64],
) -> Result<Arc<dyn Classifier>> {
    validate_training_input(features, labels)?;

    let positives = labels.iter().filter(|&&y| y == 1).count();
    info!(
        classifier = %params.kind,
        rows = features.n_rows(),
        columns = features.n_cols(),
        positives = positives,
        "Fitting classifier"
    );

    let classifier: Arc<dyn Classifier> = match params.kind {
        ClassifierKind::Logistic => Arc::new(LogisticRegression::fit(
            &LogisticConfig::default(),
            features,
            labels,
        )?),
        ClassifierKind::GradientBoosting => {
            let config = BoostingConfig {
                n_estimators: params.n_estimators,
                learning_rate: params.learning_rate,
                seed: params.random_state,
                ..Default::default()
            };
            Arc::new(GradientBoostedStumps::fit(&config, features, labels)?)
        }
    };

    Ok(classifier)
}

/// Shape and label checks shared by every classifier
pub(crate) fn validate_training_input(features: &FeatureMatrix, labels: &[i64]) -> Result<()> {
    if features.is_empty() {
        return Err(ModelError::Training("no training rows".to_string()));
    }
    if features.n_cols() == 0 {
        return Err(ModelError::Training("no feature columns".to_string()));
    }
    if features.n_rows() != labels.len() {
        return Err(ModelError::Training(format!(
            "{} feature rows but {} labels",
            features.n_rows(),
            labels.len()
        )));
    }
    if let Some(bad) = labels.iter().find(|&&y| y != 0 && y != 1) {
        return Err(ModelError::Training(format!(
            "labels must be 0 or 1, found {}",
            bad
        )));
    }
    Ok(())
}

/// Ensure a matrix has the width a classifier was fitted on
pub(crate) fn check_width(expected: usize, features: &FeatureMatrix) -> Result<()> {
    if features.n_cols() != expected {
        return Err(ModelError::ShapeMismatch {
            expected,
            actual: features.n_cols(),
        });
    }
    Ok(())
}

/// Negative count over positive count; 1.0 when there are no positives
pub fn scale_pos_weight(labels: &[i64]) -> f64 {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 {
        1.0
    } else {
        negatives as f64 / positives as f64
    }
}

/// Balanced weights `n / (2 · n_class)` for classes 0 and 1
pub fn balanced_class_weights(labels: &[i64]) -> [f64; 2] {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|&&y| y == 1).count() as f64;
    let negatives = n - positives;
    let weight = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
    [weight(negatives), weight(positives)]
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f32>>) -> FeatureMatrix {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let columns = (0..width).map(|i| format!("f{}", i)).collect();
        FeatureMatrix::from_rows(columns, rows).unwrap()
    }

    /// Feature 0 marks delayed flights; delays are a 1-in-5 minority
    fn imbalanced() -> (FeatureMatrix, Vec<i64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..100 {
            let delayed = i % 5 == 0;
            // Some noise so the classes are not perfectly separable
            let hot = if i % 25 == 1 { true } else { delayed };
            rows.push(vec![if hot { 1.0 } else { 0.0 }, (i % 2) as f32]);
            labels.push(i64::from(delayed));
        }
        (matrix(rows), labels)
    }

    #[test]
    fn test_scale_pos_weight() {
        assert_eq!(scale_pos_weight(&[0, 0, 0, 1]), 3.0);
        assert_eq!(scale_pos_weight(&[0, 0]), 1.0);
        assert_eq!(scale_pos_weight(&[]), 1.0);
    }

    #[test]
    fn test_balanced_class_weights() {
        let weights = balanced_class_weights(&[0, 0, 0, 1]);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(1000.0) <= 1.0);
        assert!(sigmoid(-1000.0) >= 0.0);
    }

    #[test]
    fn test_train_both_families_detect_minority_class() {
        let (features, labels) = imbalanced();
        for kind in [ClassifierKind::Logistic, ClassifierKind::GradientBoosting] {
            let params = TrainParams {
                kind,
                random_state: 1,
                learning_rate: 0.3,
                n_estimators: 20,
            };
            let classifier = train(&params, &features, &labels).unwrap();
            assert_eq!(classifier.kind(), kind);
            assert_eq!(classifier.n_features(), 2);

            let predictions = classifier.predict(&features).unwrap();
            let caught = predictions
                .iter()
                .zip(&labels)
                .filter(|(p, y)| **p == 1 && **y == 1)
                .count();
            assert_eq!(caught, 20, "{} missed delayed rows", kind);
        }
    }

    #[test]
    fn test_train_rejects_bad_input() {
        let params = TrainParams {
            kind: ClassifierKind::Logistic,
            random_state: 1,
            learning_rate: 0.1,
            n_estimators: 10,
        };
        let features = matrix(vec![vec![1.0], vec![0.0]]);

        assert!(train(&params, &features, &[1]).is_err());
        assert!(train(&params, &features, &[1, 2]).is_err());
        assert!(train(&params, &matrix(vec![]), &[]).is_err());
    }

    #[test]
    fn test_predict_checks_width() {
        let (features, labels) = imbalanced();
        let params = TrainParams {
            kind: ClassifierKind::Logistic,
            random_state: 1,
            learning_rate: 0.1,
            n_estimators: 10,
        };
        let classifier = train(&params, &features, &labels).unwrap();
        let narrow = matrix(vec![vec![1.0]]);
        assert!(matches!(
            classifier.predict(&narrow),
            Err(ModelError::ShapeMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
