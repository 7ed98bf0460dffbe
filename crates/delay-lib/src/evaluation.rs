//! Classification metrics for trained delay models

use crate::error::{ModelError, Result};
use serde::Serialize;

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Counts for the positive (delayed) class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub classes: Vec<ClassMetrics>,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub confusion: ConfusionMatrix,
    pub total: usize,
}

impl ClassificationReport {
    pub fn class(&self, label: i64) -> Option<&ClassMetrics> {
        self.classes.iter().find(|c| c.label == label)
    }
}

/// Compare binary predictions against ground truth
pub fn classification_report(truth: &[i64], predicted: &[i64]) -> Result<ClassificationReport> {
    if truth.len() != predicted.len() {
        return Err(ModelError::ShapeMismatch {
            expected: truth.len(),
            actual: predicted.len(),
        });
    }

    let mut confusion = ConfusionMatrix {
        true_negative: 0,
        false_positive: 0,
        false_negative: 0,
        true_positive: 0,
    };
    for (&y, &p) in truth.iter().zip(predicted) {
        match (y == 1, p == 1) {
            (false, false) => confusion.true_negative += 1,
            (false, true) => confusion.false_positive += 1,
            (true, false) => confusion.false_negative += 1,
            (true, true) => confusion.true_positive += 1,
        }
    }

    let total = truth.len();
    let correct = confusion.true_negative + confusion.true_positive;
    let classes = vec![
        class_metrics(
            0,
            confusion.true_negative,
            confusion.false_negative,
            confusion.false_positive,
        ),
        class_metrics(
            1,
            confusion.true_positive,
            confusion.false_positive,
            confusion.false_negative,
        ),
    ];

    let macro_f1 = classes.iter().map(|c| c.f1).sum::<f64>() / classes.len() as f64;
    let weighted_f1 = ratio(
        classes.iter().map(|c| c.f1 * c.support as f64).sum::<f64>(),
        total as f64,
    );

    Ok(ClassificationReport {
        accuracy: ratio(correct as f64, total as f64),
        classes,
        macro_f1,
        weighted_f1,
        confusion,
        total,
    })
}

/// Metrics for a class from its own hits, false alarms and misses
fn class_metrics(label: i64, hits: usize, false_alarms: usize, misses: usize) -> ClassMetrics {
    let precision = ratio(hits as f64, (hits + false_alarms) as f64);
    let recall = ratio(hits as f64, (hits + misses) as f64);
    ClassMetrics {
        label,
        precision,
        recall,
        f1: ratio(2.0 * precision * recall, precision + recall),
        support: hits + misses,
    }
}

/// Division that reports 0 for an empty denominator
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let truth = [1, 1, 0, 0, 0, 1];
        let predicted = [1, 0, 0, 1, 0, 1];
        let report = classification_report(&truth, &predicted).unwrap();

        assert_eq!(
            report.confusion,
            ConfusionMatrix {
                true_negative: 2,
                false_positive: 1,
                false_negative: 1,
                true_positive: 2,
            }
        );
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);

        let delayed = report.class(1).unwrap();
        assert!((delayed.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((delayed.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(delayed.support, 3);
        assert_eq!(report.class(0).unwrap().support, 3);
    }

    #[test]
    fn test_no_positive_predictions() {
        let report = classification_report(&[1, 0, 0], &[0, 0, 0]).unwrap();
        let delayed = report.class(1).unwrap();
        assert_eq!(delayed.precision, 0.0);
        assert_eq!(delayed.recall, 0.0);
        assert_eq!(delayed.f1, 0.0);
        assert!((report.class(0).unwrap().recall - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            classification_report(&[1, 0], &[1]),
            Err(ModelError::ShapeMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_empty_input() {
        let report = classification_report(&[], &[]).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy, 0.0);
    }
}
