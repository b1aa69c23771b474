//! Binary classification metrics

use crate::error::{Result, SentinelError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Confusion counts with `Malicious` (1.0) as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut m = Self::default();
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            match (*t > 0.5, *p > 0.5) {
                (true, true) => m.tp += 1,
                (false, true) => m.fp += 1,
                (false, false) => m.tn += 1,
                (true, false) => m.fn_ += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

/// Precision, recall and F1 of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

impl ClassificationMetrics {
    /// Scores for hard 0/1 predictions. Undefined ratios count as zero.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(SentinelError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(SentinelError::DataError(
                "Cannot score an empty evaluation set".to_string(),
            ));
        }

        let confusion = ConfusionMatrix::from_predictions(y_true, y_pred);
        let ConfusionMatrix { tp, fp, tn, fn_ } = confusion;

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if tp + fn_ > 0 {
            tp as f64 / (tp + fn_) as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Ok(Self {
            precision,
            recall,
            f1,
            accuracy: (tp + tn) as f64 / confusion.total() as f64,
            confusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];

        let m = ClassificationMetrics::compute(&y_true, &y_pred).unwrap();
        assert_eq!(m.confusion, ConfusionMatrix { tp: 3, fp: 1, tn: 3, fn_: 1 });
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert!((m.f1 - 0.75).abs() < 1e-12);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions() {
        let m = ClassificationMetrics::compute(&array![1.0, 0.0], &array![0.0, 0.0]).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(ClassificationMetrics::compute(&array![1.0], &array![1.0, 0.0]).is_err());
    }
}
