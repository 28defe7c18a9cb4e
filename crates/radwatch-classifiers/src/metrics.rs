//! Held-out evaluation metrics

use radwatch_core::Label;
use serde::{Deserialize, Serialize};

/// Scores of one model on the held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    /// Support-weighted precision
    pub precision: f64,
    /// Support-weighted recall
    pub recall: f64,
    /// Support-weighted F1
    pub f1: f64,
    /// `[[tn, fp], [fn, tp]]`, rows are true labels
    pub confusion_matrix: [[u64; 2]; 2],
    /// Samples per true class, non-radical first
    pub support: [u64; 2],
}

impl EvaluationReport {
    pub fn evaluate(truth: &[Label], predicted: &[Label]) -> Self {
        let mut matrix = [[0u64; 2]; 2];
        for (t, p) in truth.iter().zip(predicted) {
            matrix[t.index()][p.index()] += 1;
        }

        let total: u64 = matrix.iter().flatten().sum();
        let support = [matrix[0][0] + matrix[0][1], matrix[1][0] + matrix[1][1]];
        let correct = matrix[0][0] + matrix[1][1];

        let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
        if total > 0 {
            for class in 0..2 {
                let tp = matrix[class][class] as f64;
                let predicted_as = (matrix[0][class] + matrix[1][class]) as f64;
                let actual = support[class] as f64;

                let p = ratio(tp, predicted_as);
                let r = ratio(tp, actual);
                let f = ratio(2.0 * p * r, p + r);
                let weight = actual / total as f64;
                precision += weight * p;
                recall += weight * r;
                f1 += weight * f;
            }
        }

        Self {
            accuracy: ratio(correct as f64, total as f64),
            precision,
            recall,
            f1,
            confusion_matrix: matrix,
            support,
        }
    }
}

/// Division where an empty denominator scores zero
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
