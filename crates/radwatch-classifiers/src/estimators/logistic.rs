//! L2-regularized logistic regression fitted by full-batch gradient descent

use super::{check_sample, check_training_set, design_matrix, sigmoid, targets, to_vector, Estimator};
use ndarray::Array1;
use radwatch_core::{Label, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    #[serde(default)]
    weights: Array1<f64>,
    #[serde(default)]
    bias: f64,
    #[serde(default)]
    fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 300,
            l2: 1e-3,
            weights: Array1::zeros(0),
            bias: 0.0,
            fitted: false,
        }
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, samples: &[Vec<f32>], labels: &[Label]) -> Result<()> {
        let dimension = check_training_set(samples, labels)?;
        let x = design_matrix(samples, dimension);
        let y = targets(labels, 1.0, 0.0);
        let n = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(dimension);
        let mut bias = 0.0_f64;

        for _ in 0..self.epochs {
            let errors = (x.dot(&weights) + bias).mapv(sigmoid) - &y;
            let grad_w = x.t().dot(&errors) / n + &weights * self.l2;
            weights.scaled_add(-self.learning_rate, &grad_w);
            bias -= self.learning_rate * errors.sum() / n;
        }

        self.weights = weights;
        self.bias = bias;
        self.fitted = true;
        Ok(())
    }

    fn positive_probability(&self, sample: &[f32]) -> Result<f32> {
        check_sample(self.dimension(), sample)?;
        let margin = self.weights.dot(&to_vector(sample)) + self.bias;
        Ok(sigmoid(margin) as f32)
    }

    fn dimension(&self) -> Option<usize> {
        self.fitted.then_some(self.weights.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_data::separable;

    #[test]
    fn test_learns_separable_clusters() {
        let (x, y) = separable(15);
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();
        assert!(model.positive_probability(&[1.2, 0.9]).unwrap() > 0.8);
        assert!(model.positive_probability(&[-1.2, -0.9]).unwrap() < 0.2);
    }

    #[test]
    fn test_unfitted_model_refuses_to_score() {
        let model = LogisticRegression::default();
        assert!(model.positive_probability(&[0.0, 0.0]).is_err());
    }
}
