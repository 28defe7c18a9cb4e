//! Linear support vector machine trained with Pegasos stochastic sub-gradient steps

use super::{
    check_sample, check_training_set, design_matrix, sigmoid, targets, to_vector, DecisionFunction,
    Estimator,
};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use radwatch_core::{Label, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    /// Regularization strength
    pub lambda: f64,
    pub epochs: usize,
    pub seed: u64,
    #[serde(default)]
    weights: Array1<f64>,
    #[serde(default)]
    bias: f64,
    #[serde(default)]
    fitted: bool,
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self {
            lambda: 0.01,
            epochs: 50,
            seed: 42,
            weights: Array1::zeros(0),
            bias: 0.0,
            fitted: false,
        }
    }
}

impl Estimator for LinearSvm {
    fn fit(&mut self, samples: &[Vec<f32>], labels: &[Label]) -> Result<()> {
        let dimension = check_training_set(samples, labels)?;
        let x = design_matrix(samples, dimension);
        let y = targets(labels, 1.0, -1.0);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..samples.len()).collect();

        // The bias is shrunk like any weight, as if it were a constant feature
        let mut w = Array1::<f64>::zeros(dimension);
        let mut b = 0.0_f64;
        let mut t = 0u64;

        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                t += 1;
                let eta = 1.0 / (self.lambda * t as f64);
                let row = x.row(i);
                let margin = row.dot(&w) + b;

                let shrink = 1.0 - eta * self.lambda;
                w *= shrink;
                b *= shrink;
                if y[i] * margin < 1.0 {
                    w.scaled_add(eta * y[i], &row);
                    b += eta * y[i];
                }
            }
        }

        self.weights = w;
        self.bias = b;
        self.fitted = true;
        Ok(())
    }

    /// Uncalibrated probability; wrap in [`super::Calibrated`] for real estimates
    fn positive_probability(&self, sample: &[f32]) -> Result<f32> {
        Ok(sigmoid(f64::from(self.decision_value(sample)?)) as f32)
    }

    fn dimension(&self) -> Option<usize> {
        self.fitted.then_some(self.weights.len())
    }
}

impl DecisionFunction for LinearSvm {
    fn decision_value(&self, sample: &[f32]) -> Result<f32> {
        check_sample(self.dimension(), sample)?;
        Ok((self.weights.dot(&to_vector(sample)) + self.bias) as f32)
    }
}
