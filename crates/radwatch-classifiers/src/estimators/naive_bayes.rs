//! Gaussian naive Bayes

use super::{check_sample, check_training_set, design_matrix, to_vector, Estimator};
use ndarray::{Array1, Axis};
use radwatch_core::{Error, Label, Result};
use serde::{Deserialize, Serialize};

/// Per-class feature statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ClassStats {
    log_prior: f64,
    means: Array1<f64>,
    variances: Array1<f64>,
}

impl ClassStats {
    fn log_likelihood(&self, sample: &Array1<f64>) -> f64 {
        let diff = sample - &self.means;
        let normalizer = (&self.variances * (2.0 * std::f64::consts::PI)).mapv(f64::ln);
        let exponent = &diff * &diff / &self.variances;
        self.log_prior - 0.5 * (normalizer + exponent).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
    #[serde(default)]
    classes: Vec<ClassStats>,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
            classes: Vec::new(),
        }
    }
}

impl Estimator for GaussianNaiveBayes {
    fn fit(&mut self, samples: &[Vec<f32>], labels: &[Label]) -> Result<()> {
        let dimension = check_training_set(samples, labels)?;
        let x = design_matrix(samples, dimension);
        let n = x.nrows() as f64;

        // Smoothing is relative to the largest variance over the whole set
        let max_variance = x.var_axis(Axis(0), 0.0).fold(0.0_f64, |m, v| m.max(*v));
        let epsilon = (self.var_smoothing * max_variance).max(f64::MIN_POSITIVE);

        let mut classes = Vec::with_capacity(Label::ALL.len());
        for label in Label::ALL {
            let rows: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == label)
                .map(|(i, _)| i)
                .collect();
            if rows.is_empty() {
                return Err(Error::classifier(format!(
                    "naive bayes needs examples of both classes, none for {}",
                    label
                )));
            }
            let members = x.select(Axis(0), &rows);
            let means = members
                .mean_axis(Axis(0))
                .ok_or_else(|| Error::classifier("empty class in naive bayes fit"))?;
            let variances = members.var_axis(Axis(0), 0.0) + epsilon;
            classes.push(ClassStats {
                log_prior: (rows.len() as f64 / n).ln(),
                means,
                variances,
            });
        }

        self.classes = classes;
        Ok(())
    }

    fn positive_probability(&self, sample: &[f32]) -> Result<f32> {
        check_sample(self.dimension(), sample)?;
        let sample = to_vector(sample);
        let negative = self.classes[Label::NonRadical.index()].log_likelihood(&sample);
        let positive = self.classes[Label::Radical.index()].log_likelihood(&sample);
        // Two-class softmax over joint log likelihoods
        Ok(super::sigmoid(positive - negative) as f32)
    }

    fn dimension(&self) -> Option<usize> {
        (self.classes.len() == Label::ALL.len()).then(|| self.classes[0].means.len())
    }
}
