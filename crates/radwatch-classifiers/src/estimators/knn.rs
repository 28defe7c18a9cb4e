//! k-nearest neighbours by Euclidean distance

use super::{check_sample, check_training_set, design_matrix, to_vector, Estimator};
use ndarray::{Array2, Axis};
use radwatch_core::{Label, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    pub k: usize,
    #[serde(default)]
    samples: Array2<f64>,
    #[serde(default)]
    labels: Vec<Label>,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self {
            k: 5,
            samples: Array2::zeros((0, 0)),
            labels: Vec::new(),
        }
    }
}

impl Estimator for KnnClassifier {
    fn fit(&mut self, samples: &[Vec<f32>], labels: &[Label]) -> Result<()> {
        let dimension = check_training_set(samples, labels)?;
        self.samples = design_matrix(samples, dimension);
        self.labels = labels.to_vec();
        Ok(())
    }

    /// Share of radical labels among the `k` closest training samples
    fn positive_probability(&self, sample: &[f32]) -> Result<f32> {
        check_sample(self.dimension(), sample)?;
        let offsets = &self.samples - &to_vector(sample);
        let distances = (&offsets * &offsets).sum_axis(Axis(1));

        let mut ranked: Vec<(f64, Label)> = distances
            .iter()
            .copied()
            .zip(self.labels.iter().copied())
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let k = self.k.max(1).min(ranked.len());
        let positives = ranked[..k].iter().filter(|(_, l)| l.is_positive()).count();
        Ok(positives as f32 / k as f32)
    }

    fn dimension(&self) -> Option<usize> {
        (self.samples.nrows() > 0).then(|| self.samples.ncols())
    }
}
