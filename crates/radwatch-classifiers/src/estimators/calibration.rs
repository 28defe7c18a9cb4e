//! Platt scaling over out-of-fold decision values

use super::{check_training_set, sigmoid, targets, DecisionFunction, Estimator};
use ndarray::{aview1, Zip};
use radwatch_core::{Error, Label, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_FOLDS: usize = 3;
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Fitted sigmoid `P(radical | f) = 1 / (1 + exp(-(a * f + b)))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl PlattScaling {
    /// Newton's method with backtracking on the smoothed-target log loss
    pub fn fit(decisions: &[f64], labels: &[Label]) -> Self {
        let positives = labels.iter().filter(|l| l.is_positive()).count() as f64;
        let negatives = labels.len() as f64 - positives;
        let f = aview1(decisions);
        let t = targets(labels, (positives + 1.0) / (positives + 2.0), 1.0 / (negatives + 2.0));
        let f_squared = &f * &f;

        let loss = |a: f64, b: f64| -> f64 {
            let z = &f * a + b;
            Zip::from(&z)
                .and(&t)
                .fold(0.0, |acc, z, t| acc + t * softplus(-z) + (1.0 - t) * softplus(*z))
        };

        let mut a = 0.0;
        let mut b = ((positives + 1.0) / (negatives + 1.0)).ln();
        let mut current = loss(a, b);

        for _ in 0..MAX_NEWTON_ITERATIONS {
            let p = (&f * a + b).mapv(sigmoid);
            let d = &p - &t;
            let w = &p * &(1.0 - &p);
            let (ga, gb) = (d.dot(&f), d.sum());
            let haa = 1e-12 + w.dot(&f_squared);
            let hab = w.dot(&f);
            let hbb = 1e-12 + w.sum();
            if ga.abs() < 1e-5 && gb.abs() < 1e-5 {
                break;
            }

            let det = haa * hbb - hab * hab;
            if det.abs() < f64::EPSILON {
                break;
            }
            let da = -(hbb * ga - hab * gb) / det;
            let db = -(haa * gb - hab * ga) / det;
            let slope = ga * da + gb * db;

            let mut step = 1.0;
            let mut improved = false;
            while step >= 1e-10 {
                let (na, nb) = (a + step * da, b + step * db);
                let candidate = loss(na, nb);
                if candidate <= current + 1e-4 * step * slope {
                    a = na;
                    b = nb;
                    current = candidate;
                    improved = true;
                    break;
                }
                step /= 2.0;
            }
            if !improved {
                break;
            }
        }

        Self { a, b }
    }

    pub fn probability(&self, decision: f64) -> f64 {
        sigmoid(self.a * decision + self.b)
    }
}

fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// An estimator whose margins are mapped to probabilities by Platt scaling.
///
/// The sigmoid is fitted on decision values the base estimator produced for
/// samples it was not trained on (k-fold), then the base estimator is refit on
/// every sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibrated<E> {
    pub folds: usize,
    base: E,
    #[serde(default)]
    scaling: Option<PlattScaling>,
}

impl<E> Calibrated<E> {
    pub fn new(base: E) -> Self {
        Self {
            folds: DEFAULT_FOLDS,
            base,
            scaling: None,
        }
    }

    pub fn base(&self) -> &E {
        &self.base
    }

    pub fn scaling(&self) -> Option<PlattScaling> {
        self.scaling
    }
}

/// Fold index per sample, dealt round-robin within each class
fn stratified_folds(labels: &[Label], folds: usize) -> Vec<usize> {
    let mut seen = [0usize; 2];
    labels
        .iter()
        .map(|label| {
            let slot = &mut seen[label.index()];
            let fold = *slot % folds;
            *slot += 1;
            fold
        })
        .collect()
}

impl<E> Estimator for Calibrated<E>
where
    E: Estimator + DecisionFunction + Clone,
{
    fn fit(&mut self, samples: &[Vec<f32>], labels: &[Label]) -> Result<()> {
        check_training_set(samples, labels)?;
        if self.folds < 2 || samples.len() < self.folds {
            return Err(Error::classifier(format!(
                "calibration needs at least {} samples, got {}",
                self.folds.max(2),
                samples.len()
            )));
        }

        let assignment = stratified_folds(labels, self.folds);
        let mut decisions = vec![0.0_f64; samples.len()];

        for fold in 0..self.folds {
            let (train_x, train_y): (Vec<Vec<f32>>, Vec<Label>) = samples
                .iter()
                .zip(labels)
                .zip(&assignment)
                .filter(|(_, f)| **f != fold)
                .map(|((s, l), _)| (s.clone(), *l))
                .unzip();
            if train_x.is_empty() {
                continue;
            }

            let mut model = self.base.clone();
            model.fit(&train_x, &train_y)?;
            for (i, _) in assignment.iter().enumerate().filter(|(_, f)| **f == fold) {
                decisions[i] = f64::from(model.decision_value(&samples[i])?);
            }
        }

        self.scaling = Some(PlattScaling::fit(&decisions, labels));
        self.base.fit(samples, labels)
    }

    fn positive_probability(&self, sample: &[f32]) -> Result<f32> {
        let scaling = self
            .scaling
            .ok_or_else(|| Error::classifier("calibrated estimator has not been fitted"))?;
        let decision = self.base.decision_value(sample)?;
        Ok(scaling.probability(f64::from(decision)) as f32)
    }

    fn dimension(&self) -> Option<usize> {
        self.scaling.and(self.base.dimension())
    }
}
