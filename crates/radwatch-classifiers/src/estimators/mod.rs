//! Trainable vector estimators
//!
//! Every estimator consumes averaged embedding vectors and produces the
//! probability of the radical class. Training and scoring run on `ndarray`
//! matrices. Fitted models are persisted as JSON, tagged by `type`, so an
//! artifact file is self-describing:
//!
//! ```json
//! {"type": "logistic_regression", "weights": {"v": 1, "dim": [100], "data": [...]}, "bias": 0.1, ...}
//! ```

pub mod calibration;
pub mod knn;
pub mod logistic;
pub mod naive_bayes;
pub mod svm;

pub use calibration::Calibrated;
pub use knn::KnnClassifier;
pub use logistic::LogisticRegression;
pub use naive_bayes::GaussianNaiveBayes;
pub use svm::LinearSvm;

use crate::classifier::{Classifier, ScoringInput};
use ndarray::{Array1, Array2};
use radwatch_core::{Error, Label, ModelId, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A binary estimator over fixed-width vectors
pub trait Estimator {
    /// Fit on `samples`, replacing any previous state
    fn fit(&mut self, samples: &[Vec<f32>], labels: &[Label]) -> Result<()>;

    /// Probability of the positive class for one sample
    fn positive_probability(&self, sample: &[f32]) -> Result<f32>;

    /// Input width learned during fitting, `None` before the first fit
    fn dimension(&self) -> Option<usize>;
}

/// Estimators exposing an uncalibrated margin
pub trait DecisionFunction {
    fn decision_value(&self, sample: &[f32]) -> Result<f32>;
}

/// Shared shape checks for `fit`
pub(crate) fn check_training_set(samples: &[Vec<f32>], labels: &[Label]) -> Result<usize> {
    if samples.is_empty() {
        return Err(Error::classifier("cannot fit on an empty training set"));
    }
    if samples.len() != labels.len() {
        return Err(Error::classifier(format!(
            "{} samples but {} labels",
            samples.len(),
            labels.len()
        )));
    }
    let dimension = samples[0].len();
    if samples.iter().any(|s| s.len() != dimension) {
        return Err(Error::classifier("training samples have inconsistent widths"));
    }
    Ok(dimension)
}

/// Shared shape check for scoring
pub(crate) fn check_sample(expected: Option<usize>, sample: &[f32]) -> Result<()> {
    match expected {
        None => Err(Error::classifier("estimator has not been fitted")),
        Some(dim) if dim != sample.len() => Err(Error::classifier(format!(
            "expected a {}-dimensional vector, got {}",
            dim,
            sample.len()
        ))),
        Some(_) => Ok(()),
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Stack checked samples into an `n x dimension` design matrix
pub(crate) fn design_matrix(samples: &[Vec<f32>], dimension: usize) -> Array2<f64> {
    Array2::from_shape_fn((samples.len(), dimension), |(i, j)| f64::from(samples[i][j]))
}

pub(crate) fn to_vector(sample: &[f32]) -> Array1<f64> {
    sample.iter().map(|x| f64::from(*x)).collect()
}

/// Encode labels as `positive` or `negative` targets
pub(crate) fn targets(labels: &[Label], positive: f64, negative: f64) -> Array1<f64> {
    labels
        .iter()
        .map(|l| if l.is_positive() { positive } else { negative })
        .collect()
}

/// A fitted (or ready-to-fit) vector model, one variant per trainable member
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    NaiveBayes(GaussianNaiveBayes),
    Svm(Calibrated<LinearSvm>),
    Knn(KnnClassifier),
}

impl TrainedModel {
    /// Unfitted estimator with default hyperparameters; `None` for raw-text models
    pub fn for_model(id: ModelId) -> Option<Self> {
        match id {
            ModelId::LogisticRegression => {
                Some(Self::LogisticRegression(LogisticRegression::default()))
            }
            ModelId::NaiveBayes => Some(Self::NaiveBayes(GaussianNaiveBayes::default())),
            ModelId::Svm => Some(Self::Svm(Calibrated::new(LinearSvm::default()))),
            ModelId::Knn => Some(Self::Knn(KnnClassifier::default())),
            ModelId::Lexicon => None,
        }
    }

    pub fn model_id(&self) -> ModelId {
        match self {
            Self::LogisticRegression(_) => ModelId::LogisticRegression,
            Self::NaiveBayes(_) => ModelId::NaiveBayes,
            Self::Svm(_) => ModelId::Svm,
            Self::Knn(_) => ModelId::Knn,
        }
    }

    fn estimator(&self) -> &dyn Estimator {
        match self {
            Self::LogisticRegression(m) => m,
            Self::NaiveBayes(m) => m,
            Self::Svm(m) => m,
            Self::Knn(m) => m,
        }
    }

    fn estimator_mut(&mut self) -> &mut dyn Estimator {
        match self {
            Self::LogisticRegression(m) => m,
            Self::NaiveBayes(m) => m,
            Self::Svm(m) => m,
            Self::Knn(m) => m,
        }
    }

    pub fn fit(&mut self, samples: &[Vec<f32>], labels: &[Label]) -> Result<()> {
        self.estimator_mut().fit(samples, labels)
    }

    pub fn positive_probability(&self, sample: &[f32]) -> Result<f32> {
        self.estimator().positive_probability(sample)
    }

    pub fn dimension(&self) -> Option<usize> {
        self.estimator().dimension()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load a persisted model, checking it matches the slot it is loaded into
    pub fn load(path: &Path, expected: ModelId) -> Result<Self> {
        let model = Self::from_json(&std::fs::read(path)?)?;
        if model.model_id() != expected {
            return Err(Error::config(format!(
                "{:?} holds a {} model, expected {}",
                path,
                model.model_id(),
                expected
            )));
        }
        if model.dimension().is_none() {
            return Err(Error::config(format!("{:?} holds an unfitted model", path)));
        }
        Ok(model)
    }
}

/// Adapter exposing a fitted vector model to the ensemble
pub struct VectorClassifier {
    model: TrainedModel,
}

impl VectorClassifier {
    pub fn new(model: TrainedModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }
}

impl Classifier for VectorClassifier {
    fn id(&self) -> ModelId {
        self.model.model_id()
    }

    fn positive_probability(&self, input: &ScoringInput<'_>) -> Result<f32> {
        self.model.positive_probability(input.vector)
    }
}

/// Mapping between label names and the integer classes estimators use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<Label>,
}

impl LabelEncoder {
    /// The binary encoder: non-radical is 0, radical is 1
    pub fn binary() -> Self {
        Self {
            classes: Label::ALL.to_vec(),
        }
    }

    pub fn encode(&self, label: Label) -> Option<usize> {
        self.classes.iter().position(|c| *c == label)
    }

    pub fn decode(&self, index: usize) -> Option<Label> {
        self.classes.get(index).copied()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_trainable_model_fits_and_round_trips() {
        let (x, y) = test_data::separable(20);
        for id in ModelId::ALL.into_iter().filter(|id| id.is_trainable()) {
            let mut model = TrainedModel::for_model(id).unwrap();
            model.fit(&x, &y).unwrap();
            assert_eq!(model.model_id(), id);

            let restored = TrainedModel::from_json(&model.to_json().unwrap()).unwrap();
            let p = restored.positive_probability(&[1.0, 0.8]).unwrap();
            let q = restored.positive_probability(&[-1.0, -0.9]).unwrap();
            assert!(p > 0.5 && q < 0.5, "{} scored {} / {}", id, p, q);
        }
        assert!(TrainedModel::for_model(ModelId::Lexicon).is_none());
    }

    #[test]
    fn test_persisted_json_is_tagged() {
        let (x, y) = test_data::separable(5);
        let mut model = TrainedModel::for_model(ModelId::Knn).unwrap();
        model.fit(&x, &y).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&model.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "knn");
    }

    #[test]
    fn test_load_rejects_wrong_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svm.json");
        let (x, y) = test_data::separable(5);
        let mut model = TrainedModel::for_model(ModelId::NaiveBayes).unwrap();
        model.fit(&x, &y).unwrap();
        std::fs::write(&path, model.to_json().unwrap()).unwrap();

        assert!(TrainedModel::load(&path, ModelId::Svm).is_err());
        assert!(TrainedModel::load(&path, ModelId::NaiveBayes).is_ok());
    }

    #[test]
    fn test_vector_classifier_rejects_wrong_width() {
        let (x, y) = test_data::separable(5);
        let mut model = TrainedModel::for_model(ModelId::LogisticRegression).unwrap();
        model.fit(&x, &y).unwrap();
        let classifier = VectorClassifier::new(model);
        let wide = [0.1_f32; 3];
        assert!(classifier
            .positive_probability(&ScoringInput::new("", &wide))
            .is_err());
    }

    #[test]
    fn test_label_encoder() {
        let encoder = LabelEncoder::binary();
        assert_eq!(encoder.encode(Label::Radical), Some(1));
        assert_eq!(encoder.decode(0), Some(Label::NonRadical));
        assert_eq!(encoder.decode(5), None);
    }

    #[test]
    fn test_shape_checks() {
        assert!(check_training_set(&[], &[]).is_err());
        assert!(check_training_set(&[vec![1.0]], &[]).is_err());
        assert!(check_training_set(
            &[vec![1.0], vec![1.0, 2.0]],
            &[Label::Radical, Label::NonRadical]
        )
        .is_err());
        assert!(check_sample(None, &[1.0]).is_err());
        assert!(check_sample(Some(2), &[1.0, 2.0]).is_ok());
    }

    #[test]
    fn test_design_matrix_layout() {
        let x = design_matrix(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]], 2);
        assert_eq!(x.dim(), (3, 2));
        assert_eq!(x[[2, 0]], 5.0);
        assert_eq!(
            targets(&[Label::Radical, Label::NonRadical], 1.0, -1.0).to_vec(),
            vec![1.0, -1.0]
        );
    }
}
