//! Classifier trait and common types

use radwatch_core::{InputKind, Label, ModelId, Result};
use serde::{Deserialize, Serialize};

/// Trait for all loaded ensemble members
pub trait Classifier: Send + Sync {
    /// Ensemble member this classifier serves
    fn id(&self) -> ModelId;

    /// Input the classifier scores on
    fn input_kind(&self) -> InputKind {
        self.id().input_kind()
    }

    /// Probability of the positive (radical) class
    fn positive_probability(&self, input: &ScoringInput<'_>) -> Result<f32>;
}

/// One document as seen by the ensemble: its text and the vector computed once
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    /// Document text, consumed by raw-text models
    pub text: &'a str,

    /// Averaged embedding, consumed by vector models
    pub vector: &'a [f32],
}

impl<'a> ScoringInput<'a> {
    pub fn new(text: &'a str, vector: &'a [f32]) -> Self {
        Self { text, vector }
    }

    /// False when the vectorizer returned the all-zero sentinel
    pub fn has_vector_signal(&self) -> bool {
        self.vector.iter().any(|v| *v != 0.0)
    }
}

/// Thresholded prediction of a single model for a single document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model: ModelId,
    pub label: Label,
    pub positive_probability: f32,
    pub negative_probability: f32,
}

impl ModelPrediction {
    /// Build a prediction, deciding the label from the probability alone
    pub fn from_probability(model: ModelId, positive_probability: f32, threshold: f32) -> Self {
        let p = positive_probability.clamp(0.0, 1.0);
        Self {
            model,
            label: label_for(p, threshold),
            positive_probability: p,
            negative_probability: 1.0 - p,
        }
    }
}

/// Binary decision rule shared by every ensemble member
pub fn label_for(positive_probability: f32, threshold: f32) -> Label {
    if positive_probability >= threshold {
        Label::Radical
    } else {
        Label::NonRadical
    }
}
