//! Thresholded multi-model scoring with a majority-vote aggregate

use crate::classifier::{label_for, Classifier, ModelPrediction, ScoringInput};
use crate::vectorizer::Vectorizer;
use radwatch_core::{InputKind, Label, ModelId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why an ensemble member contributed nothing for a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The model is configured but not loaded
    Unavailable,
    /// Vector model and the document has no embedding signal
    NoVectorSignal,
    /// The prediction call failed
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedModel {
    pub model: ModelId,
    pub reason: SkipReason,
}

/// Ensemble output for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentScore {
    /// One entry per contributing model, in ensemble order
    pub predictions: Vec<ModelPrediction>,
    pub skipped: Vec<SkippedModel>,
    /// Majority vote, `None` when no model contributed
    pub aggregate: Option<Label>,
    pub threshold: f32,
}

/// Majority vote over contributing predictions; ties resolve to non-radical
pub fn aggregate_votes(predictions: &[ModelPrediction]) -> Option<Label> {
    if predictions.is_empty() {
        return None;
    }
    let positive = predictions.iter().filter(|p| p.label.is_positive()).count();
    let negative = predictions.len() - positive;
    Some(if positive > negative {
        Label::Radical
    } else {
        Label::NonRadical
    })
}

/// Frozen view of the active ensemble: members, vectorizer and threshold.
///
/// Workers take one at start so a reload or threshold change mid-run cannot
/// mix model versions within a batch.
#[derive(Clone)]
pub struct EnsembleScorer {
    members: Vec<(ModelId, Option<Arc<dyn Classifier>>)>,
    vectorizer: Option<Arc<Vectorizer>>,
    threshold: f32,
}

impl EnsembleScorer {
    pub fn new(
        members: Vec<(ModelId, Option<Arc<dyn Classifier>>)>,
        vectorizer: Option<Arc<Vectorizer>>,
        threshold: f32,
    ) -> Self {
        Self {
            members,
            vectorizer,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Member ids in scoring order, loaded or not
    pub fn model_ids(&self) -> Vec<ModelId> {
        self.members.iter().map(|(id, _)| *id).collect()
    }

    /// Members that are loaded and can contribute
    pub fn loaded_count(&self) -> usize {
        self.members.iter().filter(|(_, c)| c.is_some()).count()
    }

    /// Embedding of `text`, or an empty vector when no table is loaded
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        match &self.vectorizer {
            Some(vectorizer) => vectorizer.vectorize(text),
            None => Vec::new(),
        }
    }

    /// Vectorize once, then score against every member
    pub fn score(&self, text: &str) -> DocumentScore {
        let vector = self.vectorize(text);
        self.score_input(&ScoringInput::new(text, &vector))
    }

    pub fn score_input(&self, input: &ScoringInput<'_>) -> DocumentScore {
        let has_signal = input.has_vector_signal();
        let mut predictions = Vec::with_capacity(self.members.len());
        let mut skipped = Vec::new();

        for (id, classifier) in &self.members {
            let Some(classifier) = classifier else {
                skipped.push(SkippedModel {
                    model: *id,
                    reason: SkipReason::Unavailable,
                });
                continue;
            };
            if classifier.input_kind() == InputKind::Vector && !has_signal {
                debug!(model = %id, "Skipping vector model, document has no embedding signal");
                skipped.push(SkippedModel {
                    model: *id,
                    reason: SkipReason::NoVectorSignal,
                });
                continue;
            }
            match classifier.positive_probability(input) {
                Ok(p) => predictions.push(ModelPrediction::from_probability(*id, p, self.threshold)),
                Err(e) => {
                    warn!(model = %id, error = %e, "Model prediction failed, skipping");
                    skipped.push(SkippedModel {
                        model: *id,
                        reason: SkipReason::Failed(e.to_string()),
                    });
                }
            }
        }

        let aggregate = aggregate_votes(&predictions);
        DocumentScore {
            predictions,
            skipped,
            aggregate,
            threshold: self.threshold,
        }
    }

    /// Decision for a probability under this scorer's threshold
    pub fn decide(&self, positive_probability: f32) -> Label {
        label_for(positive_probability, self.threshold)
    }
}
