//! RadWatch Classifiers
//!
//! Everything needed to turn a document into a moderation decision:
//! - Text cleaning (noise stripping, stopwords, Indonesian stemming, slang)
//! - Averaged word-embedding vectorization with a zero-vector "no signal" sentinel
//! - Trainable vector estimators persisted as tagged JSON, plus a raw-text lexicon model
//! - A registry that owns loaded models and the process-wide decision threshold
//! - Ensemble scoring with a majority-vote aggregate

pub mod classifier;
pub mod config;
pub mod ensemble;
pub mod estimators;
pub mod lexicon;
pub mod metrics;
pub mod preprocess;
pub mod registry;
pub mod stemmer;
pub mod vectorizer;

pub use classifier::{label_for, Classifier, ModelPrediction, ScoringInput};
pub use config::{validate_threshold, ClassifierConfig, ResourceConfig};
pub use ensemble::{aggregate_votes, DocumentScore, EnsembleScorer, SkipReason, SkippedModel};
pub use estimators::{Estimator, LabelEncoder, TrainedModel, VectorClassifier};
pub use lexicon::{LexiconClassifier, LexiconSpec};
pub use metrics::EvaluationReport;
pub use preprocess::TextCleaner;
pub use registry::{ModelRegistry, ModelStatus};
pub use stemmer::Stemmer;
pub use vectorizer::{is_zero_vector, EmbeddingTable, Vectorizer};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{Classifier, ModelPrediction, ScoringInput};
    pub use crate::ensemble::{DocumentScore, EnsembleScorer};
    pub use crate::registry::ModelRegistry;
    pub use crate::vectorizer::Vectorizer;
}
