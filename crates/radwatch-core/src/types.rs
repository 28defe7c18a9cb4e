//! Core types for RadWatch

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary moderation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Negative class (encoded as 0)
    NonRadical,
    /// Positive class (encoded as 1)
    Radical,
}

impl Label {
    /// Both labels in encoder order
    pub const ALL: [Label; 2] = [Label::NonRadical, Label::Radical];

    /// Label-encoder index of this label
    pub fn index(self) -> usize {
        match self {
            Self::NonRadical => 0,
            Self::Radical => 1,
        }
    }

    /// Label from a label-encoder index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::NonRadical),
            1 => Some(Self::Radical),
            _ => None,
        }
    }

    /// Whether this is the positive class
    pub fn is_positive(self) -> bool {
        self == Self::Radical
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonRadical => "non_radical",
            Self::Radical => "radical",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a model consumes when scoring a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Averaged word-embedding vector
    Vector,
    /// The document text itself
    RawText,
}

/// Identifier of an ensemble member.
///
/// The set is closed: adding a model kind means adding a variant and handling
/// it everywhere a `match` covers the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    LogisticRegression,
    NaiveBayes,
    Svm,
    Knn,
    Lexicon,
}

impl ModelId {
    pub const ALL: [ModelId; 5] = [
        ModelId::LogisticRegression,
        ModelId::NaiveBayes,
        ModelId::Svm,
        ModelId::Knn,
        ModelId::Lexicon,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogisticRegression => "logistic_regression",
            Self::NaiveBayes => "naive_bayes",
            Self::Svm => "svm",
            Self::Knn => "knn",
            Self::Lexicon => "lexicon",
        }
    }

    /// Input the model scores on
    pub fn input_kind(self) -> InputKind {
        match self {
            Self::Lexicon => InputKind::RawText,
            _ => InputKind::Vector,
        }
    }

    /// Whether the training pipeline fits this model
    pub fn is_trainable(self) -> bool {
        self.input_kind() == InputKind::Vector
    }

    /// Whether raw probability estimates need a calibration step
    pub fn needs_calibration(self) -> bool {
        matches!(self, Self::Svm)
    }

    /// File (or directory) name of the persisted model inside the models directory
    pub fn artifact_name(self) -> String {
        match self {
            Self::Lexicon => "lexicon".to_string(),
            other => format!("{}.json", other.as_str()),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| crate::Error::config(format!("unknown model id '{}'", s)))
    }
}

/// Kind of artifact a chunked upload installs.
///
/// Selects the destination path and the install strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    LogisticRegression,
    NaiveBayes,
    Svm,
    Knn,
    /// Raw-text model, delivered as a ZIP archive
    Lexicon,
    /// Word-embedding table used by the vectorizer
    Embedding,
    /// Label encoder written next to the classifiers
    LabelEncoder,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::LogisticRegression,
        ArtifactKind::NaiveBayes,
        ArtifactKind::Svm,
        ArtifactKind::Knn,
        ArtifactKind::Lexicon,
        ArtifactKind::Embedding,
        ArtifactKind::LabelEncoder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogisticRegression => "logistic_regression",
            Self::NaiveBayes => "naive_bayes",
            Self::Svm => "svm",
            Self::Knn => "knn",
            Self::Lexicon => "lexicon",
            Self::Embedding => "embedding",
            Self::LabelEncoder => "label_encoder",
        }
    }

    /// Ensemble member this artifact backs, if any
    pub fn model_id(self) -> Option<ModelId> {
        match self {
            Self::LogisticRegression => Some(ModelId::LogisticRegression),
            Self::NaiveBayes => Some(ModelId::NaiveBayes),
            Self::Svm => Some(ModelId::Svm),
            Self::Knn => Some(ModelId::Knn),
            Self::Lexicon => Some(ModelId::Lexicon),
            Self::Embedding | Self::LabelEncoder => None,
        }
    }
}

impl From<ModelId> for ArtifactKind {
    fn from(id: ModelId) -> Self {
        match id {
            ModelId::LogisticRegression => Self::LogisticRegression,
            ModelId::NaiveBayes => Self::NaiveBayes,
            ModelId::Svm => Self::Svm,
            ModelId::Knn => Self::Knn,
            ModelId::Lexicon => Self::Lexicon,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::Error::invalid_state(format!("unsupported model_type '{}'", s)))
    }
}
