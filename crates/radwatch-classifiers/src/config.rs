//! Configuration for the model registry and ensemble

use radwatch_core::{ArtifactKind, Error, ModelId, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for all classifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Directory holding persisted models and the label encoder
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Word-embedding table in word2vec text format
    #[serde(default = "default_embedding_path")]
    pub embedding_path: PathBuf,

    /// Ensemble members, in scoring and training order
    #[serde(default = "default_ensemble")]
    pub ensemble: Vec<ModelId>,

    /// Members kept out of scoring (still trained)
    #[serde(default)]
    pub hidden: Vec<ModelId>,

    /// Initial decision threshold on P(radical)
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Replacement text-cleaning resources
    #[serde(default)]
    pub resources: ResourceConfig,
}

/// Optional files replacing the built-in cleaning resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Stopwords, one per line
    pub stopwords: Option<PathBuf>,

    /// Slang dictionary, YAML map of `slang: formal`
    pub slang: Option<PathBuf>,

    /// Stemmer root words, one per line
    pub roots: Option<PathBuf>,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_embedding_path() -> PathBuf {
    PathBuf::from("./models/embeddings.txt")
}

fn default_ensemble() -> Vec<ModelId> {
    ModelId::ALL.to_vec()
}

fn default_threshold() -> f32 {
    0.5
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            embedding_path: default_embedding_path(),
            ensemble: default_ensemble(),
            hidden: Vec::new(),
            threshold: default_threshold(),
            resources: ResourceConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// Config rooted at `models_dir`, with the embedding table inside it
    pub fn with_models_dir(models_dir: impl Into<PathBuf>) -> Self {
        let models_dir = models_dir.into();
        Self {
            embedding_path: models_dir.join("embeddings.txt"),
            models_dir,
            ..Self::default()
        }
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse classifier config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)?;
        for (i, id) in self.ensemble.iter().enumerate() {
            if self.ensemble[..i].contains(id) {
                return Err(Error::config(format!("'{}' listed twice in ensemble", id)));
            }
        }
        Ok(())
    }

    /// Where an artifact of `kind` lives on disk
    pub fn artifact_path(&self, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Embedding => self.embedding_path.clone(),
            ArtifactKind::LabelEncoder => self.models_dir.join("label_encoder.json"),
            ArtifactKind::LogisticRegression
            | ArtifactKind::NaiveBayes
            | ArtifactKind::Svm
            | ArtifactKind::Knn
            | ArtifactKind::Lexicon => match kind.model_id() {
                Some(id) => self.models_dir.join(id.artifact_name()),
                None => self.models_dir.join(kind.as_str()),
            },
        }
    }

    /// Ensemble members that take part in scoring
    pub fn active_members(&self) -> Vec<ModelId> {
        self.ensemble
            .iter()
            .copied()
            .filter(|id| !self.hidden.contains(id))
            .collect()
    }

    /// Ensemble members the training pipeline fits, in order
    pub fn trainable_members(&self) -> Vec<ModelId> {
        self.ensemble
            .iter()
            .copied()
            .filter(|id| id.is_trainable())
            .collect()
    }
}

/// Thresholds are probabilities
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "threshold must lie in [0, 1], got {}",
            threshold
        )))
    }
}
