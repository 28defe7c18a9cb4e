//! Model registry: the single in-memory handle on loaded models

use crate::classifier::Classifier;
use crate::config::{validate_threshold, ClassifierConfig};
use crate::ensemble::EnsembleScorer;
use crate::estimators::{TrainedModel, VectorClassifier};
use crate::lexicon::LexiconClassifier;
use crate::preprocess::{load_slang_map, load_word_list, TextCleaner};
use crate::stemmer::Stemmer;
use crate::vectorizer::{EmbeddingTable, Vectorizer};
use parking_lot::RwLock;
use radwatch_core::{ArtifactKind, Error, ModelId, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Load state of one ensemble member
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub model: ModelId,
    pub loaded: bool,
    pub hidden: bool,
}

/// Registry of loaded ensemble members, the vectorizer and the decision threshold
pub struct ModelRegistry {
    config: ClassifierConfig,
    threshold: RwLock<f32>,
    vectorizer: RwLock<Option<Arc<Vectorizer>>>,
    models: RwLock<HashMap<ModelId, Arc<dyn Classifier>>>,
}

impl ModelRegistry {
    /// Create an empty registry; call [`ModelRegistry::load_all`] to populate it
    pub fn new(config: ClassifierConfig) -> Self {
        let threshold = config.threshold;
        Self {
            config,
            threshold: RwLock::new(threshold),
            vectorizer: RwLock::new(None),
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Text cleaner built from the configured resources
    pub fn build_cleaner(&self) -> Result<TextCleaner> {
        let resources = &self.config.resources;
        let mut cleaner = TextCleaner::new()?;
        if let Some(path) = &resources.stopwords {
            cleaner = cleaner.with_stopwords(load_word_list(path)?);
        }
        if let Some(path) = &resources.slang {
            cleaner = cleaner.with_slang(load_slang_map(path)?);
        }
        if let Some(path) = &resources.roots {
            cleaner = cleaner.with_stemmer(Stemmer::new().with_roots(load_word_list(path)?));
        }
        Ok(cleaner)
    }

    fn load_vectorizer(&self) -> Result<Vectorizer> {
        let table = EmbeddingTable::load(&self.config.embedding_path)?;
        if table.dimension() == 0 {
            return Err(Error::config("embedding table is empty"));
        }
        Ok(Vectorizer::new(self.build_cleaner()?, table))
    }

    fn load_model(&self, id: ModelId) -> Result<Arc<dyn Classifier>> {
        let path = self.config.artifact_path(id.into());
        let classifier: Arc<dyn Classifier> = match id {
            ModelId::Lexicon => Arc::new(LexiconClassifier::load_dir(&path)?),
            ModelId::LogisticRegression | ModelId::NaiveBayes | ModelId::Svm | ModelId::Knn => {
                Arc::new(VectorClassifier::new(TrainedModel::load(&path, id)?))
            }
        };
        Ok(classifier)
    }

    /// Load the vectorizer and every ensemble member from disk.
    ///
    /// Members that fail to load are logged and left unloaded; the registry
    /// keeps serving whatever did load. Returns the number of loaded members.
    pub fn load_all(&self) -> usize {
        info!(
            "Initializing model registry with {} models",
            self.config.ensemble.len()
        );

        match self.load_vectorizer() {
            Ok(vectorizer) => {
                info!(dimension = vectorizer.dimension(), "Loaded embedding table");
                *self.vectorizer.write() = Some(Arc::new(vectorizer));
            }
            Err(e) => {
                warn!(
                    path = ?self.config.embedding_path,
                    error = %e,
                    "Failed to load embedding table, vector models will not contribute"
                );
                *self.vectorizer.write() = None;
            }
        }

        let mut loaded = HashMap::new();
        for id in &self.config.ensemble {
            match self.load_model(*id) {
                Ok(classifier) => {
                    info!(model = %id, "Loaded model");
                    loaded.insert(*id, classifier);
                }
                Err(e) => warn!(model = %id, error = %e, "Failed to load model"),
            }
        }

        let count = loaded.len();
        *self.models.write() = loaded;
        info!(
            "Model registry initialized with {}/{} models",
            count,
            self.config.ensemble.len()
        );
        count
    }

    /// Drop the in-memory copy of an artifact so its file can be replaced
    pub fn unload(&self, kind: ArtifactKind) {
        match kind {
            ArtifactKind::Embedding => {
                self.vectorizer.write().take();
            }
            ArtifactKind::LabelEncoder => {}
            ArtifactKind::LogisticRegression
            | ArtifactKind::NaiveBayes
            | ArtifactKind::Svm
            | ArtifactKind::Knn
            | ArtifactKind::Lexicon => {
                if let Some(id) = kind.model_id() {
                    self.models.write().remove(&id);
                }
            }
        }
        info!(artifact = %kind, "Unloaded artifact");
    }

    /// Reload everything from disk
    pub fn reload(&self) -> usize {
        self.load_all()
    }

    /// Register an in-memory classifier, replacing any loaded one
    pub fn insert(&self, classifier: Arc<dyn Classifier>) {
        self.models.write().insert(classifier.id(), classifier);
    }

    /// Install an in-memory vectorizer
    pub fn set_vectorizer(&self, vectorizer: Vectorizer) {
        *self.vectorizer.write() = Some(Arc::new(vectorizer));
    }

    pub fn get(&self, id: ModelId) -> Result<Arc<dyn Classifier>> {
        self.models
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::unavailable(format!("model '{}' is not loaded", id)))
    }

    /// The loaded vectorizer, needed by training
    pub fn vectorizer(&self) -> Result<Arc<Vectorizer>> {
        self.vectorizer
            .read()
            .clone()
            .ok_or_else(|| Error::unavailable("embedding table is not loaded"))
    }

    pub fn threshold(&self) -> f32 {
        *self.threshold.read()
    }

    pub fn set_threshold(&self, threshold: f32) -> Result<()> {
        validate_threshold(threshold)?;
        *self.threshold.write() = threshold;
        info!(threshold, "Decision threshold updated");
        Ok(())
    }

    /// Snapshot of the active (non-hidden) ensemble for scoring
    pub fn scorer(&self) -> EnsembleScorer {
        let models = self.models.read();
        let members = self
            .config
            .active_members()
            .into_iter()
            .map(|id| (id, models.get(&id).cloned()))
            .collect();
        EnsembleScorer::new(members, self.vectorizer.read().clone(), self.threshold())
    }

    pub fn status(&self) -> Vec<ModelStatus> {
        let models = self.models.read();
        self.config
            .ensemble
            .iter()
            .map(|id| ModelStatus {
                model: *id,
                loaded: models.contains_key(id),
                hidden: self.config.hidden.contains(id),
            })
            .collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.models.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::test_support::FixedClassifier;
    use crate::estimators::test_data::separable;

    fn write_models(config: &ClassifierConfig) {
        std::fs::create_dir_all(&config.models_dir).unwrap();
        std::fs::write(&config.embedding_path, "2 2\njihad 1.0 0.8\ndamai -1.0 -0.9\n").unwrap();
        let (x, y) = separable(6);
        let mut model = TrainedModel::for_model(ModelId::LogisticRegression).unwrap();
        model.fit(&x, &y).unwrap();
        std::fs::write(
            config.artifact_path(ArtifactKind::LogisticRegression),
            model.to_json().unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_load_all_skips_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClassifierConfig::with_models_dir(dir.path());
        write_models(&config);

        let registry = ModelRegistry::new(config);
        assert_eq!(registry.load_all(), 1);
        assert!(registry.get(ModelId::LogisticRegression).is_ok());
        assert!(matches!(
            registry.get(ModelId::Svm),
            Err(Error::ResourceUnavailable(_))
        ));
        assert!(registry.vectorizer().is_ok());

        let score = registry.scorer().score("jihad");
        assert_eq!(score.predictions.len(), 1);
        assert_eq!(score.skipped.len(), 4);
    }

    #[test]
    fn test_unload_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClassifierConfig::with_models_dir(dir.path());
        write_models(&config);
        let registry = ModelRegistry::new(config);
        registry.load_all();

        registry.unload(ArtifactKind::LogisticRegression);
        registry.unload(ArtifactKind::Embedding);
        assert_eq!(registry.loaded_count(), 0);
        assert!(registry.vectorizer().is_err());

        assert_eq!(registry.reload(), 1);
        assert!(registry.vectorizer().is_ok());
    }

    #[test]
    fn test_threshold_validation() {
        let registry = ModelRegistry::new(ClassifierConfig::default());
        assert_eq!(registry.threshold(), 0.5);
        registry.set_threshold(0.8).unwrap();
        assert_eq!(registry.scorer().threshold(), 0.8);
        assert!(registry.set_threshold(-0.1).is_err());
        assert!(registry.set_threshold(1.01).is_err());
        assert_eq!(registry.threshold(), 0.8);
    }

    #[test]
    fn test_hidden_members_are_left_out_of_scoring() {
        let config = ClassifierConfig {
            hidden: vec![ModelId::Lexicon],
            ..Default::default()
        };
        let registry = ModelRegistry::new(config);
        registry.insert(Arc::new(FixedClassifier {
            id: ModelId::Lexicon,
            probability: 0.9,
        }));

        let scorer = registry.scorer();
        assert!(!scorer.model_ids().contains(&ModelId::Lexicon));
        let status = registry.status();
        assert!(status.iter().any(|s| s.model == ModelId::Lexicon && s.loaded && s.hidden));
    }
}
