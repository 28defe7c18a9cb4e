//! Store interface for datasets, documents, results, batches and training records
//!
//! Workers open a [`StoreSession`] on their own thread and drop it when they
//! return, whatever the outcome.

use crate::task::{BatchStatus, ModelOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use radwatch_core::{Error, Label, ModelId, Result};
use radwatch_telemetry::{AuditEvent, AuditSeverity, AuditWriter, JournalConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub dataset_id: i64,
    pub text: String,
    #[serde(default)]
    pub cleaned_text: Option<String>,
    #[serde(default)]
    pub classified: bool,
}

impl Document {
    /// Cleaned and not yet classified
    pub fn is_batch_target(&self) -> bool {
        self.cleaned_text.is_some() && !self.classified
    }
}

/// One model's decision for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub document_id: i64,
    pub model: ModelId,
    pub label: Label,
    pub positive_probability: f32,
    pub negative_probability: f32,
    pub created_at: DateTime<Utc>,
}

/// Durable record of a batch classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationBatch {
    pub id: String,
    pub dataset_id: i64,
    pub models: Vec<ModelId>,
    pub total_items: u64,
    pub status: BatchStatus,
    /// Documents scored so far, with or without a majority label
    #[serde(default)]
    pub processed_items: u64,
    pub positive_count: u64,
    pub negative_count: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Samples per class after validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub non_radical: u64,
    pub radical: u64,
}

impl ClassCounts {
    pub fn from_labels(labels: &[Label]) -> Self {
        let radical = labels.iter().filter(|l| l.is_positive()).count() as u64;
        Self {
            non_radical: labels.len() as u64 - radical,
            radical,
        }
    }

    pub fn total(&self) -> u64 {
        self.non_radical + self.radical
    }
}

/// Durable audit record of a deployed training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: String,
    pub requested_by: Option<String>,
    pub filename: String,
    pub col_text: String,
    pub col_label: String,
    pub sample_count: u64,
    pub class_counts: ClassCounts,
    pub outcomes: BTreeMap<ModelId, ModelOutcome>,
    pub deployed: bool,
    pub created_at: DateTime<Utc>,
}

/// Source of sessions
pub trait Store: Send + Sync {
    fn session(&self) -> Result<Box<dyn StoreSession + '_>>;
}

/// Unit of store access owned by one thread
pub trait StoreSession {
    fn dataset(&self, id: i64) -> Result<Option<Dataset>>;

    /// Documents of the dataset that are cleaned and not yet classified
    fn target_documents(&self, dataset_id: i64) -> Result<Vec<Document>>;

    /// Delete the document's previous results and insert `results`
    fn replace_results(&mut self, document_id: i64, results: &[ClassificationResult]) -> Result<()>;

    fn results_for(&self, document_id: i64) -> Result<Vec<ClassificationResult>>;

    fn mark_classified(&mut self, document_id: i64) -> Result<()>;

    fn insert_batch(&mut self, batch: &ClassificationBatch) -> Result<()>;

    fn update_batch(&mut self, batch: &ClassificationBatch) -> Result<()>;

    /// Most recently started batch of the dataset
    fn latest_batch(&self, dataset_id: i64) -> Result<Option<ClassificationBatch>>;

    fn insert_training_record(&mut self, record: &TrainingRecord) -> Result<()>;

    fn training_records(&self) -> Result<Vec<TrainingRecord>>;
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// YAML or JSON file with datasets and documents loaded at startup
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// Directory of the audit journal; no journal when unset
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
}

/// Seed file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub datasets: Vec<SeedDataset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedDataset {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub documents: Vec<SeedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedDocument {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub cleaned_text: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    datasets: BTreeMap<i64, Dataset>,
    documents: BTreeMap<i64, Document>,
    results: HashMap<i64, Vec<ClassificationResult>>,
    batches: Vec<ClassificationBatch>,
    training_records: Vec<TrainingRecord>,
}

/// In-process store, optionally journaling batches and training records
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    journal: Option<Mutex<AuditWriter>>,
    open_sessions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            journal: None,
            open_sessions: AtomicUsize::new(0),
        }
    }

    /// Journal batch and training records to `dir`
    pub fn with_journal(mut self, dir: impl Into<PathBuf>) -> Result<Self> {
        let writer = AuditWriter::open(JournalConfig::new(dir))?;
        self.journal = Some(Mutex::new(writer));
        Ok(self)
    }

    pub fn from_settings(settings: &StoreSettings) -> Result<Self> {
        let mut store = Self::new();
        if let Some(dir) = &settings.journal_dir {
            store = store.with_journal(dir)?;
        }
        if let Some(path) = &settings.seed_file {
            let seed = load_seed(path)?;
            let datasets = seed.datasets.len();
            store.seed(seed);
            info!(datasets, path = ?path, "Seeded store");
        }
        Ok(store)
    }

    pub fn seed(&self, seed: SeedData) {
        for dataset in seed.datasets {
            let documents = dataset
                .documents
                .into_iter()
                .map(|d| Document {
                    id: d.id,
                    dataset_id: dataset.id,
                    text: d.text,
                    cleaned_text: d.cleaned_text,
                    classified: false,
                })
                .collect();
            self.insert_dataset(
                Dataset {
                    id: dataset.id,
                    name: dataset.name,
                },
                documents,
            );
        }
    }

    pub fn insert_dataset(&self, dataset: Dataset, documents: Vec<Document>) {
        let mut state = self.state.lock();
        for document in documents {
            state.documents.insert(document.id, document);
        }
        state.datasets.insert(dataset.id, dataset);
    }

    pub fn document(&self, id: i64) -> Option<Document> {
        self.state.lock().documents.get(&id).cloned()
    }

    /// Sessions currently alive
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    fn journal(&self, event: AuditEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.lock().write_event(event) {
                warn!(error = %e, "Failed to write audit journal");
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn load_seed(path: &Path) -> Result<SeedData> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path.extension().is_some_and(|e| e == "json");
    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse seed file {:?}: {}", path, e)))
    }
}

impl Store for MemoryStore {
    fn session(&self) -> Result<Box<dyn StoreSession + '_>> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession { store: self }))
    }
}

struct MemorySession<'a> {
    store: &'a MemoryStore,
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        self.store.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StoreSession for MemorySession<'_> {
    fn dataset(&self, id: i64) -> Result<Option<Dataset>> {
        Ok(self.store.state.lock().datasets.get(&id).cloned())
    }

    fn target_documents(&self, dataset_id: i64) -> Result<Vec<Document>> {
        Ok(self
            .store
            .state
            .lock()
            .documents
            .values()
            .filter(|d| d.dataset_id == dataset_id && d.is_batch_target())
            .cloned()
            .collect())
    }

    fn replace_results(&mut self, document_id: i64, results: &[ClassificationResult]) -> Result<()> {
        let mut state = self.store.state.lock();
        if !state.documents.contains_key(&document_id) {
            return Err(Error::not_found(format!("document {}", document_id)));
        }
        state.results.insert(document_id, results.to_vec());
        Ok(())
    }

    fn results_for(&self, document_id: i64) -> Result<Vec<ClassificationResult>> {
        Ok(self
            .store
            .state
            .lock()
            .results
            .get(&document_id)
            .cloned()
            .unwrap_or_default())
    }

    fn mark_classified(&mut self, document_id: i64) -> Result<()> {
        let mut state = self.store.state.lock();
        let document = state
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| Error::not_found(format!("document {}", document_id)))?;
        document.classified = true;
        Ok(())
    }

    fn insert_batch(&mut self, batch: &ClassificationBatch) -> Result<()> {
        self.store.state.lock().batches.push(batch.clone());
        self.store.journal(
            AuditEvent::new("batch_started")
                .with_subject(batch.id.clone())
                .with_data(batch),
        );
        Ok(())
    }

    fn update_batch(&mut self, batch: &ClassificationBatch) -> Result<()> {
        {
            let mut state = self.store.state.lock();
            let existing = state
                .batches
                .iter_mut()
                .find(|b| b.id == batch.id)
                .ok_or_else(|| Error::not_found(format!("batch '{}'", batch.id)))?;
            *existing = batch.clone();
        }
        let (event_type, severity) = match batch.status {
            BatchStatus::Processing => return Ok(()),
            BatchStatus::Completed => ("batch_completed", AuditSeverity::Info),
            BatchStatus::Error => ("batch_failed", AuditSeverity::Error),
        };
        self.store.journal(
            AuditEvent::new(event_type)
                .with_subject(batch.id.clone())
                .with_data(batch)
                .with_severity(severity),
        );
        Ok(())
    }

    fn latest_batch(&self, dataset_id: i64) -> Result<Option<ClassificationBatch>> {
        Ok(self
            .store
            .state
            .lock()
            .batches
            .iter()
            .filter(|b| b.dataset_id == dataset_id)
            .max_by_key(|b| b.started_at)
            .cloned())
    }

    fn insert_training_record(&mut self, record: &TrainingRecord) -> Result<()> {
        self.store.state.lock().training_records.push(record.clone());
        self.store.journal(
            AuditEvent::new("training_recorded")
                .with_subject(record.id.clone())
                .with_data(record),
        );
        Ok(())
    }

    fn training_records(&self) -> Result<Vec<TrainingRecord>> {
        Ok(self.store.state.lock().training_records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64, cleaned: Option<&str>) -> Document {
        Document {
            id,
            dataset_id: 1,
            text: format!("doc {}", id),
            cleaned_text: cleaned.map(str::to_string),
            classified: false,
        }
    }

    #[test]
    fn test_targets_are_cleaned_unclassified_documents() {
        let store = MemoryStore::new();
        store.insert_dataset(
            Dataset { id: 1, name: "d".into() },
            vec![doc(1, Some("a")), doc(2, None), doc(3, Some("c"))],
        );

        let mut session = store.session().unwrap();
        session.mark_classified(3).unwrap();
        let targets: Vec<i64> = session.target_documents(1).unwrap().iter().map(|d| d.id).collect();
        assert_eq!(targets, vec![1]);
        assert!(session.dataset(2).unwrap().is_none());
    }

    #[test]
    fn test_sessions_are_counted_until_dropped() {
        let store = MemoryStore::new();
        {
            let _a = store.session().unwrap();
            let _b = store.session().unwrap();
            assert_eq!(store.open_sessions(), 2);
        }
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn test_replace_results_supersedes_previous() {
        let store = MemoryStore::new();
        store.insert_dataset(Dataset { id: 1, name: "d".into() }, vec![doc(1, Some("a"))]);
        let result = |model| ClassificationResult {
            document_id: 1,
            model,
            label: Label::Radical,
            positive_probability: 0.9,
            negative_probability: 0.1,
            created_at: Utc::now(),
        };

        let mut session = store.session().unwrap();
        session
            .replace_results(1, &[result(ModelId::Svm), result(ModelId::Knn)])
            .unwrap();
        session.replace_results(1, &[result(ModelId::Lexicon)]).unwrap();
        let stored = session.results_for(1).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].model, ModelId::Lexicon);
        assert!(session.replace_results(99, &[]).is_err());
    }

    #[test]
    fn test_seed_file_and_journal() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("seed.yaml");
        std::fs::write(
            &seed,
            "datasets:\n  - id: 7\n    name: forum\n    documents:\n      - id: 70\n        text: Halo\n        cleaned_text: halo\n",
        )
        .unwrap();
        let settings = StoreSettings {
            seed_file: Some(seed),
            journal_dir: Some(dir.path().join("journal")),
        };
        let store = MemoryStore::from_settings(&settings).unwrap();

        let mut session = store.session().unwrap();
        assert_eq!(session.dataset(7).unwrap().unwrap().name, "forum");
        assert_eq!(session.target_documents(7).unwrap().len(), 1);

        let mut batch = ClassificationBatch {
            id: "b1".into(),
            dataset_id: 7,
            models: vec![ModelId::Svm],
            total_items: 1,
            status: BatchStatus::Processing,
            processed_items: 0,
            positive_count: 0,
            negative_count: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        session.insert_batch(&batch).unwrap();
        batch.status = BatchStatus::Completed;
        session.update_batch(&batch).unwrap();
        drop(session);
        drop(store);

        let events = radwatch_telemetry::read_journal(&dir.path().join("journal")).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["batch_started", "batch_completed"]);
        assert!(radwatch_telemetry::verify_chain(&events));
    }
}
