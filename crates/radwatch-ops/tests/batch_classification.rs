//! Batch classification runs over an in-memory store

mod common;

use common::{fixture, Fixture};
use radwatch_core::{Error, Label, ModelId, Result};
use radwatch_ops::store::{ClassificationBatch, ClassificationResult, Dataset, Document, TrainingRecord};
use radwatch_ops::{
    BatchClassifier, BatchProgress, BatchStatus, InMemoryTaskStore, MemoryStore, Store, StoreSession, TaskStore,
};
use std::sync::Arc;

fn document(id: i64, dataset_id: i64, cleaned: Option<&str>) -> Document {
    Document {
        id,
        dataset_id,
        text: format!("raw text {}", id),
        cleaned_text: cleaned.map(str::to_string),
        classified: false,
    }
}

fn seed_forum(store: &MemoryStore) {
    store.insert_dataset(
        Dataset {
            id: 1,
            name: "forum".to_string(),
        },
        vec![
            document(10, 1, Some("jihad kafir bom")),
            document(11, 1, Some("xyzzy qwerty")),
            document(12, 1, None),
            document(13, 1, Some("minum kopi baca buku")),
        ],
    );
}

fn classifier(fx: &Fixture, store: Arc<dyn Store>) -> (BatchClassifier, Arc<InMemoryTaskStore<BatchProgress>>) {
    let progress = Arc::new(InMemoryTaskStore::new());
    (
        BatchClassifier::new(progress.clone(), fx.registry.clone(), store),
        progress,
    )
}

#[tokio::test]
async fn test_batch_scores_targets_and_counts_votes() {
    let fx = fixture().with_all_models();
    seed_forum(&fx.store);
    let (batches, _) = classifier(&fx, fx.store.clone());

    assert_eq!(batches.status(1).unwrap().status, "not_started");
    let spawned = batches.start(1).unwrap();
    spawned.handle.await.unwrap();

    let view = batches.status(1).unwrap();
    assert_eq!(view.status, "completed");
    assert_eq!(view.total_items, 3);
    assert_eq!(view.processed_items, 3);
    assert_eq!(view.progress_percentage, 100);
    assert_eq!(view.batch_id.as_deref(), Some(spawned.id.as_str()));

    let session = fx.store.session().unwrap();
    assert_eq!(session.results_for(10).unwrap().len(), 5);
    assert!(session
        .results_for(10)
        .unwrap()
        .iter()
        .all(|r| r.label == Label::Radical));

    // No embedding signal: only the raw-text model answers
    let silent = session.results_for(11).unwrap();
    assert_eq!(silent.len(), 1);
    assert_eq!(silent[0].model, ModelId::Lexicon);
    assert_eq!(silent[0].label, Label::NonRadical);

    assert!(session.results_for(12).unwrap().is_empty());
    assert!(!fx.store.document(12).unwrap().classified);
    assert!(fx.store.document(13).unwrap().classified);

    let batch = session.latest_batch(1).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.positive_count, 1);
    assert_eq!(batch.negative_count, 2);
    assert_eq!(batch.models, ModelId::ALL.to_vec());
    assert!(batch.completed_at.is_some());
    drop(session);
    assert_eq!(fx.store.open_sessions(), 0);
}

#[tokio::test]
async fn test_status_falls_back_to_durable_batch() {
    let fx = fixture().with_all_models();
    seed_forum(&fx.store);
    let (batches, _) = classifier(&fx, fx.store.clone());
    batches.start(1).unwrap().handle.await.unwrap();

    let (restarted, _) = classifier(&fx, fx.store.clone());
    let view = restarted.status(1).unwrap();
    assert_eq!(view.status, "completed");
    assert_eq!(view.processed_items, 3);
    assert_eq!(view.progress_percentage, 100);

    // Everything is classified now, so a second run has nothing to do
    let again = restarted.start(1).unwrap();
    again.handle.await.unwrap();
    let view = restarted.status(1).unwrap();
    assert_eq!(view.total_items, 0);
    assert_eq!(view.progress_percentage, 100);
}

#[tokio::test]
async fn test_start_rules() {
    let fx = fixture().with_all_models();
    seed_forum(&fx.store);
    let (batches, progress) = classifier(&fx, fx.store.clone());

    assert!(matches!(batches.start(99), Err(Error::NotFound(_))));
    assert!(matches!(batches.status(99), Err(Error::NotFound(_))));

    let now = chrono::Utc::now();
    progress.set(
        "1",
        BatchProgress {
            dataset_id: 1,
            batch_id: "running".to_string(),
            status: BatchStatus::Processing,
            total_items: 3,
            processed_items: 1,
            created_at: now,
            updated_at: now,
        },
    );
    assert!(matches!(batches.start(1), Err(Error::Conflict(_))));
    assert_eq!(batches.status(1).unwrap().progress_percentage, 33);
}

#[tokio::test]
async fn test_start_needs_loaded_models() {
    let fx = fixture();
    seed_forum(&fx.store);
    let (batches, _) = classifier(&fx, fx.store.clone());
    assert!(matches!(batches.start(1), Err(Error::ResourceUnavailable(_))));
}

/// Store whose sessions refuse to write results for one document
struct FailingStore {
    inner: Arc<MemoryStore>,
    poisoned: i64,
}

struct FailingSession<'a> {
    inner: Box<dyn StoreSession + 'a>,
    poisoned: i64,
}

impl Store for FailingStore {
    fn session(&self) -> Result<Box<dyn StoreSession + '_>> {
        Ok(Box::new(FailingSession {
            inner: self.inner.session()?,
            poisoned: self.poisoned,
        }))
    }
}

impl StoreSession for FailingSession<'_> {
    fn dataset(&self, id: i64) -> Result<Option<Dataset>> {
        self.inner.dataset(id)
    }

    fn target_documents(&self, dataset_id: i64) -> Result<Vec<Document>> {
        self.inner.target_documents(dataset_id)
    }

    fn replace_results(&mut self, document_id: i64, results: &[ClassificationResult]) -> Result<()> {
        if document_id == self.poisoned {
            return Err(Error::internal("disk full"));
        }
        self.inner.replace_results(document_id, results)
    }

    fn results_for(&self, document_id: i64) -> Result<Vec<ClassificationResult>> {
        self.inner.results_for(document_id)
    }

    fn mark_classified(&mut self, document_id: i64) -> Result<()> {
        self.inner.mark_classified(document_id)
    }

    fn insert_batch(&mut self, batch: &ClassificationBatch) -> Result<()> {
        self.inner.insert_batch(batch)
    }

    fn update_batch(&mut self, batch: &ClassificationBatch) -> Result<()> {
        self.inner.update_batch(batch)
    }

    fn latest_batch(&self, dataset_id: i64) -> Result<Option<ClassificationBatch>> {
        self.inner.latest_batch(dataset_id)
    }

    fn insert_training_record(&mut self, record: &TrainingRecord) -> Result<()> {
        self.inner.insert_training_record(record)
    }

    fn training_records(&self) -> Result<Vec<TrainingRecord>> {
        self.inner.training_records()
    }
}

#[tokio::test]
async fn test_store_error_marks_batch_failed_and_keeps_partial_results() {
    let fx = fixture().with_all_models();
    seed_forum(&fx.store);
    let failing = Arc::new(FailingStore {
        inner: fx.store.clone(),
        poisoned: 11,
    });
    let (batches, _) = classifier(&fx, failing);

    batches.start(1).unwrap().handle.await.unwrap();

    let view = batches.status(1).unwrap();
    assert_eq!(view.status, "error");
    assert_eq!(view.processed_items, 1);

    let session = fx.store.session().unwrap();
    assert_eq!(session.results_for(10).unwrap().len(), 5);
    assert!(fx.store.document(10).unwrap().classified);
    assert!(!fx.store.document(11).unwrap().classified);
    assert!(!fx.store.document(13).unwrap().classified);

    let batch = session.latest_batch(1).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Error);
    assert!(batch.error.unwrap().contains("disk full"));
    assert_eq!(batch.positive_count, 1);
    drop(session);
    assert_eq!(fx.store.open_sessions(), 0);
}

#[tokio::test]
async fn test_failed_batch_counts_unlabelled_documents_as_processed() {
    let fx = fixture();
    fx.install_vector_models();
    fx.registry.reload();
    seed_forum(&fx.store);
    let failing: Arc<dyn Store> = Arc::new(FailingStore {
        inner: fx.store.clone(),
        poisoned: 13,
    });
    let (batches, _) = classifier(&fx, failing.clone());
    batches.start(1).unwrap().handle.await.unwrap();

    // Document 11 has no in-vocabulary words, so no member votes on it
    let batch = fx.store.session().unwrap().latest_batch(1).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Error);
    assert_eq!(batch.processed_items, 2);
    assert_eq!(batch.positive_count + batch.negative_count, 1);

    // A fresh classifier has no live progress and reads the durable record
    let (restarted, _) = classifier(&fx, failing);
    let view = restarted.status(1).unwrap();
    assert_eq!(view.status, "error");
    assert_eq!(view.processed_items, 2);
    assert_eq!(view.progress_percentage, 66);
}

#[test]
fn test_classify_text() {
    let fx = fixture().with_all_models();
    let (batches, _) = classifier(&fx, fx.store.clone());

    assert!(matches!(batches.classify_text("   "), Err(Error::Validation(_))));

    let score = batches.classify_text("Jihad melawan kafir! #perang").unwrap();
    assert_eq!(score.predictions.len(), 5);
    assert_eq!(score.aggregate, Some(Label::Radical));

    let neutral = batches.classify_text("minum kopi dan baca buku").unwrap();
    assert_eq!(neutral.aggregate, Some(Label::NonRadical));
}
