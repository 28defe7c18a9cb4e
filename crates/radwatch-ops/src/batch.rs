//! Batch classification of every cleaned, unclassified document of a dataset
//!
//! `start` snapshots the active ensemble so the whole run scores with one set
//! of models and one threshold. The worker writes results through its own
//! store session and keeps the partial results if it stops on an error.

use crate::store::{ClassificationBatch, ClassificationResult, Document, Store};
use crate::task::{new_task_id, panic_message, percentage, BatchProgress, BatchStatus, Spawned};
use crate::task_store::TaskStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use radwatch_classifiers::{DocumentScore, EnsembleScorer, ModelRegistry};
use radwatch_core::{Error, Label, Result};
use radwatch_telemetry::metrics::{self as telemetry, TaskKind, TaskOutcome};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Progress of the most recent run for a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStatusView {
    /// `processing`, `completed`, `error` or `not_started`
    pub status: String,
    pub total_items: u64,
    pub processed_items: u64,
    pub progress_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl BatchStatusView {
    fn not_started() -> Self {
        Self {
            status: "not_started".to_string(),
            total_items: 0,
            processed_items: 0,
            progress_percentage: 0,
            batch_id: None,
        }
    }
}

fn status_name(status: BatchStatus) -> &'static str {
    match status {
        BatchStatus::Processing => "processing",
        BatchStatus::Completed => "completed",
        BatchStatus::Error => "error",
    }
}

/// Runs batch classifications, at most one per dataset at a time
pub struct BatchClassifier {
    progress: Arc<dyn TaskStore<BatchProgress>>,
    registry: Arc<ModelRegistry>,
    store: Arc<dyn Store>,
    starting: Mutex<()>,
}

impl BatchClassifier {
    pub fn new(
        progress: Arc<dyn TaskStore<BatchProgress>>,
        registry: Arc<ModelRegistry>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            progress,
            registry,
            store,
            starting: Mutex::new(()),
        }
    }

    /// Start classifying the dataset's pending documents in the background
    pub fn start(&self, dataset_id: i64) -> Result<Spawned> {
        // Serializes the conflict check with the insert of the progress record
        let _guard = self.starting.lock();
        let key = dataset_id.to_string();

        let mut session = self.store.session()?;
        if session.dataset(dataset_id)?.is_none() {
            return Err(Error::not_found(format!("dataset {}", dataset_id)));
        }
        if let Some(running) = self.progress.get(&key) {
            if running.status == BatchStatus::Processing {
                return Err(Error::conflict(format!(
                    "dataset {} is already being classified by batch '{}'",
                    dataset_id, running.batch_id
                )));
            }
        }

        let scorer = self.registry.scorer();
        if scorer.loaded_count() == 0 {
            return Err(Error::unavailable("no classification models are loaded"));
        }
        let documents = session.target_documents(dataset_id)?;

        let now = Utc::now();
        let batch = ClassificationBatch {
            id: new_task_id(),
            dataset_id,
            models: scorer.model_ids(),
            total_items: documents.len() as u64,
            status: BatchStatus::Processing,
            processed_items: 0,
            positive_count: 0,
            negative_count: 0,
            started_at: now,
            completed_at: None,
            error: None,
        };
        session.insert_batch(&batch)?;
        drop(session);

        self.progress.set(
            &key,
            BatchProgress {
                dataset_id,
                batch_id: batch.id.clone(),
                status: BatchStatus::Processing,
                total_items: batch.total_items,
                processed_items: 0,
                created_at: now,
                updated_at: now,
            },
        );
        telemetry::task_started(TaskKind::Batch);
        info!(
            dataset_id,
            batch_id = %batch.id,
            documents = batch.total_items,
            models = scorer.loaded_count(),
            "Batch classification started"
        );

        let id = batch.id.clone();
        let worker = BatchWorker {
            key,
            batch,
            documents,
            scorer,
            store: self.store.clone(),
            progress: self.progress.clone(),
        };
        let handle = tokio::task::spawn_blocking(move || worker.run());
        Ok(Spawned { id, handle })
    }

    /// Progress of the dataset's current or most recent run
    pub fn status(&self, dataset_id: i64) -> Result<BatchStatusView> {
        if let Some(progress) = self.progress.get(&dataset_id.to_string()) {
            return Ok(BatchStatusView {
                status: status_name(progress.status).to_string(),
                total_items: progress.total_items,
                processed_items: progress.processed_items,
                progress_percentage: percentage(progress.processed_items, progress.total_items),
                batch_id: Some(progress.batch_id),
            });
        }

        let session = self.store.session()?;
        if session.dataset(dataset_id)?.is_none() {
            return Err(Error::not_found(format!("dataset {}", dataset_id)));
        }
        Ok(match session.latest_batch(dataset_id)? {
            Some(batch) => {
                let processed = match batch.status {
                    BatchStatus::Completed => batch.total_items,
                    BatchStatus::Processing | BatchStatus::Error => batch.processed_items,
                };
                BatchStatusView {
                    status: status_name(batch.status).to_string(),
                    total_items: batch.total_items,
                    processed_items: processed,
                    progress_percentage: percentage(processed, batch.total_items),
                    batch_id: Some(batch.id),
                }
            }
            None => BatchStatusView::not_started(),
        })
    }

    /// Score one text against the active ensemble right away
    pub fn classify_text(&self, text: &str) -> Result<DocumentScore> {
        if text.trim().is_empty() {
            return Err(Error::validation("text must not be empty"));
        }
        Ok(self.registry.scorer().score(text))
    }

    /// Drop finished progress records older than `cutoff`
    pub fn purge_expired(&self, cutoff: DateTime<Utc>) -> usize {
        self.progress.purge(cutoff).len()
    }
}

/// Store rows for every prediction in `score`
pub fn result_rows(document_id: i64, score: &DocumentScore, at: DateTime<Utc>) -> Vec<ClassificationResult> {
    score
        .predictions
        .iter()
        .map(|p| ClassificationResult {
            document_id,
            model: p.model,
            label: p.label,
            positive_probability: p.positive_probability,
            negative_probability: p.negative_probability,
            created_at: at,
        })
        .collect()
}

struct BatchWorker {
    key: String,
    batch: ClassificationBatch,
    documents: Vec<Document>,
    scorer: EnsembleScorer,
    store: Arc<dyn Store>,
    progress: Arc<dyn TaskStore<BatchProgress>>,
}

impl BatchWorker {
    fn run(mut self) {
        let result = catch_unwind(AssertUnwindSafe(|| self.process()))
            .unwrap_or_else(|payload| Err(Error::internal(panic_message(payload))));

        self.batch.completed_at = Some(Utc::now());
        let outcome = match &result {
            Ok(()) => {
                self.batch.status = BatchStatus::Completed;
                info!(
                    batch_id = %self.batch.id,
                    positive = self.batch.positive_count,
                    negative = self.batch.negative_count,
                    "Batch classification completed"
                );
                TaskOutcome::Completed
            }
            Err(e) => {
                self.batch.status = BatchStatus::Error;
                self.batch.error = Some(e.to_string());
                error!(batch_id = %self.batch.id, error = %e, "Batch classification failed");
                TaskOutcome::Failed
            }
        };

        let saved = self
            .store
            .session()
            .and_then(|mut session| session.update_batch(&self.batch));
        if let Err(e) = saved {
            warn!(batch_id = %self.batch.id, error = %e, "Failed to save batch record");
        }

        let status = self.batch.status;
        if let Err(e) = self.progress.update(&self.key, &mut |p| p.status = status) {
            warn!(batch_id = %self.batch.id, error = %e, "Failed to finish batch progress");
        }
        telemetry::task_finished(TaskKind::Batch, outcome);
    }

    fn process(&mut self) -> Result<()> {
        let mut session = self.store.session()?;

        for document in &self.documents {
            let text = document.cleaned_text.as_deref().unwrap_or(&document.text);
            let score = self.scorer.score(text);
            debug!(
                document_id = document.id,
                contributing = score.predictions.len(),
                skipped = score.skipped.len(),
                "Scored document"
            );

            session.replace_results(document.id, &result_rows(document.id, &score, Utc::now()))?;
            session.mark_classified(document.id)?;

            match score.aggregate {
                Some(Label::Radical) => self.batch.positive_count += 1,
                Some(Label::NonRadical) => self.batch.negative_count += 1,
                None => {}
            }
            self.batch.processed_items += 1;
            telemetry::documents_classified(1);
            let processed = self.batch.processed_items;
            if let Err(e) = self.progress.update(&self.key, &mut |p| p.processed_items = processed) {
                debug!(batch_id = %self.batch.id, error = %e, "Progress update refused");
            }
        }
        Ok(())
    }
}
