//! Training pipeline: validate, vectorize, split, fit each model, optionally deploy
//!
//! The whole run happens on one blocking worker. A model that fails to fit
//! is recorded and the others carry on; invalid data stops the run before
//! anything is fitted or written.

use crate::dataset::{resolve_dataset_path, LabeledDataset, Table};
use crate::installer::ModelInstaller;
use crate::split::{stratified_split, Split};
use crate::store::{ClassCounts, Store, TrainingRecord};
use crate::task::{
    new_task_id, panic_message, ModelOutcome, Spawned, TrainingMetadata, TrainingStatus, TrainingTask,
};
use crate::task_store::TaskStore;
use chrono::{DateTime, Utc};
use radwatch_classifiers::{label_for, EvaluationReport, LabelEncoder, ModelRegistry, TrainedModel};
use radwatch_core::{ArtifactKind, Error, Label, ModelId, Result};
use radwatch_telemetry::metrics::{self as telemetry, TaskKind, TaskOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Training pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Directory that dataset filenames are resolved against
    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: PathBuf,

    /// Share of each class held out for evaluation
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,

    /// Seed of the split shuffle
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Report vectorization progress every this many rows
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// How long finished runs stay pollable
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_datasets_dir() -> PathBuf {
    PathBuf::from("./datasets")
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_progress_interval() -> usize {
    100
}

fn default_retention_secs() -> u64 {
    3600
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            datasets_dir: default_datasets_dir(),
            test_ratio: default_test_ratio(),
            seed: default_seed(),
            progress_interval: default_progress_interval(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl TrainingSettings {
    pub fn with_datasets_dir(datasets_dir: impl Into<PathBuf>) -> Self {
        Self {
            datasets_dir: datasets_dir.into(),
            ..Self::default()
        }
    }
}

/// Fit `id` on the training rows and score it on the held-out rows
pub fn train_and_evaluate(
    id: ModelId,
    vectors: &[Vec<f32>],
    labels: &[Label],
    split: &Split,
    threshold: f32,
) -> Result<(TrainedModel, EvaluationReport)> {
    let mut model = TrainedModel::for_model(id)
        .ok_or_else(|| Error::classifier(format!("{} is not trainable", id)))?;

    let train_x: Vec<Vec<f32>> = split.train.iter().map(|i| vectors[*i].clone()).collect();
    let train_y: Vec<Label> = split.train.iter().map(|i| labels[*i]).collect();
    model.fit(&train_x, &train_y)?;

    let truth: Vec<Label> = split.test.iter().map(|i| labels[*i]).collect();
    let predicted = split
        .test
        .iter()
        .map(|i| {
            model
                .positive_probability(&vectors[*i])
                .map(|p| label_for(p, threshold))
        })
        .collect::<Result<Vec<Label>>>()?;

    Ok((model, EvaluationReport::evaluate(&truth, &predicted)))
}

/// Runs training jobs in the background
pub struct TrainingService {
    settings: TrainingSettings,
    tasks: Arc<dyn TaskStore<TrainingTask>>,
    registry: Arc<ModelRegistry>,
    installer: Arc<ModelInstaller>,
    store: Arc<dyn Store>,
}

impl TrainingService {
    pub fn new(
        settings: TrainingSettings,
        tasks: Arc<dyn TaskStore<TrainingTask>>,
        registry: Arc<ModelRegistry>,
        installer: Arc<ModelInstaller>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            settings,
            tasks,
            registry,
            installer,
            store,
        }
    }

    /// Check the request, create the task and start the worker
    pub fn start(&self, metadata: TrainingMetadata) -> Result<Spawned> {
        let blank: Vec<&str> = [("col_text", &metadata.col_text), ("col_label", &metadata.col_label)]
            .into_iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(name, _)| name)
            .collect();
        if !blank.is_empty() {
            return Err(Error::validation(format!("{} must not be empty", blank.join(", "))));
        }
        let path = resolve_dataset_path(&self.settings.datasets_dir, &metadata.filename)?;

        let id = new_task_id();
        self.tasks.set(&id, TrainingTask::new(id.clone(), metadata.clone()));
        telemetry::task_started(TaskKind::Training);
        info!(
            task_id = %id,
            filename = %metadata.filename,
            deploy = metadata.deploy,
            "Training started"
        );

        let worker = TrainingWorker {
            id: id.clone(),
            metadata,
            path,
            settings: self.settings.clone(),
            tasks: self.tasks.clone(),
            registry: self.registry.clone(),
            installer: self.installer.clone(),
            store: self.store.clone(),
        };
        let handle = tokio::task::spawn_blocking(move || worker.run());
        Ok(Spawned { id, handle })
    }

    pub fn status(&self, id: &str) -> Result<TrainingTask> {
        self.tasks
            .get(id)
            .ok_or_else(|| Error::not_found(format!("training task '{}'", id)))
    }

    /// Drop finished runs older than the retention window
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::seconds(self.settings.retention_secs as i64);
        let purged = self.tasks.purge(cutoff).len();
        if purged > 0 {
            info!(count = purged, "Purged expired training tasks");
        }
        purged
    }
}

struct TrainingWorker {
    id: String,
    metadata: TrainingMetadata,
    path: PathBuf,
    settings: TrainingSettings,
    tasks: Arc<dyn TaskStore<TrainingTask>>,
    registry: Arc<ModelRegistry>,
    installer: Arc<ModelInstaller>,
    store: Arc<dyn Store>,
}

/// What a finished run hands back to the task record
struct RunSummary {
    results: BTreeMap<ModelId, ModelOutcome>,
    message: String,
    degraded: bool,
}

impl TrainingWorker {
    fn run(self) {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.process()))
            .unwrap_or_else(|payload| Err(Error::internal(panic_message(payload))));

        let outcome = match result {
            Ok(summary) => {
                info!(task_id = %self.id, message = %summary.message, "Training completed");
                let outcome = if summary.degraded {
                    TaskOutcome::Degraded
                } else {
                    TaskOutcome::Completed
                };
                let RunSummary { results, message, .. } = summary;
                let mut results = Some(results);
                let recorded = self.tasks.update(&self.id, &mut |t| {
                    t.status = TrainingStatus::Completed;
                    t.progress = 100;
                    t.message = message.clone();
                    t.results = results.take();
                });
                if let Err(e) = recorded {
                    warn!(task_id = %self.id, error = %e, "Failed to record training result");
                }
                outcome
            }
            Err(e) => {
                error!(task_id = %self.id, error = %e, "Training failed");
                let recorded = self.tasks.update(&self.id, &mut |t| {
                    t.status = TrainingStatus::Error;
                    t.message = e.to_string();
                });
                if let Err(e) = recorded {
                    warn!(task_id = %self.id, error = %e, "Failed to record training error");
                }
                TaskOutcome::Failed
            }
        };

        telemetry::training_duration(started.elapsed());
        telemetry::task_finished(TaskKind::Training, outcome);
    }

    fn report(&self, progress: u8, message: &str) {
        let updated = self.tasks.update(&self.id, &mut |t| {
            t.progress = t.progress.max(progress);
            t.message = message.to_string();
        });
        if let Err(e) = updated {
            debug!(task_id = %self.id, error = %e, "Progress update refused");
        }
    }

    fn process(&self) -> Result<RunSummary> {
        self.report(5, "Validating data");
        let table = Table::load(&self.path)?;
        let dataset = LabeledDataset::from_table(&table, &self.metadata.col_text, &self.metadata.col_label)?;

        let vectors = self.vectorize(&dataset)?;

        self.report(50, "Splitting data");
        let split = stratified_split(&dataset.labels, self.settings.test_ratio, self.settings.seed)?;

        let members = self.registry.config().trainable_members();
        if members.is_empty() {
            return Err(Error::config("no trainable models in the ensemble"));
        }
        let threshold = self.registry.threshold();

        let mut results = BTreeMap::new();
        let mut trained = Vec::new();
        for (done, id) in members.iter().enumerate() {
            self.report(
                55 + ((done * 35) / members.len()) as u8,
                &format!("Training {}", id),
            );
            let fitted = catch_unwind(AssertUnwindSafe(|| {
                train_and_evaluate(*id, &vectors, &dataset.labels, &split, threshold)
            }))
            .unwrap_or_else(|payload| Err(Error::internal(panic_message(payload))));

            match fitted {
                Ok((_, metrics)) => {
                    info!(
                        task_id = %self.id,
                        model = %id,
                        accuracy = metrics.accuracy,
                        f1 = metrics.f1,
                        "Model evaluated"
                    );
                    results.insert(
                        *id,
                        ModelOutcome::Trained {
                            metrics,
                            deployment: None,
                        },
                    );
                    trained.push(*id);
                }
                Err(e) => {
                    warn!(task_id = %self.id, model = %id, error = %e, "Model training failed");
                    results.insert(*id, ModelOutcome::Failed { error: e.to_string() });
                }
            }
        }

        let mut degraded = trained.len() < members.len();
        let mut message = format!("Trained {} of {} models", trained.len(), members.len());

        if self.metadata.deploy && !trained.is_empty() {
            self.report(90, "Deploying models");
            let pending = self.deploy(&trained, &vectors, &dataset.labels, &mut results)?;
            degraded |= pending;
            message.push_str(", deployed");
            if pending {
                message.push_str(" (restart required for some models)");
            }
            self.record(&dataset, &results)?;
        }

        Ok(RunSummary {
            results,
            message,
            degraded,
        })
    }

    fn vectorize(&self, dataset: &LabeledDataset) -> Result<Vec<Vec<f32>>> {
        let vectorizer = self.registry.vectorizer()?;
        let total = dataset.len();
        let interval = self.settings.progress_interval.max(1);
        let mut vectors = Vec::with_capacity(total);

        for (done, text) in dataset.texts.iter().enumerate() {
            vectors.push(vectorizer.vectorize(text));
            if (done + 1) % interval == 0 || done + 1 == total {
                let progress = 10 + ((done + 1) * 40 / total) as u8;
                self.report(progress, &format!("Vectorizing {}/{}", done + 1, total));
            }
        }
        Ok(vectors)
    }

    /// Refit every evaluated model on all rows and install it.
    ///
    /// Returns whether any install was parked until restart.
    fn deploy(
        &self,
        trained: &[ModelId],
        vectors: &[Vec<f32>],
        labels: &[Label],
        results: &mut BTreeMap<ModelId, ModelOutcome>,
    ) -> Result<bool> {
        let mut pending = false;
        for id in trained {
            let deployed = TrainedModel::for_model(*id)
                .ok_or_else(|| Error::classifier(format!("{} is not trainable", id)))
                .and_then(|mut model| {
                    model.fit(vectors, labels)?;
                    model.to_json()
                })
                .and_then(|bytes| self.installer.install_bytes(ArtifactKind::from(*id), &bytes));

            let note = match deployed {
                Ok(outcome) => {
                    pending |= outcome.is_degraded();
                    outcome.message(ArtifactKind::from(*id))
                }
                Err(e) => {
                    warn!(task_id = %self.id, model = %id, error = %e, "Model deployment failed");
                    format!("deployment failed: {}", e)
                }
            };
            if let Some(ModelOutcome::Trained { deployment, .. }) = results.get_mut(id) {
                *deployment = Some(note);
            }
        }

        let encoder = self
            .installer
            .install_bytes(ArtifactKind::LabelEncoder, &LabelEncoder::binary().to_json()?)?;
        pending |= encoder.is_degraded();
        Ok(pending)
    }

    fn record(&self, dataset: &LabeledDataset, results: &BTreeMap<ModelId, ModelOutcome>) -> Result<()> {
        let record = TrainingRecord {
            id: self.id.clone(),
            requested_by: self.metadata.requested_by.clone(),
            filename: self.metadata.filename.clone(),
            col_text: self.metadata.col_text.clone(),
            col_label: self.metadata.col_label.clone(),
            sample_count: dataset.len() as u64,
            class_counts: ClassCounts::from_labels(&dataset.labels),
            outcomes: results.clone(),
            deployed: results.values().any(|o| {
                matches!(o, ModelOutcome::Trained { deployment: Some(note), .. } if !note.starts_with("deployment failed"))
            }),
            created_at: Utc::now(),
        };
        let mut session = self.store.session()?;
        session.insert_training_record(&record)
    }
}
