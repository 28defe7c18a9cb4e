//! Task records tracked by the task registry

use chrono::{DateTime, Utc};
use radwatch_classifiers::EvaluationReport;
use radwatch_core::{ArtifactKind, Error, ModelId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Behaviour the task store needs from every record
pub trait TaskRecord: Clone + Send + Sync + 'static {
    /// Terminal records accept no further updates and become purgeable
    fn is_terminal(&self) -> bool;

    /// Whether the record ended by cancellation
    fn is_cancelled(&self) -> bool {
        false
    }

    fn updated_at(&self) -> DateTime<Utc>;

    fn touch(&mut self);
}

/// Random task identifier
pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploading,
    PendingProcessing,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::PendingProcessing => "pending_processing",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One chunked upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadTask {
    pub id: String,
    pub status: UploadStatus,
    pub progress: u8,
    pub message: String,
    pub model_type: ArtifactKind,
    #[serde(skip)]
    pub temp_dir: PathBuf,
    pub filename: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadTask {
    pub fn new(id: String, filename: String, model_type: ArtifactKind, temp_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: UploadStatus::Uploading,
            progress: 0,
            message: "Waiting for chunks".to_string(),
            model_type,
            temp_dir,
            filename,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TaskRecord for UploadTask {
    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn is_cancelled(&self) -> bool {
        self.status == UploadStatus::Cancelled
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Running,
    Completed,
    Error,
}

/// What the training run was asked to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub filename: String,
    pub col_text: String,
    pub col_label: String,
    #[serde(default)]
    pub deploy: bool,
    pub requested_by: Option<String>,
}

/// Result of training one ensemble member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Trained {
        metrics: EvaluationReport,
        /// Set when the refit model was installed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deployment: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl ModelOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, Self::Trained { .. })
    }
}

/// One training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingTask {
    pub id: String,
    pub status: TrainingStatus,
    pub progress: u8,
    pub message: String,
    pub metadata: TrainingMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<ModelId, ModelOutcome>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingTask {
    pub fn new(id: String, metadata: TrainingMetadata) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TrainingStatus::Running,
            progress: 0,
            message: "Queued".to_string(),
            metadata,
            results: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TaskRecord for TrainingTask {
    fn is_terminal(&self) -> bool {
        self.status != TrainingStatus::Running
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    Error,
}

/// In-memory progress of a batch classification run, keyed by dataset id
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub dataset_id: i64,
    pub batch_id: String,
    pub status: BatchStatus,
    pub total_items: u64,
    pub processed_items: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord for BatchProgress {
    fn is_terminal(&self) -> bool {
        self.status != BatchStatus::Processing
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Integer percentage, 100 for an empty run
pub fn percentage(done: u64, total: u64) -> u8 {
    if total == 0 {
        100
    } else {
        ((done.min(total) * 100) / total) as u8
    }
}

/// A task that was accepted and handed to a background worker
#[derive(Debug)]
pub struct Spawned {
    pub id: String,
    pub handle: tokio::task::JoinHandle<()>,
}

/// Text of a caught worker panic
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

/// Cooperative cancellation point, polled every `every` units of work
pub struct Checkpoint {
    token: CancellationToken,
    every: usize,
    count: usize,
}

impl Checkpoint {
    pub fn new(token: CancellationToken, every: usize) -> Self {
        Self {
            token,
            every: every.max(1),
            count: 0,
        }
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Count one unit of work, checking on every `every`th unit
    pub fn tick(&mut self) -> Result<()> {
        self.count += 1;
        if self.count % self.every == 0 {
            self.check()
        } else {
            Ok(())
        }
    }

    /// The same token, polled at a different interval
    pub fn with_interval(&self, every: usize) -> Self {
        Self::new(self.token.clone(), every)
    }
}
