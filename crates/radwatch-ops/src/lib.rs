//! RadWatch Ops
//!
//! Background task orchestration for the moderation service.
//!
//! Provides:
//! - A task registry with cancellation checkpoints
//! - The chunked upload protocol and archive extraction
//! - A model installer that hot-swaps artifacts under a running registry
//! - The training pipeline and batch classification orchestrator
//! - The store interface for datasets, results and audit records

pub mod archive;
pub mod batch;
pub mod dataset;
pub mod installer;
pub mod split;
pub mod store;
pub mod task;
pub mod task_store;
pub mod training;
pub mod upload;

pub use batch::{BatchClassifier, BatchStatusView};
pub use dataset::{normalize_label, LabeledDataset, Table};
pub use installer::{ArtifactFs, InstallOutcome, ModelHost, ModelInstaller, StdFs};
pub use split::{stratified_split, Split};
pub use store::{
    ClassificationBatch, ClassificationResult, Dataset, Document, MemoryStore, Store, StoreSession,
    StoreSettings, TrainingRecord,
};
pub use task::{
    BatchProgress, BatchStatus, Checkpoint, ModelOutcome, Spawned, TrainingMetadata, TrainingStatus,
    TrainingTask, UploadStatus, UploadTask,
};
pub use task_store::{InMemoryTaskStore, TaskStore};
pub use training::{TrainingService, TrainingSettings};
pub use upload::{UploadManager, UploadSettings};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::batch::BatchClassifier;
    pub use crate::installer::ModelInstaller;
    pub use crate::store::{MemoryStore, Store};
    pub use crate::task_store::{InMemoryTaskStore, TaskStore};
    pub use crate::training::TrainingService;
    pub use crate::upload::UploadManager;
}
