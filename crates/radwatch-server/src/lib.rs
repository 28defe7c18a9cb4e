//! RadWatch Server
//!
//! HTTP surface of the moderation subsystem: chunked model uploads,
//! training runs, batch classification and the decision threshold.

pub mod config;
pub mod routes;

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use radwatch_classifiers::ModelRegistry;
use radwatch_ops::{
    BatchClassifier, InMemoryTaskStore, MemoryStore, ModelInstaller, Store, TrainingService,
    UploadManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use config::ServerConfig;
pub use routes::build_router;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub installer: Arc<ModelInstaller>,
    pub uploads: Arc<UploadManager>,
    pub training: Arc<TrainingService>,
    pub batches: Arc<BatchClassifier>,
    pub metrics: Option<PrometheusHandle>,
    pub max_chunk_bytes: usize,
    batch_retention: chrono::Duration,
}

impl AppState {
    /// Wire every service over `store`. Nothing is loaded from disk.
    pub fn build(config: &ServerConfig, store: Arc<dyn Store>) -> Self {
        let registry = Arc::new(ModelRegistry::new(config.classifiers.clone()));
        let installer = Arc::new(
            ModelInstaller::new(config.classifiers.clone(), registry.clone())
                .with_cancel_check_entries(config.uploads.cancel_check_entries),
        );

        let uploads = Arc::new(UploadManager::new(
            config.uploads.clone(),
            Arc::new(InMemoryTaskStore::new()),
            installer.clone(),
        ));
        let training = Arc::new(TrainingService::new(
            config.training.clone(),
            Arc::new(InMemoryTaskStore::new()),
            registry.clone(),
            installer.clone(),
            store.clone(),
        ));
        let batches = Arc::new(BatchClassifier::new(
            Arc::new(InMemoryTaskStore::new()),
            registry.clone(),
            store,
        ));

        Self {
            registry,
            installer,
            uploads,
            training,
            batches,
            metrics: None,
            max_chunk_bytes: config.max_chunk_bytes,
            batch_retention: chrono::Duration::seconds(config.batch_retention_secs as i64),
        }
    }

    /// Open the configured store, promote pending model files and load the registry
    pub fn bootstrap(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = MemoryStore::from_settings(&config.store)?;
        let state = Self::build(config, Arc::new(store));

        let promoted = state.installer.promote_pending_updates();
        if !promoted.is_empty() {
            info!(count = promoted.len(), "Promoted pending model files");
        }

        let loaded = state.registry.load_all();
        info!(
            loaded,
            threshold = state.registry.threshold(),
            "Model registry loaded"
        );
        Ok(state)
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Drop terminal task records past their retention window
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let purged = self.uploads.purge_expired(now)
            + self.training.purge_expired(now)
            + self.batches.purge_expired(now - self.batch_retention);
        if purged > 0 {
            debug!(purged, "Retention sweep");
        }
        purged
    }
}

/// Run `sweep` every `interval` until `shutdown` fires
pub fn spawn_retention_sweeper(
    state: AppState,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    state.sweep();
                }
            }
        }
    })
}
