//! Chunked upload protocol
//!
//! `init` creates a staging directory, `chunk` drops numbered parts into it in
//! any order, and `finish` hands the task to a blocking worker that assembles
//! the parts and installs the artifact. `cancel` is cooperative: the worker
//! notices at its next checkpoint.

use crate::installer::{InstallOutcome, ModelInstaller};
use crate::task::{new_task_id, panic_message, Checkpoint, TaskRecord, UploadStatus, UploadTask};
use crate::task_store::TaskStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use radwatch_core::{ArtifactKind, Error, Result};
use radwatch_telemetry::metrics::{self as telemetry, TaskKind, TaskOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PART_PREFIX: &str = "part_";

/// Upload protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Root of the per-upload staging directories
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Poll for cancellation every this many assembled parts
    #[serde(default = "default_cancel_check_parts")]
    pub cancel_check_parts: usize,

    /// Poll for cancellation every this many extracted archive entries
    #[serde(default = "default_cancel_check_entries")]
    pub cancel_check_entries: usize,

    /// How long finished tasks stay pollable
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("radwatch-uploads")
}

fn default_cancel_check_parts() -> usize {
    5
}

fn default_cancel_check_entries() -> usize {
    50
}

fn default_retention_secs() -> u64 {
    3600
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            cancel_check_parts: default_cancel_check_parts(),
            cancel_check_entries: default_cancel_check_entries(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl UploadSettings {
    pub fn with_staging_dir(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            ..Self::default()
        }
    }
}

/// Final path component of a client-supplied filename
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::validation(format!("invalid filename '{}'", filename)));
    }
    Ok(name.to_string())
}

/// Part numbers present in `dir`, ascending, with their paths
fn list_parts(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::transient_io(format!("cannot read staging directory: {}", e)))?;
    let mut parts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::transient_io(e.to_string()))?;
        let name = entry.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix(PART_PREFIX))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(index) = index {
            parts.push((index, entry.path()));
        }
    }
    parts.sort_by_key(|(index, _)| *index);
    Ok(parts)
}

/// Fail unless the parts are exactly `0..N-1`
fn check_contiguous(parts: &[(u64, PathBuf)]) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::validation("no chunks were received"));
    }
    for (expected, (index, _)) in parts.iter().enumerate() {
        if *index != expected as u64 {
            return Err(Error::validation(format!("missing chunk {}", expected)));
        }
    }
    Ok(())
}

fn remove_staging_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = ?dir, error = %e, "Failed to remove staging directory");
        }
    }
}

/// Owner of every chunked upload in the process
pub struct UploadManager {
    settings: UploadSettings,
    tasks: Arc<dyn TaskStore<UploadTask>>,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    installer: Arc<ModelInstaller>,
}

impl UploadManager {
    pub fn new(
        settings: UploadSettings,
        tasks: Arc<dyn TaskStore<UploadTask>>,
        installer: Arc<ModelInstaller>,
    ) -> Self {
        Self {
            settings,
            tasks,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            installer,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Open an upload and its staging directory
    pub fn init(&self, filename: &str, kind: ArtifactKind) -> Result<UploadTask> {
        let filename = sanitize_filename(filename)?;
        let id = new_task_id();
        let temp_dir = self.settings.staging_dir.join(&id);
        std::fs::create_dir_all(&temp_dir)?;

        let task = UploadTask::new(id.clone(), filename, kind, temp_dir);
        self.tasks.set(&id, task.clone());
        self.tokens.lock().insert(id.clone(), CancellationToken::new());
        telemetry::task_started(TaskKind::Upload);
        info!(upload_id = %id, artifact = %kind, filename = %task.filename, "Upload initialized");
        Ok(task)
    }

    /// Store one chunk; arrival order does not matter
    pub fn chunk(&self, id: &str, index: u64, bytes: &[u8]) -> Result<()> {
        let task = self.status(id)?;
        if task.status != UploadStatus::Uploading {
            return Err(Error::invalid_state(format!(
                "upload is {}, not accepting chunks",
                task.status.as_str()
            )));
        }

        let part = task.temp_dir.join(format!("{}{}", PART_PREFIX, index));
        std::fs::write(&part, bytes)
            .map_err(|e| Error::transient_io(format!("failed to write chunk {}: {}", index, e)))?;
        telemetry::upload_bytes(bytes.len() as u64);
        debug!(upload_id = %id, chunk = index, bytes = bytes.len(), "Stored chunk");
        Ok(())
    }

    /// Queue the upload for assembly and return the worker handle
    pub fn finish(&self, id: &str) -> Result<JoinHandle<()>> {
        let task = self.status(id)?;
        match task.status {
            UploadStatus::Uploading => {}
            UploadStatus::Cancelled => {
                return Err(Error::invalid_state("upload was cancelled"));
            }
            other => {
                return Err(Error::invalid_state(format!(
                    "upload is already {}",
                    other.as_str()
                )));
            }
        }

        let mut queued = false;
        self.tasks
            .update(id, &mut |t| {
                if t.status == UploadStatus::Uploading {
                    t.status = UploadStatus::PendingProcessing;
                    t.message = "Queued for processing".to_string();
                    queued = true;
                }
            })
            .map_err(|e| match e {
                Error::Cancelled => Error::invalid_state("upload was cancelled"),
                other => other,
            })?;
        if !queued {
            return Err(Error::invalid_state("upload is already queued"));
        }

        let token = self
            .tokens
            .lock()
            .entry(id.to_string())
            .or_default()
            .clone();
        let worker = AssemblyWorker {
            id: id.to_string(),
            kind: task.model_type,
            temp_dir: task.temp_dir,
            filename: task.filename,
            checkpoint_parts: self.settings.cancel_check_parts,
            token,
            tasks: self.tasks.clone(),
            installer: self.installer.clone(),
        };
        info!(upload_id = %id, "Upload queued for processing");
        Ok(tokio::task::spawn_blocking(move || worker.run()))
    }

    /// Request cancellation; returns a message describing what happened
    pub fn cancel(&self, id: &str) -> Result<String> {
        let task = self.status(id)?;
        if task.status.is_terminal() {
            return Ok(format!("Upload already {}, nothing to cancel", task.status.as_str()));
        }

        // `finish` may have queued a worker since the snapshot
        let mut replaced = task.status;
        let cancelled = self.tasks.update(id, &mut |t| {
            replaced = t.status;
            t.status = UploadStatus::Cancelled;
            t.message = "Cancelled by user".to_string();
        });
        if let Err(e) = cancelled {
            debug!(upload_id = %id, error = %e, "Upload finished before it could be cancelled");
            return Ok("Upload already finished, nothing to cancel".to_string());
        }

        if let Some(token) = self.tokens.lock().get(id) {
            token.cancel();
        }
        if replaced == UploadStatus::Uploading {
            // No worker exists yet to clean up
            remove_staging_dir(&task.temp_dir);
            telemetry::task_finished(TaskKind::Upload, TaskOutcome::Cancelled);
        }
        info!(upload_id = %id, "Upload cancelled");
        Ok("Upload cancelled".to_string())
    }

    pub fn status(&self, id: &str) -> Result<UploadTask> {
        self.tasks
            .get(id)
            .ok_or_else(|| Error::not_found(format!("upload '{}'", id)))
    }

    /// Drop finished uploads older than the retention window
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::seconds(self.settings.retention_secs as i64);
        let purged = self.tasks.purge(cutoff);
        let mut tokens = self.tokens.lock();
        for (id, task) in &purged {
            tokens.remove(id);
            remove_staging_dir(&task.temp_dir);
        }
        if !purged.is_empty() {
            info!(count = purged.len(), "Purged expired uploads");
        }
        purged.len()
    }
}

/// Everything the background assembly needs, detached from the manager
struct AssemblyWorker {
    id: String,
    kind: ArtifactKind,
    temp_dir: PathBuf,
    filename: String,
    checkpoint_parts: usize,
    token: CancellationToken,
    tasks: Arc<dyn TaskStore<UploadTask>>,
    installer: Arc<ModelInstaller>,
}

impl AssemblyWorker {
    fn run(self) {
        let result = catch_unwind(AssertUnwindSafe(|| self.process()))
            .unwrap_or_else(|payload| Err(Error::internal(panic_message(payload))));

        let outcome = match result {
            Ok(outcome) => {
                let message = outcome.message(self.kind);
                let finished = self.tasks.update(&self.id, &mut |t| {
                    t.status = UploadStatus::Completed;
                    t.progress = 100;
                    t.message = message.clone();
                });
                if let Err(Error::Cancelled) = finished {
                    self.record_committed(&message);
                }
                if outcome.is_degraded() {
                    TaskOutcome::Degraded
                } else {
                    TaskOutcome::Completed
                }
            }
            Err(Error::Cancelled) => TaskOutcome::Cancelled,
            Err(e) => {
                error!(upload_id = %self.id, error = %e, "Upload processing failed");
                let recorded = self.tasks.update(&self.id, &mut |t| {
                    t.status = UploadStatus::Failed;
                    t.message = "Upload processing failed".to_string();
                    t.error = Some(e.to_string());
                });
                if recorded.is_ok() {
                    TaskOutcome::Failed
                } else {
                    TaskOutcome::Cancelled
                }
            }
        };

        if outcome == TaskOutcome::Cancelled {
            info!(upload_id = %self.id, "Upload worker stopped after cancellation");
        }
        remove_staging_dir(&self.temp_dir);
        telemetry::task_finished(TaskKind::Upload, outcome);
    }

    /// The artifact was swapped in before a late cancel; report what is served
    fn record_committed(&self, message: &str) {
        let Some(mut task) = self.tasks.get(&self.id) else {
            return;
        };
        warn!(upload_id = %self.id, "Cancellation arrived after the artifact was swapped in");
        task.status = UploadStatus::Completed;
        task.progress = 100;
        task.message = format!("{}; cancellation arrived after the swap", message);
        task.touch();
        self.tasks.set(&self.id, task);
    }

    /// Move progress forward; a cancelled task refuses the update
    fn report(&self, progress: u8, message: &str) -> Result<()> {
        self.tasks
            .update(&self.id, &mut |t| {
                t.progress = t.progress.max(progress);
                t.message = message.to_string();
            })
            .map(|_| ())
    }

    fn process(&self) -> Result<InstallOutcome> {
        self.tasks.update(&self.id, &mut |t| {
            t.status = UploadStatus::Processing;
            t.message = "Assembling chunks".to_string();
        })?;

        let mut checkpoint = Checkpoint::new(self.token.clone(), self.checkpoint_parts);
        let assembled = self.assemble(&mut checkpoint)?;
        checkpoint.check()?;
        self.report(40, "Installing artifact")?;

        let outcome = self.installer.install(self.kind, &assembled, &checkpoint, &mut |fraction| {
            let progress = 40 + (fraction.clamp(0.0, 1.0) * 55.0) as u8;
            let _ = self.report(progress, "Installing artifact");
        })?;
        Ok(outcome)
    }

    /// Concatenate the parts in numeric order, deleting each once copied
    fn assemble(&self, checkpoint: &mut Checkpoint) -> Result<PathBuf> {
        let parts = list_parts(&self.temp_dir)?;
        check_contiguous(&parts)?;

        let output = self.temp_dir.join(format!("assembled_{}", self.filename));
        let mut writer = BufWriter::new(
            File::create(&output)
                .map_err(|e| Error::transient_io(format!("cannot create assembled file: {}", e)))?,
        );
        let total = parts.len();
        let mut bytes = 0u64;

        for (done, (index, path)) in parts.iter().enumerate() {
            checkpoint.tick()?;
            let mut part = File::open(path)
                .map_err(|e| Error::transient_io(format!("cannot read chunk {}: {}", index, e)))?;
            bytes += std::io::copy(&mut part, &mut writer)
                .map_err(|e| Error::transient_io(format!("cannot append chunk {}: {}", index, e)))?;
            drop(part);
            std::fs::remove_file(path)?;

            let progress = (((done + 1) * 40) / total) as u8;
            self.report(progress, "Assembling chunks")?;
        }
        writer
            .flush()
            .map_err(|e| Error::transient_io(format!("cannot flush assembled file: {}", e)))?;

        info!(upload_id = %self.id, parts = total, bytes, "Assembled upload");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::write_zip;
    use crate::installer::ModelHost;
    use crate::task_store::InMemoryTaskStore;
    use radwatch_classifiers::ClassifierConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NoopHost;

    impl ModelHost for NoopHost {
        fn unload(&self, _kind: ArtifactKind) {}
        fn reload(&self) {}
    }

    fn manager(dir: &Path) -> UploadManager {
        let config = ClassifierConfig::with_models_dir(dir.join("models"));
        let installer = Arc::new(ModelInstaller::new(config, Arc::new(NoopHost)));
        UploadManager::new(
            UploadSettings::with_staging_dir(dir.join("staging")),
            Arc::new(InMemoryTaskStore::new()),
            installer,
        )
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/svm.json").unwrap(), "svm.json");
        assert_eq!(sanitize_filename("C:\\models\\lexicon.zip").unwrap(), "lexicon.zip");
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("  ").is_err());
        assert!(sanitize_filename("..").is_err());
    }

    #[test]
    fn test_gap_names_missing_index() {
        let parts = vec![(0, PathBuf::from("a")), (1, PathBuf::from("b")), (3, PathBuf::from("c"))];
        let err = check_contiguous(&parts).unwrap_err();
        assert!(err.to_string().contains("missing chunk 2"));
        assert!(check_contiguous(&[]).is_err());
    }

    #[test]
    fn test_list_parts_sorts_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for index in [10, 2, 0, 1] {
            std::fs::write(dir.path().join(format!("part_{}", index)), b"x").unwrap();
        }
        std::fs::write(dir.path().join("assembled_part_3"), b"x").unwrap();
        let indices: Vec<u64> = list_parts(dir.path()).unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2, 10]);
    }

    #[test]
    fn test_chunk_rules() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = manager(dir.path());

        assert!(matches!(uploads.chunk("nope", 0, b"x"), Err(Error::NotFound(_))));

        let task = uploads.init("svm.json", ArtifactKind::Svm).unwrap();
        uploads.chunk(&task.id, 1, b"world").unwrap();
        uploads.chunk(&task.id, 0, b"hello").unwrap();
        assert!(task.temp_dir.join("part_1").exists());

        uploads.cancel(&task.id).unwrap();
        assert!(!task.temp_dir.exists());
        assert!(matches!(uploads.chunk(&task.id, 2, b"!"), Err(Error::InvalidState(_))));
        assert!(matches!(uploads.finish(&task.id), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_cancel_finished_upload_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = manager(dir.path());
        let task = uploads.init("svm.json", ArtifactKind::Svm).unwrap();
        uploads
            .tasks
            .update(&task.id, &mut |t| t.status = UploadStatus::Failed)
            .unwrap();

        let message = uploads.cancel(&task.id).unwrap();
        assert!(message.contains("already failed"));
        assert_eq!(uploads.status(&task.id).unwrap().status, UploadStatus::Failed);
    }

    /// Store whose next snapshot read is followed by `finish` queueing the upload
    #[derive(Default)]
    struct FinishAfterSnapshot {
        inner: InMemoryTaskStore<UploadTask>,
        armed: AtomicBool,
    }

    impl TaskStore<UploadTask> for FinishAfterSnapshot {
        fn get(&self, id: &str) -> Option<UploadTask> {
            let snapshot = self.inner.get(id);
            if self.armed.swap(false, Ordering::SeqCst) {
                let _ = self
                    .inner
                    .update(id, &mut |t| t.status = UploadStatus::PendingProcessing);
            }
            snapshot
        }

        fn set(&self, id: &str, task: UploadTask) {
            self.inner.set(id, task)
        }

        fn delete(&self, id: &str) -> Option<UploadTask> {
            self.inner.delete(id)
        }

        fn update(&self, id: &str, apply: &mut dyn FnMut(&mut UploadTask)) -> Result<UploadTask> {
            self.inner.update(id, apply)
        }

        fn purge(&self, cutoff: DateTime<Utc>) -> Vec<(String, UploadTask)> {
            self.inner.purge(cutoff)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn test_cancel_leaves_staging_to_a_queued_worker() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FinishAfterSnapshot::default());
        let config = ClassifierConfig::with_models_dir(dir.path().join("models"));
        let uploads = UploadManager::new(
            UploadSettings::with_staging_dir(dir.path().join("staging")),
            store.clone(),
            Arc::new(ModelInstaller::new(config, Arc::new(NoopHost))),
        );
        let task = uploads.init("svm.json", ArtifactKind::Svm).unwrap();
        uploads.chunk(&task.id, 0, b"{}").unwrap();

        store.armed.store(true, Ordering::SeqCst);
        assert_eq!(uploads.cancel(&task.id).unwrap(), "Upload cancelled");

        assert_eq!(uploads.status(&task.id).unwrap().status, UploadStatus::Cancelled);
        // The queued worker owns the staging directory now
        assert!(task.temp_dir.join("part_0").exists());
    }

    #[tokio::test]
    async fn test_missing_chunk_fails_task() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = manager(dir.path());
        let task = uploads.init("svm.json", ArtifactKind::Svm).unwrap();
        uploads.chunk(&task.id, 0, b"{").unwrap();
        uploads.chunk(&task.id, 2, b"}").unwrap();

        uploads.finish(&task.id).unwrap().await.unwrap();

        let status = uploads.status(&task.id).unwrap();
        assert_eq!(status.status, UploadStatus::Failed);
        assert!(status.error.unwrap().contains("missing chunk 1"));
        assert!(!task.temp_dir.exists());
    }

    #[tokio::test]
    async fn test_archive_upload_installs_lexicon() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = manager(dir.path());
        let zip_path = dir.path().join("lexicon.zip");
        write_zip(
            &zip_path,
            &[("wrapper/lexicon.yaml", b"bias: -1.0\nterms:\n  jihad: 3.0\n")],
        );
        let bytes = std::fs::read(&zip_path).unwrap();

        let task = uploads.init("lexicon.zip", ArtifactKind::Lexicon).unwrap();
        uploads.chunk(&task.id, 0, &bytes).unwrap();
        uploads.finish(&task.id).unwrap().await.unwrap();

        let status = uploads.status(&task.id).unwrap();
        assert_eq!(status.status, UploadStatus::Completed, "{:?}", status.error);
        assert_eq!(status.progress, 100);
        assert!(dir.path().join("models/lexicon/lexicon.yaml").exists());
    }

    #[test]
    fn test_purge_expired_removes_finished_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = manager(dir.path());
        let task = uploads.init("svm.json", ArtifactKind::Svm).unwrap();
        uploads.cancel(&task.id).unwrap();

        assert_eq!(uploads.purge_expired(Utc::now()), 0);
        let later = Utc::now() + chrono::Duration::seconds(3601);
        assert_eq!(uploads.purge_expired(later), 1);
        assert!(matches!(uploads.status(&task.id), Err(Error::NotFound(_))));
    }
}
