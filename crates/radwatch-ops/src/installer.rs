//! Model installer: hot-swaps artifacts under a running model registry
//!
//! Every artifact kind maps to one destination and one strategy. Files are
//! replaced in place; directory models are extracted next to their
//! destination and swapped in. When the platform refuses to touch a file the
//! serving process still holds, the new artifact is parked as
//! `<destination>.pending` and promoted on the next start.

use crate::archive;
use crate::task::Checkpoint;
use radwatch_classifiers::{ClassifierConfig, LabelEncoder, LexiconClassifier, ModelRegistry, TrainedModel};
use radwatch_core::{ArtifactKind, Error, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// The component holding artifacts in memory
pub trait ModelHost: Send + Sync {
    /// Release the in-memory copy of `kind` before its file is replaced
    fn unload(&self, kind: ArtifactKind);

    /// Pick up whatever is on disk now
    fn reload(&self);
}

impl ModelHost for ModelRegistry {
    fn unload(&self, kind: ArtifactKind) {
        ModelRegistry::unload(self, kind);
    }

    fn reload(&self) {
        ModelRegistry::reload(self);
    }
}

/// Filesystem operations that can hit a locked file
pub trait ArtifactFs: Send + Sync {
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// The real filesystem
pub struct StdFs;

impl ArtifactFs for StdFs {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}

#[cfg(windows)]
const LOCK_ERROR_CODES: [i32; 2] = [32, 33]; // sharing and lock violations
#[cfg(not(windows))]
const LOCK_ERROR_CODES: [i32; 2] = [16, 26]; // EBUSY, ETXTBSY

const CROSS_DEVICE_CODE: i32 = 18; // EXDEV

/// Whether `err` means another holder has the file open
pub fn is_lock_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || err
            .raw_os_error()
            .is_some_and(|code| LOCK_ERROR_CODES.contains(&code))
}

/// How an artifact kind is put in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    ReplaceFile,
    ExtractArchive,
}

pub fn strategy_for(kind: ArtifactKind) -> InstallStrategy {
    match kind {
        ArtifactKind::LogisticRegression
        | ArtifactKind::NaiveBayes
        | ArtifactKind::Svm
        | ArtifactKind::Knn
        | ArtifactKind::Embedding
        | ArtifactKind::LabelEncoder => InstallStrategy::ReplaceFile,
        ArtifactKind::Lexicon => InstallStrategy::ExtractArchive,
    }
}

/// `<path>.<suffix>`, keeping the full original file name
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

pub fn pending_path(dest: &Path) -> PathBuf {
    sibling(dest, "pending")
}

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    Installed { destination: PathBuf },
    /// The destination was locked; the artifact waits at `pending`
    PendingRestart { pending: PathBuf },
}

impl InstallOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::PendingRestart { .. })
    }

    pub fn message(&self, kind: ArtifactKind) -> String {
        match self {
            Self::Installed { .. } => format!("{} installed", kind),
            Self::PendingRestart { .. } => format!(
                "{} installed, restart required: the current file is in use",
                kind
            ),
        }
    }
}

pub struct ModelInstaller {
    config: ClassifierConfig,
    host: Arc<dyn ModelHost>,
    fs: Arc<dyn ArtifactFs>,
    cancel_check_entries: usize,
}

impl ModelInstaller {
    pub fn new(config: ClassifierConfig, host: Arc<dyn ModelHost>) -> Self {
        Self {
            config,
            host,
            fs: Arc::new(StdFs),
            cancel_check_entries: 50,
        }
    }

    /// Route renames and removals through `fs`
    pub fn with_fs(mut self, fs: Arc<dyn ArtifactFs>) -> Self {
        self.fs = fs;
        self
    }

    /// Poll for cancellation every `entries` extracted archive members
    pub fn with_cancel_check_entries(mut self, entries: usize) -> Self {
        self.cancel_check_entries = entries.max(1);
        self
    }

    pub fn destination(&self, kind: ArtifactKind) -> PathBuf {
        self.config.artifact_path(kind)
    }

    /// Install `source` as the artifact `kind`, consuming the source.
    ///
    /// `progress` receives the fraction of the install done.
    pub fn install(
        &self,
        kind: ArtifactKind,
        source: &Path,
        checkpoint: &Checkpoint,
        progress: &mut dyn FnMut(f32),
    ) -> Result<InstallOutcome> {
        let dest = self.destination(kind);
        let outcome = match strategy_for(kind) {
            InstallStrategy::ReplaceFile => {
                validate_file(kind, source)?;
                checkpoint.check()?;
                progress(0.5);
                self.swap_unloaded(kind, checkpoint, || self.replace_file(source, &dest))?
            }
            InstallStrategy::ExtractArchive => {
                let mut entry_checkpoint = checkpoint.with_interval(self.cancel_check_entries);
                let incoming = sibling(&dest, "incoming");
                let swapped = self
                    .stage_archive(kind, source, &incoming, &mut entry_checkpoint, progress)
                    .and_then(|_| checkpoint.check())
                    .and_then(|_| {
                        self.swap_unloaded(kind, checkpoint, || self.swap_dir(&incoming, &dest))
                    });
                match swapped {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        remove_quietly(&incoming);
                        return Err(e);
                    }
                }
            }
        };

        progress(1.0);
        match &outcome {
            InstallOutcome::Installed { destination } => {
                info!(artifact = %kind, destination = ?destination, "Artifact installed")
            }
            InstallOutcome::PendingRestart { pending } => {
                warn!(artifact = %kind, pending = ?pending, "Destination locked, artifact parked until restart")
            }
        }
        Ok(outcome)
    }

    /// Run `swap` with `kind` unloaded, then reload whatever is on disk.
    ///
    /// A cancellation that lands while the host unloads stops the install
    /// before the destination is touched.
    fn swap_unloaded(
        &self,
        kind: ArtifactKind,
        checkpoint: &Checkpoint,
        swap: impl FnOnce() -> Result<InstallOutcome>,
    ) -> Result<InstallOutcome> {
        self.host.unload(kind);
        let swapped = checkpoint.check().and_then(|_| swap());
        self.host.reload();
        swapped
    }

    /// Install a single file artifact without cancellation or progress
    pub fn install_file(&self, kind: ArtifactKind, source: &Path) -> Result<InstallOutcome> {
        let checkpoint = Checkpoint::new(tokio_util::sync::CancellationToken::new(), 1);
        self.install(kind, source, &checkpoint, &mut |_| {})
    }

    /// Write `bytes` beside the destination and install them
    pub fn install_bytes(&self, kind: ArtifactKind, bytes: &[u8]) -> Result<InstallOutcome> {
        let dest = self.destination(kind);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staged = sibling(&dest, &format!("{}.staged", uuid::Uuid::new_v4().simple()));
        std::fs::write(&staged, bytes)?;
        let result = self.install_file(kind, &staged);
        if staged.exists() {
            remove_quietly(&staged);
        }
        result
    }

    fn stage_archive(
        &self,
        kind: ArtifactKind,
        source: &Path,
        incoming: &Path,
        checkpoint: &mut Checkpoint,
        progress: &mut dyn FnMut(f32),
    ) -> Result<()> {
        archive::validate_zip(source)?;
        if incoming.exists() {
            std::fs::remove_dir_all(incoming)?;
        }
        let summary = archive::extract(source, incoming, checkpoint, &mut |f| progress(f * 0.9))?;
        info!(
            artifact = %kind,
            files = summary.files,
            bytes = summary.bytes,
            skipped = summary.skipped,
            "Archive extracted"
        );
        validate_dir(kind, incoming)
    }

    fn replace_file(&self, source: &Path, dest: &Path) -> Result<InstallOutcome> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // The previous file stays recoverable at `.old` until the new one is in
        let old = sibling(dest, "old");
        let had_previous = dest.exists();
        if had_previous {
            if old.exists() {
                remove_quietly(&old);
            }
            if let Err(e) = self.fs.rename(dest, &old) {
                return self.park_file(source, dest, e);
            }
        }

        let moved = match self.fs.rename(source, dest) {
            Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_CODE) => {
                std::fs::copy(source, dest).map(|_| remove_quietly(source))
            }
            other => other,
        };
        if let Err(e) = moved {
            if had_previous {
                if let Err(restore) = self.fs.rename(&old, dest) {
                    warn!(path = ?dest, error = %restore, "Failed to restore previous model file");
                }
            }
            return self.park_file(source, dest, e);
        }

        if had_previous {
            if let Err(e) = self.fs.remove_file(&old) {
                warn!(path = ?old, error = %e, "Failed to remove replaced model file");
            }
        }
        Ok(InstallOutcome::Installed {
            destination: dest.to_path_buf(),
        })
    }

    fn park_file(&self, source: &Path, dest: &Path, err: io::Error) -> Result<InstallOutcome> {
        if !is_lock_error(&err) {
            return Err(err.into());
        }
        let pending = pending_path(dest);
        std::fs::copy(source, &pending)?;
        remove_quietly(source);
        Ok(InstallOutcome::PendingRestart { pending })
    }

    fn swap_dir(&self, incoming: &Path, dest: &Path) -> Result<InstallOutcome> {
        let old = sibling(dest, "old");
        if old.exists() {
            remove_quietly(&old);
        }

        let had_previous = dest.exists();
        if had_previous {
            if let Err(e) = self.fs.rename(dest, &old) {
                return self.park_dir(incoming, dest, e);
            }
        }

        if let Err(e) = self.fs.rename(incoming, dest) {
            if had_previous {
                if let Err(restore) = self.fs.rename(&old, dest) {
                    warn!(error = %restore, "Failed to restore previous model directory");
                }
            }
            return self.park_dir(incoming, dest, e);
        }

        if had_previous {
            if let Err(e) = self.fs.remove_dir_all(&old) {
                warn!(path = ?old, error = %e, "Failed to remove replaced model directory");
            }
        }
        Ok(InstallOutcome::Installed {
            destination: dest.to_path_buf(),
        })
    }

    fn park_dir(&self, incoming: &Path, dest: &Path, err: io::Error) -> Result<InstallOutcome> {
        if !is_lock_error(&err) {
            remove_quietly(incoming);
            return Err(err.into());
        }
        let pending = pending_path(dest);
        if pending.exists() {
            std::fs::remove_dir_all(&pending)?;
        }
        std::fs::rename(incoming, &pending)?;
        Ok(InstallOutcome::PendingRestart { pending })
    }

    /// Replace every destination that has a `.pending` sibling with it.
    ///
    /// Runs at startup, before any model is loaded. Returns the promoted paths.
    pub fn promote_pending_updates(&self) -> Vec<PathBuf> {
        let mut promoted = Vec::new();
        for kind in ArtifactKind::ALL {
            let dest = self.destination(kind);
            let pending = pending_path(&dest);
            if !pending.exists() {
                continue;
            }

            let cleared = match strategy_for(kind) {
                InstallStrategy::ReplaceFile if dest.exists() => self.fs.remove_file(&dest),
                InstallStrategy::ExtractArchive if dest.exists() => self.fs.remove_dir_all(&dest),
                _ => Ok(()),
            };
            match cleared.and_then(|_| self.fs.rename(&pending, &dest)) {
                Ok(()) => {
                    info!(artifact = %kind, destination = ?dest, "Promoted pending update");
                    promoted.push(dest);
                }
                Err(e) => warn!(artifact = %kind, error = %e, "Failed to promote pending update"),
            }
        }
        promoted
    }
}

/// Reject uploads that would not load, before anything is replaced
fn validate_file(kind: ArtifactKind, source: &Path) -> Result<()> {
    let invalid = |e: Error| Error::validation(format!("uploaded file is not a valid {}: {}", kind, e));
    match kind {
        ArtifactKind::LogisticRegression
        | ArtifactKind::NaiveBayes
        | ArtifactKind::Svm
        | ArtifactKind::Knn => {
            if let Some(id) = kind.model_id() {
                TrainedModel::load(source, id).map_err(invalid)?;
            }
            Ok(())
        }
        ArtifactKind::LabelEncoder => {
            let bytes = std::fs::read(source)?;
            serde_json::from_slice::<LabelEncoder>(&bytes)
                .map_err(|e| invalid(e.into()))
                .map(|_| ())
        }
        ArtifactKind::Embedding | ArtifactKind::Lexicon => Ok(()),
    }
}

fn validate_dir(kind: ArtifactKind, dir: &Path) -> Result<()> {
    match kind {
        ArtifactKind::Lexicon => LexiconClassifier::load_dir(dir)
            .map(|_| ())
            .map_err(|e| Error::validation(format!("archive does not hold a lexicon model: {}", e))),
        _ => Ok(()),
    }
}

fn remove_quietly(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = ?path, error = %e, "Failed to remove staging path");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use radwatch_classifiers::estimators::TrainedModel;
    use radwatch_core::{Label, ModelId};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<String>>,
    }

    impl ModelHost for RecordingHost {
        fn unload(&self, kind: ArtifactKind) {
            self.calls.lock().push(format!("unload:{}", kind));
        }

        fn reload(&self) {
            self.calls.lock().push("reload".to_string());
        }
    }

    /// Filesystem that cannot move or remove `held`, like a file another process has open
    struct LockedFs {
        held: PathBuf,
    }

    impl LockedFs {
        fn guard(&self, path: &Path) -> io::Result<()> {
            if path == self.held {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                Ok(())
            }
        }
    }

    impl ArtifactFs for LockedFs {
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.guard(path)?;
            std::fs::remove_file(path)
        }

        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            self.guard(path)?;
            std::fs::remove_dir_all(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.guard(from)?;
            self.guard(to)?;
            std::fs::rename(from, to)
        }
    }

    /// Filesystem that runs out of space when moving `source`
    struct FullDiskFs {
        source: PathBuf,
    }

    impl ArtifactFs for FullDiskFs {
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            std::fs::remove_file(path)
        }

        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            std::fs::remove_dir_all(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if from == self.source {
                Err(io::Error::from_raw_os_error(28))
            } else {
                std::fs::rename(from, to)
            }
        }
    }

    /// Host whose unload races a cancel request
    struct CancellingHost {
        token: CancellationToken,
        calls: Mutex<Vec<String>>,
    }

    impl ModelHost for CancellingHost {
        fn unload(&self, kind: ArtifactKind) {
            self.calls.lock().push(format!("unload:{}", kind));
            self.token.cancel();
        }

        fn reload(&self) {
            self.calls.lock().push("reload".to_string());
        }
    }

    fn model_json() -> Vec<u8> {
        let mut model = TrainedModel::for_model(ModelId::Knn).unwrap();
        model
            .fit(&[vec![1.0], vec![-1.0]], &[Label::Radical, Label::NonRadical])
            .unwrap();
        model.to_json().unwrap()
    }

    fn setup() -> (tempfile::TempDir, ClassifierConfig, Arc<RecordingHost>) {
        let dir = tempfile::tempdir().unwrap();
        let config = ClassifierConfig::with_models_dir(dir.path().join("models"));
        (dir, config, Arc::new(RecordingHost::default()))
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(strategy_for(ArtifactKind::Lexicon), InstallStrategy::ExtractArchive);
        assert_eq!(strategy_for(ArtifactKind::Embedding), InstallStrategy::ReplaceFile);
        assert_eq!(
            pending_path(Path::new("/m/svm.json")),
            PathBuf::from("/m/svm.json.pending")
        );
    }

    #[test]
    fn test_replace_file_unloads_then_reloads() {
        let (dir, config, host) = setup();
        let installer = ModelInstaller::new(config.clone(), host.clone());
        let dest = config.artifact_path(ArtifactKind::Knn);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"old").unwrap();

        let source = dir.path().join("upload.json");
        std::fs::write(&source, model_json()).unwrap();
        let outcome = installer.install_file(ArtifactKind::Knn, &source).unwrap();

        assert_eq!(outcome, InstallOutcome::Installed { destination: dest.clone() });
        assert_eq!(std::fs::read(&dest).unwrap(), model_json());
        assert!(!source.exists());
        assert_eq!(*host.calls.lock(), vec!["unload:knn", "reload"]);
    }

    #[test]
    fn test_locked_destination_parks_pending_copy() {
        let (dir, config, host) = setup();
        let dest = config.artifact_path(ArtifactKind::Knn);
        let installer = ModelInstaller::new(config.clone(), host.clone())
            .with_fs(Arc::new(LockedFs { held: dest.clone() }));
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"old").unwrap();

        let source = dir.path().join("upload.json");
        std::fs::write(&source, model_json()).unwrap();
        let outcome = installer.install_file(ArtifactKind::Knn, &source).unwrap();

        assert!(outcome.is_degraded());
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert_eq!(std::fs::read(pending_path(&dest)).unwrap(), model_json());
        assert!(outcome.message(ArtifactKind::Knn).contains("restart required"));
        assert_eq!(host.calls.lock().last().map(String::as_str), Some("reload"));

        // Next start promotes the parked file
        let promoted = ModelInstaller::new(config, host).promote_pending_updates();
        assert_eq!(promoted, vec![dest.clone()]);
        assert_eq!(std::fs::read(&dest).unwrap(), model_json());
        assert!(!pending_path(&dest).exists());
    }

    #[test]
    fn test_failed_move_restores_previous_file() {
        let (dir, config, host) = setup();
        let source = dir.path().join("upload.json");
        std::fs::write(&source, model_json()).unwrap();
        let installer = ModelInstaller::new(config.clone(), host.clone())
            .with_fs(Arc::new(FullDiskFs { source: source.clone() }));
        let dest = config.artifact_path(ArtifactKind::Knn);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"old").unwrap();

        let result = installer.install_file(ArtifactKind::Knn, &source);

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert!(!sibling(&dest, "old").exists());
        assert!(!pending_path(&dest).exists());
        assert_eq!(*host.calls.lock(), vec!["unload:knn", "reload"]);
    }

    #[test]
    fn test_cancel_during_unload_keeps_destination() {
        let (dir, config, _) = setup();
        let token = CancellationToken::new();
        let host = Arc::new(CancellingHost {
            token: token.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let installer = ModelInstaller::new(config.clone(), host.clone());
        let checkpoint = Checkpoint::new(token, 1);

        let dest = config.artifact_path(ArtifactKind::Knn);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"old").unwrap();
        let source = dir.path().join("upload.json");
        std::fs::write(&source, model_json()).unwrap();

        let result = installer.install(ArtifactKind::Knn, &source, &checkpoint, &mut |_| {});
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
        assert_eq!(*host.calls.lock(), vec!["unload:knn", "reload"]);

        // Directory models stop before the swap too, without leaving the staged tree
        let lexicon = config.artifact_path(ArtifactKind::Lexicon);
        std::fs::create_dir_all(&lexicon).unwrap();
        std::fs::write(lexicon.join("lexicon.yaml"), b"terms:\n  bom: 1.0\n").unwrap();
        let zip_path = dir.path().join("lexicon.zip");
        crate::archive::test_support::write_zip(
            &zip_path,
            &[("lexicon.yaml", b"terms:\n  kafir: 1.0\n")],
        );
        let fresh = CancellationToken::new();
        let host = Arc::new(CancellingHost {
            token: fresh.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let installer = ModelInstaller::new(config.clone(), host);
        let result = installer.install(
            ArtifactKind::Lexicon,
            &zip_path,
            &Checkpoint::new(fresh, 1),
            &mut |_| {},
        );
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(std::fs::read_to_string(lexicon.join("lexicon.yaml")).unwrap().contains("bom"));
        assert!(!sibling(&lexicon, "incoming").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_busy_codes_are_lock_errors() {
        assert!(is_lock_error(&io::Error::from_raw_os_error(16)));
        assert!(is_lock_error(&io::Error::from_raw_os_error(26)));
        assert!(!is_lock_error(&io::Error::from_raw_os_error(2)));
    }

    #[test]
    fn test_invalid_model_is_rejected_before_unload() {
        let (dir, config, host) = setup();
        let installer = ModelInstaller::new(config, host.clone());
        let source = dir.path().join("upload.json");
        std::fs::write(&source, b"{\"type\": \"bert\"}").unwrap();

        let result = installer.install_file(ArtifactKind::Svm, &source);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(host.calls.lock().is_empty());
    }

    #[test]
    fn test_archive_swap_replaces_directory() {
        let (dir, config, host) = setup();
        let installer = ModelInstaller::new(config.clone(), host.clone());
        let dest = config.artifact_path(ArtifactKind::Lexicon);
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), b"x").unwrap();

        let zip_path = dir.path().join("lexicon.zip");
        crate::archive::test_support::write_zip(
            &zip_path,
            &[("wrap/lexicon.yaml", b"bias: -1.0\nterms:\n  jihad: 2.0\n")],
        );
        let outcome = installer.install_file(ArtifactKind::Lexicon, &zip_path).unwrap();

        assert!(!outcome.is_degraded());
        assert!(dest.join("lexicon.yaml").exists());
        assert!(!dest.join("stale.txt").exists());
        assert!(!sibling(&dest, "incoming").exists());
        assert!(!sibling(&dest, "old").exists());
    }

    #[test]
    fn test_locked_directory_parks_extracted_tree() {
        let (dir, config, host) = setup();
        let dest = config.artifact_path(ArtifactKind::Lexicon);
        let installer =
            ModelInstaller::new(config.clone(), host).with_fs(Arc::new(LockedFs { held: dest.clone() }));
        std::fs::create_dir_all(&dest).unwrap();

        let zip_path = dir.path().join("lexicon.zip");
        crate::archive::test_support::write_zip(
            &zip_path,
            &[("lexicon.yaml", b"terms:\n  kafir: 1.0\n")],
        );
        let outcome = installer.install_file(ArtifactKind::Lexicon, &zip_path).unwrap();

        assert!(outcome.is_degraded());
        assert!(pending_path(&dest).join("lexicon.yaml").exists());
    }

    #[test]
    fn test_archive_without_lexicon_fails_and_cleans_up() {
        let (dir, config, host) = setup();
        let installer = ModelInstaller::new(config.clone(), host);
        let zip_path = dir.path().join("lexicon.zip");
        crate::archive::test_support::write_zip(&zip_path, &[("readme.txt", b"hi")]);

        let result = installer.install_file(ArtifactKind::Lexicon, &zip_path);
        assert!(matches!(result, Err(Error::Validation(_))));
        let dest = config.artifact_path(ArtifactKind::Lexicon);
        assert!(!sibling(&dest, "incoming").exists());
    }
}
