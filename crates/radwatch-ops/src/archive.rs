//! ZIP extraction for directory-shaped model artifacts

use crate::task::Checkpoint;
use radwatch_core::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// System files archivers add that never belong to a model
const SYSTEM_FILES: [&str; 2] = ["thumbs.db", "desktop.ini"];

/// One archive member that will be extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub index: usize,
    /// Path below the destination, wrapper folder already stripped
    pub relative: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub bytes: u64,
    pub skipped: usize,
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| Error::transient_io(format!("cannot open archive {:?}: {}", path, e)))?;
    zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::transient_io(format!("not a valid ZIP archive: {}", e)))
}

/// Fail unless `path` is a readable ZIP archive
pub fn validate_zip(path: &Path) -> Result<()> {
    open_archive(path).map(|_| ())
}

/// Hidden and OS metadata entries (`__MACOSX/`, dot files, Thumbs.db, desktop.ini)
pub fn is_hidden_entry(path: &Path) -> bool {
    let hidden_component = path.components().any(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name == "__MACOSX"
        }
        _ => false,
    });
    let system_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .is_some_and(|n| SYSTEM_FILES.contains(&n.as_str()));
    hidden_component || system_file
}

/// Single top-level directory shared by every entry, if there is one
fn common_root(entries: &[(PathBuf, bool)]) -> Option<PathBuf> {
    let mut root: Option<&std::ffi::OsStr> = None;
    let mut has_nested = false;
    for (path, is_dir) in entries {
        let mut components = path.components();
        let first = match components.next() {
            Some(Component::Normal(first)) => first,
            _ => return None,
        };
        let nested = components.next().is_some();
        // A plain file at the top level means there is no wrapper
        if !nested && !is_dir {
            return None;
        }
        has_nested |= nested;
        match root {
            None => root = Some(first),
            Some(r) if r != first => return None,
            Some(_) => {}
        }
    }
    root.filter(|_| has_nested).map(PathBuf::from)
}

/// List the entries to extract: safe, visible, with any wrapper folder stripped.
///
/// Returns the plan and the number of hidden entries skipped.
pub fn plan_entries(path: &Path) -> Result<(Vec<PlannedEntry>, usize)> {
    let mut archive = open_archive(path)?;
    let mut visible = Vec::new();
    let mut skipped = 0;

    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|e| Error::transient_io(format!("unreadable archive entry {}: {}", index, e)))?;
        let name = file.enclosed_name().ok_or_else(|| {
            Error::validation(format!("unsafe archive entry name '{}'", file.name()))
        })?;
        if is_hidden_entry(&name) {
            skipped += 1;
            continue;
        }
        visible.push((index, name, file.is_dir(), file.size()));
    }

    let shape: Vec<(PathBuf, bool)> = visible.iter().map(|(_, p, d, _)| (p.clone(), *d)).collect();
    let root = common_root(&shape);

    let entries = visible
        .into_iter()
        .filter_map(|(index, name, is_dir, size)| {
            let relative = match &root {
                Some(root) => name.strip_prefix(root).ok()?.to_path_buf(),
                None => name,
            };
            // The wrapper folder itself strips to an empty path
            (!relative.as_os_str().is_empty()).then_some(PlannedEntry {
                index,
                relative,
                is_dir,
                size,
            })
        })
        .collect();

    Ok((entries, skipped))
}

/// Extract `archive` into `dest` member by member.
///
/// `progress` receives the fraction of uncompressed bytes written. The
/// checkpoint is ticked once per entry.
pub fn extract(
    archive_path: &Path,
    dest: &Path,
    checkpoint: &mut Checkpoint,
    progress: &mut dyn FnMut(f32),
) -> Result<ExtractSummary> {
    let (entries, skipped) = plan_entries(archive_path)?;
    let mut archive = open_archive(archive_path)?;
    std::fs::create_dir_all(dest)?;

    let total: u64 = entries.iter().map(|e| e.size).sum();
    let mut summary = ExtractSummary {
        skipped,
        ..Default::default()
    };

    for entry in &entries {
        checkpoint.tick()?;
        let target = dest.join(&entry.relative);

        if entry.is_dir {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut member = archive.by_index(entry.index).map_err(|e| {
            Error::transient_io(format!("unreadable archive entry {:?}: {}", entry.relative, e))
        })?;
        let mut out = BufWriter::new(File::create(&target)?);
        let written = std::io::copy(&mut member, &mut out)?;
        debug!(entry = ?entry.relative, bytes = written, "Extracted archive entry");

        summary.files += 1;
        summary.bytes += written;
        if total > 0 {
            progress((summary.bytes as f32 / total as f32).min(1.0));
        }
    }

    checkpoint.check()?;
    progress(1.0);
    Ok(summary)
}
