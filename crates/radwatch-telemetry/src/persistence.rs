//! Audit journal persistence
//!
//! Append-only JSON-lines files with size-based rotation. The hash chain
//! continues across rotations and process restarts: a reopened writer resumes
//! from the last event on disk.

use crate::audit::{AuditChain, AuditEvent};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CURRENT_FILE: &str = "audit_current.jsonl";

/// Configuration for the audit journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Directory to store journal files
    pub journal_dir: PathBuf,

    /// Maximum file size before rotation (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Flush to disk after this many events
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,
}

impl JournalConfig {
    pub fn new(journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            journal_dir: journal_dir.into(),
            max_file_size: default_max_file_size(),
            flush_interval: default_flush_interval(),
        }
    }
}

fn default_max_file_size() -> u64 {
    16 * 1024 * 1024 // 16MB
}

fn default_flush_interval() -> usize {
    1
}

/// Journal writer with rotation support
pub struct AuditWriter {
    config: JournalConfig,
    current_file: Option<BufWriter<File>>,
    current_size: u64,
    events_since_flush: usize,
    chain: AuditChain,
}

impl AuditWriter {
    /// Open the journal, creating the directory and resuming the chain
    pub fn open(config: JournalConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.journal_dir)?;

        let head = read_journal(&config.journal_dir)?
            .last()
            .and_then(|event| event.hash.clone());

        let mut writer = Self {
            config,
            current_file: None,
            current_size: 0,
            events_since_flush: 0,
            chain: AuditChain::resume(head),
        };
        writer.open_current_file()?;
        Ok(writer)
    }

    /// Chain and append an event, returning the event as written
    pub fn write_event(&mut self, event: AuditEvent) -> std::io::Result<AuditEvent> {
        if self.current_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let event = self.chain.link(event);
        let line = format!("{}\n", serde_json::to_string(&event)?);
        let bytes = line.as_bytes();

        if let Some(ref mut writer) = self.current_file {
            writer.write_all(bytes)?;
            self.current_size += bytes.len() as u64;
            self.events_since_flush += 1;

            if self.events_since_flush >= self.config.flush_interval {
                writer.flush()?;
                self.events_since_flush = 0;
            }
        }

        Ok(event)
    }

    /// Force flush to disk
    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
            self.events_since_flush = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.current_file {
            writer.flush()?;
        }
        self.current_file = None;

        let current = self.config.journal_dir.join(CURRENT_FILE);
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f").to_string();
        let mut rotated = self.config.journal_dir.join(format!("audit_{}.jsonl", stamp));
        let mut suffix = 1;
        while rotated.exists() {
            rotated = self
                .config
                .journal_dir
                .join(format!("audit_{}_{}.jsonl", stamp, suffix));
            suffix += 1;
        }
        match std::fs::rename(&current, &rotated) {
            Ok(()) => info!("Rotated audit file to: {:?}", rotated),
            Err(e) => warn!("Failed to rotate audit file: {}", e),
        }

        self.open_current_file()
    }

    fn open_current_file(&mut self) -> std::io::Result<()> {
        let path = self.config.journal_dir.join(CURRENT_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        self.current_size = file.metadata()?.len();
        self.current_file = Some(BufWriter::new(file));
        self.events_since_flush = 0;
        Ok(())
    }
}

impl Drop for AuditWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush audit journal: {}", e);
        }
    }
}

/// Every event in the journal, oldest first
pub fn read_journal(dir: &Path) -> std::io::Result<Vec<AuditEvent>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut rotated = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_rotated = path.extension().is_some_and(|e| e == "jsonl")
            && path.file_name().is_some_and(|n| n != CURRENT_FILE);
        if is_rotated {
            rotated.push(path);
        }
    }
    // Rotated names embed a sortable timestamp
    rotated.sort();
    rotated.push(dir.join(CURRENT_FILE));

    let mut events = Vec::new();
    for path in rotated.iter().filter(|p| p.exists()) {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping unreadable audit line in {:?}: {}", path, e),
            }
        }
    }
    Ok(events)
}
