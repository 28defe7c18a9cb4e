//! Hash-chained audit trail for training deployments and batch runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Head of a hash chain; each linked event commits to the one before it
#[derive(Debug, Default)]
pub struct AuditChain {
    head: Option<String>,
}

impl AuditChain {
    /// Continue a chain whose last event hashed to `head`
    pub fn resume(head: Option<String>) -> Self {
        Self { head }
    }

    /// Stamp `event` with the previous head and its own hash, then advance
    pub fn link(&mut self, mut event: AuditEvent) -> AuditEvent {
        event.previous_hash = self.head.take();
        let hash = compute_hash(&event);
        event.hash = Some(hash.clone());
        self.head = Some(hash);
        event
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }
}

/// Check that every event links to its predecessor and hashes correctly.
///
/// The first event may link to a hash outside `events` (a rotated file).
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut prev_hash: Option<&String> = events.first().and_then(|e| e.previous_hash.as_ref());

    for event in events {
        if event.previous_hash.as_ref() != prev_hash {
            return false;
        }
        if event.hash.as_deref() != Some(compute_hash(event).as_str()) {
            return false;
        }
        prev_hash = event.hash.as_ref();
    }

    true
}

fn compute_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();

    // Everything except the hash field itself
    hasher.update(event.event_type.as_bytes());
    if let Some(ref subject) = event.subject {
        hasher.update(subject.as_bytes());
    }
    if let Some(ref data) = event.data {
        hasher.update(data.as_bytes());
    }
    hasher.update(event.timestamp.to_rfc3339().as_bytes());
    hasher.update(event.severity.as_str().as_bytes());
    if let Some(ref prev) = event.previous_hash {
        hasher.update(prev.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// A single audit event in the trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event type, e.g. `training_deployed`
    pub event_type: String,

    /// Id of the record the event is about
    pub subject: Option<String>,

    /// Event payload (JSON serialized)
    pub data: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Hash of this event
    pub hash: Option<String>,

    /// Hash of previous event (for chaining)
    pub previous_hash: Option<String>,

    pub severity: AuditSeverity,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            subject: None,
            data: None,
            timestamp: Utc::now(),
            hash: None,
            previous_hash: None,
            severity: AuditSeverity::Info,
        }
    }

    /// Set the subject id
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set event data
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_string(&data).ok();
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

impl AuditSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}
