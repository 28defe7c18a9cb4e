//! RadWatch Telemetry
//!
//! Audit and metrics functionality for RadWatch background tasks.
//!
//! Provides:
//! - A hash-chained audit trail for deployed training runs and batch results
//! - A rotating JSON-lines journal that persists the chain
//! - Task counters and timings through the `metrics` facade

pub mod audit;
pub mod metrics;
pub mod persistence;

pub use audit::{verify_chain, AuditChain, AuditEvent, AuditSeverity};
pub use metrics::{TaskKind, TaskOutcome};
pub use persistence::{read_journal, AuditWriter, JournalConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditChain, AuditEvent};
    pub use crate::metrics::{TaskKind, TaskOutcome};
    pub use crate::persistence::{AuditWriter, JournalConfig};
}
