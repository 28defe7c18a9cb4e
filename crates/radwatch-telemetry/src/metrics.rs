//! Task metrics recorded through the `metrics` facade
//!
//! Nothing here installs a recorder; without one every call is a no-op. The
//! server installs the Prometheus exporter at startup.

use std::time::Duration;

/// Kind of background task, used as the `kind` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Upload,
    Training,
    Batch,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Training => "training",
            Self::Batch => "batch",
        }
    }
}

/// How a task ended, used as the `outcome` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// Completed with a restart-required warning
    Degraded,
    Failed,
    Cancelled,
}

impl TaskOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Register descriptions for every metric
pub fn describe() {
    metrics::describe_counter!("radwatch_tasks_started_total", "Background tasks started by kind");
    metrics::describe_counter!(
        "radwatch_tasks_finished_total",
        "Background tasks finished by kind and outcome"
    );
    metrics::describe_counter!(
        "radwatch_documents_classified_total",
        "Documents scored by batch classification"
    );
    metrics::describe_counter!(
        "radwatch_upload_bytes_total",
        "Bytes received through chunked uploads"
    );
    metrics::describe_histogram!(
        "radwatch_training_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of training runs"
    );
}

pub fn task_started(kind: TaskKind) {
    metrics::counter!("radwatch_tasks_started_total", "kind" => kind.as_str()).increment(1);
}

pub fn task_finished(kind: TaskKind, outcome: TaskOutcome) {
    metrics::counter!(
        "radwatch_tasks_finished_total",
        "kind" => kind.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn documents_classified(count: u64) {
    metrics::counter!("radwatch_documents_classified_total").increment(count);
}

pub fn upload_bytes(bytes: u64) {
    metrics::counter!("radwatch_upload_bytes_total").increment(bytes);
}

pub fn training_duration(elapsed: Duration) {
    metrics::histogram!("radwatch_training_duration_seconds").record(elapsed.as_secs_f64());
}
