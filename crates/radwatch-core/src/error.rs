//! Error types for RadWatch

/// Result type alias using RadWatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for RadWatch operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or incomplete training data. Fatal to the run.
    #[error("validation error: {0}")]
    Validation(String),

    /// Chunk or archive I/O failure that the client may retry
    #[error("transient io error: {0}")]
    TransientIo(String),

    /// A configured model is not loaded
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Cooperative abort observed at a worker checkpoint
    #[error("operation cancelled")]
    Cancelled,

    /// Unknown task, dataset or document
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current task state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operation collides with one already running
    #[error("conflict: {0}")]
    Conflict(String),

    /// Classifier fitting or prediction errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new transient io error
    pub fn transient_io(msg: impl Into<String>) -> Self {
        Self::TransientIo(msg.into())
    }

    /// Create a new resource unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is the cooperative cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
