//! RadWatch Core
//!
//! Core types and utilities shared across RadWatch components.
//!
//! This crate provides:
//! - The error taxonomy used by every worker and the HTTP surface
//! - Closed identifiers for ensemble members and uploadable artifacts
//! - The binary moderation label

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ArtifactKind, InputKind, Label, ModelId};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ArtifactKind, InputKind, Label, ModelId};
}
