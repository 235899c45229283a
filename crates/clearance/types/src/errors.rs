//! Error types for the clearance layer

use serde::{Deserialize, Serialize};

/// Errors that can occur in clearance operations.
///
/// Every variant carries the specific reason so staff can act on it
/// (for example `checklist incomplete: soft_copy_received`).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClearanceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClearanceError {
    /// The taxonomy bucket this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::AlreadyProcessed(_) => ErrorKind::AlreadyProcessed,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// The reason string without the kind prefix
    pub fn reason(&self) -> &str {
        match self {
            Self::Validation(r)
            | Self::Precondition(r)
            | Self::InvalidState(r)
            | Self::AlreadyProcessed(r)
            | Self::Consistency(r)
            | Self::NotFound(r)
            | Self::Storage(r) => r,
        }
    }

    /// Whether the caller should re-fetch state before acting again
    pub fn requires_refetch(&self) -> bool {
        matches!(self, Self::AlreadyProcessed(_) | Self::Consistency(_))
    }
}

/// Coarse classification of [`ClearanceError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Precondition,
    InvalidState,
    AlreadyProcessed,
    Consistency,
    NotFound,
    Storage,
}

/// Result type alias for clearance operations
pub type ClearanceResult<T> = Result<T, ClearanceError>;
