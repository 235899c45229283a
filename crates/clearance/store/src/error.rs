use clearance_types::ClearanceError;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage-layer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// An expected version did not match; nothing was written
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StoreError> for ClearanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ClearanceError::NotFound(msg),
            StoreError::Conflict(msg) => ClearanceError::Consistency(msg),
            StoreError::InvalidInput(msg) => ClearanceError::Validation(msg),
            StoreError::Backend(msg) => ClearanceError::Storage(msg),
        }
    }
}
