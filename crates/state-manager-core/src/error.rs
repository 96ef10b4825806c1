//! Error taxonomy surfaced by the API (spec.md §7).
//!
//! Grounded on `everruns-durable::engine::executor::ExecutorError`'s
//! `thiserror` enum shape. HTTP status mapping lives at the API layer
//! (`state-manager-api::error`), which only needs to match on these variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::placeholder::PlaceholderError> for ManagerError {
    fn from(e: crate::placeholder::PlaceholderError) -> Self {
        ManagerError::InvalidInput(e.to_string())
    }
}

impl From<crate::retry::RetryPolicyError> for ManagerError {
    fn from(e: crate::retry::RetryPolicyError) -> Self {
        ManagerError::InvalidInput(e.to_string())
    }
}
