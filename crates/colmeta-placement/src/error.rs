//! Placement error types.

use thiserror::Error;

/// Errors produced by placement transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid placement request: {0}")]
    Validation(String),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
