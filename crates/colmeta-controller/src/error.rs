//! Controller error types.

use colmeta_core::{ModelError, NamespaceError};
use colmeta_placement::PlacementError;
use colmeta_store::StoreError;
use thiserror::Error;

/// Errors surfaced by every mutator.
///
/// `NotFound`, `AlreadyExists` and `Validation` are permanent until the
/// request changes. `VersionConflict` is only returned once the retry
/// budget is spent; `Timeout` once the caller's deadline passes.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("version conflict on {key} after {attempts} attempt(s)")]
    VersionConflict { key: String, attempts: u32 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),

    #[error("deadline exceeded during {0}")]
    Timeout(&'static str),
}

impl ControllerError {
    /// Worth retrying later with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControllerError::VersionConflict { .. } | ControllerError::Timeout(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::NotFound(_))
    }
}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { key, .. } => {
                ControllerError::VersionConflict { key, attempts: 1 }
            }
            StoreError::InvalidKey(key) => {
                ControllerError::Validation(format!("invalid key {key:?}"))
            }
            other => ControllerError::StoreUnavailable(other),
        }
    }
}

impl From<PlacementError> for ControllerError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::NotFound(msg) => ControllerError::NotFound(msg),
            PlacementError::AlreadyExists(msg) => ControllerError::AlreadyExists(msg),
            PlacementError::Validation(msg) => ControllerError::Validation(msg),
        }
    }
}

impl From<ModelError> for ControllerError {
    fn from(err: ModelError) -> Self {
        ControllerError::Validation(err.to_string())
    }
}

impl From<NamespaceError> for ControllerError {
    fn from(err: NamespaceError) -> Self {
        ControllerError::Validation(err.to_string())
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
