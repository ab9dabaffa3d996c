//! Error types for the versioned store.

use thiserror::Error;

use crate::types::{Expected, Version};

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("version conflict on {key}: expected {expected}, found {}", display_version(.actual))]
    VersionConflict {
        key: String,
        expected: Expected,
        actual: Option<Version>,
    },

    #[error("invalid key {0:?}")]
    InvalidKey(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

fn display_version(v: &Option<Version>) -> String {
    match v {
        Some(v) => format!("version {v}"),
        None => "absent".to_string(),
    }
}
