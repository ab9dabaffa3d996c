//! colmeta-core — shared types for the colmeta metadata control plane.
//!
//! Holds the namespace identifier, the entity models persisted by the
//! controller (table schemas, ingestion jobs, subscribers, assignments,
//! cluster instances), and the TOML configuration shared by binaries.

pub mod config;
pub mod namespace;
pub mod types;

pub use config::ControllerConfig;
pub use namespace::{Namespace, NamespaceError};
pub use types::*;
