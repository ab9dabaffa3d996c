//! Entity models persisted by the controller.
//!
//! All types are serializable to/from JSON. Maps use `BTreeMap` so the
//! serialized form is canonical, which the collection digests rely on.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural validation failure for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} {name:?}: {reason}")]
pub struct ModelError {
    pub kind: &'static str,
    pub name: String,
    pub reason: String,
}

impl ModelError {
    fn new(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

fn check_name(kind: &'static str, name: &str) -> Result<(), ModelError> {
    if name.is_empty() {
        return Err(ModelError::new(kind, name, "name must not be empty"));
    }
    if name.contains('/') {
        return Err(ModelError::new(kind, name, "name must not contain '/'"));
    }
    Ok(())
}

// ── Table schema ───────────────────────────────────────────────────

/// Column data types understood by the column store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    Float32,
    /// Dictionary-encoded string with a one-byte code.
    SmallEnum,
    /// Dictionary-encoded string with a two-byte code.
    BigEnum,
    Uuid,
    GeoPoint,
}

impl DataType {
    /// Maximum number of distinct cases for enum columns, `None` otherwise.
    pub fn enum_cardinality(self) -> Option<usize> {
        match self {
            DataType::SmallEnum => Some(1 << 8),
            DataType::BigEnum => Some(1 << 16),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl Column {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            deleted: false,
            default_value: None,
        }
    }
}

/// Schema of one table in a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    /// Indices into `columns`.
    pub primary_key_columns: Vec<usize>,
    #[serde(default)]
    pub is_fact_table: bool,
    /// Opaque table-level settings (batch sizes, retention, ...).
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    /// Bumped by the controller on every update.
    #[serde(default)]
    pub version: u32,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Structural checks: names, column uniqueness, primary key shape.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_name("table", &self.name)?;
        if self.columns.is_empty() {
            return Err(ModelError::new("table", &self.name, "no columns"));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.is_empty() {
                return Err(ModelError::new("table", &self.name, "empty column name"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ModelError::new(
                    "table",
                    &self.name,
                    format!("duplicate column {:?}", column.name),
                ));
            }
        }
        if self.primary_key_columns.is_empty() {
            return Err(ModelError::new("table", &self.name, "primary key is empty"));
        }
        for &idx in &self.primary_key_columns {
            match self.columns.get(idx) {
                None => {
                    return Err(ModelError::new(
                        "table",
                        &self.name,
                        format!("primary key column index {idx} out of range"),
                    ));
                }
                Some(c) if c.deleted => {
                    return Err(ModelError::new(
                        "table",
                        &self.name,
                        format!("primary key column {:?} is deleted", c.name),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Checks that `next` is a legal evolution of `self`: columns are only
    /// appended or marked deleted, existing names/types and the primary
    /// key never change, and deleted columns stay deleted.
    pub fn check_evolution(&self, next: &TableSchema) -> Result<(), ModelError> {
        if next.columns.len() < self.columns.len() {
            return Err(ModelError::new("table", &self.name, "columns cannot be removed"));
        }
        for (old, new) in self.columns.iter().zip(&next.columns) {
            if old.name != new.name || old.data_type != new.data_type {
                return Err(ModelError::new(
                    "table",
                    &self.name,
                    format!("column {:?} cannot be renamed or retyped", old.name),
                ));
            }
            if old.deleted && !new.deleted {
                return Err(ModelError::new(
                    "table",
                    &self.name,
                    format!("deleted column {:?} cannot be restored", old.name),
                ));
            }
        }
        if self.primary_key_columns != next.primary_key_columns {
            return Err(ModelError::new("table", &self.name, "primary key cannot change"));
        }
        Ok(())
    }
}

// ── Ingestion ──────────────────────────────────────────────────────

/// An ingestion job: consume `topic` on `cluster` into `table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub table: String,
    pub topic: String,
    pub cluster: String,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    /// Bumped by the controller on every update.
    #[serde(default)]
    pub version: u32,
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        check_name("job", &self.name)?;
        if self.table.is_empty() {
            return Err(ModelError::new("job", &self.name, "target table is empty"));
        }
        if self.topic.is_empty() {
            return Err(ModelError::new("job", &self.name, "source topic is empty"));
        }
        Ok(())
    }
}

/// A registered ingestion subscriber process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub name: String,
    pub address: String,
}

impl Subscriber {
    pub fn validate(&self) -> Result<(), ModelError> {
        check_name("subscriber", &self.name)
    }
}

/// The jobs a subscriber is responsible for, keyed by subscriber name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionAssignment {
    pub subscriber: String,
    pub jobs: Vec<JobConfig>,
}

impl IngestionAssignment {
    pub fn validate(&self) -> Result<(), ModelError> {
        check_name("assignment", &self.subscriber)?;
        let mut seen = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !seen.insert(job.name.as_str()) {
                return Err(ModelError::new(
                    "assignment",
                    &self.subscriber,
                    format!("job {:?} assigned twice", job.name),
                ));
            }
        }
        Ok(())
    }
}

// ── Cluster ────────────────────────────────────────────────────────

fn default_weight() -> u32 {
    1
}

/// A cluster member that can host shard replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    /// host:port the data plane serves on.
    pub endpoint: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl Instance {
    pub fn new(id: &str, endpoint: &str) -> Self {
        Self {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            zone: String::new(),
            weight: default_weight(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        check_name("instance", &self.id)?;
        if self.endpoint.is_empty() {
            return Err(ModelError::new("instance", &self.id, "endpoint is empty"));
        }
        Ok(())
    }
}
