//! Append-only enum dictionaries.
//!
//! The dictionary for `(namespace, table, column)` is a JSON array of case
//! strings stored at `enums/{table}/{column}`; a case's position is its
//! code. Cases are only ever appended, so a code handed out once stays
//! valid for the lifetime of the column.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{Namespace, TableSchema};
use colmeta_store::{Expected, VersionedStore, decode, encode, key_path};
use tracing::{debug, info};

use crate::collection::{Collection, namespace_exists};
use crate::error::{ControllerError, ControllerResult};
use crate::retry::RetryPolicy;

/// Integer code of an enum case.
pub type EnumCode = u32;

pub trait EnumReader {
    /// Cases in code order. Empty if nothing was ever assigned.
    fn get_enum_cases(
        &self,
        ns: &Namespace,
        table: &str,
        column: &str,
    ) -> ControllerResult<Vec<String>>;
}

pub trait EnumMutator: EnumReader {
    /// Codes for `cases`, in input order, assigning fresh codes to cases
    /// not seen before. Safe to call concurrently from many writers.
    fn extend_enum_cases(
        &self,
        ns: &Namespace,
        table: &str,
        column: &str,
        cases: &[String],
    ) -> ControllerResult<Vec<EnumCode>>;
}

#[derive(Clone)]
pub struct EnumDictionary {
    store: Arc<dyn VersionedStore>,
    tables: Collection<TableSchema>,
    retry: RetryPolicy,
}

impl EnumDictionary {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            tables: Collection::new(Arc::clone(&store), retry.clone()),
            store,
            retry,
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tables: self.tables.with_deadline(deadline),
            retry: self.retry.clone().with_deadline(deadline),
        }
    }

    fn key(table: &str, column: &str) -> String {
        key_path(&["enums", table, column])
    }

    /// Cardinality limit of an existing, live enum column.
    fn column_limit(&self, ns: &Namespace, table: &str, column: &str) -> ControllerResult<usize> {
        let schema = self.tables.get(ns, table)?;
        let col = schema.column(column).ok_or_else(|| {
            ControllerError::Validation(format!("table {table} has no column {column}"))
        })?;
        if col.deleted {
            return Err(ControllerError::Validation(format!(
                "column {table}.{column} is deleted"
            )));
        }
        col.data_type.enum_cardinality().ok_or_else(|| {
            ControllerError::Validation(format!(
                "column {table}.{column} is {:?}, not an enum",
                col.data_type
            ))
        })
    }
}

impl EnumReader for EnumDictionary {
    fn get_enum_cases(
        &self,
        ns: &Namespace,
        table: &str,
        column: &str,
    ) -> ControllerResult<Vec<String>> {
        namespace_exists(self.store.as_ref(), ns)?;
        match self.store.get(ns, &Self::key(table, column))? {
            Some(raw) => Ok(decode(&raw.value)?),
            None => Ok(Vec::new()),
        }
    }
}

impl EnumMutator for EnumDictionary {
    fn extend_enum_cases(
        &self,
        ns: &Namespace,
        table: &str,
        column: &str,
        cases: &[String],
    ) -> ControllerResult<Vec<EnumCode>> {
        let key = Self::key(table, column);
        self.retry.run("extend_enum_cases", || {
            let limit = self.column_limit(ns, table, column)?;
            let current = self.store.get(ns, &key)?;
            let (mut dict, observed): (Vec<String>, Option<u64>) = match current {
                Some(raw) => (decode(&raw.value)?, Some(raw.version)),
                None => (Vec::new(), None),
            };

            let known = dict.len();
            let codes = assign_codes(&mut dict, cases)?;
            if dict.len() == known {
                debug!(namespace = %ns, table, column, "all enum cases already known");
                return Ok(codes);
            }
            if dict.len() > limit {
                return Err(ControllerError::Validation(format!(
                    "column {table}.{column} would hold {} cases, limit is {limit}",
                    dict.len()
                )));
            }

            let version = self
                .store
                .put(ns, &key, &encode(&dict)?, Expected::from_observed(observed))?;
            info!(
                namespace = %ns,
                table,
                column,
                added = dict.len() - known,
                total = dict.len(),
                version,
                "extended enum dictionary"
            );
            Ok(codes)
        })
    }
}

/// Looks up or appends each case, returning codes in input order.
///
/// Unknown cases are appended in first-occurrence order; repeated
/// unknown cases share the code of their first occurrence.
fn assign_codes(dict: &mut Vec<String>, cases: &[String]) -> ControllerResult<Vec<EnumCode>> {
    let mut index: HashMap<String, EnumCode> = HashMap::with_capacity(dict.len() + cases.len());
    for (code, case) in dict.iter().enumerate() {
        index.insert(case.clone(), to_code(code)?);
    }
    let mut codes = Vec::with_capacity(cases.len());
    for case in cases {
        let code = match index.get(case) {
            Some(&code) => code,
            None => {
                let code = to_code(dict.len())?;
                dict.push(case.clone());
                index.insert(case.clone(), code);
                code
            }
        };
        codes.push(code);
    }
    Ok(codes)
}

fn to_code(position: usize) -> ControllerResult<EnumCode> {
    EnumCode::try_from(position)
        .map_err(|_| ControllerError::Validation(format!("enum code {position} out of range")))
}
