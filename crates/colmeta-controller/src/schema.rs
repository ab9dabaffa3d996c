//! Table schema mutator.

use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{ModelError, Namespace, TableSchema};
use colmeta_store::VersionedStore;

use crate::collection::{Collection, Entity};
use crate::error::ControllerResult;
use crate::retry::RetryPolicy;

impl Entity for TableSchema {
    const KIND: &'static str = "table";
    const COLLECTION: &'static str = "schema/tables";

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ModelError> {
        TableSchema::validate(self)
    }
}

#[derive(Clone)]
pub struct SchemaMutator {
    tables: Collection<TableSchema>,
}

impl SchemaMutator {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            tables: Collection::new(store, retry),
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            tables: self.tables.with_deadline(deadline),
        }
    }

    pub fn list_tables(&self, ns: &Namespace) -> ControllerResult<Vec<TableSchema>> {
        self.tables.list(ns)
    }

    pub fn get_table(&self, ns: &Namespace, name: &str) -> ControllerResult<TableSchema> {
        self.tables.get(ns, name)
    }

    /// Create a table at schema version 1.
    ///
    /// With `force` an existing table is overwritten and its version
    /// bumped; otherwise a duplicate name is `AlreadyExists`.
    pub fn create_table(
        &self,
        ns: &Namespace,
        schema: &TableSchema,
        force: bool,
    ) -> ControllerResult<TableSchema> {
        if force {
            return self.tables.upsert_with(ns, &schema.name, |current| {
                let mut next = schema.clone();
                next.version = current.map_or(1, |c| c.version + 1);
                Ok(next)
            });
        }
        let mut fresh = schema.clone();
        fresh.version = 1;
        self.tables.create(ns, &fresh)?;
        Ok(fresh)
    }

    /// Replace an existing table, bumping its schema version.
    ///
    /// Unless `force`, the change must be a legal evolution: columns are
    /// only appended or marked deleted and the primary key is unchanged.
    pub fn update_table(
        &self,
        ns: &Namespace,
        schema: &TableSchema,
        force: bool,
    ) -> ControllerResult<TableSchema> {
        self.replace(ns, schema, force)
    }

    pub fn delete_table(&self, ns: &Namespace, name: &str) -> ControllerResult<()> {
        self.tables.delete(ns, name)
    }

    pub fn get_hash(&self, ns: &Namespace) -> ControllerResult<String> {
        self.tables.hash(ns)
    }

    fn replace(
        &self,
        ns: &Namespace,
        schema: &TableSchema,
        force: bool,
    ) -> ControllerResult<TableSchema> {
        self.tables.update_with(ns, &schema.name, |current| {
            if !force {
                current.check_evolution(schema)?;
            }
            let mut next = schema.clone();
            next.version = current.version + 1;
            Ok(next)
        })
    }
}
