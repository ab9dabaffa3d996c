//! Namespace registry, kept in the reserved root scope.

use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{ModelError, Namespace};
use colmeta_store::VersionedStore;
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, Entity, NAMESPACES};
use crate::error::ControllerResult;
use crate::retry::RetryPolicy;

/// Registry record for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    pub name: Namespace,
}

impl Entity for NamespaceRecord {
    const KIND: &'static str = "namespace";
    const COLLECTION: &'static str = NAMESPACES;

    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn validate(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct NamespaceMutator {
    records: Collection<NamespaceRecord>,
}

impl NamespaceMutator {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            records: Collection::new(store, retry),
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            records: self.records.with_deadline(deadline),
        }
    }

    /// Register `ns`. `AlreadyExists` if it is registered already.
    pub fn create_namespace(&self, ns: &Namespace) -> ControllerResult<()> {
        self.records
            .create(&Namespace::root(), &NamespaceRecord { name: ns.clone() })
    }

    /// Registered namespaces, ascending.
    pub fn list_namespaces(&self) -> ControllerResult<Vec<Namespace>> {
        Ok(self
            .records
            .list(&Namespace::root())?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }
}
