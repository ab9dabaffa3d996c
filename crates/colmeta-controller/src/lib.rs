//! colmeta-controller — metadata mutators for the column-store cluster.
//!
//! Every mutator is a thin, stateless wrapper over a shared
//! [`VersionedStore`]: it reads the current value, computes the next one
//! and writes it back conditioned on the version it read, retrying on
//! conflict under a [`RetryPolicy`].
//!
//! # Architecture
//!
//! ```text
//! Controller
//!   ├── PlacementManager      build / add / replace / remove / mark available
//!   ├── EnumDictionary        get and extend append-only enum dictionaries
//!   ├── NamespaceMutator      root-scope registry of namespaces
//!   └── Collection<T>         CRUD + hash, one per entity kind
//!       ├── SchemaMutator        schema/tables/{table}
//!       ├── JobMutator           jobs/{job}
//!       ├── SubscriberMutator    subscribers/{subscriber}
//!       ├── AssignmentMutator    assignments/{subscriber}
//!       └── MembershipManager    instances/{instance}
//! ```
//!
//! Consumers poll the `get_hash` operations to detect drift without
//! transferring the collections themselves.

pub mod assignment;
pub mod collection;
pub mod enums;
pub mod error;
pub mod job;
pub mod membership;
pub mod namespace;
pub mod placement;
pub mod retry;
pub mod schema;
pub mod subscriber;

use std::sync::Arc;
use std::time::Instant;

use colmeta_store::VersionedStore;

pub use assignment::AssignmentMutator;
pub use collection::{Collection, Entity};
pub use enums::{EnumCode, EnumDictionary, EnumMutator, EnumReader};
pub use error::{ControllerError, ControllerResult};
pub use job::JobMutator;
pub use membership::MembershipManager;
pub use namespace::{NamespaceMutator, NamespaceRecord};
pub use placement::{PlacementManager, PlacementMutator};
pub use retry::RetryPolicy;
pub use schema::SchemaMutator;
pub use subscriber::{SubscriberMutator, SubscriberReader};

/// Every mutator, sharing one store and retry policy.
#[derive(Clone)]
pub struct Controller {
    pub namespaces: NamespaceMutator,
    pub schemas: SchemaMutator,
    pub jobs: JobMutator,
    pub subscribers: SubscriberMutator,
    pub assignments: AssignmentMutator,
    pub membership: MembershipManager,
    pub enums: EnumDictionary,
    pub placement: PlacementManager,
}

impl Controller {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            namespaces: NamespaceMutator::new(Arc::clone(&store), retry.clone()),
            schemas: SchemaMutator::new(Arc::clone(&store), retry.clone()),
            jobs: JobMutator::new(Arc::clone(&store), retry.clone()),
            subscribers: SubscriberMutator::new(Arc::clone(&store), retry.clone()),
            assignments: AssignmentMutator::new(Arc::clone(&store), retry.clone()),
            membership: MembershipManager::new(Arc::clone(&store), retry.clone()),
            enums: EnumDictionary::new(Arc::clone(&store), retry.clone()),
            placement: PlacementManager::new(store, retry),
        }
    }

    /// Same mutators, with every call bounded by `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            namespaces: self.namespaces.with_deadline(deadline),
            schemas: self.schemas.with_deadline(deadline),
            jobs: self.jobs.with_deadline(deadline),
            subscribers: self.subscribers.with_deadline(deadline),
            assignments: self.assignments.with_deadline(deadline),
            membership: self.membership.with_deadline(deadline),
            enums: self.enums.with_deadline(deadline),
            placement: self.placement.with_deadline(deadline),
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use colmeta_core::{Column, DataType, Instance, JobConfig, Namespace, TableSchema};
    use colmeta_store::{RedbStore, VersionedStore};

    use crate::namespace::NamespaceMutator;
    use crate::retry::RetryPolicy;

    pub fn ns(name: &str) -> Namespace {
        Namespace::parse(name).unwrap()
    }

    /// In-memory store with `namespaces` registered.
    pub fn store_with(namespaces: &[&str]) -> Arc<dyn VersionedStore> {
        let store: Arc<dyn VersionedStore> = Arc::new(RedbStore::open_in_memory().unwrap());
        let registry = NamespaceMutator::new(Arc::clone(&store), RetryPolicy::default());
        for name in namespaces {
            registry.create_namespace(&ns(name)).unwrap();
        }
        store
    }

    pub fn trips_table() -> TableSchema {
        TableSchema {
            name: "trips".to_string(),
            columns: vec![
                Column::new("uuid", DataType::Uuid),
                Column::new("city", DataType::SmallEnum),
                Column::new("status", DataType::BigEnum),
                Column::new("ts", DataType::Int64),
            ],
            primary_key_columns: vec![0],
            is_fact_table: true,
            config: Default::default(),
            version: 0,
        }
    }

    pub fn job(name: &str) -> JobConfig {
        JobConfig {
            name: name.to_string(),
            table: "trips".to_string(),
            topic: "trips".to_string(),
            cluster: "kafka-1".to_string(),
            config: Default::default(),
            version: 0,
        }
    }

    pub fn instances(ids: &[&str]) -> Vec<Instance> {
        ids.iter()
            .map(|id| Instance::new(id, &format!("{id}:9374")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{instances, ns, store_with};
    use std::time::Duration;

    #[test]
    fn controller_shares_one_store() {
        let c = Controller::new(store_with(&[]), RetryPolicy::default());
        c.namespaces.create_namespace(&ns("ns1")).unwrap();
        for inst in instances(&["a", "b"]) {
            c.membership.join(&ns("ns1"), &inst).unwrap();
        }
        let members = c.membership.get_instances(&ns("ns1")).unwrap();
        let placement = c
            .placement
            .build_initial_placement(&ns("ns1"), 4, 2, &members)
            .unwrap();
        assert_eq!(placement.replica_count(), 8);
    }

    #[test]
    fn expired_deadline_applies_to_every_mutator() {
        let c = Controller::new(store_with(&["ns1"]), RetryPolicy::default())
            .with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(
            c.namespaces.create_namespace(&ns("ns2")),
            Err(ControllerError::Timeout(_))
        ));
        assert!(matches!(
            c.placement.build_initial_placement(&ns("ns1"), 1, 1, &instances(&["a"])),
            Err(ControllerError::Timeout(_))
        ));
        assert!(matches!(
            c.enums.extend_enum_cases(&ns("ns1"), "t", "c", &["x".to_string()]),
            Err(ControllerError::Timeout(_))
        ));
    }
}
