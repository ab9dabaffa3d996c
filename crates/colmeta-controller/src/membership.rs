//! Membership manager — tracks the instances of a namespace's cluster.
//!
//! Instances join and leave here; the placement only refers to them by
//! id and never creates or deletes membership records.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use colmeta_core::{Instance, ModelError, Namespace};
use colmeta_store::VersionedStore;

use crate::collection::{Collection, Entity};
use crate::error::{ControllerError, ControllerResult};
use crate::placement::placement_references;
use crate::retry::RetryPolicy;

impl Entity for Instance {
    const KIND: &'static str = "instance";
    const COLLECTION: &'static str = "instances";

    fn name(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ModelError> {
        Instance::validate(self)
    }
}

/// Manages cluster membership records.
#[derive(Clone)]
pub struct MembershipManager {
    store: Arc<dyn VersionedStore>,
    instances: Collection<Instance>,
}

impl MembershipManager {
    /// Create a new membership manager.
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            instances: Collection::new(Arc::clone(&store), retry),
            store,
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            store: Arc::clone(&self.store),
            instances: self.instances.with_deadline(deadline),
        }
    }

    /// Register a new instance. `AlreadyExists` if the id is taken.
    pub fn join(&self, ns: &Namespace, instance: &Instance) -> ControllerResult<()> {
        self.instances.create(ns, instance)?;
        info!(namespace = %ns, instance = %instance.id, endpoint = %instance.endpoint, "instance joined cluster");
        Ok(())
    }

    /// Remove an instance. `NotFound` if it never joined, `Validation`
    /// while the namespace's placement still lists it.
    pub fn leave(&self, ns: &Namespace, id: &str) -> ControllerResult<()> {
        self.instances.ensure_namespace(ns)?;
        if placement_references(self.store.as_ref(), ns, id)? {
            return Err(ControllerError::Validation(format!(
                "instance {id} is still in the placement of namespace {ns}"
            )));
        }
        self.instances.delete(ns, id)?;
        info!(namespace = %ns, instance = %id, "instance left cluster");
        Ok(())
    }

    pub fn get_instance(&self, ns: &Namespace, id: &str) -> ControllerResult<Instance> {
        self.instances.get(ns, id)
    }

    /// All members, ascending by id.
    pub fn get_instances(&self, ns: &Namespace) -> ControllerResult<Vec<Instance>> {
        self.instances.list(ns)
    }

    /// Resolve ids to member records, in the given order.
    pub fn resolve(&self, ns: &Namespace, ids: &[String]) -> ControllerResult<Vec<Instance>> {
        ids.iter().map(|id| self.get_instance(ns, id)).collect()
    }

    pub fn get_hash(&self, ns: &Namespace) -> ControllerResult<String> {
        self.instances.hash(ns)
    }
}
