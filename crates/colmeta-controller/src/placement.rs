//! Placement mutator — persists placement transitions for a namespace.
//!
//! The placement of a namespace is one value at key `placement`, so every
//! transition replaces it as a single CAS unit. The transitions themselves
//! are computed by `colmeta_placement`.

use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{Instance, Namespace};
use colmeta_placement::{self as placer, Placement, ShardId};
use colmeta_store::{Expected, Versioned, VersionedStore, decode, encode};
use tracing::{debug, info};

use crate::collection::namespace_exists;
use crate::error::{ControllerError, ControllerResult};
use crate::retry::RetryPolicy;

const PLACEMENT_KEY: &str = "placement";

/// Whether the stored placement of `ns` still lists instance `id`.
pub(crate) fn placement_references(
    store: &dyn VersionedStore,
    ns: &Namespace,
    id: &str,
) -> ControllerResult<bool> {
    let Some(raw) = store.get(ns, PLACEMENT_KEY)? else {
        return Ok(false);
    };
    let placement: Placement = decode(&raw.value)?;
    Ok(placement.instances.contains_key(id))
}

pub trait PlacementMutator {
    fn build_initial_placement(
        &self,
        ns: &Namespace,
        num_shards: u32,
        num_replica: u32,
        instances: &[Instance],
    ) -> ControllerResult<Placement>;

    fn get_current_placement(&self, ns: &Namespace) -> ControllerResult<Placement>;

    fn add_instance(&self, ns: &Namespace, new: &[Instance]) -> ControllerResult<Placement>;

    fn replace_instance(
        &self,
        ns: &Namespace,
        leaving: &[String],
        new: &[Instance],
    ) -> ControllerResult<Placement>;

    fn remove_instance(&self, ns: &Namespace, leaving: &[String]) -> ControllerResult<Placement>;

    fn mark_namespace_available(&self, ns: &Namespace) -> ControllerResult<Placement>;

    fn mark_instance_available(&self, ns: &Namespace, instance: &str)
    -> ControllerResult<Placement>;

    fn mark_shards_available(
        &self,
        ns: &Namespace,
        instance: &str,
        shards: &[ShardId],
    ) -> ControllerResult<Placement>;
}

#[derive(Clone)]
pub struct PlacementManager {
    store: Arc<dyn VersionedStore>,
    retry: RetryPolicy,
}

impl PlacementManager {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry.clone().with_deadline(deadline),
        }
    }

    /// Digest of the stored placement.
    pub fn get_hash(&self, ns: &Namespace) -> ControllerResult<String> {
        namespace_exists(self.store.as_ref(), ns)?;
        Ok(self.store.digest(ns, PLACEMENT_KEY)?)
    }

    fn read(&self, ns: &Namespace) -> ControllerResult<Versioned<Placement>> {
        namespace_exists(self.store.as_ref(), ns)?;
        let raw = self
            .store
            .get(ns, PLACEMENT_KEY)?
            .ok_or_else(|| ControllerError::NotFound(format!("placement for namespace {ns}")))?;
        debug!(namespace = %ns, version = raw.version, "read placement");
        Ok(Versioned::new(decode(&raw.value)?, raw.version))
    }

    /// Read, apply `f`, and write back conditioned on the version read.
    /// An unchanged placement is returned without a write.
    fn transition<F>(&self, op: &'static str, ns: &Namespace, f: F) -> ControllerResult<Placement>
    where
        F: Fn(&Placement) -> ControllerResult<Placement>,
    {
        self.retry.run(op, || {
            let current = self.read(ns)?;
            let next = f(&current.value)?;
            if next == current.value {
                debug!(namespace = %ns, op, "placement unchanged");
                return Ok(next);
            }
            let version = self.store.put(
                ns,
                PLACEMENT_KEY,
                &encode(&next)?,
                Expected::Version(current.version),
            )?;
            info!(
                namespace = %ns,
                op,
                version,
                instances = next.instances.len(),
                replicas = next.replica_count(),
                "placement updated"
            );
            Ok(next)
        })
    }
}

impl PlacementMutator for PlacementManager {
    fn build_initial_placement(
        &self,
        ns: &Namespace,
        num_shards: u32,
        num_replica: u32,
        instances: &[Instance],
    ) -> ControllerResult<Placement> {
        let placement = placer::build_initial(num_shards, num_replica, instances)?;
        let bytes = encode(&placement)?;
        self.retry.check_deadline("build_initial_placement")?;
        namespace_exists(self.store.as_ref(), ns)?;
        match self.store.put(ns, PLACEMENT_KEY, &bytes, Expected::Absent) {
            Ok(version) => {
                info!(namespace = %ns, num_shards, num_replica, version, "placement built");
                Ok(placement)
            }
            Err(e) if e.is_conflict() => Err(ControllerError::AlreadyExists(format!(
                "placement for namespace {ns}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn get_current_placement(&self, ns: &Namespace) -> ControllerResult<Placement> {
        Ok(self.read(ns)?.value)
    }

    fn add_instance(&self, ns: &Namespace, new: &[Instance]) -> ControllerResult<Placement> {
        self.transition("add_instance", ns, |p| Ok(placer::add_instances(p, new)?))
    }

    fn replace_instance(
        &self,
        ns: &Namespace,
        leaving: &[String],
        new: &[Instance],
    ) -> ControllerResult<Placement> {
        self.transition("replace_instance", ns, |p| {
            Ok(placer::replace_instances(p, leaving, new)?)
        })
    }

    fn remove_instance(&self, ns: &Namespace, leaving: &[String]) -> ControllerResult<Placement> {
        self.transition("remove_instance", ns, |p| {
            Ok(placer::remove_instances(p, leaving)?)
        })
    }

    fn mark_namespace_available(&self, ns: &Namespace) -> ControllerResult<Placement> {
        self.transition("mark_namespace_available", ns, |p| {
            Ok(placer::mark_namespace_available(p)?)
        })
    }

    fn mark_instance_available(
        &self,
        ns: &Namespace,
        instance: &str,
    ) -> ControllerResult<Placement> {
        self.transition("mark_instance_available", ns, |p| {
            Ok(placer::mark_instance_available(p, instance)?)
        })
    }

    fn mark_shards_available(
        &self,
        ns: &Namespace,
        instance: &str,
        shards: &[ShardId],
    ) -> ControllerResult<Placement> {
        self.transition("mark_shards_available", ns, |p| {
            Ok(placer::mark_shards_available(p, instance, shards)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{instances, ns, store_with};
    use colmeta_placement::ReplicaState;

    fn manager() -> (Arc<dyn VersionedStore>, PlacementManager) {
        let store = store_with(&["ns1"]);
        let mgr = PlacementManager::new(Arc::clone(&store), RetryPolicy::default());
        (store, mgr)
    }

    fn version(store: &Arc<dyn VersionedStore>) -> u64 {
        store.get(&ns("ns1"), PLACEMENT_KEY).unwrap().unwrap().version
    }

    #[test]
    fn build_and_get() {
        let (_, mgr) = manager();
        let built = mgr
            .build_initial_placement(&ns("ns1"), 12, 1, &instances(&["a", "b", "c"]))
            .unwrap();
        assert_eq!(mgr.get_current_placement(&ns("ns1")).unwrap(), built);
        for load in built.loads().values() {
            assert_eq!(*load, 4);
        }
    }

    #[test]
    fn build_twice_is_already_exists() {
        let (_, mgr) = manager();
        mgr.build_initial_placement(&ns("ns1"), 4, 1, &instances(&["a"]))
            .unwrap();
        let err = mgr
            .build_initial_placement(&ns("ns1"), 4, 1, &instances(&["a"]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyExists(_)));
    }

    #[test]
    fn missing_placement_is_not_found() {
        let (_, mgr) = manager();
        assert!(mgr.get_current_placement(&ns("ns1")).unwrap_err().is_not_found());
        assert!(mgr
            .mark_namespace_available(&ns("ns1"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn invalid_build_writes_nothing() {
        let (store, mgr) = manager();
        let err = mgr
            .build_initial_placement(&ns("ns1"), 4, 3, &instances(&["a", "b"]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert!(store.get(&ns("ns1"), PLACEMENT_KEY).unwrap().is_none());
    }

    #[test]
    fn mark_twice_does_not_bump_version() {
        let (store, mgr) = manager();
        mgr.build_initial_placement(&ns("ns1"), 4, 2, &instances(&["a", "b"]))
            .unwrap();
        mgr.mark_shards_available(&ns("ns1"), "a", &[0, 1]).unwrap();
        let v = version(&store);
        let again = mgr.mark_shards_available(&ns("ns1"), "a", &[0, 1]).unwrap();
        assert_eq!(version(&store), v);
        assert_eq!(again.instances["a"].shards[&0].state, ReplicaState::Available);
    }

    #[test]
    fn add_then_mark_completes_handoff() {
        let (_, mgr) = manager();
        mgr.build_initial_placement(&ns("ns1"), 6, 1, &instances(&["a", "b"]))
            .unwrap();
        mgr.mark_namespace_available(&ns("ns1")).unwrap();

        let added = mgr.add_instance(&ns("ns1"), &instances(&["c"])).unwrap();
        assert_eq!(added.instances["c"].active_load(), 2);
        assert!(!added.is_stable());

        let done = mgr.mark_instance_available(&ns("ns1"), "c").unwrap();
        assert!(done.is_stable());
        assert_eq!(done.replica_count(), 6);
        for load in done.loads().values() {
            assert_eq!(*load, 2);
        }
    }

    #[test]
    fn remove_below_factor_is_rejected() {
        let (store, mgr) = manager();
        mgr.build_initial_placement(&ns("ns1"), 6, 2, &instances(&["a", "b", "c"]))
            .unwrap();
        let v = version(&store);
        let err = mgr
            .remove_instance(&ns("ns1"), &["a".to_string()])
            .unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert_eq!(version(&store), v);
    }

    #[test]
    fn replace_moves_every_shard() {
        let (_, mgr) = manager();
        mgr.build_initial_placement(&ns("ns1"), 4, 1, &instances(&["a", "b"]))
            .unwrap();
        mgr.mark_namespace_available(&ns("ns1")).unwrap();
        let replaced = mgr
            .replace_instance(&ns("ns1"), &["a".to_string()], &instances(&["c"]))
            .unwrap();
        assert_eq!(replaced.instances["c"].active_load(), 2);
        let done = mgr.mark_instance_available(&ns("ns1"), "c").unwrap();
        assert!(!done.instances.contains_key("a"));
        assert!(done.is_stable());
    }

    #[test]
    fn hash_tracks_placement_changes() {
        let (_, mgr) = manager();
        mgr.build_initial_placement(&ns("ns1"), 4, 1, &instances(&["a"]))
            .unwrap();
        let h = mgr.get_hash(&ns("ns1")).unwrap();
        mgr.mark_instance_available(&ns("ns1"), "a").unwrap();
        assert_ne!(mgr.get_hash(&ns("ns1")).unwrap(), h);
    }
}
