//! Ingestion assignment mutator: which jobs each subscriber runs.

use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{IngestionAssignment, ModelError, Namespace};
use colmeta_store::VersionedStore;

use crate::collection::{Collection, Entity};
use crate::error::ControllerResult;
use crate::retry::RetryPolicy;

impl Entity for IngestionAssignment {
    const KIND: &'static str = "assignment";
    const COLLECTION: &'static str = "assignments";

    fn name(&self) -> &str {
        &self.subscriber
    }

    fn validate(&self) -> Result<(), ModelError> {
        IngestionAssignment::validate(self)
    }
}

#[derive(Clone)]
pub struct AssignmentMutator {
    assignments: Collection<IngestionAssignment>,
}

impl AssignmentMutator {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            assignments: Collection::new(store, retry),
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            assignments: self.assignments.with_deadline(deadline),
        }
    }

    pub fn get_assignment(
        &self,
        ns: &Namespace,
        subscriber: &str,
    ) -> ControllerResult<IngestionAssignment> {
        self.assignments.get(ns, subscriber)
    }

    pub fn get_assignments(&self, ns: &Namespace) -> ControllerResult<Vec<IngestionAssignment>> {
        self.assignments.list(ns)
    }

    pub fn add_assignment(
        &self,
        ns: &Namespace,
        assignment: &IngestionAssignment,
    ) -> ControllerResult<()> {
        self.assignments.create(ns, assignment)
    }

    pub fn update_assignment(
        &self,
        ns: &Namespace,
        assignment: &IngestionAssignment,
    ) -> ControllerResult<()> {
        self.assignments.update(ns, assignment)
    }

    pub fn delete_assignment(&self, ns: &Namespace, subscriber: &str) -> ControllerResult<()> {
        self.assignments.delete(ns, subscriber)
    }

    /// Digest of one subscriber's assignment; changes whenever its job
    /// list does.
    pub fn get_hash(&self, ns: &Namespace, subscriber: &str) -> ControllerResult<String> {
        self.assignments.hash_of(ns, subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;
    use crate::testutil::{job, ns, store_with};

    fn assignment(subscriber: &str, jobs: &[&str]) -> IngestionAssignment {
        IngestionAssignment {
            subscriber: subscriber.to_string(),
            jobs: jobs.iter().map(|j| job(j)).collect(),
        }
    }

    #[test]
    fn crud_round() {
        let m = AssignmentMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        m.add_assignment(&ns("ns1"), &assignment("sub-a", &["j1"])).unwrap();
        m.update_assignment(&ns("ns1"), &assignment("sub-a", &["j1", "j2"]))
            .unwrap();
        assert_eq!(m.get_assignment(&ns("ns1"), "sub-a").unwrap().jobs.len(), 2);
        assert_eq!(m.get_assignments(&ns("ns1")).unwrap().len(), 1);
        m.delete_assignment(&ns("ns1"), "sub-a").unwrap();
        assert!(m.get_assignment(&ns("ns1"), "sub-a").unwrap_err().is_not_found());
    }

    #[test]
    fn hash_is_scoped_to_one_subscriber() {
        let m = AssignmentMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        m.add_assignment(&ns("ns1"), &assignment("sub-a", &["j1"])).unwrap();
        let a = m.get_hash(&ns("ns1"), "sub-a").unwrap();

        m.add_assignment(&ns("ns1"), &assignment("sub-b", &["j2"])).unwrap();
        assert_eq!(m.get_hash(&ns("ns1"), "sub-a").unwrap(), a);

        m.update_assignment(&ns("ns1"), &assignment("sub-a", &["j1", "j3"]))
            .unwrap();
        assert_ne!(m.get_hash(&ns("ns1"), "sub-a").unwrap(), a);
    }

    #[test]
    fn prefix_sibling_does_not_leak_into_hash() {
        let m = AssignmentMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        m.add_assignment(&ns("ns1"), &assignment("sub", &["j1"])).unwrap();
        let h = m.get_hash(&ns("ns1"), "sub").unwrap();
        m.add_assignment(&ns("ns1"), &assignment("sub-2", &["j1"])).unwrap();
        assert_eq!(m.get_hash(&ns("ns1"), "sub").unwrap(), h);
    }

    #[test]
    fn duplicate_jobs_rejected() {
        let m = AssignmentMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        let err = m
            .add_assignment(&ns("ns1"), &assignment("sub-a", &["j1", "j1"]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
    }
}
