//! Ingestion job mutator.

use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{JobConfig, ModelError, Namespace};
use colmeta_store::VersionedStore;

use crate::collection::{Collection, Entity};
use crate::error::ControllerResult;
use crate::retry::RetryPolicy;

impl Entity for JobConfig {
    const KIND: &'static str = "job";
    const COLLECTION: &'static str = "jobs";

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ModelError> {
        JobConfig::validate(self)
    }
}

#[derive(Clone)]
pub struct JobMutator {
    jobs: Collection<JobConfig>,
}

impl JobMutator {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            jobs: Collection::new(store, retry),
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            jobs: self.jobs.with_deadline(deadline),
        }
    }

    pub fn get_job(&self, ns: &Namespace, name: &str) -> ControllerResult<JobConfig> {
        self.jobs.get(ns, name)
    }

    pub fn get_jobs(&self, ns: &Namespace) -> ControllerResult<Vec<JobConfig>> {
        self.jobs.list(ns)
    }

    /// Add a job at version 1.
    pub fn add_job(&self, ns: &Namespace, job: &JobConfig) -> ControllerResult<JobConfig> {
        let mut fresh = job.clone();
        fresh.version = 1;
        self.jobs.create(ns, &fresh)?;
        Ok(fresh)
    }

    /// Replace a job, bumping its version.
    pub fn update_job(&self, ns: &Namespace, job: &JobConfig) -> ControllerResult<JobConfig> {
        self.jobs.update_with(ns, &job.name, |current| {
            let mut next = job.clone();
            next.version = current.version + 1;
            Ok(next)
        })
    }

    pub fn delete_job(&self, ns: &Namespace, name: &str) -> ControllerResult<()> {
        self.jobs.delete(ns, name)
    }

    pub fn get_hash(&self, ns: &Namespace) -> ControllerResult<String> {
        self.jobs.hash(ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControllerError;
    use crate::testutil::{job, ns, store_with};

    #[test]
    fn add_update_delete() {
        let m = JobMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        assert_eq!(m.add_job(&ns("ns1"), &job("trips-ingest")).unwrap().version, 1);

        let mut next = job("trips-ingest");
        next.topic = "trips-v2".to_string();
        assert_eq!(m.update_job(&ns("ns1"), &next).unwrap().version, 2);
        assert_eq!(m.get_job(&ns("ns1"), "trips-ingest").unwrap().topic, "trips-v2");

        m.delete_job(&ns("ns1"), "trips-ingest").unwrap();
        assert!(m.get_jobs(&ns("ns1")).unwrap().is_empty());
    }

    #[test]
    fn duplicate_add_is_already_exists() {
        let m = JobMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        m.add_job(&ns("ns1"), &job("j1")).unwrap();
        assert!(matches!(
            m.add_job(&ns("ns1"), &job("j1")).unwrap_err(),
            ControllerError::AlreadyExists(_)
        ));
    }

    #[test]
    fn update_missing_is_not_found() {
        let m = JobMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        assert!(m.update_job(&ns("ns1"), &job("j1")).unwrap_err().is_not_found());
        assert!(m.delete_job(&ns("ns1"), "j1").unwrap_err().is_not_found());
    }

    #[test]
    fn job_without_topic_is_invalid() {
        let m = JobMutator::new(store_with(&["ns1"]), RetryPolicy::default());
        let mut bad = job("j1");
        bad.topic.clear();
        assert!(matches!(
            m.add_job(&ns("ns1"), &bad).unwrap_err(),
            ControllerError::Validation(_)
        ));
    }
}
