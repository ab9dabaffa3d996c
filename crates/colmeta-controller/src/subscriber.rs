//! Subscriber registry.
//!
//! Readers only see [`SubscriberReader`]; subscriber processes register
//! and deregister themselves through [`SubscriberMutator`].

use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{ModelError, Namespace, Subscriber};
use colmeta_store::VersionedStore;
use tracing::info;

use crate::collection::{Collection, Entity};
use crate::error::ControllerResult;
use crate::retry::RetryPolicy;

impl Entity for Subscriber {
    const KIND: &'static str = "subscriber";
    const COLLECTION: &'static str = "subscribers";

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), ModelError> {
        Subscriber::validate(self)
    }
}

pub trait SubscriberReader {
    fn get_subscriber(&self, ns: &Namespace, name: &str) -> ControllerResult<Subscriber>;

    fn get_subscribers(&self, ns: &Namespace) -> ControllerResult<Vec<Subscriber>>;

    fn get_hash(&self, ns: &Namespace) -> ControllerResult<String>;
}

#[derive(Clone)]
pub struct SubscriberMutator {
    subscribers: Collection<Subscriber>,
}

impl SubscriberMutator {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            subscribers: Collection::new(store, retry),
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            subscribers: self.subscribers.with_deadline(deadline),
        }
    }

    /// Register or re-register a subscriber, replacing its address.
    pub fn register(&self, ns: &Namespace, subscriber: &Subscriber) -> ControllerResult<()> {
        self.subscribers.upsert(ns, subscriber)?;
        info!(namespace = %ns, subscriber = %subscriber.name, address = %subscriber.address, "subscriber registered");
        Ok(())
    }

    pub fn deregister(&self, ns: &Namespace, name: &str) -> ControllerResult<()> {
        self.subscribers.delete(ns, name)
    }
}

impl SubscriberReader for SubscriberMutator {
    fn get_subscriber(&self, ns: &Namespace, name: &str) -> ControllerResult<Subscriber> {
        self.subscribers.get(ns, name)
    }

    fn get_subscribers(&self, ns: &Namespace) -> ControllerResult<Vec<Subscriber>> {
        self.subscribers.list(ns)
    }

    fn get_hash(&self, ns: &Namespace) -> ControllerResult<String> {
        self.subscribers.hash(ns)
    }
}
