//! Generic versioned collection behind the uniform mutators.
//!
//! Each entity lives at `{COLLECTION}/{name}` inside its namespace, stored
//! as JSON. Writes go through the bounded CAS loop in [`RetryPolicy`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use colmeta_core::{ModelError, Namespace};
use colmeta_store::{Expected, Versioned, VersionedStore, decode, encode, key_path};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{ControllerError, ControllerResult};
use crate::retry::RetryPolicy;

/// Root-scope collection holding one record per namespace.
pub const NAMESPACES: &str = "namespaces";

/// A named, self-validating value stored in a [`Collection`].
pub trait Entity: Serialize + DeserializeOwned + Clone {
    /// Human-readable kind used in error messages and logs.
    const KIND: &'static str;
    /// Key prefix of the collection.
    const COLLECTION: &'static str;

    fn name(&self) -> &str;

    fn validate(&self) -> Result<(), ModelError>;
}

/// CRUD-plus-hash over one entity collection.
pub struct Collection<T> {
    store: Arc<dyn VersionedStore>,
    retry: RetryPolicy,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Collection<T> {
    pub fn new(store: Arc<dyn VersionedStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            _entity: PhantomData,
        }
    }

    /// Same collection, with every loop bounded by `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry.clone().with_deadline(deadline),
            _entity: PhantomData,
        }
    }

    pub fn key(name: &str) -> String {
        key_path(&[T::COLLECTION, name])
    }

    pub fn get(&self, ns: &Namespace, name: &str) -> ControllerResult<T> {
        self.get_versioned(ns, name)?
            .map(|v| v.value)
            .ok_or_else(|| not_found::<T>(ns, name))
    }

    /// Point read with the version it was read at.
    pub fn get_versioned(
        &self,
        ns: &Namespace,
        name: &str,
    ) -> ControllerResult<Option<Versioned<T>>> {
        self.ensure_namespace(ns)?;
        self.read(ns, name)
    }

    pub fn list(&self, ns: &Namespace) -> ControllerResult<Vec<T>> {
        self.ensure_namespace(ns)?;
        let entries = self.store.list(ns, T::COLLECTION)?;
        debug!(namespace = %ns, collection = T::COLLECTION, count = entries.len(), "listed");
        entries
            .iter()
            .map(|e| decode(&e.value).map_err(ControllerError::from))
            .collect()
    }

    /// Insert a new entity. `AlreadyExists` if the name is taken.
    pub fn create(&self, ns: &Namespace, value: &T) -> ControllerResult<()> {
        value.validate()?;
        self.retry.check_deadline("create")?;
        self.ensure_namespace(ns)?;
        let key = Self::key(value.name());
        let bytes = encode(value)?;
        match self.store.put(ns, &key, &bytes, Expected::Absent) {
            Ok(version) => {
                info!(namespace = %ns, kind = T::KIND, name = value.name(), version, "created");
                Ok(())
            }
            Err(e) if e.is_conflict() => Err(ControllerError::AlreadyExists(format!(
                "{} {} in namespace {ns}",
                T::KIND,
                value.name()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `value` whether or not it exists. Returns the new version.
    pub fn upsert(&self, ns: &Namespace, value: &T) -> ControllerResult<u64> {
        value.validate()?;
        let key = Self::key(value.name());
        let bytes = encode(value)?;
        self.retry.run("upsert", || {
            self.ensure_namespace(ns)?;
            let observed = self.store.get(ns, &key)?.map(|v| v.version);
            let version = self
                .store
                .put(ns, &key, &bytes, Expected::from_observed(observed))?;
            info!(namespace = %ns, kind = T::KIND, name = value.name(), version, "stored");
            Ok(version)
        })
    }

    /// Read-modify-write an existing entity. `NotFound` if absent.
    ///
    /// `f` may run more than once and must derive its result from the
    /// value it is given. The entity cannot be renamed.
    pub fn update_with<F>(&self, ns: &Namespace, name: &str, mut f: F) -> ControllerResult<T>
    where
        F: FnMut(&T) -> ControllerResult<T>,
    {
        let key = Self::key(name);
        self.retry.run("update", || {
            self.ensure_namespace(ns)?;
            let current = self.read(ns, name)?.ok_or_else(|| not_found::<T>(ns, name))?;
            let next = f(&current.value)?;
            if next.name() != name {
                return Err(ControllerError::Validation(format!(
                    "{} {name} cannot be renamed to {}",
                    T::KIND,
                    next.name()
                )));
            }
            next.validate()?;
            let version = self.store.put(
                ns,
                &key,
                &encode(&next)?,
                Expected::Version(current.version),
            )?;
            info!(namespace = %ns, kind = T::KIND, name, version, "updated");
            Ok(next)
        })
    }

    /// Read-modify-write that also covers the absent case: `f` is given
    /// `None` when nothing is stored under `name`.
    pub fn upsert_with<F>(&self, ns: &Namespace, name: &str, mut f: F) -> ControllerResult<T>
    where
        F: FnMut(Option<&T>) -> ControllerResult<T>,
    {
        let key = Self::key(name);
        self.retry.run("upsert", || {
            self.ensure_namespace(ns)?;
            let current = self.read(ns, name)?;
            let next = f(current.as_ref().map(|c| &c.value))?;
            if next.name() != name {
                return Err(ControllerError::Validation(format!(
                    "{} {name} cannot be stored as {}",
                    T::KIND,
                    next.name()
                )));
            }
            next.validate()?;
            let expected = Expected::from_observed(current.map(|c| c.version));
            let version = self.store.put(ns, &key, &encode(&next)?, expected)?;
            info!(namespace = %ns, kind = T::KIND, name, version, "stored");
            Ok(next)
        })
    }

    /// Replace an existing entity. `NotFound` if absent.
    pub fn update(&self, ns: &Namespace, value: &T) -> ControllerResult<()> {
        self.update_with(ns, value.name(), |_| Ok(value.clone()))
            .map(|_| ())
    }

    /// Delete an existing entity. `NotFound` if absent.
    pub fn delete(&self, ns: &Namespace, name: &str) -> ControllerResult<()> {
        let key = Self::key(name);
        self.retry.run("delete", || {
            self.ensure_namespace(ns)?;
            let current = self
                .store
                .get(ns, &key)?
                .ok_or_else(|| not_found::<T>(ns, name))?;
            self.store.delete(ns, &key, current.version)?;
            info!(namespace = %ns, kind = T::KIND, name, "deleted");
            Ok(())
        })
    }

    /// Digest of the whole collection.
    pub fn hash(&self, ns: &Namespace) -> ControllerResult<String> {
        self.ensure_namespace(ns)?;
        Ok(self.store.digest(ns, T::COLLECTION)?)
    }

    /// Digest of the single entity `name`.
    pub fn hash_of(&self, ns: &Namespace, name: &str) -> ControllerResult<String> {
        self.ensure_namespace(ns)?;
        Ok(self.store.digest(ns, &Self::key(name))?)
    }

    /// `NotFound` unless `ns` is registered. The root scope always exists.
    pub fn ensure_namespace(&self, ns: &Namespace) -> ControllerResult<()> {
        namespace_exists(self.store.as_ref(), ns)
    }

    fn read(&self, ns: &Namespace, name: &str) -> ControllerResult<Option<Versioned<T>>> {
        let Some(raw) = self.store.get(ns, &Self::key(name))? else {
            return Ok(None);
        };
        debug!(namespace = %ns, kind = T::KIND, name, version = raw.version, "read");
        let value = decode(&raw.value)?;
        Ok(Some(Versioned::new(value, raw.version)))
    }
}

/// `NotFound` unless `ns` is the root scope or has a registry record.
pub(crate) fn namespace_exists(store: &dyn VersionedStore, ns: &Namespace) -> ControllerResult<()> {
    if ns.is_root() {
        return Ok(());
    }
    let key = format!("{NAMESPACES}/{ns}");
    match store.get(&Namespace::root(), &key)? {
        Some(_) => Ok(()),
        None => Err(ControllerError::NotFound(format!("namespace {ns}"))),
    }
}

fn not_found<T: Entity>(ns: &Namespace, name: &str) -> ControllerError {
    ControllerError::NotFound(format!("{} {name} in namespace {ns}", T::KIND))
}
