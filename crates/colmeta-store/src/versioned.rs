//! The store contract the controller is written against.

use colmeta_core::Namespace;
use sha2::{Digest, Sha256};

use crate::error::StoreResult;
use crate::types::{Entry, Expected, Version, Versioned};

/// Namespaced key-value store with optimistic concurrency.
///
/// Implementations must make `put` and `delete` atomic with respect to
/// their precondition check: a write either observes the expected version
/// and applies, or fails with [`StoreError::VersionConflict`] and changes
/// nothing.
///
/// [`StoreError::VersionConflict`]: crate::StoreError::VersionConflict
pub trait VersionedStore: Send + Sync {
    /// Point read. `None` if the key holds no live value.
    fn get(&self, ns: &Namespace, key: &str) -> StoreResult<Option<Versioned<Vec<u8>>>>;

    /// Conditioned write. Returns the new version.
    fn put(&self, ns: &Namespace, key: &str, value: &[u8], expected: Expected)
    -> StoreResult<Version>;

    /// Conditioned delete of a live value at `expected`.
    fn delete(&self, ns: &Namespace, key: &str, expected: Version) -> StoreResult<()>;

    /// Live entries of a collection in ascending key order.
    fn list(&self, ns: &Namespace, collection: &str) -> StoreResult<Vec<Entry>>;

    /// Hex digest over the keys and values of a collection.
    ///
    /// Depends only on content: equal for equal collections regardless of
    /// write order or namespace, and different after any value change.
    fn digest(&self, ns: &Namespace, collection: &str) -> StoreResult<String> {
        Ok(digest_entries(&self.list(ns, collection)?))
    }
}

/// SHA-256 over length-prefixed `(key, value)` pairs, in the given order.
///
/// Callers pass entries sorted by key, which [`VersionedStore::list`]
/// guarantees. Versions are not hashed.
pub fn digest_entries(entries: &[Entry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update((entry.key.len() as u64).to_le_bytes());
        hasher.update(entry.key.as_bytes());
        hasher.update((entry.value.len() as u64).to_le_bytes());
        hasher.update(&entry.value);
    }
    hex::encode(hasher.finalize())
}
