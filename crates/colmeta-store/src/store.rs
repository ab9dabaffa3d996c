//! RedbStore — embedded redb implementation of [`VersionedStore`].
//!
//! Each conditioned write runs in a single redb write transaction, which
//! redb serializes, so the version check and the write are atomic. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use colmeta_core::Namespace;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::*;
use crate::types::*;
use crate::versioned::VersionedStore;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe versioned store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "metadata store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory metadata store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(VALUES).map_err(map_err!(Table))?;
        txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn full_key(ns: &Namespace, key: &str) -> StoreResult<String> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(format!("{ns}/{key}"))
    }

    /// Apply `write` if the live version matches `expected`, bumping the
    /// key's version. `write` receives the values table and full key.
    fn conditioned<F>(
        &self,
        ns: &Namespace,
        key: &str,
        expected: Expected,
        write: F,
    ) -> StoreResult<Version>
    where
        F: FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>, &str) -> StoreResult<()>,
    {
        let full = Self::full_key(ns, key)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let mut values = txn.open_table(VALUES).map_err(map_err!(Table))?;
            let mut versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
            let live = values.get(full.as_str()).map_err(map_err!(Read))?.is_some();
            let last = versions
                .get(full.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);
            let current = live.then_some(last);
            if expected.matches(current) {
                let next = last + 1;
                write(&mut values, full.as_str())?;
                versions
                    .insert(full.as_str(), next)
                    .map_err(map_err!(Write))?;
                Ok(next)
            } else {
                Err(current)
            }
        };
        match outcome {
            Ok(next) => {
                txn.commit().map_err(map_err!(Transaction))?;
                Ok(next)
            }
            Err(actual) => {
                txn.abort().map_err(map_err!(Transaction))?;
                debug!(namespace = %ns, %key, %expected, ?actual, "version conflict");
                Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    actual,
                })
            }
        }
    }
}

impl VersionedStore for RedbStore {
    fn get(&self, ns: &Namespace, key: &str) -> StoreResult<Option<Versioned<Vec<u8>>>> {
        let full = Self::full_key(ns, key)?;
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let values = txn.open_table(VALUES).map_err(map_err!(Table))?;
        let Some(guard) = values.get(full.as_str()).map_err(map_err!(Read))? else {
            return Ok(None);
        };
        let value = guard.value().to_vec();
        let versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        let version = versions
            .get(full.as_str())
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .ok_or_else(|| StoreError::Read(format!("missing version for {full}")))?;
        Ok(Some(Versioned::new(value, version)))
    }

    fn put(
        &self,
        ns: &Namespace,
        key: &str,
        value: &[u8],
        expected: Expected,
    ) -> StoreResult<Version> {
        let version = self.conditioned(ns, key, expected, |values, full| {
            values.insert(full, value).map_err(map_err!(Write))?;
            Ok(())
        })?;
        debug!(namespace = %ns, %key, version, "value stored");
        Ok(version)
    }

    fn delete(&self, ns: &Namespace, key: &str, expected: Version) -> StoreResult<()> {
        let tombstone = self.conditioned(ns, key, Expected::Version(expected), |values, full| {
            values.remove(full).map_err(map_err!(Write))?;
            Ok(())
        })?;
        debug!(namespace = %ns, %key, tombstone, "value deleted");
        Ok(())
    }

    fn list(&self, ns: &Namespace, collection: &str) -> StoreResult<Vec<Entry>> {
        let exact = Self::full_key(ns, collection)?;
        let children = format!("{exact}/");
        let scope_len = ns.as_str().len() + 1;

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let values = txn.open_table(VALUES).map_err(map_err!(Table))?;
        let versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;

        let mut results = Vec::new();
        for entry in values.range(exact.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let full = key.value();
            if full != exact && !full.starts_with(&children) {
                // `jobs-archive` sorts between `jobs` and `jobs/`; stop
                // only once past the children range.
                if full > children.as_str() {
                    break;
                }
                continue;
            }
            let version = versions
                .get(full)
                .map_err(map_err!(Read))?
                .map(|g| g.value())
                .ok_or_else(|| StoreError::Read(format!("missing version for {full}")))?;
            results.push(Entry {
                key: full[scope_len..].to_string(),
                value: value.value().to_vec(),
                version,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(name: &str) -> Namespace {
        Namespace::parse(name).unwrap()
    }

    #[test]
    fn put_and_get() {
        let store = RedbStore::open_in_memory().unwrap();
        let v = store.put(&ns("a"), "jobs/x", b"one", Expected::Absent).unwrap();
        assert_eq!(v, 1);

        let got = store.get(&ns("a"), "jobs/x").unwrap().unwrap();
        assert_eq!(got.value, b"one");
        assert_eq!(got.version, 1);
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = RedbStore::open_in_memory().unwrap();
        assert!(store.get(&ns("a"), "nothing").unwrap().is_none());
    }

    #[test]
    fn namespaces_are_isolated() {
        let store = RedbStore::open_in_memory().unwrap();
        store.put(&ns("a"), "k", b"1", Expected::Absent).unwrap();
        assert!(store.get(&ns("b"), "k").unwrap().is_none());
        store.put(&ns("b"), "k", b"2", Expected::Absent).unwrap();
        assert_eq!(store.get(&ns("a"), "k").unwrap().unwrap().value, b"1");
    }

    #[test]
    fn create_twice_conflicts() {
        let store = RedbStore::open_in_memory().unwrap();
        store.put(&ns("a"), "k", b"1", Expected::Absent).unwrap();
        let err = store.put(&ns("a"), "k", b"2", Expected::Absent).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { actual: Some(1), .. }
        ));
        assert_eq!(store.get(&ns("a"), "k").unwrap().unwrap().value, b"1");
    }

    #[test]
    fn stale_version_conflicts() {
        let store = RedbStore::open_in_memory().unwrap();
        let v1 = store.put(&ns("a"), "k", b"1", Expected::Absent).unwrap();
        let v2 = store.put(&ns("a"), "k", b"2", Expected::Version(v1)).unwrap();
        assert_eq!(v2, 2);

        let err = store.put(&ns("a"), "k", b"3", Expected::Version(v1)).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn versions_survive_delete() {
        let store = RedbStore::open_in_memory().unwrap();
        let v1 = store.put(&ns("a"), "k", b"1", Expected::Absent).unwrap();
        store.delete(&ns("a"), "k", v1).unwrap();
        assert!(store.get(&ns("a"), "k").unwrap().is_none());

        // Recreating continues the sequence, so the old version stays stale.
        let v3 = store.put(&ns("a"), "k", b"again", Expected::Absent).unwrap();
        assert_eq!(v3, 3);
        assert!(store.put(&ns("a"), "k", b"x", Expected::Version(v1)).is_err());
    }

    #[test]
    fn delete_requires_matching_version() {
        let store = RedbStore::open_in_memory().unwrap();
        let v1 = store.put(&ns("a"), "k", b"1", Expected::Absent).unwrap();
        store.put(&ns("a"), "k", b"2", Expected::Version(v1)).unwrap();
        assert!(store.delete(&ns("a"), "k", v1).unwrap_err().is_conflict());
        assert!(store.delete(&ns("a"), "missing", 1).unwrap_err().is_conflict());
    }

    #[test]
    fn invalid_keys_rejected() {
        let store = RedbStore::open_in_memory().unwrap();
        assert!(matches!(
            store.put(&ns("a"), "jobs//x", b"", Expected::Absent),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn list_returns_collection_in_key_order() {
        let store = RedbStore::open_in_memory().unwrap();
        let a = ns("a");
        store.put(&a, "jobs/b", b"2", Expected::Absent).unwrap();
        store.put(&a, "jobs/a", b"1", Expected::Absent).unwrap();
        store.put(&a, "jobs2/z", b"x", Expected::Absent).unwrap();
        store.put(&a, "jobs-archive", b"x", Expected::Absent).unwrap();
        store.put(&a, "subscribers/s", b"x", Expected::Absent).unwrap();
        store.put(&ns("b"), "jobs/c", b"3", Expected::Absent).unwrap();

        let jobs = store.list(&a, "jobs").unwrap();
        let keys: Vec<_> = jobs.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["jobs/a", "jobs/b"]);
        assert_eq!(jobs[0].value, b"1");
    }

    #[test]
    fn list_includes_exact_key() {
        let store = RedbStore::open_in_memory().unwrap();
        let a = ns("a");
        store.put(&a, "assignments/sub1", b"x", Expected::Absent).unwrap();
        store.put(&a, "assignments/sub10", b"y", Expected::Absent).unwrap();

        let one = store.list(&a, "assignments/sub1").unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].key, "assignments/sub1");
    }

    #[test]
    fn digest_ignores_write_order_and_namespace() {
        let store = RedbStore::open_in_memory().unwrap();
        store.put(&ns("a"), "jobs/x", b"1", Expected::Absent).unwrap();
        store.put(&ns("a"), "jobs/y", b"2", Expected::Absent).unwrap();
        store.put(&ns("b"), "jobs/y", b"2", Expected::Absent).unwrap();
        store.put(&ns("b"), "jobs/x", b"1", Expected::Absent).unwrap();

        let da = store.digest(&ns("a"), "jobs").unwrap();
        let db = store.digest(&ns("b"), "jobs").unwrap();
        assert_eq!(da, db);
        assert_eq!(da.len(), 64);
    }

    #[test]
    fn digest_tracks_content_not_versions() {
        let store = RedbStore::open_in_memory().unwrap();
        let a = ns("a");
        let empty = store.digest(&a, "jobs").unwrap();

        let v1 = store.put(&a, "jobs/x", b"1", Expected::Absent).unwrap();
        let one = store.digest(&a, "jobs").unwrap();
        assert_ne!(empty, one);

        let v2 = store.put(&a, "jobs/x", b"2", Expected::Version(v1)).unwrap();
        assert_ne!(store.digest(&a, "jobs").unwrap(), one);

        store.put(&a, "jobs/x", b"1", Expected::Version(v2)).unwrap();
        assert_eq!(store.digest(&a, "jobs").unwrap(), one);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("meta.redb");

        {
            let store = RedbStore::open(&db_path).unwrap();
            store.put(&ns("prod"), "placement", b"p", Expected::Absent).unwrap();
        }

        // Reopen the same database file.
        let store = RedbStore::open(&db_path).unwrap();
        let got = store.get(&ns("prod"), "placement").unwrap().unwrap();
        assert_eq!(got.value, b"p");
        assert_eq!(got.version, 1);
    }

    #[test]
    fn concurrent_creates_have_one_winner() {
        let store = RedbStore::open_in_memory().unwrap();
        let a = ns("a");
        let wins: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = store.clone();
                    let a = a.clone();
                    s.spawn(move || {
                        store
                            .put(&a, "race", format!("{i}").as_bytes(), Expected::Absent)
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });
        assert_eq!(wins, 1);
    }
}
