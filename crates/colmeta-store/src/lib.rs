//! colmeta-store — versioned metadata store.
//!
//! Defines the [`VersionedStore`] contract every mutator is written
//! against (point reads, compare-and-swap writes, collection digests) and
//! ships [`RedbStore`], an embedded implementation backed by
//! [redb](https://docs.rs/redb) used by the operator CLI and tests.
//!
//! # Layout
//!
//! Keys are `/`-separated paths scoped by a [`Namespace`]. A collection is
//! a key prefix: an entry belongs to collection `c` when its key is `c` or
//! starts with `c/`. Values are opaque bytes; the controller stores
//! canonical JSON.
//!
//! Versions are tracked per key, start at 1 and only ever grow, including
//! across deletes, so a conditioned write cannot be confused by a
//! delete-and-recreate in between.
//!
//! [`Namespace`]: colmeta_core::Namespace

pub mod codec;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;
pub mod versioned;

pub use codec::{decode, encode};
pub use error::{StoreError, StoreResult};
pub use store::RedbStore;
pub use types::*;
pub use versioned::{VersionedStore, digest_entries};
