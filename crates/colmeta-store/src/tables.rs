//! redb table definitions for the versioned store.
//!
//! Both tables are keyed by `{namespace}/{key}`. Namespaces never contain
//! `/`, so the first separator splits scope from key.

use redb::TableDefinition;

/// Live values. A missing row means the key is absent.
pub const VALUES: TableDefinition<&str, &[u8]> = TableDefinition::new("values");

/// Last version written per key. Rows survive deletes.
pub const VERSIONS: TableDefinition<&str, u64> = TableDefinition::new("versions");
