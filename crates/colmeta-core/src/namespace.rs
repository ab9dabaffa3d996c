//! Namespace identifiers.
//!
//! Every entity and placement lives inside exactly one namespace. The
//! namespace is always passed explicitly; there is no ambient default.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a namespace identifier in bytes.
pub const MAX_NAMESPACE_LEN: usize = 128;

const ROOT_SCOPE: &str = "_root";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("namespace must not be empty")]
    Empty,
    #[error("namespace too long ({0} bytes, max {MAX_NAMESPACE_LEN})")]
    TooLong(usize),
    #[error("namespace {0:?} contains invalid character {1:?}")]
    InvalidChar(String, char),
    #[error("namespace {0:?} uses the reserved '_' prefix")]
    Reserved(String),
}

/// A validated namespace identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    pub fn parse(name: &str) -> Result<Self, NamespaceError> {
        if name.is_empty() {
            return Err(NamespaceError::Empty);
        }
        if name.len() > MAX_NAMESPACE_LEN {
            return Err(NamespaceError::TooLong(name.len()));
        }
        if name.starts_with('_') {
            return Err(NamespaceError::Reserved(name.to_string()));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(NamespaceError::InvalidChar(name.to_string(), c));
        }
        Ok(Self(name.to_string()))
    }

    /// The reserved scope holding cluster-wide records such as the
    /// namespace registry. Cannot be produced by [`Namespace::parse`].
    pub fn root() -> Self {
        Self(ROOT_SCOPE.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_SCOPE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = NamespaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

impl std::str::FromStr for Namespace {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_common_names() {
        for name in ["ns1", "prod-trips", "team_a.staging"] {
            assert_eq!(Namespace::parse(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn parse_rejects_invalid() {
        assert_eq!(Namespace::parse(""), Err(NamespaceError::Empty));
        assert!(matches!(
            Namespace::parse("a/b"),
            Err(NamespaceError::InvalidChar(_, '/'))
        ));
        assert!(matches!(
            Namespace::parse("_root"),
            Err(NamespaceError::Reserved(_))
        ));
        let long = "x".repeat(MAX_NAMESPACE_LEN + 1);
        assert!(matches!(Namespace::parse(&long), Err(NamespaceError::TooLong(_))));
    }

    #[test]
    fn root_scope_is_distinct() {
        let root = Namespace::root();
        assert!(root.is_root());
        assert!(!Namespace::parse("root").unwrap().is_root());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ns: Namespace = serde_json::from_str("\"ns1\"").unwrap();
        assert_eq!(ns.as_str(), "ns1");
        assert!(serde_json::from_str::<Namespace>("\"bad name\"").is_err());
    }
}
