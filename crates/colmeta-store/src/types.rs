//! Value types shared by the store contract and its implementations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-key version. `0` is never assigned to a live value.
pub type Version = u64;

/// Precondition for a conditioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expected {
    /// The key must not hold a live value.
    Absent,
    /// The live value must be at exactly this version.
    Version(Version),
}

impl Expected {
    /// Precondition matching what a read observed.
    pub fn from_observed(observed: Option<Version>) -> Self {
        match observed {
            Some(v) => Expected::Version(v),
            None => Expected::Absent,
        }
    }

    pub fn matches(self, live: Option<Version>) -> bool {
        match (self, live) {
            (Expected::Absent, None) => true,
            (Expected::Version(want), Some(have)) => want == have,
            _ => false,
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Absent => f.write_str("absent"),
            Expected::Version(v) => write!(f, "version {v}"),
        }
    }
}

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }
}

/// One live entry returned by a collection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Key relative to the namespace.
    pub key: String,
    pub value: Vec<u8>,
    pub version: Version,
}

/// Joins path segments into a store key.
pub fn key_path(segments: &[&str]) -> String {
    segments.join("/")
}

/// Checks a key is a non-empty `/`-separated path without empty segments.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.split('/').all(|seg| !seg.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_matches_observed_state() {
        assert!(Expected::Absent.matches(None));
        assert!(!Expected::Absent.matches(Some(1)));
        assert!(Expected::Version(3).matches(Some(3)));
        assert!(!Expected::Version(3).matches(Some(4)));
        assert!(!Expected::Version(3).matches(None));
        assert_eq!(Expected::from_observed(Some(2)), Expected::Version(2));
        assert_eq!(Expected::from_observed(None), Expected::Absent);
    }

    #[test]
    fn key_validation() {
        assert!(is_valid_key("jobs/trips"));
        assert!(is_valid_key("placement"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("/jobs"));
        assert!(!is_valid_key("jobs/"));
        assert!(!is_valid_key("jobs//trips"));
        assert_eq!(key_path(&["enums", "trips", "city"]), "enums/trips/city");
    }
}
