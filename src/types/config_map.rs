//! Flat configuration mapping with per-key provenance.
//!
//! Values are stored unresolved: they may still carry `{NAME}` tokens or
//! `OBF:`/`ENC:` payloads. Every write records where the value came from, so a
//! key can never exist without a source entry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// A base configuration file on disk
    File(String),
    /// A persisted override, identified by its logical file id
    Override(String),
    /// Process environment snapshot
    Environment,
    /// Set programmatically (command line defines, derived values)
    Computed,
}

impl Provenance {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File(path.into())
    }

    pub fn overridden(file_id: impl Into<String>) -> Self {
        Self::Override(file_id.into())
    }

    pub fn is_override(&self) -> bool {
        matches!(self, Self::Override(_))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path),
            Self::Override(id) => write!(f, "{}", id),
            Self::Environment => write!(f, "environment"),
            Self::Computed => write!(f, "computed"),
        }
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Key to provenance lookup
pub type SourceMap = BTreeMap<String, Provenance>;

/// Key to unresolved value mapping, last writer wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    values: BTreeMap<String, String>,
    sources: SourceMap,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value and record its provenance, replacing any earlier writer
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>, source: Provenance) {
        let key = key.into();
        self.sources.insert(key.clone(), source);
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn source(&self, key: &str) -> Option<&Provenance> {
        self.sources.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<(String, Provenance)> {
        let value = self.values.remove(key)?;
        let source = self.sources.remove(key).unwrap_or(Provenance::Computed);
        Some((value, source))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(key, value, provenance)` in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Provenance)> {
        self.values.iter().filter_map(|(k, v)| {
            self.sources
                .get(k)
                .map(|source| (k.as_str(), v.as_str(), source))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    /// Copy every entry of `other` on top of this map
    pub fn merge(&mut self, other: &ConfigMap) {
        for (key, value, source) in other.iter() {
            self.set(key, value, source.clone());
        }
    }

    /// Build a map where every entry shares one provenance
    pub fn from_pairs<I, K, V>(pairs: I, source: Provenance) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::new();
        for (key, value) in pairs {
            map.set(key, value, source.clone());
        }
        map
    }
}
