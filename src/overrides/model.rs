//! In-memory form of the override store.

use std::collections::BTreeMap;

use crate::timestamp::TimestampedSection;
use crate::types::{ConfigMap, Provenance};

/// Overrides for one logical configuration file (e.g. `/MineStar.properties`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideFile {
    id: String,
    values: BTreeMap<String, String>,
    /// Non-string entries found on disk, written back untouched
    pub(crate) extra: toml::Table,
}

impl OverrideFile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
            extra: toml::Table::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra.is_empty()
    }
}

/// Every override, grouped by logical file id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    files: BTreeMap<String, OverrideFile>,
    pub meta: TimestampedSection,
    /// Unknown top-level entries, written back untouched
    pub(crate) extra: toml::Table,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, file_id: &str) -> Option<&OverrideFile> {
        self.files.get(file_id)
    }

    pub fn files(&self) -> impl Iterator<Item = &OverrideFile> {
        self.files.values()
    }

    pub(crate) fn insert_file(&mut self, file: OverrideFile) {
        self.files.insert(file.id.clone(), file);
    }

    pub fn get(&self, file_id: &str, key: &str) -> Option<&str> {
        self.files.get(file_id)?.get(key)
    }

    /// Set `key` in `file_id`, returning the value it replaced
    pub fn put(
        &mut self,
        file_id: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.files
            .entry(file_id.to_string())
            .or_insert_with(|| OverrideFile::new(file_id))
            .set(key, value)
    }

    /// Remove `key` from `file_id`; a file left with no entries is dropped
    pub fn remove(&mut self, file_id: &str, key: &str) -> Option<String> {
        let file = self.files.get_mut(file_id)?;
        let removed = file.unset(key);
        if file.is_empty() {
            self.files.remove(file_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.files.values().map(OverrideFile::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Files in merge order: those named in `preferred` first, in that order,
    /// then any others by id
    fn ordered<'a>(&'a self, preferred: &'a [String]) -> impl Iterator<Item = &'a OverrideFile> {
        let listed = preferred.iter().filter_map(|id| self.files.get(id));
        let rest = self
            .files
            .values()
            .filter(move |f| !preferred.iter().any(|id| id == &f.id));
        listed.chain(rest)
    }

    /// Write every override into `config`, recording its file id as the source
    pub fn apply_to(&self, config: &mut ConfigMap, preferred: &[String]) -> usize {
        let mut applied = 0;
        for file in self.ordered(preferred) {
            for (key, value) in file.iter() {
                config.set(key, value, Provenance::overridden(file.id()));
                applied += 1;
            }
        }
        applied
    }

    /// All overrides as one map, in the same order `apply_to` uses
    pub fn flatten(&self, preferred: &[String]) -> ConfigMap {
        let mut map = ConfigMap::new();
        self.apply_to(&mut map, preferred);
        map
    }
}
