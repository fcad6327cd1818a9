//! Persisted override store.
//!
//! One TOML file holds the overrides for every logical configuration file:
//!
//! ```toml
//! [meta]
//! created = "20261018093015123"
//! modified = "20261018101500042"
//!
//! [overrides."/MineStar.properties"]
//! _HOME = "/opt/mstar"
//! ```
//!
//! Entries this version does not understand are kept and written back as-is.
//! Saves replace the file atomically, so concurrent processes see whole
//! stores only; the last `save` wins.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::model::{OverrideFile, OverrideSet};
use crate::fsutil;
use crate::timestamp::TimestampedSection;
use crate::types::{MstarError, Result, ResultExt};

const META_KEY: &str = "meta";
const OVERRIDES_KEY: &str = "overrides";

/// Location of the persisted override store
#[derive(Debug, Clone)]
pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store. A missing file is an empty store.
    pub fn load(&self) -> Result<OverrideSet> {
        if !self.path.exists() {
            debug!("No override store at {}", self.path.display());
            return Ok(OverrideSet::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context_fn(|| format!("reading override store {}", self.path.display()))?;
        let set = self.parse(&text)?;
        debug!(
            "Loaded {} overrides from {}",
            set.len(),
            self.path.display()
        );
        Ok(set)
    }

    /// Persist `set`, stamping its modified (and first-time created) time
    pub fn save(&self, set: &mut OverrideSet) -> Result<()> {
        let previous = set.meta.clone();
        set.meta.touch();

        let result = render(set).and_then(|text| fsutil::write_atomic(&self.path, text.as_bytes()));
        if let Err(e) = &result {
            warn!("Saving override store {} failed: {}", self.path.display(), e);
            set.meta = previous;
        } else {
            info!("Saved {} overrides to {}", set.len(), self.path.display());
        }
        result
    }

    fn parse(&self, text: &str) -> Result<OverrideSet> {
        let corrupt = |message: String| MstarError::corrupt_store(&self.path, message);

        let mut root: toml::Table = toml::from_str(text).map_err(|e| corrupt(e.to_string()))?;
        let mut set = OverrideSet::new();

        if let Some(meta) = root.remove(META_KEY) {
            set.meta = meta
                .try_into::<TimestampedSection>()
                .map_err(|e| corrupt(format!("[{}]: {}", META_KEY, e)))?;
        }

        if let Some(overrides) = root.remove(OVERRIDES_KEY) {
            let toml::Value::Table(files) = overrides else {
                return Err(corrupt(format!("'{}' must be a table", OVERRIDES_KEY)));
            };
            for (file_id, entries) in files {
                let toml::Value::Table(entries) = entries else {
                    return Err(corrupt(format!("overrides for '{}' must be a table", file_id)));
                };
                let mut file = OverrideFile::new(&file_id);
                for (key, value) in entries {
                    match value {
                        toml::Value::String(s) => {
                            file.set(key, s);
                        }
                        other => {
                            file.extra.insert(key, other);
                        }
                    }
                }
                set.insert_file(file);
            }
        }

        set.extra = root;
        Ok(set)
    }
}

fn render(set: &OverrideSet) -> Result<String> {
    let mut root = set.extra.clone();

    let meta = toml::Value::try_from(&set.meta)
        .map_err(|e| MstarError::Config(format!("serializing store metadata: {}", e)))?;
    root.insert(META_KEY.to_string(), meta);

    let mut files = toml::Table::new();
    for file in set.files() {
        let mut entries = file.extra.clone();
        for (key, value) in file.iter() {
            entries.insert(key.to_string(), toml::Value::String(value.to_string()));
        }
        files.insert(file.id().to_string(), toml::Value::Table(entries));
    }
    root.insert(OVERRIDES_KEY.to_string(), toml::Value::Table(files));

    toml::to_string_pretty(&root)
        .map_err(|e| MstarError::Config(format!("serializing override store: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::Timestamp;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> OverrideStore {
        OverrideStore::new(dir.path().join("MineStar.overrides"))
    }

    #[test]
    fn test_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let set = store_in(&dir).load().unwrap();
        assert!(set.is_empty());
        assert!(!set.meta.is_persisted());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut set = OverrideSet::new();
        set.put("/MineStar.properties", "_HOME", "/b");
        set.put("/Site.properties", "_SITE", "north pit");
        store.save(&mut set).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.get("/MineStar.properties", "_HOME"), Some("/b"));
        assert_eq!(loaded.get("/Site.properties", "_SITE"), Some("north pit"));
        assert_eq!(loaded.meta, set.meta);
    }

    #[test]
    fn test_unknown_entries_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"
format = 3

[audit]
last_editor = "ops"

[overrides."/MineStar.properties"]
_HOME = "/a"
_RETRIES = 5
"#,
        )
        .unwrap();

        let mut set = store.load().unwrap();
        set.put("/MineStar.properties", "_HOME", "/b");
        store.save(&mut set).unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        let root: toml::Table = toml::from_str(&text).unwrap();
        assert_eq!(root["format"].as_integer(), Some(3));
        assert_eq!(root["audit"]["last_editor"].as_str(), Some("ops"));
        let file = &root["overrides"]["/MineStar.properties"];
        assert_eq!(file["_HOME"].as_str(), Some("/b"));
        assert_eq!(file["_RETRIES"].as_integer(), Some(5));
    }

    #[test]
    fn test_corrupt_store_reported() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "[overrides\n_HOME = ").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, MstarError::OverrideStoreCorrupt { .. }));

        std::fs::write(store.path(), "overrides = 4\n").unwrap();
        assert!(matches!(
            store.load().unwrap_err(),
            MstarError::OverrideStoreCorrupt { .. }
        ));
    }

    #[test]
    fn test_interrupted_save_leaves_old_state() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut set = OverrideSet::new();
        set.put("/MineStar.properties", "_HOME", "/old");
        store.save(&mut set).unwrap();

        // a writer that dies halfway through the new content
        let mut next = set.clone();
        next.put("/MineStar.properties", "_HOME", "/new");
        next.put("/MineStar.properties", "_EXTRA", "x");
        let full = render(&next).unwrap();
        let result = fsutil::write_atomic_with(store.path(), |file| {
            use std::io::Write;
            file.write_all(&full.as_bytes()[..full.len() / 2])?;
            Err(MstarError::Config("crash injected".to_string()))
        });
        assert!(result.is_err());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.get("/MineStar.properties", "_HOME"), Some("/old"));
        assert_eq!(loaded.get("/MineStar.properties", "_EXTRA"), None);

        store.save(&mut next).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.get("/MineStar.properties", "_HOME"), Some("/new"));
        assert_eq!(loaded.get("/MineStar.properties", "_EXTRA"), Some("x"));
    }

    #[test]
    fn test_failed_save_keeps_previous_metadata() {
        let dir = TempDir::new().unwrap();
        // parent is a regular file, so the save cannot create its directory
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = OverrideStore::new(blocker.join("MineStar.overrides"));

        let mut set = OverrideSet::new();
        set.put("/MineStar.properties", "_HOME", "/b");
        assert!(store.save(&mut set).is_err());
        assert!(!set.meta.is_persisted());
    }

    #[test]
    fn test_second_save_advances_modified_only() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut set = OverrideSet::new();
        set.put("/MineStar.properties", "_HOME", "/b");
        store.save(&mut set).unwrap();
        let first = store.load().unwrap().meta;

        set.put("/MineStar.properties", "_HOME", "/c");
        store.save(&mut set).unwrap();
        let second = store.load().unwrap().meta;

        assert_eq!(first.created, second.created);
        let (m1, m2): (Timestamp, Timestamp) =
            (first.modified.unwrap(), second.modified.unwrap());
        assert!(m2.to_string() >= m1.to_string());
    }
}
