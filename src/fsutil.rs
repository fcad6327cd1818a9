//! Atomic file replacement.
//!
//! Content is written to a temporary file in the destination directory and
//! renamed over the target in one step. Readers in other processes see either
//! the previous file or the new one, never a partial write. If writing fails
//! the temporary file is removed and the target is untouched.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::types::{MstarError, Result, ResultExt};

/// Atomically replace `path` with `contents`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    write_atomic_with(path, |file| file.write_all(contents).map_err(MstarError::from))
}

/// Atomically replace `path` with whatever `write` produces
pub fn write_atomic_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context_fn(|| format!("creating directory {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context_fn(|| format!("creating temporary file in {}", dir.display()))?;

    // On error `tmp` is dropped here, which deletes it
    write(&mut tmp)?;

    tmp.as_file()
        .sync_all()
        .with_context_fn(|| format!("syncing {}", tmp.path().display()))?;
    tmp.persist(path).map_err(|e| {
        MstarError::Io(std::io::Error::new(
            e.error.kind(),
            format!("replacing {}: {}", path.display(), e.error),
        ))
    })?;

    debug!("Atomically replaced {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/store.toml");

        write_atomic(&target, b"a = 1\n").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "a = 1\n");
    }

    #[test]
    fn test_failed_write_leaves_target_and_no_debris() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("store.toml");
        std::fs::write(&target, "old").unwrap();

        let result = write_atomic_with(&target, |file| {
            file.write_all(b"half of the new").map_err(MstarError::from)?;
            Err(MstarError::Config("crash injected".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
