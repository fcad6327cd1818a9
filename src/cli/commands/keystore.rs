//! Keystore Commands
//!
//! Usage:
//!   mstarconf --password-env VAR keystore add-key [ALIAS] [--force]
//!   mstarconf keystore list

use std::path::PathBuf;

use crate::cli::ui::Output;
use crate::cli::util::CommandOptions;
use crate::config::Settings;
use crate::crypto::{FileKeystore, Keystore};
use crate::types::{MstarError, Result};

fn keystore_path(settings: &Settings) -> Result<PathBuf> {
    settings.keystore.clone().ok_or_else(|| {
        MstarError::Config("no keystore configured (set `keystore` in settings)".to_string())
    })
}

/// Generate a new property key under `alias` (default: the configured alias)
pub fn add_key(options: &CommandOptions, alias: Option<&str>, force: bool) -> Result<()> {
    let settings = options.load_settings()?;
    let path = keystore_path(&settings)?;
    let alias = alias.unwrap_or(&settings.key_alias);

    let keystore = FileKeystore::open(&path)?;
    if keystore.aliases().iter().any(|a| a == alias) && !force {
        return Err(MstarError::Config(format!(
            "Key '{}' already exists. Use --force to replace it.",
            alias
        )));
    }
    keystore.generate_key(alias, &options.password()?)?;

    let out = Output::new();
    out.success(&format!("Generated key '{}'", alias));
    out.info(&format!("Keystore: {}", path.display()));
    if force {
        out.warning("Values encrypted under the previous key can no longer be decrypted");
    }
    Ok(())
}

pub fn list(options: &CommandOptions) -> Result<()> {
    let path = keystore_path(&options.load_settings()?)?;
    let keystore = FileKeystore::open(&path)?;

    let out = Output::new();
    out.header(&format!("Keystore ({})", path.display()));
    let meta = keystore.meta();
    if let (Some(created), Some(modified)) = (meta.created, meta.modified) {
        out.info(&format!("created {}, modified {}", created, modified));
    }

    let aliases = keystore.aliases();
    if aliases.is_empty() {
        out.info("No keys");
        return Ok(());
    }
    let width = aliases.iter().map(String::len).max().unwrap_or(0);
    for alias in aliases {
        let handle = keystore.get(&alias)?;
        out.entry(&alias, &handle.algorithm().to_string(), width);
    }
    Ok(())
}
