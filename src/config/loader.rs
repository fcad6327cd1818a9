//! Settings Loader (Figment-based)
//!
//! Loads and merges settings from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global settings (~/.config/mstarconf/settings.toml)
//! 3. Explicit settings file (`--settings`)
//! 4. Environment variables (MSTARCONF_* prefix, `__` separates nesting)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{debug, info};

use super::types::Settings;
use crate::types::{MstarError, Result};

/// Environment variable prefix for settings
pub const ENV_PREFIX: &str = "MSTARCONF_";

/// Environment variable holding an inline base64 property key
pub const KEY_ENV: &str = "MSTARCONF_KEY";

/// Settings loader
pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings with full resolution chain using Figment:
    /// defaults → global → explicit file → env vars
    pub fn load(explicit: Option<&Path>) -> Result<Settings> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(global_path) = Self::global_settings_path()
            && global_path.exists()
        {
            debug!("Loading global settings from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(MstarError::Config(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading settings from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        // e.g. MSTARCONF_KEY_ALIAS -> key_alias, MSTARCONF_LENIENT -> lenient
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        Self::extract(figment)
    }

    /// Load settings from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Settings> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Settings::default()))
                .merge(Toml::file(path)),
        )
    }

    fn extract(figment: Figment) -> Result<Settings> {
        let mut settings: Settings = figment
            .extract()
            .map_err(|e| MstarError::Config(format!("Settings error: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global settings directory (~/.config/mstarconf/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(|p| PathBuf::from(p).join("mstarconf"))
            .or_else(|| {
                ProjectDirs::from("", "", "mstarconf").map(|dirs| dirs.config_dir().to_path_buf())
            })
    }

    /// Get path to global settings file
    pub fn global_settings_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("settings.toml"))
    }

    /// Show settings file paths
    pub fn show_path(explicit: Option<&Path>) {
        println!("Settings paths:");
        println!();

        if let Some(global) = Self::global_settings_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:   {} {}", exists, global.display());
        } else {
            println!("  Global:   (not available)");
        }

        if let Some(path) = explicit {
            let exists = if path.exists() { "✓" } else { "✗" };
            println!("  Explicit: {} {}", exists, path.display());
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write the default global settings file
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let path = Self::global_settings_path().ok_or_else(|| {
            MstarError::Config("Cannot determine global settings directory".to_string())
        })?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        if !path.exists() || force {
            fs::write(&path, Self::default_settings())?;
            info!("Created global settings: {}", path.display());
        } else {
            info!("Global settings exist: {}", path.display());
        }
        Ok(path)
    }

    /// Default settings file content (TOML)
    fn default_settings() -> String {
        r#"# mstarconf settings
# Explicit --settings files and MSTARCONF_* variables override these.

# Directories searched for base files, lowest precedence first
search_path = ["."]
config_files = ["/MineStar.properties"]
override_store = "MineStar.overrides"

# keystore = "mstar.keystore"
key_alias = "mstar"
secure_properties = []

lenient = false
precedence = ["call", "overrides", "base", "environment", "time"]
import_environment = true
path_style = "native"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{Layer, PathStyle};
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file_merges_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
config_files = ["/MineStar.properties", "/Site.properties"]
secure_properties = ["_DBPASSWORD"]
precedence = ["environment", "overrides", "base"]
path_style = "windows"
"#,
        )
        .unwrap();

        let settings = SettingsLoader::load_from_file(&path).unwrap();
        assert_eq!(settings.config_files.len(), 2);
        assert!(settings.is_secure("_DBPASSWORD"));
        assert_eq!(settings.key_alias, "mstar");
        assert_eq!(settings.path_style, PathStyle::Windows);
        assert_eq!(
            settings.precedence,
            vec![Layer::Call, Layer::Environment, Layer::Overrides, Layer::Base]
        );
    }

    #[test]
    fn test_default_settings_text_parses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, SettingsLoader::default_settings()).unwrap();

        let settings = SettingsLoader::load_from_file(&path).unwrap();
        assert_eq!(settings.precedence, Layer::default_order());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "config_files = []\n").unwrap();
        assert!(SettingsLoader::load_from_file(&path).is_err());
    }

    #[test]
    fn test_missing_explicit_file_rejected() {
        let dir = TempDir::new().unwrap();
        let err = SettingsLoader::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, MstarError::Config(_)));
    }
}
