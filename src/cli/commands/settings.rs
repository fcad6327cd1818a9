//! Settings Command
//!
//! Manage mstarconf's own settings.
//!
//! Usage:
//!   mstarconf settings show [-f json|toml]
//!   mstarconf settings path
//!   mstarconf settings init [--force]

use crate::cli::util::{CommandOptions, SettingsFormat};
use crate::config::SettingsLoader;
use crate::types::{MstarError, Result};

/// Show the effective settings (merged from all sources)
pub fn show(options: &CommandOptions, format: SettingsFormat) -> Result<()> {
    let settings = options.load_settings()?;
    match format {
        SettingsFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
        SettingsFormat::Toml => {
            let text = toml::to_string_pretty(&settings)
                .map_err(|e| MstarError::Config(format!("rendering settings: {}", e)))?;
            println!("{}", text);
        }
    }
    Ok(())
}

pub fn path(options: &CommandOptions) -> Result<()> {
    SettingsLoader::show_path(options.settings_path());
    Ok(())
}

/// Write the default global settings file
pub fn init(force: bool) -> Result<()> {
    let path = SettingsLoader::init_global(force)?;
    println!("✓ Initialized global settings");
    println!("  Settings: {}", path.display());
    Ok(())
}
