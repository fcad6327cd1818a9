//! CLI Common Utilities
//!
//! Shared setup for command handlers: settings resolution, context loading
//! and password intake.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::config::{Settings, SettingsLoader};
use crate::context::ConfigContext;
use crate::types::{ConfigMap, MstarError, Provenance, Result};

/// Options every command that touches configuration shares
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Explicit settings file (`--settings`)
    pub settings: Option<PathBuf>,
    /// Environment variable holding the keystore password
    pub password_env: Option<String>,
}

impl CommandOptions {
    pub fn settings_path(&self) -> Option<&Path> {
        self.settings.as_deref()
    }

    pub fn load_settings(&self) -> Result<Settings> {
        SettingsLoader::load(self.settings_path())
    }

    /// Load settings and configuration, unlocking the keystore key when a
    /// password variable was given
    pub fn load_context(&self) -> Result<ConfigContext> {
        let ctx = ConfigContext::load(self.load_settings()?)?;
        if let Some(var) = &self.password_env {
            ctx.unlock_key(&read_password(var)?)?;
        }
        Ok(ctx)
    }

    pub fn password(&self) -> Result<SecretString> {
        let var = self.password_env.as_deref().ok_or_else(|| {
            MstarError::Config("this command needs --password-env".to_string())
        })?;
        read_password(var)
    }
}

/// Output of listing commands (`sources`, `override list`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for ListFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ListFormat::Text),
            "json" => Ok(ListFormat::Json),
            _ => Err(format!("Invalid format '{}'. Valid values: text, json", s)),
        }
    }
}

/// Output of `settings show`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettingsFormat {
    #[default]
    Toml,
    Json,
}

impl std::str::FromStr for SettingsFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "toml" => Ok(SettingsFormat::Toml),
            "json" => Ok(SettingsFormat::Json),
            _ => Err(format!("Invalid format '{}'. Valid values: toml, json", s)),
        }
    }
}

/// Read a password from the named environment variable
pub fn read_password(var: &str) -> Result<SecretString> {
    let value = std::env::var(var).map_err(|_| {
        MstarError::Config(format!("password variable {} is not set", var))
    })?;
    if value.is_empty() {
        return Err(MstarError::Config(format!("password variable {} is empty", var)));
    }
    Ok(SecretString::from(value))
}

/// Parse a `KEY=VALUE` command line define
pub fn parse_define(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid define '{}'. Expected KEY=VALUE", s)),
    }
}

/// Per-call bindings built from `--define` flags
pub fn defines_to_bindings(defines: &[(String, String)]) -> ConfigMap {
    ConfigMap::from_pairs(defines.iter().cloned(), Provenance::Computed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define() {
        assert_eq!(
            parse_define("_HOME=/opt/mstar").unwrap(),
            ("_HOME".to_string(), "/opt/mstar".to_string())
        );
        assert_eq!(
            parse_define("URL=a=b").unwrap(),
            ("URL".to_string(), "a=b".to_string())
        );
        assert!(parse_define("novalue").is_err());
        assert!(parse_define("=x").is_err());
    }

    #[test]
    fn test_password_required() {
        let options = CommandOptions::default();
        assert!(matches!(options.password(), Err(MstarError::Config(_))));
    }

    #[test]
    fn test_output_formats_reject_unknown() {
        assert_eq!("JSON".parse::<ListFormat>().unwrap(), ListFormat::Json);
        assert_eq!("text".parse::<ListFormat>().unwrap(), ListFormat::Text);
        assert!("yaml".parse::<ListFormat>().is_err());
        assert!("toml".parse::<ListFormat>().is_err());

        assert_eq!("toml".parse::<SettingsFormat>().unwrap(), SettingsFormat::Toml);
        assert_eq!("json".parse::<SettingsFormat>().unwrap(), SettingsFormat::Json);
        assert!("yaml".parse::<SettingsFormat>().is_err());
        assert!("text".parse::<SettingsFormat>().is_err());
    }

    #[test]
    fn test_defines_to_bindings() {
        let map = defines_to_bindings(&[("A".to_string(), "1".to_string())]);
        assert_eq!(map.get("A"), Some("1"));
        assert_eq!(map.source("A"), Some(&Provenance::Computed));
    }
}
