//! Settings Types
//!
//! Settings of the resolution subsystem itself: where base files and the
//! override store live, which properties are secret, and how bindings are
//! layered during resolution.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{MstarError, Result};

/// Root settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directories searched for base files, lowest precedence first
    pub search_path: Vec<PathBuf>,

    /// Logical ids of the base files to load, in merge order
    pub config_files: Vec<String>,

    /// Persisted override store
    pub override_store: PathBuf,

    /// Keystore holding the property key (enables keystore encryption)
    pub keystore: Option<PathBuf>,

    /// Alias of the property key within the keystore
    pub key_alias: String,

    /// Properties whose overrides are written encrypted
    pub secure_properties: Vec<String>,

    /// Leave unknown `{NAME}` tokens in place instead of failing
    pub lenient: bool,

    /// Resolution order, highest precedence first
    pub precedence: Vec<Layer>,

    /// Snapshot the process environment as a binding layer
    pub import_environment: bool,

    /// Separator style for path resolution
    pub path_style: PathStyle,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_path: vec![PathBuf::from(".")],
            config_files: vec!["/MineStar.properties".to_string()],
            override_store: PathBuf::from("MineStar.overrides"),
            keystore: None,
            key_alias: "mstar".to_string(),
            secure_properties: Vec::new(),
            lenient: false,
            precedence: Layer::default_order(),
            import_environment: true,
            path_style: PathStyle::Native,
        }
    }
}

impl Settings {
    /// Validate settings and normalize the precedence list.
    /// Returns `MstarError::Config` on validation failure.
    pub fn validate(&mut self) -> Result<()> {
        if self.config_files.is_empty() {
            return Err(MstarError::Config(
                "config_files must name at least one file".to_string(),
            ));
        }

        if self.key_alias.trim().is_empty() {
            return Err(MstarError::Config("key_alias must not be empty".to_string()));
        }

        let mut seen = Vec::with_capacity(self.precedence.len());
        for layer in &self.precedence {
            if seen.contains(layer) {
                return Err(MstarError::Config(format!(
                    "precedence lists '{}' more than once",
                    layer
                )));
            }
            seen.push(*layer);
        }

        // per-call bindings always come first
        if !self.precedence.contains(&Layer::Call) {
            self.precedence.insert(0, Layer::Call);
        }

        Ok(())
    }

    pub fn is_secure(&self, key: &str) -> bool {
        self.secure_properties.iter().any(|k| k == key)
    }
}

// =============================================================================
// Resolution Layers
// =============================================================================

/// A source of bindings during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Bindings passed with a single resolve call
    Call,
    /// Persisted overrides
    Overrides,
    /// Base configuration files
    Base,
    /// Process environment snapshot
    Environment,
    /// Current date and time fields
    Time,
}

impl Layer {
    pub fn default_order() -> Vec<Layer> {
        vec![
            Layer::Call,
            Layer::Overrides,
            Layer::Base,
            Layer::Environment,
            Layer::Time,
        ]
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Call => write!(f, "call"),
            Layer::Overrides => write!(f, "overrides"),
            Layer::Base => write!(f, "base"),
            Layer::Environment => write!(f, "environment"),
            Layer::Time => write!(f, "time"),
        }
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" => Ok(Layer::Call),
            "overrides" => Ok(Layer::Overrides),
            "base" => Ok(Layer::Base),
            "environment" | "env" => Ok(Layer::Environment),
            "time" => Ok(Layer::Time),
            _ => Err(format!(
                "Unknown layer: {}. Valid values: call, overrides, base, environment, time",
                s
            )),
        }
    }
}

// =============================================================================
// Path Style
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Whatever the running platform uses
    #[default]
    Native,
    Unix,
    Windows,
}

impl PathStyle {
    pub fn separator(&self) -> char {
        match self {
            PathStyle::Native => std::path::MAIN_SEPARATOR,
            PathStyle::Unix => '/',
            PathStyle::Windows => '\\',
        }
    }

    pub fn is_windows(&self) -> bool {
        self.separator() == '\\'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        let mut settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.precedence, Layer::default_order());
    }

    #[test]
    fn test_duplicate_layer_rejected() {
        let mut settings = Settings {
            precedence: vec![Layer::Base, Layer::Base],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_call_layer_prepended() {
        let mut settings = Settings {
            precedence: vec![Layer::Environment, Layer::Overrides, Layer::Base],
            ..Settings::default()
        };
        settings.validate().unwrap();
        assert_eq!(settings.precedence[0], Layer::Call);
        assert_eq!(settings.precedence[1], Layer::Environment);
    }

    #[test]
    fn test_empty_config_files_rejected() {
        let mut settings = Settings {
            config_files: vec![],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_layer_from_str() {
        assert_eq!("ENV".parse::<Layer>().unwrap(), Layer::Environment);
        assert!("nowhere".parse::<Layer>().is_err());
    }
}
