//! Settings Management
//!
//! Settings of the resolution subsystem with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global settings (~/.config/mstarconf/settings.toml)
//! 3. Explicit settings file (--settings)
//! 4. Environment variables (MSTARCONF_*)
//!
//! Also home to the reader for the `.properties` base files those settings
//! point at.

mod loader;
pub mod properties;
mod types;

pub use loader::{ENV_PREFIX, KEY_ENV, SettingsLoader};
pub use types::*;
