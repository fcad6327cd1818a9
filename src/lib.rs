//! mstarconf - MineStar Configuration Resolution
//!
//! Resolves `{NAME}` templates against layered configuration, persists
//! operator overrides across restarts and protects selected values at rest.
//!
//! ## Core Features
//!
//! - **Recursive Resolution**: tokens inside substituted values are resolved
//!   too, with cycle detection and an opt-in lenient mode
//! - **Provenance**: every key records the file or override that supplied it
//! - **Override Store**: per-file overrides saved with atomic replace
//! - **Property Encryption**: `ENC:` values bound to their property name, keyed
//!   inline or through a password-sealed keystore
//! - **Obfuscation**: `OBF:` values compatible with the Jetty password format
//!
//! ## Quick Start
//!
//! ```ignore
//! use mstarconf::{ConfigContext, SettingsLoader};
//!
//! let ctx = ConfigContext::load(SettingsLoader::load(None)?)?;
//! let logs = ctx.interpret_path("{_HOME}/logs")?;
//! let source = ctx.source_of("_HOME");
//! ```
//!
//! ## Modules
//!
//! - [`context`]: the loaded configuration and its outward operations
//! - [`resolver`]: token substitution over layered bindings
//! - [`overrides`]: persisted override store
//! - [`crypto`]: obfuscation, keystore and property encryptors
//! - [`config`]: settings of the subsystem itself and the base file reader

pub mod cli;
pub mod config;
pub mod context;
pub mod crypto;
pub mod fsutil;
pub mod overrides;
pub mod resolver;
pub mod timestamp;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Settings
pub use config::{Layer, PathStyle, Settings, SettingsLoader};

// Error Types
pub use types::error::{MstarError, Result, ResultExt};

// Configuration
pub use context::{ConfigContext, DumpFormat, DumpOptions};
pub use types::{ConfigMap, Provenance, SourceMap};

// =============================================================================
// Storage Re-exports
// =============================================================================

pub use overrides::{OverrideFile, OverrideSet, OverrideStore};
pub use timestamp::{Timestamp, TimestampedSection};

// =============================================================================
// Crypto Re-exports
// =============================================================================

pub use crypto::{
    CipherPropertyEncryptor, FileKeystore, KeyStorePropertyEncryptor, Keystore, PropertyEncryptor,
    SecretKeyHandle,
};

pub use resolver::{Bindings, Resolver};
