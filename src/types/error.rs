//! Unified Error Type System
//!
//! Centralized error types for configuration resolution, the override store
//! and property encryption.
//!
//! ## Error Groups
//!
//! - **Resolution**: unknown or self-referential tokens
//! - **Keys**: property bound to the wrong name, missing or sealed key material
//! - **Persistence**: corrupt override store, malformed timestamps, I/O
//!
//! Resolution and encryption errors always reach the caller. Substituting an
//! empty or default value would hand a broken path or password to the
//! surrounding scripts with no diagnostic.

use thiserror::Error;

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum MstarError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Resolution Errors
    // -------------------------------------------------------------------------
    /// A `{NAME}` token had no binding in any layer (strict mode only)
    #[error("Unresolved variable: {{{name}}}")]
    UnresolvedVariable { name: String },

    /// A token chain led back to a token already being expanded
    #[error("Cyclic reference: {cycle}")]
    CyclicReference { cycle: String },

    // -------------------------------------------------------------------------
    // Key Errors
    // -------------------------------------------------------------------------
    /// Ciphertext was not produced for this property name (or was tampered with)
    #[error("Encrypted value is not bound to property '{property}'")]
    PropertyBinding { property: String },

    #[error("Key '{alias}' is not available: {reason}")]
    KeyNotAvailable { alias: String, reason: String },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Obfuscation error: {0}")]
    Obfuscation(String),

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Override store {path} is corrupt: {message}")]
    OverrideStoreCorrupt { path: String, message: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MstarError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl MstarError {
    /// Create an unresolved-variable error
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedVariable { name: name.into() }
    }

    /// Create a key-not-available error
    pub fn key_unavailable(alias: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyNotAvailable {
            alias: alias.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt-store error
    pub fn corrupt_store(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::OverrideStoreCorrupt {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Check if this error came from template resolution
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedVariable { .. } | Self::CyclicReference { .. }
        )
    }

    /// Check if this error came from key handling or property binding
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::PropertyBinding { .. } | Self::KeyNotAvailable { .. } | Self::Crypto(_)
        )
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| {
            MstarError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", context.into(), e),
            ))
        })
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| {
            MstarError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", f().into(), e),
            ))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_display_shows_token() {
        let err = MstarError::unresolved("_HOME");
        assert_eq!(err.to_string(), "Unresolved variable: {_HOME}");
        assert!(err.is_resolution_error());
        assert!(!err.is_key_error());
    }

    #[test]
    fn test_key_errors_classified() {
        let err = MstarError::key_unavailable("mstar", "sealed");
        assert!(err.is_key_error());
        assert_eq!(err.to_string(), "Key 'mstar' is not available: sealed");

        let err = MstarError::PropertyBinding {
            property: "_DBPASSWORD".to_string(),
        };
        assert!(err.is_key_error());
    }

    #[test]
    fn test_io_context_keeps_kind() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = io.with_context("saving overrides").unwrap_err();
        match err {
            MstarError::Io(inner) => {
                assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
                assert!(inner.to_string().starts_with("saving overrides"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
