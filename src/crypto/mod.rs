//! Protection of configuration values at rest
//!
//! - [`obfuscation`]: reversible `OBF:` encoding, no key involved
//! - [`keystore`]: password-sealed key material addressed by alias
//! - [`encryptor`]: `ENC:` values bound to their property name

pub mod encryptor;
pub mod keystore;
pub mod obfuscation;

pub use encryptor::{
    CipherPropertyEncryptor, ENC_PREFIX, KeyStorePropertyEncryptor, PropertyEncryptor,
    is_encrypted,
};
pub use keystore::{FileKeystore, KdfParams, KeyAlgorithm, Keystore, SecretKeyHandle};
pub use obfuscation::{OBF_PREFIX, deobfuscate, is_obfuscated, obfuscate};
