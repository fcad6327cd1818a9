//! Property encryption bound to the property name.
//!
//! Encrypted values are stored as `ENC:` followed by base64 of
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`. The property name is
//! the AEAD associated data, so a value encrypted for `_DBPASSWORD` fails to
//! decrypt when read back as any other property.

use std::sync::{Arc, OnceLock};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use super::keystore::{KEY_SIZE, KeyMaterial, Keystore, NONCE_SIZE};
use crate::types::{MstarError, Result};

/// Marker prefixed to every encrypted value
pub const ENC_PREFIX: &str = "ENC:";

/// Check whether a stored value is encrypted
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENC_PREFIX)
}

/// Encrypt and decrypt configuration values keyed by property name
pub trait PropertyEncryptor: Send + Sync {
    /// Encrypt `plaintext` for property `name`
    fn encrypt_property(&self, name: &str, plaintext: &str) -> Result<String>;

    /// Decrypt a value previously encrypted for property `name`
    fn decrypt_property(&self, name: &str, ciphertext: &str) -> Result<String>;

    /// Short label for logs and `show` output
    fn describe(&self) -> String;
}

fn seal(key: &KeyMaterial, name: &str, plaintext: &str) -> Result<String> {
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_ref())
        .map_err(|_| MstarError::Crypto("invalid property key".to_string()))?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_bytes(),
                aad: name.as_bytes(),
            },
        )
        .map_err(|_| MstarError::Crypto(format!("encrypting '{}' failed", name)))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(format!("{}{}", ENC_PREFIX, STANDARD.encode(out)))
}

fn open(key: &KeyMaterial, name: &str, encoded: &str) -> Result<String> {
    let body = encoded.strip_prefix(ENC_PREFIX).unwrap_or(encoded);
    let data = STANDARD
        .decode(body.trim())
        .map_err(|e| MstarError::Crypto(format!("'{}' is not valid base64: {}", name, e)))?;
    if data.len() < NONCE_SIZE {
        return Err(MstarError::Crypto(format!(
            "'{}' is too short to be encrypted",
            name
        )));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key.as_ref())
        .map_err(|_| MstarError::Crypto("invalid property key".to_string()))?;
    let plain = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(&data[..NONCE_SIZE]),
                Payload {
                    msg: &data[NONCE_SIZE..],
                    aad: name.as_bytes(),
                },
            )
            .map_err(|_| MstarError::PropertyBinding {
                property: name.to_string(),
            })?,
    );

    String::from_utf8(plain.to_vec())
        .map_err(|_| MstarError::Crypto(format!("'{}' did not decrypt to text", name)))
}

// =============================================================================
// Inline key
// =============================================================================

/// Encryptor holding its raw key directly
pub struct CipherPropertyEncryptor {
    key: KeyMaterial,
}

impl CipherPropertyEncryptor {
    pub fn new(key: KeyMaterial) -> Self {
        Self { key }
    }

    /// Build from a base64-encoded 32-byte key
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| MstarError::Crypto(format!("property key is not base64: {}", e)))?,
        );
        if bytes.len() != KEY_SIZE {
            return Err(MstarError::Crypto(format!(
                "property key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }
}

impl PropertyEncryptor for CipherPropertyEncryptor {
    fn encrypt_property(&self, name: &str, plaintext: &str) -> Result<String> {
        seal(&self.key, name, plaintext)
    }

    fn decrypt_property(&self, name: &str, ciphertext: &str) -> Result<String> {
        open(&self.key, name, ciphertext)
    }

    fn describe(&self) -> String {
        "inline key".to_string()
    }
}

// =============================================================================
// Keystore-backed key
// =============================================================================

/// Encryptor that fetches its key from a keystore on first use.
///
/// The key under `alias` must already be unlocked; otherwise every call fails
/// with `KeyNotAvailable` until it is.
pub struct KeyStorePropertyEncryptor {
    keystore: Arc<dyn Keystore>,
    alias: String,
    key: OnceLock<KeyMaterial>,
}

impl KeyStorePropertyEncryptor {
    pub fn new(keystore: Arc<dyn Keystore>, alias: impl Into<String>) -> Self {
        Self {
            keystore,
            alias: alias.into(),
            key: OnceLock::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    fn key(&self) -> Result<&KeyMaterial> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }
        let handle = self.keystore.get(&self.alias)?;
        let material = handle.material()?.clone();
        debug!("Loaded property key '{}' from keystore", self.alias);
        Ok(self.key.get_or_init(|| material))
    }
}

impl PropertyEncryptor for KeyStorePropertyEncryptor {
    fn encrypt_property(&self, name: &str, plaintext: &str) -> Result<String> {
        seal(self.key()?, name, plaintext)
    }

    fn decrypt_property(&self, name: &str, ciphertext: &str) -> Result<String> {
        open(self.key()?, name, ciphertext)
    }

    fn describe(&self) -> String {
        format!("keystore alias '{}'", self.alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keystore::tests::{TEST_KDF, password};
    use crate::crypto::keystore::{FileKeystore, SecretKeyHandle};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn inline() -> CipherPropertyEncryptor {
        CipherPropertyEncryptor::new(Zeroizing::new([7u8; KEY_SIZE]))
    }

    #[test]
    fn test_round_trip() {
        let enc = inline();
        let ct = enc.encrypt_property("_DBPASSWORD", "tiger").unwrap();
        assert!(is_encrypted(&ct));
        assert!(!ct.contains("tiger"));
        assert_eq!(enc.decrypt_property("_DBPASSWORD", &ct).unwrap(), "tiger");
    }

    #[test]
    fn test_wrong_property_name_is_rejected() {
        let enc = inline();
        let ct = enc.encrypt_property("_DBPASSWORD", "tiger").unwrap();
        let err = enc.decrypt_property("_EMAILPASSWORD", &ct).unwrap_err();
        assert!(matches!(err, MstarError::PropertyBinding { property } if property == "_EMAILPASSWORD"));
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let enc = inline();
        let ct = enc.encrypt_property("p", "value").unwrap();
        let mut raw = STANDARD.decode(&ct[ENC_PREFIX.len()..]).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = format!("{}{}", ENC_PREFIX, STANDARD.encode(raw));
        assert!(enc.decrypt_property("p", &tampered).is_err());
    }

    #[test]
    fn test_from_base64_checks_length() {
        assert!(CipherPropertyEncryptor::from_base64(&STANDARD.encode([1u8; 16])).is_err());
        let enc = CipherPropertyEncryptor::from_base64(&STANDARD.encode([1u8; 32])).unwrap();
        let ct = enc.encrypt_property("a", "b").unwrap();
        assert_eq!(enc.decrypt_property("a", &ct).unwrap(), "b");
    }

    #[test]
    fn test_keystore_encryptor_requires_unlocked_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keystore.toml");
        let writer = FileKeystore::open(&path).unwrap().with_kdf(TEST_KDF);
        let handle = SecretKeyHandle::generate("mstar");
        let inline = CipherPropertyEncryptor::new(handle.material().unwrap().clone());
        writer.put("mstar", handle, &password("pw")).unwrap();

        let store: Arc<dyn Keystore> = Arc::new(FileKeystore::open(&path).unwrap());
        let enc = KeyStorePropertyEncryptor::new(store.clone(), "mstar");
        let err = enc.encrypt_property("x", "y").unwrap_err();
        assert!(matches!(err, MstarError::KeyNotAvailable { .. }));

        store.unlock("mstar", &password("pw")).unwrap();
        let ct = enc.encrypt_property("x", "y").unwrap();
        assert_eq!(enc.decrypt_property("x", &ct).unwrap(), "y");
        // same key material as the inline form
        assert_eq!(inline.decrypt_property("x", &ct).unwrap(), "y");
    }

    #[test]
    fn test_keystore_encryptor_missing_alias() {
        let store: Arc<dyn Keystore> = Arc::new(FileKeystore::in_memory());
        let enc = KeyStorePropertyEncryptor::new(store, "absent");
        assert!(matches!(
            enc.decrypt_property("x", "ENC:AAAA"),
            Err(MstarError::KeyNotAvailable { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip_and_binding(value in ".{0,48}", name in "[A-Za-z_]{1,16}", other in "[A-Za-z_]{1,16}") {
            let enc = inline();
            let ct = enc.encrypt_property(&name, &value).unwrap();
            prop_assert_eq!(enc.decrypt_property(&name, &ct).unwrap(), value.clone());
            if other != name {
                prop_assert!(enc.decrypt_property(&other, &ct).is_err());
            }
        }
    }
}
