//! Password-protected container of named secret keys.
//!
//! Each key is persisted sealed: wrapped with ChaCha20-Poly1305 under a key
//! derived from the operator's password with scrypt, with the alias bound in
//! as associated data. A [`SecretKeyHandle`] loaded from disk stays sealed
//! until [`Keystore::unlock`] is called with the right password. Unsealing
//! happens once and is never undone for the life of the handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::fsutil;
use crate::timestamp::TimestampedSection;
use crate::types::{MstarError, Result, ResultExt};

/// Size of a property key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;
/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;

/// Raw key material, wiped on drop
pub type KeyMaterial = Zeroizing<[u8; KEY_SIZE]>;

/// Algorithms a stored key can be used with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KeyAlgorithm {
    #[default]
    ChaCha20Poly1305,
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChaCha20Poly1305 => write!(f, "ChaCha20Poly1305"),
        }
    }
}

/// scrypt cost parameters stored next to each sealed key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

impl KdfParams {
    fn derive(&self, password: &SecretString, salt: &[u8]) -> Result<KeyMaterial> {
        let params = scrypt::Params::new(self.log_n, self.r, self.p, KEY_SIZE)
            .map_err(|e| MstarError::Crypto(format!("invalid scrypt parameters: {}", e)))?;
        let mut kek = Zeroizing::new([0u8; KEY_SIZE]);
        scrypt::scrypt(
            password.expose_secret().as_bytes(),
            salt,
            &params,
            kek.as_mut(),
        )
        .map_err(|e| MstarError::Crypto(format!("scrypt failed: {}", e)))?;
        Ok(kek)
    }
}

/// Persisted, password-wrapped form of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKey {
    pub kdf: KdfParams,
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub wrapped: Vec<u8>,
}

/// Handle to one key in a keystore, sealed or unsealed
#[derive(Clone)]
pub struct SecretKeyHandle {
    alias: String,
    algorithm: KeyAlgorithm,
    sealed: Option<SealedKey>,
    material: Option<KeyMaterial>,
}

impl std::fmt::Debug for SecretKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKeyHandle")
            .field("alias", &self.alias)
            .field("algorithm", &self.algorithm)
            .field("unsealed", &self.is_unsealed())
            .finish()
    }
}

impl SecretKeyHandle {
    /// Fresh random key material, not yet sealed under any password
    pub fn generate(alias: impl Into<String>) -> Self {
        let mut material = Zeroizing::new([0u8; KEY_SIZE]);
        rand::rng().fill_bytes(material.as_mut());
        Self::from_material(alias, material)
    }

    pub fn from_material(alias: impl Into<String>, material: KeyMaterial) -> Self {
        Self {
            alias: alias.into(),
            algorithm: KeyAlgorithm::default(),
            sealed: None,
            material: Some(material),
        }
    }

    fn from_sealed(alias: String, algorithm: KeyAlgorithm, sealed: SealedKey) -> Self {
        Self {
            alias,
            algorithm,
            sealed: Some(sealed),
            material: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn is_unsealed(&self) -> bool {
        self.material.is_some()
    }

    /// Key material, available only after unsealing
    pub fn material(&self) -> Result<&KeyMaterial> {
        self.material.as_ref().ok_or_else(|| {
            MstarError::key_unavailable(&self.alias, "key is sealed; unlock it with its password")
        })
    }

    /// Unwrap the key with `password`. A no-op on an unsealed handle.
    pub fn unseal(&mut self, password: &SecretString) -> Result<()> {
        if self.material.is_some() {
            return Ok(());
        }
        let sealed = self
            .sealed
            .as_ref()
            .ok_or_else(|| MstarError::key_unavailable(&self.alias, "no sealed key material"))?;

        let kek = sealed.kdf.derive(password, &sealed.salt)?;
        let cipher = ChaCha20Poly1305::new_from_slice(kek.as_ref())
            .map_err(|_| MstarError::Crypto("invalid key-encryption key".to_string()))?;
        let plain = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&sealed.nonce),
                    Payload {
                        msg: &sealed.wrapped,
                        aad: self.alias.as_bytes(),
                    },
                )
                .map_err(|_| {
                    MstarError::key_unavailable(&self.alias, "wrong password or damaged key entry")
                })?,
        );
        if plain.len() != KEY_SIZE {
            return Err(MstarError::key_unavailable(
                &self.alias,
                format!("unwrapped key has {} bytes", plain.len()),
            ));
        }

        let mut material = Zeroizing::new([0u8; KEY_SIZE]);
        material.copy_from_slice(&plain);
        self.material = Some(material);
        debug!("Unsealed key '{}'", self.alias);
        Ok(())
    }

    /// Wrap the (unsealed) key under `password`, replacing any earlier sealing
    fn seal(&mut self, password: &SecretString, kdf: KdfParams) -> Result<()> {
        let material = self.material()?;

        let mut salt = [0u8; SALT_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let kek = kdf.derive(password, &salt)?;
        let cipher = ChaCha20Poly1305::new_from_slice(kek.as_ref())
            .map_err(|_| MstarError::Crypto("invalid key-encryption key".to_string()))?;
        let wrapped = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: material.as_ref(),
                    aad: self.alias.as_bytes(),
                },
            )
            .map_err(|_| MstarError::Crypto("key wrapping failed".to_string()))?;

        self.sealed = Some(SealedKey {
            kdf,
            salt,
            nonce,
            wrapped,
        });
        Ok(())
    }
}

/// Password-protected container of secret keys addressed by alias.
///
/// Implementations are shared between threads; mutation of one alias is
/// serialized internally.
pub trait Keystore: Send + Sync {
    /// Fetch a copy of the handle stored under `alias`
    fn get(&self, alias: &str) -> Result<SecretKeyHandle>;

    /// Install `handle` under `alias`, sealed with `password`
    fn put(&self, alias: &str, handle: SecretKeyHandle, password: &SecretString) -> Result<()>;

    /// Unseal the key stored under `alias`
    fn unlock(&self, alias: &str, password: &SecretString) -> Result<()>;

    /// Aliases currently held
    fn aliases(&self) -> Vec<String>;
}

// =============================================================================
// File-backed keystore
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeystoreFile {
    #[serde(default)]
    meta: TimestampedSection,
    #[serde(default)]
    keys: BTreeMap<String, KeyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyRecord {
    algorithm: KeyAlgorithm,
    kdf: KdfParams,
    salt: String,
    nonce: String,
    wrapped: String,
}

impl KeyRecord {
    fn from_sealed(algorithm: KeyAlgorithm, sealed: &SealedKey) -> Self {
        Self {
            algorithm,
            kdf: sealed.kdf,
            salt: STANDARD.encode(sealed.salt),
            nonce: STANDARD.encode(sealed.nonce),
            wrapped: STANDARD.encode(&sealed.wrapped),
        }
    }

    fn to_sealed(&self, alias: &str) -> Result<SealedKey> {
        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| MstarError::key_unavailable(alias, format!("bad {}: {}", field, e)))
        };
        let salt = decode("salt", &self.salt)?;
        let nonce = decode("nonce", &self.nonce)?;
        Ok(SealedKey {
            kdf: self.kdf,
            salt: salt
                .try_into()
                .map_err(|_| MstarError::key_unavailable(alias, "salt has wrong length"))?,
            nonce: nonce
                .try_into()
                .map_err(|_| MstarError::key_unavailable(alias, "nonce has wrong length"))?,
            wrapped: decode("wrapped key", &self.wrapped)?,
        })
    }
}

struct KeystoreState {
    meta: TimestampedSection,
    handles: BTreeMap<String, SecretKeyHandle>,
}

/// Keystore persisted as a TOML file, saved atomically on every `put`
pub struct FileKeystore {
    path: Option<PathBuf>,
    kdf: KdfParams,
    state: RwLock<KeystoreState>,
}

impl FileKeystore {
    /// Open the keystore at `path`; a missing file is an empty keystore
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file: KeystoreFile = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context_fn(|| format!("reading keystore {}", path.display()))?;
            toml::from_str(&text).map_err(|e| {
                MstarError::Config(format!("keystore {} is unreadable: {}", path.display(), e))
            })?
        } else {
            KeystoreFile::default()
        };

        let mut handles = BTreeMap::new();
        for (alias, record) in file.keys {
            let sealed = record.to_sealed(&alias)?;
            handles.insert(
                alias.clone(),
                SecretKeyHandle::from_sealed(alias, record.algorithm, sealed),
            );
        }
        debug!("Opened keystore {} ({} keys)", path.display(), handles.len());

        Ok(Self {
            path: Some(path),
            kdf: KdfParams::default(),
            state: RwLock::new(KeystoreState {
                meta: file.meta,
                handles,
            }),
        })
    }

    /// Keystore that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            kdf: KdfParams::default(),
            state: RwLock::new(KeystoreState {
                meta: TimestampedSection::new(),
                handles: BTreeMap::new(),
            }),
        }
    }

    /// Override the scrypt cost used when sealing new keys
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Generate, seal and store a new random key under `alias`
    pub fn generate_key(&self, alias: &str, password: &SecretString) -> Result<()> {
        self.put(alias, SecretKeyHandle::generate(alias), password)
    }

    pub fn meta(&self) -> TimestampedSection {
        self.read_state().meta.clone()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, KeystoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, KeystoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &mut KeystoreState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut meta = state.meta.clone();
        meta.touch();
        let keys = state
            .handles
            .iter()
            .filter_map(|(alias, handle)| {
                handle
                    .sealed
                    .as_ref()
                    .map(|sealed| (alias.clone(), KeyRecord::from_sealed(handle.algorithm, sealed)))
            })
            .collect();
        let file = KeystoreFile { meta, keys };
        let text = toml::to_string_pretty(&file)
            .map_err(|e| MstarError::Config(format!("serializing keystore: {}", e)))?;
        fsutil::write_atomic(path, text.as_bytes())?;

        // stamps only advance once the file is on disk
        state.meta = file.meta;
        Ok(())
    }
}

impl Keystore for FileKeystore {
    fn get(&self, alias: &str) -> Result<SecretKeyHandle> {
        self.read_state()
            .handles
            .get(alias)
            .cloned()
            .ok_or_else(|| MstarError::key_unavailable(alias, "no such alias"))
    }

    fn put(&self, alias: &str, mut handle: SecretKeyHandle, password: &SecretString) -> Result<()> {
        if handle.alias != alias {
            handle.alias = alias.to_string();
        }
        handle.seal(password, self.kdf)?;

        let mut state = self.write_state();
        let previous = state.handles.insert(alias.to_string(), handle);
        if let Err(e) = self.persist(&mut state) {
            // keep memory consistent with the file that is still on disk
            match previous {
                Some(old) => state.handles.insert(alias.to_string(), old),
                None => state.handles.remove(alias),
            };
            return Err(e);
        }
        info!("Stored key '{}'", alias);
        Ok(())
    }

    fn unlock(&self, alias: &str, password: &SecretString) -> Result<()> {
        let mut state = self.write_state();
        let handle = state
            .handles
            .get_mut(alias)
            .ok_or_else(|| MstarError::key_unavailable(alias, "no such alias"))?;
        handle.unseal(password)
    }

    fn aliases(&self) -> Vec<String> {
        self.read_state().handles.keys().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Cheap scrypt cost so tests stay fast
    pub(crate) const TEST_KDF: KdfParams = KdfParams {
        log_n: 4,
        r: 8,
        p: 1,
    };

    pub(crate) fn password(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_get_missing_alias_fails() {
        let store = FileKeystore::in_memory();
        let err = store.get("mstar").unwrap_err();
        assert!(matches!(err, MstarError::KeyNotAvailable { .. }));
    }

    #[test]
    fn test_persisted_key_is_sealed_until_unlocked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keystore.toml");

        let store = FileKeystore::open(&path).unwrap().with_kdf(TEST_KDF);
        store.generate_key("mstar", &password("s3cret")).unwrap();
        let original = store.get("mstar").unwrap();
        assert!(original.is_unsealed());

        let reopened = FileKeystore::open(&path).unwrap();
        let handle = reopened.get("mstar").unwrap();
        assert!(!handle.is_unsealed());
        assert!(matches!(
            handle.material(),
            Err(MstarError::KeyNotAvailable { .. })
        ));

        reopened.unlock("mstar", &password("s3cret")).unwrap();
        let handle = reopened.get("mstar").unwrap();
        assert_eq!(**handle.material().unwrap(), **original.material().unwrap());
    }

    #[test]
    fn test_wrong_password_keeps_key_sealed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keystore.toml");
        FileKeystore::open(&path)
            .unwrap()
            .with_kdf(TEST_KDF)
            .generate_key("mstar", &password("right"))
            .unwrap();

        let reopened = FileKeystore::open(&path).unwrap();
        let err = reopened.unlock("mstar", &password("wrong")).unwrap_err();
        assert!(matches!(err, MstarError::KeyNotAvailable { .. }));
        assert!(!reopened.get("mstar").unwrap().is_unsealed());
    }

    #[test]
    fn test_unseal_is_idempotent() {
        let mut handle = SecretKeyHandle::generate("a");
        let before = **handle.material().unwrap();
        handle.unseal(&password("anything")).unwrap();
        assert_eq!(**handle.material().unwrap(), before);
    }

    #[test]
    fn test_file_carries_timestamps_and_no_plain_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keystore.toml");
        let store = FileKeystore::open(&path).unwrap().with_kdf(TEST_KDF);
        let handle = SecretKeyHandle::generate("mstar");
        let raw = STANDARD.encode(**handle.material().unwrap());
        store.put("mstar", handle, &password("pw")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[meta]"));
        assert!(text.contains("[keys.mstar]"));
        assert!(!text.contains(&raw));
        assert!(store.meta().created.is_some());
        assert_eq!(store.aliases(), vec!["mstar".to_string()]);
    }

    #[test]
    fn test_failed_write_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let store = FileKeystore::open(blocker.join("keystore.toml"))
            .unwrap()
            .with_kdf(TEST_KDF);
        assert!(store.generate_key("mstar", &password("pw")).is_err());
        assert_eq!(store.meta(), TimestampedSection::new());
        assert!(store.aliases().is_empty());
    }
}
