//! Configuration Context
//!
//! An explicitly constructed, explicitly loaded view of the configuration:
//! base files merged with persisted overrides, the process environment
//! snapshot and the selected property encryptor. Every resolution, override
//! and dump operation goes through a [`ConfigContext`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{KEY_ENV, Layer, Settings, properties};
use crate::crypto::{
    CipherPropertyEncryptor, FileKeystore, KeyStorePropertyEncryptor, Keystore, PropertyEncryptor,
    deobfuscate, is_encrypted, is_obfuscated,
};
use crate::overrides::{OverrideSet, OverrideStore};
use crate::resolver::{Bindings, EnvironmentBindings, LayeredBindings, Resolver, TimeBindings};
use crate::timestamp::TimestampedSection;
use crate::types::{ConfigMap, MstarError, Provenance, Result, SourceMap};

/// Placeholder printed instead of secret values
pub const MASK: &str = "********";

static ENVIRONMENT_SOURCE: Provenance = Provenance::Environment;

// =============================================================================
// Dump options
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFormat {
    #[default]
    Text,
    Json,
    Toml,
}

impl std::str::FromStr for DumpFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(DumpFormat::Text),
            "json" => Ok(DumpFormat::Json),
            "toml" => Ok(DumpFormat::Toml),
            _ => Err(format!(
                "Invalid format '{}'. Valid values: text, json, toml",
                s
            )),
        }
    }
}

/// What `dump_config` prints
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Only keys starting with this prefix
    pub prefix: Option<String>,
    /// Include where each value came from
    pub provenance: bool,
    /// Resolve tokens and decode values instead of printing them raw
    pub resolve: bool,
    /// Replace secure, obfuscated and encrypted values with a mask
    pub mask_secrets: bool,
    pub format: DumpFormat,
}

// =============================================================================
// Context
// =============================================================================

/// Loaded configuration and everything needed to resolve it
pub struct ConfigContext {
    settings: Settings,
    store: OverrideStore,
    resolver: Resolver,
    keystore: Option<Arc<dyn Keystore>>,
    encryptor: Option<Arc<dyn PropertyEncryptor>>,
    pinned_environment: Option<EnvironmentBindings>,

    loaded: bool,
    base: ConfigMap,
    overrides: OverrideSet,
    override_values: ConfigMap,
    merged: ConfigMap,
    environment: EnvironmentBindings,
    base_files: Vec<PathBuf>,

    /// Decoded `OBF:`/`ENC:` values keyed by (property, raw value)
    decoded: RwLock<HashMap<(String, String), Zeroizing<String>>>,
}

impl ConfigContext {
    /// Build an unloaded context, selecting the property encryptor:
    /// a configured keystore first, then an inline key in `MSTARCONF_KEY`.
    pub fn new(settings: Settings) -> Result<Self> {
        let mut ctx = Self::bare(settings);

        if let Some(path) = ctx.settings.keystore.clone() {
            let keystore = FileKeystore::open(&path)?;
            info!("Property encryption via keystore {}", path.display());
            ctx = ctx.with_keystore(Arc::new(keystore));
        } else if let Ok(encoded) = std::env::var(KEY_ENV) {
            let encryptor = CipherPropertyEncryptor::from_base64(&encoded)?;
            info!("Property encryption via inline key from {}", KEY_ENV);
            ctx = ctx.with_encryptor(Arc::new(encryptor));
        } else {
            debug!("No property encryptor configured");
        }
        Ok(ctx)
    }

    /// Build and load in one step
    pub fn load(settings: Settings) -> Result<Self> {
        let mut ctx = Self::new(settings)?;
        ctx.load_config(false)?;
        Ok(ctx)
    }

    fn bare(settings: Settings) -> Self {
        Self {
            store: OverrideStore::new(&settings.override_store),
            resolver: Resolver::with_lenient(settings.lenient),
            settings,
            keystore: None,
            encryptor: None,
            pinned_environment: None,
            loaded: false,
            base: ConfigMap::new(),
            overrides: OverrideSet::new(),
            override_values: ConfigMap::new(),
            merged: ConfigMap::new(),
            environment: EnvironmentBindings::empty(),
            base_files: Vec::new(),
            decoded: RwLock::new(HashMap::new()),
        }
    }

    /// Use `keystore` for property keys, under the configured alias
    pub fn with_keystore(mut self, keystore: Arc<dyn Keystore>) -> Self {
        let encryptor = KeyStorePropertyEncryptor::new(keystore.clone(), &self.settings.key_alias);
        self.keystore = Some(keystore);
        self.encryptor = Some(Arc::new(encryptor));
        self
    }

    /// Use `encryptor` directly, without a keystore
    pub fn with_encryptor(mut self, encryptor: Arc<dyn PropertyEncryptor>) -> Self {
        self.keystore = None;
        self.encryptor = Some(encryptor);
        self
    }

    /// Use a fixed environment snapshot instead of the process environment
    pub fn with_environment(mut self, environment: EnvironmentBindings) -> Self {
        self.pinned_environment = Some(environment);
        self
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Read base files and the override store.
    ///
    /// Without `force_reload` an already loaded context is left as is. With
    /// it, all in-memory state is discarded and re-read from disk, so edits
    /// made to the store by other processes become visible.
    pub fn load_config(&mut self, force_reload: bool) -> Result<()> {
        if self.loaded && !force_reload {
            return Ok(());
        }

        let mut base = ConfigMap::new();
        let mut base_files = Vec::new();
        for file_id in &self.settings.config_files {
            let relative = file_id.trim_start_matches(['/', '\\']);
            let mut found = false;
            for dir in &self.settings.search_path {
                let path = dir.join(relative);
                if !path.is_file() {
                    continue;
                }
                let values = properties::load_file(&path)?;
                debug!("Loaded {} values from {}", values.len(), path.display());
                base.merge(&values);
                base_files.push(path);
                found = true;
            }
            if !found {
                warn!("Base file {} not found in search path", file_id);
            }
        }

        let overrides = self.store.load()?;

        self.environment = match &self.pinned_environment {
            Some(env) => env.clone(),
            None if self.settings.import_environment => EnvironmentBindings::capture(),
            None => EnvironmentBindings::empty(),
        };
        self.base = base;
        self.base_files = base_files;
        self.overrides = overrides;
        self.decoded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.rebuild();
        self.loaded = true;

        info!(
            "Loaded configuration: {} base values, {} overrides",
            self.base.len(),
            self.overrides.len()
        );
        Ok(())
    }

    /// Shorthand for `load_config(true)`
    pub fn force_reload(&mut self) -> Result<()> {
        self.load_config(true)
    }

    /// Recompute the merged view in precedence order. The environment layer
    /// only contributes to keys the base files or overrides define.
    fn rebuild(&mut self) {
        self.override_values = self.overrides.flatten(&self.settings.config_files);

        let keys: Vec<String> = self
            .base
            .keys()
            .chain(self.override_values.keys())
            .map(str::to_string)
            .collect();

        let mut merged = ConfigMap::new();
        for layer in self.settings.precedence.iter().rev() {
            match layer {
                Layer::Base => merged.merge(&self.base),
                Layer::Overrides => merged.merge(&self.override_values),
                Layer::Environment => {
                    for key in &keys {
                        if let Some(value) = self.environment.get(key) {
                            merged.set(key.as_str(), value, Provenance::Environment);
                        }
                    }
                }
                Layer::Call | Layer::Time => {}
            }
        }
        self.merged = merged;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Merged, unresolved configuration
    pub fn config(&self) -> &ConfigMap {
        &self.merged
    }

    pub fn sources(&self) -> &SourceMap {
        self.merged.sources()
    }

    /// Where the value of `key` comes from. Keys only the environment
    /// defines report [`Provenance::Environment`] when that layer is enabled.
    pub fn source_of(&self, key: &str) -> Option<&Provenance> {
        self.merged.source(key).or_else(|| {
            (self.settings.precedence.contains(&Layer::Environment)
                && self.environment.get(key).is_some())
            .then_some(&ENVIRONMENT_SOURCE)
        })
    }

    pub fn overrides(&self) -> &OverrideSet {
        &self.overrides
    }

    pub fn override_store(&self) -> &OverrideStore {
        &self.store
    }

    /// Created/modified stamps of the override store as last loaded or saved
    pub fn store_meta(&self) -> &TimestampedSection {
        &self.overrides.meta
    }

    /// Base files actually read, in merge order
    pub fn base_files(&self) -> &[PathBuf] {
        &self.base_files
    }

    pub fn encryptor_description(&self) -> Option<String> {
        self.encryptor.as_ref().map(|e| e.describe())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a template as a path, normalized for the configured style
    pub fn interpret_path(&self, template: &str) -> Result<PathBuf> {
        self.interpret_path_with(template, &ConfigMap::new())
    }

    pub fn interpret_path_with(&self, template: &str, call: &dyn Bindings) -> Result<PathBuf> {
        self.with_bindings(call, |bindings| {
            self.resolver
                .resolve_path(template, bindings, self.settings.path_style)
                .map(PathBuf::from)
        })
    }

    /// Resolve every `{NAME}` token in `template`
    pub fn interpret_format(&self, template: &str) -> Result<String> {
        self.interpret_format_with(template, &ConfigMap::new())
    }

    /// Resolve with per-call bindings that take precedence over everything
    pub fn interpret_format_with(&self, template: &str, call: &dyn Bindings) -> Result<String> {
        self.with_bindings(call, |bindings| self.resolver.resolve(template, bindings))
    }

    /// Fully resolved and decoded value of `name`, `None` if nothing binds it
    pub fn interpret_var(&self, name: &str) -> Result<Option<String>> {
        self.with_bindings(&ConfigMap::new(), |bindings| {
            self.resolver.resolve_var(name, bindings)
        })
    }

    fn with_bindings<T>(
        &self,
        call: &dyn Bindings,
        f: impl FnOnce(&dyn Bindings) -> Result<T>,
    ) -> Result<T> {
        self.with_bindings_masked(call, false, f)
    }

    /// With `mask` set, secure and protected values resolve to [`MASK`], so
    /// values that embed them never expose the plaintext
    fn with_bindings_masked<T>(
        &self,
        call: &dyn Bindings,
        mask: bool,
        f: impl FnOnce(&dyn Bindings) -> Result<T>,
    ) -> Result<T> {
        let overrides = Decoding {
            values: &self.override_values,
            ctx: self,
        };
        let base = Decoding {
            values: &self.base,
            ctx: self,
        };
        let time = TimeBindings::now();

        let mut layered = LayeredBindings::new();
        for layer in &self.settings.precedence {
            layered = match layer {
                Layer::Call => layered.push(call),
                Layer::Overrides => layered.push(&overrides),
                Layer::Base => layered.push(&base),
                Layer::Environment => layered.push(&self.environment),
                Layer::Time => layered.push(&time),
            };
        }
        if mask {
            f(&Masking {
                inner: &layered,
                settings: &self.settings,
            })
        } else {
            f(&layered)
        }
    }

    /// Decode an `OBF:` or `ENC:` value, caching the plaintext
    fn decode<'a>(&self, name: &str, raw: &'a str) -> Result<Cow<'a, str>> {
        if !is_obfuscated(raw) && !is_encrypted(raw) {
            return Ok(Cow::Borrowed(raw));
        }

        let cache_key = (name.to_string(), raw.to_string());
        if let Some(hit) = self
            .decoded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&cache_key)
        {
            return Ok(Cow::Owned(hit.as_str().to_string()));
        }

        let plain = if is_obfuscated(raw) {
            deobfuscate(raw)?
        } else {
            self.decrypt_value(name, raw)?
        };
        debug!("Decoded protected value of '{}'", name);
        self.decoded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, Zeroizing::new(plain.clone()));
        Ok(Cow::Owned(plain))
    }

    // =========================================================================
    // Encryption
    // =========================================================================

    fn encryptor(&self) -> Result<&Arc<dyn PropertyEncryptor>> {
        self.encryptor.as_ref().ok_or_else(|| {
            MstarError::key_unavailable(
                &self.settings.key_alias,
                format!("no keystore configured and {} is not set", KEY_ENV),
            )
        })
    }

    pub fn encrypt_value(&self, name: &str, plaintext: &str) -> Result<String> {
        self.encryptor()?.encrypt_property(name, plaintext)
    }

    pub fn decrypt_value(&self, name: &str, ciphertext: &str) -> Result<String> {
        self.encryptor()?.decrypt_property(name, ciphertext)
    }

    /// Unseal the property key in the configured keystore
    pub fn unlock_key(&self, password: &SecretString) -> Result<()> {
        let keystore = self.keystore.as_ref().ok_or_else(|| {
            MstarError::key_unavailable(&self.settings.key_alias, "no keystore configured")
        })?;
        keystore.unlock(&self.settings.key_alias, password)?;
        info!("Unlocked key '{}'", self.settings.key_alias);
        Ok(())
    }

    // =========================================================================
    // Overrides
    // =========================================================================

    /// Persist an override and refresh the merged view.
    ///
    /// The store is re-read before the change so concurrent writers'
    /// overrides are not discarded. Secure properties are stored encrypted.
    pub fn put_override(&mut self, file_id: &str, key: &str, value: &str) -> Result<()> {
        let stored = if self.settings.is_secure(key) {
            self.encrypt_value(key, value)?
        } else {
            value.to_string()
        };

        let mut set = self.store.load()?;
        set.put(file_id, key, stored);
        self.store.save(&mut set)?;
        info!("Override {} set in {}", key, file_id);

        self.overrides = set;
        self.rebuild();
        Ok(())
    }

    /// Remove a persisted override; returns the raw value it held
    pub fn remove_override(&mut self, file_id: &str, key: &str) -> Result<Option<String>> {
        let mut set = self.store.load()?;
        let removed = set.remove(file_id, key);
        if removed.is_some() {
            self.store.save(&mut set)?;
            info!("Override {} removed from {}", key, file_id);
        } else {
            debug!("No override {} in {}", key, file_id);
        }

        self.overrides = set;
        self.rebuild();
        Ok(removed)
    }

    // =========================================================================
    // Dump
    // =========================================================================

    /// Render the merged configuration
    pub fn dump_config(&self, options: &DumpOptions) -> Result<String> {
        let mut rows = Vec::new();
        for (key, raw, source) in self.merged.iter() {
            if let Some(prefix) = &options.prefix
                && !key.starts_with(prefix.as_str())
            {
                continue;
            }

            let secret = self.settings.is_secure(key) || is_encrypted(raw) || is_obfuscated(raw);
            let value = if options.mask_secrets && secret {
                MASK.to_string()
            } else if options.resolve {
                self.with_bindings_masked(&ConfigMap::new(), options.mask_secrets, |bindings| {
                    self.resolver.resolve_var(key, bindings)
                })?
                .unwrap_or_default()
            } else {
                raw.to_string()
            };
            rows.push((key, value, source));
        }

        match options.format {
            DumpFormat::Text => Ok(rows
                .iter()
                .map(|(key, value, source)| {
                    if options.provenance {
                        format!("{} = {}    # {}\n", key, value, source)
                    } else {
                        format!("{} = {}\n", key, value)
                    }
                })
                .collect()),
            DumpFormat::Json => {
                let mut map = serde_json::Map::new();
                for (key, value, source) in rows {
                    let entry = if options.provenance {
                        json!({ "value": value, "source": source })
                    } else {
                        json!(value)
                    };
                    map.insert(key.to_string(), entry);
                }
                Ok(serde_json::to_string_pretty(&map)?)
            }
            DumpFormat::Toml => {
                let mut table = toml::Table::new();
                for (key, value, source) in rows {
                    let entry = if options.provenance {
                        let mut inner = toml::Table::new();
                        inner.insert("value".to_string(), toml::Value::String(value));
                        inner.insert("source".to_string(), toml::Value::String(source.to_string()));
                        toml::Value::Table(inner)
                    } else {
                        toml::Value::String(value)
                    };
                    table.insert(key.to_string(), entry);
                }
                toml::to_string(&table)
                    .map_err(|e| MstarError::Config(format!("rendering TOML: {}", e)))
            }
        }
    }
}

/// Stored values that decode `OBF:`/`ENC:` payloads on read
struct Decoding<'a> {
    values: &'a ConfigMap,
    ctx: &'a ConfigContext,
}

impl Bindings for Decoding<'_> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.values.lookup(name)
    }

    fn try_lookup(&self, name: &str) -> Result<Option<Cow<'_, str>>> {
        match self.values.get(name) {
            Some(raw) => self.ctx.decode(name, raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Hides secure and protected values from the layers it wraps
struct Masking<'a> {
    inner: &'a dyn Bindings,
    settings: &'a Settings,
}

impl Bindings for Masking<'_> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.inner.lookup(name)
    }

    fn try_lookup(&self, name: &str) -> Result<Option<Cow<'_, str>>> {
        let Some(raw) = self.inner.lookup(name) else {
            return Ok(None);
        };
        if self.settings.is_secure(name) || is_encrypted(&raw) || is_obfuscated(&raw) {
            return Ok(Some(Cow::Borrowed(MASK)));
        }
        self.inner.try_lookup(name)
    }
}
