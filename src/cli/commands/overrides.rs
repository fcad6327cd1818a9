//! Override Commands
//!
//! Manage persisted overrides.
//!
//! Usage:
//!   mstarconf override put <KEY> <VALUE> [--file /MineStar.properties]
//!   mstarconf override remove <KEY> [--file /MineStar.properties]
//!   mstarconf override list [-f json]

use crate::cli::ui::Output;
use crate::cli::util::{CommandOptions, ListFormat};
use crate::context::{ConfigContext, MASK};
use crate::crypto::{is_encrypted, is_obfuscated};
use crate::types::Result;

/// Target file id: the one given, else the first configured base file
fn target(ctx: &ConfigContext, file: Option<&str>) -> String {
    file.map(str::to_string)
        .or_else(|| ctx.settings().config_files.first().cloned())
        .unwrap_or_default()
}

pub fn put(options: &CommandOptions, key: &str, value: &str, file: Option<&str>) -> Result<()> {
    let mut ctx = options.load_context()?;
    let file_id = target(&ctx, file);
    ctx.put_override(&file_id, key, value)?;

    let out = Output::new();
    if ctx.settings().is_secure(key) {
        out.success(&format!("Set {} in {} (encrypted)", key, file_id));
    } else {
        out.success(&format!("Set {} in {}", key, file_id));
    }
    Ok(())
}

pub fn remove(options: &CommandOptions, key: &str, file: Option<&str>) -> Result<()> {
    let mut ctx = options.load_context()?;
    let file_id = target(&ctx, file);

    let out = Output::new();
    match ctx.remove_override(&file_id, key)? {
        Some(_) => out.success(&format!("Removed {} from {}", key, file_id)),
        None => out.warning(&format!("No override {} in {}", key, file_id)),
    }
    Ok(())
}

pub fn list(options: &CommandOptions, format: ListFormat) -> Result<()> {
    let ctx = options.load_context()?;
    let set = ctx.overrides();
    let shown = |key: &str, value: &str| {
        if ctx.settings().is_secure(key) || is_encrypted(value) || is_obfuscated(value) {
            MASK.to_string()
        } else {
            value.to_string()
        }
    };

    if format == ListFormat::Json {
        let mut files = serde_json::Map::new();
        for file in set.files() {
            let values: serde_json::Map<String, serde_json::Value> = file
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(shown(k, v))))
                .collect();
            files.insert(file.id().to_string(), serde_json::Value::Object(values));
        }
        let doc = serde_json::json!({
            "store": ctx.override_store().path().display().to_string(),
            "created": set.meta.created.map(|t| t.to_string()),
            "modified": set.meta.modified.map(|t| t.to_string()),
            "overrides": files,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let out = Output::new();
    out.header(&format!(
        "Overrides ({})",
        ctx.override_store().path().display()
    ));
    if let (Some(created), Some(modified)) = (set.meta.created, set.meta.modified) {
        out.info(&format!("created {}, modified {}", created, modified));
    }
    if set.is_empty() {
        out.info("No overrides");
        return Ok(());
    }
    for file in set.files() {
        out.section(file.id());
        let width = file.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in file.iter() {
            out.entry(key, &shown(key, value), width);
        }
    }
    Ok(())
}
