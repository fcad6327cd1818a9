//! Resolution Commands
//!
//! Usage:
//!   mstarconf get <NAME>
//!   mstarconf path <TEMPLATE> [-D KEY=VALUE]...
//!   mstarconf format <TEMPLATE> [-D KEY=VALUE]...
//!   mstarconf sources [--prefix P] [-f json]

use crate::cli::ui::Output;
use crate::cli::util::{CommandOptions, ListFormat, defines_to_bindings};
use crate::types::{MstarError, Result};

/// Print the resolved value of one variable
pub fn get(options: &CommandOptions, name: &str) -> Result<()> {
    let ctx = options.load_context()?;
    let value = ctx
        .interpret_var(name)?
        .ok_or_else(|| MstarError::unresolved(name))?;
    println!("{}", value);
    Ok(())
}

pub fn path(options: &CommandOptions, template: &str, defines: &[(String, String)]) -> Result<()> {
    let ctx = options.load_context()?;
    let call = defines_to_bindings(defines);
    let resolved = ctx.interpret_path_with(template, &call)?;
    println!("{}", resolved.display());
    Ok(())
}

pub fn format(options: &CommandOptions, template: &str, defines: &[(String, String)]) -> Result<()> {
    let ctx = options.load_context()?;
    let call = defines_to_bindings(defines);
    println!("{}", ctx.interpret_format_with(template, &call)?);
    Ok(())
}

/// List which file or override supplied each key
pub fn sources(options: &CommandOptions, prefix: Option<&str>, format: ListFormat) -> Result<()> {
    let ctx = options.load_context()?;
    let selected: Vec<_> = ctx
        .sources()
        .iter()
        .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
        .collect();

    if format == ListFormat::Json {
        let map: serde_json::Map<String, serde_json::Value> = selected
            .iter()
            .map(|(key, source)| ((*key).clone(), serde_json::json!(source)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    let out = Output::new();
    if selected.is_empty() {
        out.info("No matching keys");
        return Ok(());
    }
    let width = selected.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, source) in selected {
        out.source(key, source, width);
    }
    Ok(())
}
