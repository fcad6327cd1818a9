//! Reader for Java-style `.properties` base files.
//!
//! Supports `#`/`!` comments, `=`, `:` or whitespace separators, trailing
//! backslash continuation lines and the `\t \n \r \f \\ \uXXXX` escapes.

use std::path::Path;

use tracing::debug;

use crate::types::{ConfigMap, MstarError, Provenance, Result, ResultExt};

/// Parse properties text into ordered `(key, value)` pairs
pub fn parse(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((number, raw)) = lines.next() {
        let line = raw.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut logical = String::from(line);
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let key = unescape(key).map_err(|e| {
            MstarError::Config(format!("line {}: {}", number + 1, e))
        })?;
        let value = unescape(value).map_err(|e| {
            MstarError::Config(format!("line {}: {}", number + 1, e))
        })?;
        pairs.push((key, value));
    }

    Ok(pairs)
}

/// Load a properties file into a map, recording the file path as provenance.
///
/// UTF-8 is tried first; anything else is read as ISO-8859-1.
pub fn load_file(path: &Path) -> Result<ConfigMap> {
    let bytes = std::fs::read(path).with_context_fn(|| format!("reading {}", path.display()))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("{} is not UTF-8, read as ISO-8859-1", path.display());
            latin1(e.as_bytes())
        }
    };
    let pairs = parse(&text)
        .map_err(|e| MstarError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(ConfigMap::from_pairs(
        pairs,
        Provenance::file(path.display().to_string()),
    ))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix(['=', ':'])
                    .map(str::trim_start)
                    .unwrap_or(rest);
                return (&line[..i], rest);
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(s: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("bad unicode escape \\u{}", hex))?;
                out.push(code);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}
