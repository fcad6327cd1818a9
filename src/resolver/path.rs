//! Path-flavored resolution on top of [`Resolver`].

use super::bindings::Bindings;
use super::template::Resolver;
use crate::config::PathStyle;
use crate::types::Result;

impl Resolver {
    /// Resolve `template` and normalize the result as a path for `style`.
    ///
    /// Both `/` and `\` count as separators on input. Runs of separators
    /// collapse into one, except a leading pair on Windows (UNC share).
    /// Absolute paths are kept in their long form.
    pub fn resolve_path(
        &self,
        template: &str,
        bindings: &dyn Bindings,
        style: PathStyle,
    ) -> Result<String> {
        let resolved = self.resolve(template, bindings)?;
        Ok(normalize_separators(&resolved, style))
    }
}

/// Rewrite every separator to the style's separator and collapse duplicates
pub fn normalize_separators(path: &str, style: PathStyle) -> String {
    let sep = style.separator();
    let is_sep = |c: char| c == '/' || c == '\\';

    let mut out = String::with_capacity(path.len());
    let unc = style.is_windows() && path.starts_with("\\\\");
    if unc {
        out.push(sep);
    }

    let mut previous_sep = false;
    for c in path.chars() {
        if is_sep(c) {
            if !previous_sep {
                out.push(sep);
            }
            previous_sep = true;
        } else {
            out.push(c);
            previous_sep = false;
        }
    }

    // trailing separator only survives as the root itself
    if out.len() > 1 && out.ends_with(sep) && !(style.is_windows() && out.ends_with(":\\")) {
        out.pop();
    }
    out
}
