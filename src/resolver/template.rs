//! Recursive `{NAME}` token substitution.

use std::sync::LazyLock;

use regex::Regex;

use super::bindings::Bindings;
use crate::types::{MstarError, Result};

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").expect("token pattern is valid"));

/// Check whether a string still carries any `{NAME}` token
pub fn has_tokens(text: &str) -> bool {
    TOKEN_REGEX.is_match(text)
}

/// Names of the tokens in `text`, in order of appearance
pub fn token_names(text: &str) -> Vec<&str> {
    TOKEN_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Token resolver.
///
/// Substituted values are themselves resolved before they are spliced in. A
/// token that reappears within its own expansion chain is a
/// [`MstarError::CyclicReference`]; the same token used twice side by side is
/// not. Unknown tokens fail with [`MstarError::UnresolvedVariable`] unless the
/// resolver is lenient, in which case they stay in the output verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    lenient: bool,
}

impl Resolver {
    pub fn strict() -> Self {
        Self { lenient: false }
    }

    pub fn lenient() -> Self {
        Self { lenient: true }
    }

    pub fn with_lenient(lenient: bool) -> Self {
        Self { lenient }
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// Resolve every token in `template` against `bindings`
    pub fn resolve(&self, template: &str, bindings: &dyn Bindings) -> Result<String> {
        let mut chain = Vec::new();
        self.expand(template, bindings, &mut chain)
    }

    /// Look up `name` and resolve its value; `None` if nothing binds it
    pub fn resolve_var(&self, name: &str, bindings: &dyn Bindings) -> Result<Option<String>> {
        let Some(value) = bindings.try_lookup(name)? else {
            return Ok(None);
        };
        let mut chain = vec![name.to_string()];
        self.expand(&value, bindings, &mut chain).map(Some)
    }

    fn expand(
        &self,
        template: &str,
        bindings: &dyn Bindings,
        chain: &mut Vec<String>,
    ) -> Result<String> {
        if !has_tokens(template) {
            return Ok(template.to_string());
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in TOKEN_REGEX.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            last = whole.end();
            let name = name.as_str();

            if let Some(pos) = chain.iter().position(|n| n == name) {
                let mut cycle: Vec<&str> = chain[pos..].iter().map(String::as_str).collect();
                cycle.push(name);
                return Err(MstarError::CyclicReference {
                    cycle: cycle.join(" -> "),
                });
            }

            match bindings.try_lookup(name)? {
                Some(value) => {
                    chain.push(name.to_string());
                    let expanded = self.expand(&value, bindings, chain)?;
                    chain.pop();
                    out.push_str(&expanded);
                }
                None if self.lenient => out.push_str(whole.as_str()),
                None => return Err(MstarError::unresolved(name)),
            }
        }

        out.push_str(&template[last..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfigMap, Provenance};
    use proptest::prelude::*;

    fn bindings(pairs: &[(&str, &str)]) -> ConfigMap {
        ConfigMap::from_pairs(pairs.iter().copied(), Provenance::Computed)
    }

    #[test]
    fn test_simple_substitution() {
        let ctx = bindings(&[("_HOME", "/opt/mstar")]);
        let out = Resolver::strict().resolve("{_HOME}/bin", &ctx).unwrap();
        assert_eq!(out, "/opt/mstar/bin");
    }

    #[test]
    fn test_recursive_substitution() {
        let ctx = bindings(&[
            ("_HOME", "/opt/mstar"),
            ("_DATA", "{_HOME}/data"),
            ("_LOGS", "{_DATA}/logs"),
        ]);
        let out = Resolver::strict().resolve("{_LOGS}/today", &ctx).unwrap();
        assert_eq!(out, "/opt/mstar/data/logs/today");
    }

    #[test]
    fn test_repeated_token_is_not_a_cycle() {
        let ctx = bindings(&[("A", "x"), ("B", "{A}-{A}")]);
        let out = Resolver::strict().resolve("{B}/{A}", &ctx).unwrap();
        assert_eq!(out, "x-x/x");
    }

    #[test]
    fn test_cycle_detected() {
        let ctx = bindings(&[("A", "{B}"), ("B", "{A}")]);
        let err = Resolver::strict().resolve("{A}", &ctx).unwrap_err();
        match err {
            MstarError::CyclicReference { cycle } => assert_eq!(cycle, "A -> B -> A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference_detected() {
        let ctx = bindings(&[("A", "prefix {A}")]);
        let err = Resolver::lenient().resolve("{A}", &ctx).unwrap_err();
        assert!(matches!(err, MstarError::CyclicReference { .. }));
    }

    #[test]
    fn test_unresolved_strict() {
        let ctx = bindings(&[]);
        let err = Resolver::strict().resolve("{MISSING}/x", &ctx).unwrap_err();
        match err {
            MstarError::UnresolvedVariable { name } => assert_eq!(name, "MISSING"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unresolved_lenient_kept_literally() {
        let ctx = bindings(&[("A", "a")]);
        let out = Resolver::lenient()
            .resolve("{A}/{MISSING}/{A}", &ctx)
            .unwrap();
        assert_eq!(out, "a/{MISSING}/a");
    }

    #[test]
    fn test_non_token_braces_are_literal() {
        let ctx = bindings(&[]);
        let out = Resolver::strict().resolve("{} { A } {a b}", &ctx).unwrap();
        assert_eq!(out, "{} { A } {a b}");
    }

    #[test]
    fn test_resolve_var() {
        let ctx = bindings(&[("_HOME", "/m"), ("_BIN", "{_HOME}/bin"), ("LOOP", "x{LOOP}")]);
        let resolver = Resolver::strict();
        assert_eq!(
            resolver.resolve_var("_BIN", &ctx).unwrap().as_deref(),
            Some("/m/bin")
        );
        assert_eq!(resolver.resolve_var("NOPE", &ctx).unwrap(), None);
        assert!(matches!(
            resolver.resolve_var("LOOP", &ctx),
            Err(MstarError::CyclicReference { .. })
        ));
    }

    #[test]
    fn test_token_names() {
        assert_eq!(token_names("{A}/{b.c}-{d-e}"), vec!["A", "b.c", "d-e"]);
        assert!(!has_tokens("/plain/path"));
    }

    proptest! {
        #[test]
        fn test_token_free_input_unchanged(s in "[^{}]*") {
            let ctx = bindings(&[("A", "a")]);
            prop_assert_eq!(Resolver::strict().resolve(&s, &ctx).unwrap(), s);
        }
    }
}
