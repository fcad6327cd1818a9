//! Binding sources consulted while resolving tokens.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::types::{ConfigMap, Provenance, Result};

/// Anything that can supply a value for a token name
pub trait Bindings {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>>;

    /// Lookup used during resolution. Sources that decode stored values on
    /// read override this to report decode failures.
    fn try_lookup(&self, name: &str) -> Result<Option<Cow<'_, str>>> {
        Ok(self.lookup(name))
    }
}

impl Bindings for ConfigMap {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(Cow::Borrowed)
    }
}

impl Bindings for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl Bindings for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl<B: Bindings + ?Sized> Bindings for &B {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        (**self).lookup(name)
    }

    fn try_lookup(&self, name: &str) -> Result<Option<Cow<'_, str>>> {
        (**self).try_lookup(name)
    }
}

/// Ordered stack of binding sources; the first layer with a value wins
#[derive(Default)]
pub struct LayeredBindings<'a> {
    layers: Vec<&'a dyn Bindings>,
}

impl<'a> LayeredBindings<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a layer below every layer already present
    pub fn push(mut self, layer: &'a dyn Bindings) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Bindings for LayeredBindings<'_> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.layers.iter().find_map(|layer| layer.lookup(name))
    }

    fn try_lookup(&self, name: &str) -> Result<Option<Cow<'_, str>>> {
        for layer in &self.layers {
            if let Some(value) = layer.try_lookup(name)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Zero-padded date and time fields of a fixed instant.
///
/// `YYYY`, `YY`, `MM`, `DD`, `HH`, `NN` (minute) and `SS`.
#[derive(Debug, Clone)]
pub struct TimeBindings {
    fields: BTreeMap<&'static str, String>,
}

impl TimeBindings {
    pub fn now() -> Self {
        Self::at(Local::now())
    }

    pub fn at<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("YYYY", format!("{:04}", dt.year()));
        fields.insert("YY", format!("{:02}", dt.year().rem_euclid(100)));
        fields.insert("MM", format!("{:02}", dt.month()));
        fields.insert("DD", format!("{:02}", dt.day()));
        fields.insert("HH", format!("{:02}", dt.hour()));
        fields.insert("NN", format!("{:02}", dt.minute()));
        fields.insert("SS", format!("{:02}", dt.second()));
        Self { fields }
    }
}

impl Bindings for TimeBindings {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.fields.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// Snapshot of the process environment taken at load time
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBindings {
    vars: ConfigMap,
}

impl EnvironmentBindings {
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            vars: ConfigMap::from_pairs(vars, Provenance::Environment),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name)
    }
}

impl Bindings for EnvironmentBindings {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.vars.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_first_layer_wins() {
        let top = ConfigMap::from_pairs([("A", "top")], Provenance::Computed);
        let bottom = ConfigMap::from_pairs([("A", "bottom"), ("B", "b")], Provenance::Computed);
        let layered = LayeredBindings::new().push(&top).push(&bottom);

        assert_eq!(layered.lookup("A").as_deref(), Some("top"));
        assert_eq!(layered.lookup("B").as_deref(), Some("b"));
        assert_eq!(layered.lookup("C"), None);
        assert_eq!(layered.len(), 2);
    }

    #[test]
    fn test_time_fields_zero_padded() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let time = TimeBindings::at(dt);
        assert_eq!(time.lookup("YYYY").as_deref(), Some("2026"));
        assert_eq!(time.lookup("YY").as_deref(), Some("26"));
        assert_eq!(time.lookup("MM").as_deref(), Some("03"));
        assert_eq!(time.lookup("DD").as_deref(), Some("04"));
        assert_eq!(time.lookup("HH").as_deref(), Some("05"));
        assert_eq!(time.lookup("NN").as_deref(), Some("06"));
        assert_eq!(time.lookup("SS").as_deref(), Some("07"));
        assert_eq!(time.lookup("MINUTE"), None);
    }

    #[test]
    fn test_environment_snapshot() {
        let env = EnvironmentBindings::from_vars([("MSTAR_HOME".to_string(), "/m".to_string())]);
        assert_eq!(env.get("MSTAR_HOME"), Some("/m"));
        assert!(EnvironmentBindings::empty().lookup("MSTAR_HOME").is_none());
    }
}
