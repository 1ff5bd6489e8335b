//! Immutable keyed configuration bundles.
//!
//! A bundle is a plain key/value map. The merge chain is
//! asset defaults ← carrier overrides ← provisioning overrides; merging is a
//! pure function producing a new snapshot, and readers hold a shared
//! immutable reference, so a reload never mutates a bundle in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One configuration value. Untagged so replay scripts and carrier bundles
/// read naturally as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i32),
    IntArray(Vec<i32>),
    String(String),
    StringArray(Vec<String>),
}

/// Immutable keyed map of carrier policy values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigBundle {
    values: HashMap<String, ConfigValue>,
}

impl ConfigBundle {
    pub fn new(values: HashMap<String, ConfigValue>) -> Self {
        ConfigBundle { values }
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: Into<String>,
    {
        ConfigBundle {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(ConfigValue::Bool(b)) => Some(*b),
            Some(ConfigValue::Int(i)) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.values.get(key) {
            Some(ConfigValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_int_array(&self, key: &str) -> Option<&[i32]> {
        match self.values.get(key) {
            Some(ConfigValue::IntArray(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ConfigValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_string_array(&self, key: &str) -> Option<&[String]> {
        match self.values.get(key) {
            Some(ConfigValue::StringArray(v)) => Some(v),
            _ => None,
        }
    }

    /// Pure merge: `overlay` wins on key conflicts, neither input is
    /// modified.
    pub fn merged(&self, overlay: &ConfigBundle) -> ConfigBundle {
        let mut values = self.values.clone();
        for (k, v) in &overlay.values {
            values.insert(k.clone(), v.clone());
        }
        ConfigBundle { values }
    }

    /// All entries whose key starts with `prefix`, sorted by key. Used for
    /// content diffs over a key family (e.g. every threshold array).
    pub fn subset(&self, prefix: &str) -> Vec<(&str, &ConfigValue)> {
        let mut entries: Vec<(&str, &ConfigValue)> = self
            .values
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigBundle {
        ConfigBundle::from_pairs([
            ("a.flag", ConfigValue::Bool(true)),
            ("a.num", ConfigValue::Int(7)),
            ("a.arr", ConfigValue::IntArray(vec![-105, -115])),
            ("b.name", ConfigValue::String("x".into())),
        ])
    }

    #[test]
    fn test_typed_getters() {
        let b = sample();
        assert_eq!(b.get_bool("a.flag"), Some(true));
        assert_eq!(b.get_int("a.num"), Some(7));
        assert_eq!(b.get_int_array("a.arr"), Some(&[-105, -115][..]));
        assert_eq!(b.get_string("b.name"), Some("x"));
        assert_eq!(b.get_int("a.flag"), None);
        assert_eq!(b.get_bool("missing"), None);
    }

    #[test]
    fn test_bool_accepts_int_encoding() {
        let b = ConfigBundle::from_pairs([("k", ConfigValue::Int(1))]);
        assert_eq!(b.get_bool("k"), Some(true));
        let b = ConfigBundle::from_pairs([("k", ConfigValue::Int(0))]);
        assert_eq!(b.get_bool("k"), Some(false));
    }

    #[test]
    fn test_merge_overlay_wins_and_is_pure() {
        let base = sample();
        let overlay = ConfigBundle::from_pairs([
            ("a.num", ConfigValue::Int(9)),
            ("c.new", ConfigValue::Bool(false)),
        ]);
        let merged = base.merged(&overlay);
        assert_eq!(merged.get_int("a.num"), Some(9));
        assert_eq!(merged.get_bool("c.new"), Some(false));
        assert_eq!(merged.get_bool("a.flag"), Some(true));
        // inputs untouched
        assert_eq!(base.get_int("a.num"), Some(7));
        assert_eq!(overlay.len(), 2);
    }

    #[test]
    fn test_subset_is_sorted() {
        let b = sample();
        let subset = b.subset("a.");
        let keys: Vec<&str> = subset.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["a.arr", "a.flag", "a.num"]);
    }

    #[test]
    fn test_merging_identical_bundle_is_identity() {
        let b = sample();
        assert_eq!(b.merged(&ConfigBundle::default()), b);
    }

    #[test]
    fn test_json_round_trip() {
        let b = sample();
        let json = serde_json::to_string(&b).unwrap();
        let back: ConfigBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
