//! A sample: a string-keyed collection of [`Array`] values flowing through a pipeline.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::value::Array;

/// One unit of data flowing through a pipeline: a map from field name to [`Array`].
///
/// `BTreeMap` gives deterministic key iteration order, which several operators
/// (`rename`, `shape`, debug logging) rely on for stable output.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    fields: BTreeMap<String, Array>,
}

impl Sample {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert, mirroring the fluent construction idiom used elsewhere in the
    /// pipeline surface.
    pub fn with(mut self, key: impl Into<String>, value: Array) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Array) -> Option<Array> {
        self.fields.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Array> {
        self.fields.get(key)
    }

    /// Fetch a field, failing with [`Error::Coverage`] if it is absent — the error kind the
    /// spec assigns to samples missing a field a downstream operator requires.
    pub fn require(&self, key: &str) -> Result<&Array> {
        self.fields
            .get(key)
            .ok_or_else(|| Error::Coverage(format!("sample is missing required key '{key}'")))
    }

    pub fn remove(&mut self, key: &str) -> Option<Array> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rename `from` to `to`, dropping any prior value stored at `to`. No-op (returns `Ok`) if
    /// `from` is absent, treating rename as a projection rather than a requirement.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(v) = self.fields.remove(from) {
            self.fields.insert(to.to_string(), v);
        }
    }

    /// Keep only the given keys, dropping everything else.
    pub fn retain_keys(&mut self, keys: &[&str]) {
        self.fields.retain(|k, _| keys.contains(&k.as_str()));
    }
}

impl IntoIterator for Sample {
    type Item = (String, Array);
    type IntoIter = std::collections::btree_map::IntoIter<String, Array>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<(String, Array)> for Sample {
    fn from_iter<T: IntoIterator<Item = (String, Array)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_get() {
        let s = Sample::new()
            .with("x", Array::scalar(1i32))
            .with("y", Array::byte_string(b"hi".to_vec()));
        assert_eq!(s.len(), 2);
        assert!(s.get("x").is_some());
        assert!(s.get("z").is_none());
    }

    #[test]
    fn test_require_missing_is_coverage_error() {
        let s = Sample::new();
        let err = s.require("missing").unwrap_err();
        assert!(matches!(err, Error::Coverage(_)));
    }

    #[test]
    fn test_rename_moves_value() {
        let mut s = Sample::new().with("a", Array::scalar(7u8));
        s.rename("a", "b");
        assert!(s.get("a").is_none());
        assert!(s.get("b").is_some());
    }

    #[test]
    fn test_rename_missing_source_is_noop() {
        let mut s = Sample::new().with("a", Array::scalar(7u8));
        s.rename("nope", "b");
        assert!(s.get("a").is_some());
        assert!(s.get("b").is_none());
    }

    #[test]
    fn test_retain_keys() {
        let mut s = Sample::new()
            .with("a", Array::scalar(1u8))
            .with("b", Array::scalar(2u8))
            .with("c", Array::scalar(3u8));
        s.retain_keys(&["a", "c"]);
        assert_eq!(s.len(), 2);
        assert!(s.get("b").is_none());
    }
}
