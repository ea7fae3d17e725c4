use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Prefix of the local state key that stops a child rule from matching under a node
pub const SKIP_PREFIX: &str = "skip:";
/// Local state key that stops every child rule from matching under a node
pub const SKIP_ALL: &str = "skip:*";

/// An append-only, insertion-ordered, multi-valued `String -> Value` store.
///
/// `put` never overwrites: `get` returns the latest value for a key and `get_all` the whole
/// history, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateMap {
    entries: Vec<(String, Value)>,
    index: HashMap<String, Vec<usize>>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for `key`
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.index
            .entry(key.clone())
            .or_default()
            .push(self.entries.len());
        self.entries.push((key, value.into()));
    }

    /// Builder flavour of [`StateMap::put`], handy to seed a parse
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    /// The most recently appended value for `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        let idx = *self.index.get(key)?.last()?;
        Some(&self.entries[idx].1)
    }

    /// Every value ever appended for `key`, oldest first
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a Value> + use<'a> {
        self.index
            .get(key)
            .into_iter()
            .flatten()
            .map(|&idx| &self.entries[idx].1)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Adds `delta` to the latest integer value of `key` (0 if unset) and appends the result.
    pub fn increment(&mut self, key: &str, delta: i64) -> i64 {
        let next = self.get_i64(key).unwrap_or(0) + delta;
        self.put(key, next);
        next
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Distinct keys in order of first insertion
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, (k, _))| self.index.get(k).and_then(|v| v.first()) == Some(i))
            .map(|(_, (k, _))| k.as_str())
    }

    /// Every `(key, value)` pair in insertion order
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of values stored, counting history
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the flag `key` is set: present with a value other than `null` or `false`
    pub fn is_set(&self, key: &str) -> bool {
        !matches!(self.get(key), None | Some(Value::Null) | Some(Value::Bool(false)))
    }

    /// Whether children of the node owning this state must not be matched by `rule_name`
    pub fn skips(&self, rule_name: &str) -> bool {
        self.is_set(SKIP_ALL) || self.is_set(&format!("{SKIP_PREFIX}{rule_name}"))
    }
}

impl Serialize for StateMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        for key in self.keys() {
            let history: Vec<&Value> = self.get_all(key).collect();
            map.serialize_entry(key, &history)?;
        }
        map.end()
    }
}
