//! Ordered statement lists run as one transaction.
//!
//! A statement's text is its key. Adding text that is already present gets
//! an inline `/*n*/` comment appended, so the key stays unique and the
//! statement stays executable.

use crate::args::Argument;
use std::collections::HashMap;

/// Ordered, deduplicated `(statement, raw arguments)` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    keys: Vec<String>,
    entries: HashMap<String, Vec<Argument>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// The key `sql` would be stored under if it were added now.
    pub fn unique_key(&self, sql: &str) -> String {
        if !self.entries.contains_key(sql) {
            return sql.to_string();
        }
        let mut n = self.keys.len();
        loop {
            let candidate = format!("{sql}/*{n}*/");
            if !self.entries.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Append a statement; returns the key it was stored under.
    pub fn add(&mut self, sql: impl Into<String>, kv: Vec<Argument>) -> String {
        let key = self.unique_key(&sql.into());
        self.entries.insert(key.clone(), kv);
        self.keys.push(key.clone());
        key
    }

    /// Prepend a statement; returns the key it was stored under.
    ///
    /// Empty statement text is ignored.
    pub fn add_first(&mut self, sql: impl Into<String>, kv: Vec<Argument>) -> Option<String> {
        let sql = sql.into();
        if sql.is_empty() {
            return None;
        }
        let key = self.unique_key(&sql);
        self.entries.insert(key.clone(), kv);
        self.keys.insert(0, key.clone());
        Some(key)
    }

    /// Move every entry of `other` to the end of this pipeline, in order.
    pub fn append(&mut self, mut other: Pipeline) {
        for key in other.keys {
            let kv = other.entries.remove(&key).unwrap_or_default();
            self.add(key, kv);
        }
    }

    /// Whether running this pipeline needs a transaction at all.
    pub fn is_transactional(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.entries.clear();
    }

    /// Statement keys in run order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Raw arguments stored under `key`.
    pub fn args(&self, key: &str) -> Option<&[Argument]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// `(key, raw arguments)` in run order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Argument])> {
        self.keys
            .iter()
            .map(|k| (k.as_str(), self.args(k).unwrap_or_default()))
    }
}
