//! Per-statement outputs of a pipeline run.

use crate::value::Value;
use std::collections::HashMap;

/// Values produced by a pipeline run, keyed by statement key.
///
/// Inserts record the identifier they returned; updates and deletes record
/// their affected row count as [`Value::Int`]. Entries keep execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl ExecResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value produced by the statement stored under `key`.
    pub fn value_for(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Same as [`ExecResult::value_for`] but yields `Value::Null` for unknown keys.
    pub fn tx_result(&self, key: &str) -> Value {
        self.value_for(key).cloned().unwrap_or_default()
    }

    /// Number of recorded statements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statement keys in execution order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// `(key, value)` pairs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn record(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }
}
