//! Result rows.

use crate::error::ValueError;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One row of a result.
///
/// All records of a result share the same key list.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Creates a record. `values` is expected to line up with `keys`.
    pub fn new(keys: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { keys, values }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The shared key list, for building sibling records.
    pub fn shared_keys(&self) -> Arc<[String]> {
        Arc::clone(&self.keys)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Position of `key` in the key list.
    pub fn index_of(&self, key: &str) -> Result<usize, ValueError> {
        self.keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| ValueError::NoSuchKey(key.to_string()))
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &str) -> Result<&Value, ValueError> {
        let index = self.index_of(key)?;
        self.get_index(index)
    }

    /// Looks up a value by 0-based position.
    pub fn get_index(&self, index: usize) -> Result<&Value, ValueError> {
        self.values.get(index).ok_or(ValueError::NoSuchIndex {
            index,
            len: self.values.len(),
        })
    }

    /// Iterates `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.keys.iter().cloned().zip(self.values).collect()
    }
}
