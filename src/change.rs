//! Change sets: the column/value pairs that differ between an original row
//! and a requested one.

use crate::core::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMode {
    /// Diff against a zero-valued record; every populated field is written.
    Insert,
    /// Diff against the stored row; only differing fields are written.
    Update,
}

/// One differing field.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Rust field name.
    pub key: &'static str,
    /// Persisted column name.
    pub name: &'static str,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub entries: Vec<Change>,
    /// Column names in field declaration order.
    pub columns: Vec<String>,
    pub params: BTreeMap<String, Value>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &'static str, name: &'static str, value: Value) {
        self.columns.push(name.to_string());
        self.params.insert(name.to_string(), value.clone());
        self.entries.push(Change { key, name, value });
    }

    /// Strips parameters with an empty key or an empty string value.
    pub fn finish(mut self) -> Self {
        self.params
            .retain(|key, value| !key.is_empty() && !value.is_empty_text());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, column: &str) -> Option<&Change> {
        self.entries.iter().find(|c| c.name == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_strips_empty_text() {
        let mut set = ChangeSet::new();
        set.push("title", "title", Value::from("Go"));
        set.push("slug", "slug", Value::from(""));
        set.push("active", "active", Value::Boolean(false));
        let set = set.finish();

        assert_eq!(set.columns, vec!["title", "slug", "active"]);
        assert_eq!(set.len(), 3);
        assert!(set.params.contains_key("title"));
        assert!(!set.params.contains_key("slug"));
        assert_eq!(set.params.get("active"), Some(&Value::Boolean(false)));
    }
}
