//! `RepeatedKeysDictionary` (spec.md §4.4.5): a `Dictionary<String, Set>`
//! mapping one key to many values — the building block indexes are defined
//! on top of (see [`crate::index_registry`]).

use crate::dictionary::Tree;
use crate::set::Set;
use protobase_core::value::Value;

/// Copy-on-write multimap: each key maps to a [`Set`] of values, stored
/// directly as `Set` tree values (no intermediate `Value` encoding).
#[derive(Clone, Default)]
pub struct RepeatedKeysDictionary {
    tree: Tree<Set>,
}

impl RepeatedKeysDictionary {
    /// An empty multimap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> u64 {
        self.tree.len()
    }

    /// Add `value` under `key`, creating the key's set if absent.
    pub fn add(&self, key: Value, value: Value) -> Self {
        let set = self.tree.get(&key).cloned().unwrap_or_default().add(value);
        Self {
            tree: self.tree.set_key(key, set),
        }
    }

    /// Remove `value` from `key`'s set. If the set becomes empty, the key is
    /// dropped entirely.
    pub fn remove(&self, key: &Value, value: &Value) -> Self {
        match self.tree.get(key) {
            None => self.clone(),
            Some(existing) => {
                let set = existing.remove(value);
                let tree = if set.is_empty() {
                    self.tree.remove_key(key)
                } else {
                    self.tree.set_key(key.clone(), set)
                };
                Self { tree }
            }
        }
    }

    /// All values stored under `key`.
    pub fn get(&self, key: &Value) -> Set {
        self.tree.get(key).cloned().unwrap_or_default()
    }

    /// Whether `key` has any values.
    pub fn has_key(&self, key: &Value) -> bool {
        self.tree.has_key(key)
    }

    /// All `(key, set)` pairs in ascending key order.
    pub fn as_iterable(&self) -> Vec<(Value, Set)> {
        self.tree.as_iterable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_groups_values_under_key() {
        let rkd = RepeatedKeysDictionary::new()
            .add(Value::from("red"), Value::Int(1))
            .add(Value::from("red"), Value::Int(2))
            .add(Value::from("blue"), Value::Int(3));
        assert_eq!(rkd.key_count(), 2);
        assert_eq!(rkd.get(&Value::from("red")).len(), 2);
        assert!(rkd.get(&Value::from("red")).contains(&Value::Int(1)));
        assert_eq!(rkd.get(&Value::from("blue")).len(), 1);
    }

    #[test]
    fn removing_last_value_drops_key() {
        let rkd = RepeatedKeysDictionary::new().add(Value::from("red"), Value::Int(1));
        let removed = rkd.remove(&Value::from("red"), &Value::Int(1));
        assert!(!removed.has_key(&Value::from("red")));
        assert_eq!(removed.key_count(), 0);
    }

    #[test]
    fn removing_one_value_keeps_others() {
        let rkd = RepeatedKeysDictionary::new()
            .add(Value::from("red"), Value::Int(1))
            .add(Value::from("red"), Value::Int(2));
        let removed = rkd.remove(&Value::from("red"), &Value::Int(1));
        assert_eq!(removed.get(&Value::from("red")).len(), 1);
        assert!(removed.get(&Value::from("red")).contains(&Value::Int(2)));
    }
}
