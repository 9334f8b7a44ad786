//! Index-aware storage for query planning (spec.md §4.5): each
//! [`IndexDefinition`] maintains a [`RepeatedKeysDictionary`] mapping an
//! indexed field's value to the set of record pointers holding it, so the
//! planner can rewrite an equality/range predicate into a direct lookup
//! instead of a full scan.

use crate::repeated_keys_dictionary::RepeatedKeysDictionary;
use crate::set::Set;
use protobase_core::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Declares that `field` should be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDefinition {
    /// Name of the indexed field.
    pub field: String,
}

impl IndexDefinition {
    /// Define an index over `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

/// Copy-on-write collection of field indexes. Cloning is cheap (an `Arc`
/// bump over the per-field map); mutating methods return a new registry.
#[derive(Clone, Default)]
pub struct IndexRegistry {
    indexes: Arc<HashMap<String, RepeatedKeysDictionary>>,
}

impl IndexRegistry {
    /// A registry with no indexes defined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition`, creating an empty index if not already
    /// present. A no-op if the field is already indexed.
    pub fn define_index(&self, definition: &IndexDefinition) -> Self {
        if self.indexes.contains_key(&definition.field) {
            return self.clone();
        }
        tracing::debug!(field = %definition.field, "defining index");
        let mut map = (*self.indexes).clone();
        map.insert(definition.field.clone(), RepeatedKeysDictionary::new());
        Self { indexes: Arc::new(map) }
    }

    /// Whether `field` has a defined index.
    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    /// Total distinct keys currently stored for `field`'s index (spec.md
    /// §4.6 rule 4's "fewer total keys" selectivity tie-break). Zero if
    /// `field` is unindexed.
    pub fn key_count(&self, field: &str) -> u64 {
        self.indexes.get(field).map(|idx| idx.key_count()).unwrap_or(0)
    }

    /// Record that `pointer` holds `value` for `field`. A no-op if `field`
    /// is not indexed.
    pub fn index_insert(&self, field: &str, value: Value, pointer: Value) -> Self {
        match self.indexes.get(field) {
            None => self.clone(),
            Some(existing) => {
                let updated = existing.add(value, pointer);
                let mut map = (*self.indexes).clone();
                map.insert(field.to_string(), updated);
                Self { indexes: Arc::new(map) }
            }
        }
    }

    /// Remove the record that `pointer` held `value` for `field`. A no-op
    /// if `field` is not indexed or the entry is absent.
    pub fn index_remove(&self, field: &str, value: &Value, pointer: &Value) -> Self {
        match self.indexes.get(field) {
            None => self.clone(),
            Some(existing) => {
                let updated = existing.remove(value, pointer);
                let mut map = (*self.indexes).clone();
                map.insert(field.to_string(), updated);
                Self { indexes: Arc::new(map) }
            }
        }
    }

    /// Pointers whose `field` equals `value`. Empty (not an error) if
    /// `field` is unindexed or has no matches.
    pub fn lookup_eq(&self, field: &str, value: &Value) -> Set {
        self.indexes
            .get(field)
            .map(|idx| idx.get(value))
            .unwrap_or_default()
    }

    /// Union of pointers whose `field` value falls in `[from, to)`. Either
    /// bound may be omitted for an open range. Empty if `field` is
    /// unindexed.
    pub fn lookup_range(&self, field: &str, from: Option<&Value>, to: Option<&Value>) -> Set {
        let Some(idx) = self.indexes.get(field) else {
            return Set::new();
        };
        let mut result = Set::new();
        for (key, set) in idx.as_iterable() {
            let above = from.map(|f| key.total_cmp(f) != std::cmp::Ordering::Less).unwrap_or(true);
            let below = to.map(|t| key.total_cmp(t) == std::cmp::Ordering::Less).unwrap_or(true);
            if above && below {
                result = result.union(&set);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn equality_lookup_after_insert() {
        let registry = IndexRegistry::new().define_index(&IndexDefinition::new("category"));
        let registry = registry
            .index_insert("category", Value::from("tools"), ptr(1))
            .index_insert("category", Value::from("tools"), ptr(2))
            .index_insert("category", Value::from("books"), ptr(3));

        let tools = registry.lookup_eq("category", &Value::from("tools"));
        assert_eq!(tools.len(), 2);
        assert!(tools.contains(&ptr(1)));
        assert!(tools.contains(&ptr(2)));
    }

    #[test]
    fn unindexed_field_returns_empty() {
        let registry = IndexRegistry::new();
        assert!(registry.lookup_eq("missing", &Value::Int(1)).is_empty());
    }

    #[test]
    fn range_lookup_merges_matching_buckets() {
        let mut registry = IndexRegistry::new().define_index(&IndexDefinition::new("price"));
        for i in 0..10 {
            registry = registry.index_insert("price", Value::Int(i), ptr(i));
        }
        let matched = registry.lookup_range("price", Some(&Value::Int(3)), Some(&Value::Int(7)));
        let mut values: Vec<_> = matched.as_iterable().into_iter().map(|v| v.as_int().unwrap()).collect();
        values.sort();
        assert_eq!(values, vec![3, 4, 5, 6]);
    }

    #[test]
    fn remove_drops_pointer_from_bucket() {
        let registry = IndexRegistry::new()
            .define_index(&IndexDefinition::new("category"))
            .index_insert("category", Value::from("tools"), ptr(1))
            .index_insert("category", Value::from("tools"), ptr(2));
        let registry = registry.index_remove("category", &Value::from("tools"), &ptr(1));
        let tools = registry.lookup_eq("category", &Value::from("tools"));
        assert_eq!(tools.len(), 1);
        assert!(tools.contains(&ptr(2)));
    }

    #[test]
    fn key_count_tracks_distinct_keys_per_field() {
        let registry = IndexRegistry::new()
            .define_index(&IndexDefinition::new("category"))
            .index_insert("category", Value::from("tools"), ptr(1))
            .index_insert("category", Value::from("tools"), ptr(2))
            .index_insert("category", Value::from("books"), ptr(3));
        assert_eq!(registry.key_count("category"), 2);
        assert_eq!(registry.key_count("missing"), 0);
    }
}
