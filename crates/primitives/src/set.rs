//! Copy-on-write `Set` (spec.md §4.4.4): a thin wrapper over
//! [`HashDictionary`] with `Value::Null` payloads, plus set algebra.

use crate::hash_dictionary::HashDictionary;
use protobase_core::value::Value;

/// Copy-on-write set of [`Value`]s, backed by a [`HashDictionary`].
#[derive(Clone, Default)]
pub struct Set {
    inner: HashDictionary,
}

impl Set {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from an iterator of values.
    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Self {
        let mut set = Self::new();
        for v in values {
            set = set.add(v);
        }
        set
    }

    /// Number of elements.
    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    /// Whether the set holds no elements.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Add `value`. Already-present values are a no-op.
    pub fn add(&self, value: Value) -> Self {
        Self {
            inner: self.inner.set_key(value, Value::Null),
        }
    }

    /// Remove `value`. Absent value is a no-op.
    pub fn remove(&self, value: &Value) -> Self {
        Self {
            inner: self.inner.remove_key(value),
        }
    }

    /// Membership test.
    pub fn contains(&self, value: &Value) -> bool {
        self.inner.has_key(value)
    }

    /// All elements, in unspecified order.
    pub fn as_iterable(&self) -> Vec<Value> {
        self.inner.as_iterable().into_iter().map(|(k, _)| k).collect()
    }

    /// Elements present in both `self` and `other`.
    pub fn intersection(&self, other: &Set) -> Set {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Set::from_values(small.as_iterable().into_iter().filter(|v| large.contains(v)))
    }

    /// Elements present in either `self` or `other`.
    pub fn union(&self, other: &Set) -> Set {
        let mut result = self.clone();
        for v in other.as_iterable() {
            result = result.add(v);
        }
        result
    }

    /// Elements present in `self` but not `other`.
    pub fn difference(&self, other: &Set) -> Set {
        Set::from_values(self.as_iterable().into_iter().filter(|v| !other.contains(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(values: &[i64]) -> Set {
        Set::from_values(values.iter().map(|&i| Value::Int(i)))
    }

    #[test]
    fn membership_and_size() {
        let set = set_of(&[1, 2, 3]).add(Value::Int(2));
        assert_eq!(set.len(), 3);
        assert!(set.contains(&Value::Int(2)));
        assert!(!set.contains(&Value::Int(4)));
    }

    #[test]
    fn algebra() {
        let a = set_of(&[1, 2, 3, 4]);
        let b = set_of(&[3, 4, 5, 6]);
        let mut inter: Vec<_> = a.intersection(&b).as_iterable().into_iter().map(|v| v.as_int().unwrap()).collect();
        inter.sort();
        assert_eq!(inter, vec![3, 4]);

        let mut uni: Vec<_> = a.union(&b).as_iterable().into_iter().map(|v| v.as_int().unwrap()).collect();
        uni.sort();
        assert_eq!(uni, vec![1, 2, 3, 4, 5, 6]);

        let mut diff: Vec<_> = a.difference(&b).as_iterable().into_iter().map(|v| v.as_int().unwrap()).collect();
        diff.sort();
        assert_eq!(diff, vec![1, 2]);
    }
}
