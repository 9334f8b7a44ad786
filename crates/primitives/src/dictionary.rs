//! Copy-on-write ordered-binary `Dictionary` (spec.md §4.4.2): an AVL tree
//! keyed by [`Value`] under [`Value::total_cmp`], giving sorted iteration
//! and `O(log n)` point/range access without a separate sort pass.
//!
//! The tree itself ([`Tree`]) is generic over its value type so
//! [`crate::repeated_keys_dictionary::RepeatedKeysDictionary`] can reuse it
//! with `Set` values instead of round-tripping through [`Value`].

use protobase_core::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Node<V> {
    key: Value,
    value: V,
    height: u32,
    count: u64,
    left: Option<Arc<Node<V>>>,
    right: Option<Arc<Node<V>>>,
}

fn height<V>(n: &Option<Arc<Node<V>>>) -> u32 {
    n.as_ref().map(|n| n.height).unwrap_or(0)
}

fn count<V>(n: &Option<Arc<Node<V>>>) -> u64 {
    n.as_ref().map(|n| n.count).unwrap_or(0)
}

fn balance_factor<V>(n: &Node<V>) -> i64 {
    height(&n.left) as i64 - height(&n.right) as i64
}

fn make_node<V: Clone>(key: Value, value: V, left: Option<Arc<Node<V>>>, right: Option<Arc<Node<V>>>) -> Arc<Node<V>> {
    let height = 1 + height(&left).max(height(&right));
    let count = 1 + count(&left) + count(&right);
    Arc::new(Node {
        key,
        value,
        height,
        count,
        left,
        right,
    })
}

fn rotate_left<V: Clone>(n: &Node<V>) -> Arc<Node<V>> {
    let r = n.right.clone().unwrap();
    let new_left = make_node(n.key.clone(), n.value.clone(), n.left.clone(), r.left.clone());
    make_node(r.key.clone(), r.value.clone(), Some(new_left), r.right.clone())
}

fn rotate_right<V: Clone>(n: &Node<V>) -> Arc<Node<V>> {
    let l = n.left.clone().unwrap();
    let new_right = make_node(n.key.clone(), n.value.clone(), l.right.clone(), n.right.clone());
    make_node(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right))
}

fn rebalance<V: Clone>(n: Arc<Node<V>>) -> Arc<Node<V>> {
    let bf = balance_factor(&n);
    if bf > 1 {
        let left = n.left.as_ref().unwrap();
        let left = if balance_factor(left) < 0 {
            rotate_left(left)
        } else {
            left.clone()
        };
        rotate_right(&Node {
            key: n.key.clone(),
            value: n.value.clone(),
            height: n.height,
            count: n.count,
            left: Some(left),
            right: n.right.clone(),
        })
    } else if bf < -1 {
        let right = n.right.as_ref().unwrap();
        let right = if balance_factor(right) > 0 {
            rotate_right(right)
        } else {
            right.clone()
        };
        rotate_left(&Node {
            key: n.key.clone(),
            value: n.value.clone(),
            height: n.height,
            count: n.count,
            left: n.left.clone(),
            right: Some(right),
        })
    } else {
        n
    }
}

fn insert<V: Clone>(n: &Option<Arc<Node<V>>>, key: Value, value: V) -> Arc<Node<V>> {
    match n {
        None => make_node(key, value, None, None),
        Some(node) => match key.total_cmp(&node.key) {
            Ordering::Less => {
                let new_left = Some(insert(&node.left, key, value));
                rebalance(make_node(node.key.clone(), node.value.clone(), new_left, node.right.clone()))
            }
            Ordering::Greater => {
                let new_right = Some(insert(&node.right, key, value));
                rebalance(make_node(node.key.clone(), node.value.clone(), node.left.clone(), new_right))
            }
            Ordering::Equal => make_node(key, value, node.left.clone(), node.right.clone()),
        },
    }
}

fn get<'a, V>(n: &'a Option<Arc<Node<V>>>, key: &Value) -> Option<&'a V> {
    let node = n.as_ref()?;
    match key.total_cmp(&node.key) {
        Ordering::Less => get(&node.left, key),
        Ordering::Greater => get(&node.right, key),
        Ordering::Equal => Some(&node.value),
    }
}

fn remove_leftmost<V: Clone>(n: &Arc<Node<V>>) -> (Option<Arc<Node<V>>>, Value, V) {
    match &n.left {
        None => (n.right.clone(), n.key.clone(), n.value.clone()),
        Some(left) => {
            let (new_left, key, value) = remove_leftmost(left);
            (
                Some(rebalance(make_node(n.key.clone(), n.value.clone(), new_left, n.right.clone()))),
                key,
                value,
            )
        }
    }
}

fn remove<V: Clone>(n: &Option<Arc<Node<V>>>, key: &Value) -> Option<Arc<Node<V>>> {
    let node = n.as_ref()?;
    match key.total_cmp(&node.key) {
        Ordering::Less => {
            let new_left = remove(&node.left, key);
            Some(rebalance(make_node(node.key.clone(), node.value.clone(), new_left, node.right.clone())))
        }
        Ordering::Greater => {
            let new_right = remove(&node.right, key);
            Some(rebalance(make_node(node.key.clone(), node.value.clone(), node.left.clone(), new_right)))
        }
        Ordering::Equal => match (&node.left, &node.right) {
            (None, None) => None,
            (Some(l), None) => Some(l.clone()),
            (None, Some(r)) => Some(r.clone()),
            (Some(l), Some(r)) => {
                let (new_right, k, v) = remove_leftmost(r);
                let _ = l;
                Some(rebalance(make_node(k, v, node.left.clone(), new_right)))
            }
        },
    }
}

fn in_order<V: Clone>(n: &Option<Arc<Node<V>>>, out: &mut Vec<(Value, V)>) {
    if let Some(node) = n {
        in_order(&node.left, out);
        out.push((node.key.clone(), node.value.clone()));
        in_order(&node.right, out);
    }
}

fn range<'a, V>(n: &'a Option<Arc<Node<V>>>, from: Option<&Value>, to: Option<&Value>, out: &mut Vec<(&'a Value, &'a V)>) {
    let node = match n {
        None => return,
        Some(node) => node,
    };
    let go_left = from.map(|f| node.key.total_cmp(f) != Ordering::Less).unwrap_or(true);
    let go_right = to.map(|t| node.key.total_cmp(t) == Ordering::Less).unwrap_or(true);
    if go_left {
        range(&node.left, from, to, out);
    }
    let above_from = from.map(|f| node.key.total_cmp(f) != Ordering::Less).unwrap_or(true);
    let below_to = to.map(|t| node.key.total_cmp(t) == Ordering::Less).unwrap_or(true);
    if above_from && below_to {
        out.push((&node.key, &node.value));
    }
    if go_right {
        range(&node.right, from, to, out);
    }
}

/// Generic copy-on-write AVL tree keyed by [`Value`], ordered by
/// [`Value::total_cmp`]. [`Dictionary`] is `Tree<Value>`;
/// [`crate::repeated_keys_dictionary::RepeatedKeysDictionary`] uses
/// `Tree<Set>` directly.
#[derive(Debug, Clone)]
pub(crate) struct Tree<V> {
    root: Option<Arc<Node<V>>>,
}

impl<V> Default for Tree<V> {
    fn default() -> Self {
        Self { root: None }
    }
}

impl<V: Clone> Tree<V> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> u64 {
        count(&self.root)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_key(&self, key: Value, value: V) -> Self {
        Self {
            root: Some(insert(&self.root, key, value)),
        }
    }

    pub(crate) fn get(&self, key: &Value) -> Option<&V> {
        get(&self.root, key)
    }

    pub(crate) fn has_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn remove_key(&self, key: &Value) -> Self {
        Self {
            root: remove(&self.root, key),
        }
    }

    pub(crate) fn as_iterable(&self) -> Vec<(Value, V)> {
        let mut out = Vec::with_capacity(self.len() as usize);
        in_order(&self.root, &mut out);
        out
    }

    pub(crate) fn range(&self, from: Option<&Value>, to: Option<&Value>) -> Vec<(&Value, &V)> {
        let mut out = Vec::new();
        range(&self.root, from, to, &mut out);
        out
    }

    pub(crate) fn min_key(&self) -> Option<&Value> {
        let mut node = self.root.as_ref()?;
        while let Some(left) = &node.left {
            node = left;
        }
        Some(&node.key)
    }

    pub(crate) fn max_key(&self) -> Option<&Value> {
        let mut node = self.root.as_ref()?;
        while let Some(right) = &node.right {
            node = right;
        }
        Some(&node.key)
    }
}

/// Copy-on-write AVL dictionary ordered by [`Value::total_cmp`].
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    tree: Tree<Value>,
}

impl Dictionary {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dictionary from its flattened persisted form.
    pub fn from_entries<I: IntoIterator<Item = (Value, Value)>>(entries: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in entries {
            dict = dict.set_key(k, v);
        }
        dict
    }

    /// Number of key/value pairs.
    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    /// Whether the dictionary holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Set `key` to `value`, replacing any existing entry.
    pub fn set_key(&self, key: Value, value: Value) -> Self {
        Self {
            tree: self.tree.set_key(key, value),
        }
    }

    /// Look up `key`.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.tree.get(key)
    }

    /// Whether `key` is present.
    pub fn has_key(&self, key: &Value) -> bool {
        self.tree.has_key(key)
    }

    /// Remove `key`. Absent key is a no-op.
    pub fn remove_key(&self, key: &Value) -> Self {
        Self {
            tree: self.tree.remove_key(key),
        }
    }

    /// All entries in ascending key order.
    pub fn as_iterable(&self) -> Vec<(Value, Value)> {
        self.tree.as_iterable()
    }

    /// Entries with `from <= key < to`. Either bound may be omitted for an
    /// open range.
    pub fn range(&self, from: Option<&Value>, to: Option<&Value>) -> Vec<(&Value, &Value)> {
        self.tree.range(from, to)
    }

    /// Smallest key, if any.
    pub fn min_key(&self) -> Option<&Value> {
        self.tree.min_key()
    }

    /// Largest key, if any.
    pub fn max_key(&self) -> Option<&Value> {
        self.tree.max_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let dict = Dictionary::new()
            .set_key(Value::from("b"), Value::Int(2))
            .set_key(Value::from("a"), Value::Int(1))
            .set_key(Value::from("c"), Value::Int(3));
        assert_eq!(dict.get(&Value::from("a")), Some(&Value::Int(1)));
        assert_eq!(dict.len(), 3);
        let keys: Vec<_> = dict.as_iterable().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn overwrite_replaces_value() {
        let dict = Dictionary::new().set_key(Value::from("a"), Value::Int(1));
        let updated = dict.set_key(Value::from("a"), Value::Int(2));
        assert_eq!(updated.get(&Value::from("a")), Some(&Value::Int(2)));
        assert_eq!(dict.get(&Value::from("a")), Some(&Value::Int(1)), "original untouched");
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let dict = Dictionary::new().set_key(Value::from("a"), Value::Int(1));
        let same = dict.remove_key(&Value::from("missing"));
        assert_eq!(same.len(), 1);
    }

    #[test]
    fn range_query_is_half_open() {
        let mut dict = Dictionary::new();
        for i in 0..10 {
            dict = dict.set_key(Value::Int(i), Value::Int(i * 10));
        }
        let results = dict.range(Some(&Value::Int(3)), Some(&Value::Int(7)));
        let keys: Vec<_> = results.into_iter().map(|(k, _)| k.as_int().unwrap()).collect();
        assert_eq!(keys, vec![3, 4, 5, 6]);
    }
}
