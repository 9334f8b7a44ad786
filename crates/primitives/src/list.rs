//! Copy-on-write AVL-balanced `List` (spec.md §4.4.1).
//!
//! Every mutation returns a new [`List`]; the receiver is left untouched.
//! Nodes are reference-counted ([`Arc`]) so unaffected subtrees are shared,
//! not copied, between versions — the same structural-sharing pattern
//! `prataprc-rdms`'s `llrb::Node` uses for its red-black tree, adapted here
//! to AVL balancing with an order-statistics `count` field so positional
//! indexing stays `O(log n)`.

use protobase_core::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Node {
    value: Value,
    height: u32,
    count: u64,
    left: Option<Arc<Node>>,
    right: Option<Arc<Node>>,
}

fn height(n: &Option<Arc<Node>>) -> u32 {
    n.as_ref().map(|n| n.height).unwrap_or(0)
}

fn count(n: &Option<Arc<Node>>) -> u64 {
    n.as_ref().map(|n| n.count).unwrap_or(0)
}

fn balance_factor(n: &Node) -> i64 {
    height(&n.left) as i64 - height(&n.right) as i64
}

fn make_node(value: Value, left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Arc<Node> {
    let height = 1 + height(&left).max(height(&right));
    let count = 1 + count(&left) + count(&right);
    Arc::new(Node {
        value,
        height,
        count,
        left,
        right,
    })
}

fn rotate_left(n: &Node) -> Arc<Node> {
    let r = n.right.clone().expect("rotate_left requires a right child");
    let new_left = make_node(n.value.clone(), n.left.clone(), r.left.clone());
    make_node(r.value.clone(), Some(new_left), r.right.clone())
}

fn rotate_right(n: &Node) -> Arc<Node> {
    let l = n.left.clone().expect("rotate_right requires a left child");
    let new_right = make_node(n.value.clone(), l.right.clone(), n.right.clone());
    make_node(l.value.clone(), l.left.clone(), Some(new_right))
}

/// Rebalance `n` assuming both children are already balanced (the standard
/// AVL single/double rotation cases).
fn rebalance(n: Arc<Node>) -> Arc<Node> {
    let bf = balance_factor(&n);
    if bf > 1 {
        let left = n.left.as_ref().unwrap();
        let left = if balance_factor(left) < 0 {
            rotate_left(left)
        } else {
            left.clone()
        };
        rotate_right(&Node {
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

fn insert_at(n: &Option<Arc<Node>>, index: u64, value: Value) -> Arc<Node> {
    match n {
        None => make_node(value, None, None),
        Some(node) => {
            let left_count = count(&node.left);
            if index <= left_count {
                let new_left = Some(insert_at(&node.left, index, value));
                rebalance(make_node(node.value.clone(), new_left, node.right.clone()))
            } else {
                let new_right = Some(insert_at(&node.right, index - left_count - 1, value));
                rebalance(make_node(node.value.clone(), node.left.clone(), new_right))
            }
        }
    }
}

fn set_at(n: &Arc<Node>, index: u64) -> impl Fn(Value) -> Arc<Node> + '_ {
    move |value| set_at_inner(n, index, value)
}

fn set_at_inner(n: &Arc<Node>, index: u64, value: Value) -> Arc<Node> {
    let left_count = count(&n.left);
    if index < left_count {
        let new_left = Some(set_at_inner(n.left.as_ref().unwrap(), index, value));
        make_node(n.value.clone(), new_left, n.right.clone())
    } else if index == left_count {
        make_node(value, n.left.clone(), n.right.clone())
    } else {
        let new_right = Some(set_at_inner(
            n.right.as_ref().unwrap(),
            index - left_count - 1,
            value,
        ));
        make_node(n.value.clone(), n.left.clone(), new_right)
    }
}

/// Remove the leftmost node of `n`, returning the remaining subtree and the
/// removed value.
fn remove_leftmost(n: &Arc<Node>) -> (Option<Arc<Node>>, Value) {
    match &n.left {
        None => (n.right.clone(), n.value.clone()),
        Some(left) => {
            let (new_left, value) = remove_leftmost(left);
            (
                Some(rebalance(make_node(n.value.clone(), new_left, n.right.clone()))),
                value,
            )
        }
    }
}

fn remove_at(n: &Option<Arc<Node>>, index: u64) -> Option<Arc<Node>> {
    let node = n.as_ref()?;
    let left_count = count(&node.left);
    if index < left_count {
        let new_left = remove_at(&node.left, index);
        Some(rebalance(make_node(node.value.clone(), new_left, node.right.clone())))
    } else if index > left_count {
        let new_right = remove_at(&node.right, index - left_count - 1);
        Some(rebalance(make_node(node.value.clone(), node.left.clone(), new_right)))
    } else {
        match (&node.left, &node.right) {
            (None, None) => None,
            (Some(l), None) => Some(l.clone()),
            (None, Some(r)) => Some(r.clone()),
            (Some(l), Some(r)) => {
                let (new_right, successor) = remove_leftmost(r);
                let _ = l;
                Some(rebalance(make_node(successor, node.left.clone(), new_right)))
            }
        }
    }
}

fn get_at(n: &Option<Arc<Node>>, index: u64) -> Option<&Value> {
    let node = n.as_ref()?;
    let left_count = count(&node.left);
    if index < left_count {
        get_at(&node.left, index)
    } else if index == left_count {
        Some(&node.value)
    } else {
        get_at(&node.right, index - left_count - 1)
    }
}

fn in_order(n: &Option<Arc<Node>>, out: &mut Vec<Value>) {
    if let Some(node) = n {
        in_order(&node.left, out);
        out.push(node.value.clone());
        in_order(&node.right, out);
    }
}

/// Debug-only AVL invariant check: `|height(left) - height(right)| <= 1` at
/// every node, and `count == count(left) + count(right) + 1` everywhere
/// (spec.md §8).
fn check_invariants(n: &Option<Arc<Node>>) -> bool {
    match n {
        None => true,
        Some(node) => {
            let bf = balance_factor(node);
            let counted = count(&node.left) + count(&node.right) + 1 == node.count;
            bf.abs() <= 1 && counted && check_invariants(&node.left) && check_invariants(&node.right)
        }
    }
}

/// Copy-on-write, AVL-balanced positional list. Cloning is `O(1)` (an
/// `Arc` bump); every mutation produces a new `List` sharing unaffected
/// subtrees with its parent.
#[derive(Debug, Clone, Default)]
pub struct List {
    root: Option<Arc<Node>>,
}

fn normalize_index(i: i64, len: u64) -> Option<u64> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx as u64 >= len {
        None
    } else {
        Some(idx as u64)
    }
}

impl List {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list by appending each value of `values` in order. Used to
    /// rehydrate a list from its flattened persisted form.
    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Self {
        let mut list = Self::new();
        for v in values {
            list = list.append_last(v);
        }
        list
    }

    /// Number of elements.
    pub fn len(&self) -> u64 {
        count(&self.root)
    }

    /// Whether the list holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Height of the balanced tree (for diagnostics/tests).
    pub fn height(&self) -> u32 {
        height(&self.root)
    }

    /// Element at `index`; negative indices count from the end. `None` if
    /// out of range.
    pub fn get_at(&self, index: i64) -> Option<&Value> {
        let idx = normalize_index(index, self.len())?;
        get_at(&self.root, idx)
    }

    /// Overwrite the element at `index`. If `index == len()`, appends.
    /// Out-of-range (beyond `len()`, or an unresolvable negative index) is
    /// a no-op, mirroring `remove_at`'s "absent index is a no-op" rule.
    pub fn set_at(&self, index: i64, value: Value) -> Self {
        let len = self.len();
        if index >= 0 && index as u64 == len {
            return self.append_last(value);
        }
        match normalize_index(index, len) {
            Some(idx) => match &self.root {
                None => self.clone(),
                Some(root) => Self {
                    root: Some(set_at(root, idx)(value)),
                },
            },
            None => self.clone(),
        }
    }

    /// Insert `value` at `index`, shifting later elements right. `index` is
    /// clamped to `[0, len()]`.
    pub fn insert_at(&self, index: i64, value: Value) -> Self {
        let len = self.len();
        let idx = if index < 0 {
            normalize_index(index, len + 1).unwrap_or(0)
        } else {
            (index as u64).min(len)
        };
        Self {
            root: Some(insert_at(&self.root, idx, value)),
        }
    }

    /// Remove the element at `index`. Absent index is a no-op.
    pub fn remove_at(&self, index: i64) -> Self {
        match normalize_index(index, self.len()) {
            Some(idx) => Self {
                root: remove_at(&self.root, idx),
            },
            None => self.clone(),
        }
    }

    /// Prepend `value`.
    pub fn append_first(&self, value: Value) -> Self {
        self.insert_at(0, value)
    }

    /// Append `value`.
    pub fn append_last(&self, value: Value) -> Self {
        self.insert_at(self.len() as i64, value)
    }

    /// Concatenate `other` after `self`.
    pub fn extend(&self, other: &List) -> Self {
        let mut result = self.clone();
        for v in other.as_iterable() {
            result = result.append_last(v);
        }
        result
    }

    /// First `n` elements as a new list. Negative `n` means "all but the
    /// last `|n|` elements".
    pub fn head(&self, n: i64) -> Self {
        let len = self.len() as i64;
        let end = if n < 0 { (len + n).max(0) } else { n.min(len) };
        self.slice(0, end)
    }

    /// Last `n` elements as a new list. Negative `n` means "drop the first
    /// `|n|` elements and keep the rest".
    pub fn tail(&self, n: i64) -> Self {
        let len = self.len() as i64;
        let start = if n < 0 { (-n).min(len) } else { (len - n).max(0) };
        self.slice(start, len)
    }

    /// Bounded copy of `[from, to)`, clamped to the list's extent.
    pub fn slice(&self, from: i64, to: i64) -> Self {
        let len = self.len() as i64;
        let from = from.clamp(0, len) as u64;
        let to = to.clamp(0, len) as u64;
        let mut result = List::new();
        if from >= to {
            return result;
        }
        for i in from..to {
            if let Some(v) = get_at(&self.root, i) {
                result = result.append_last(v.clone());
            }
        }
        result
    }

    /// In-order values.
    pub fn as_iterable(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.len() as usize);
        in_order(&self.root, &mut out);
        out
    }

    /// `true` if the AVL balance and count invariants hold everywhere
    /// (spec.md §8 — used by property tests, not on the hot path).
    pub fn check_invariants(&self) -> bool {
        check_invariants(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn append_and_index() {
        let mut list = List::new();
        for i in 0..20 {
            list = list.append_last(v(i));
        }
        assert!(list.check_invariants());
        assert_eq!(list.len(), 20);
        assert_eq!(list.get_at(0), Some(&v(0)));
        assert_eq!(list.get_at(19), Some(&v(19)));
        assert_eq!(list.get_at(-1), Some(&v(19)));
        assert_eq!(list.get_at(20), None);
    }

    #[test]
    fn insert_and_remove_preserve_balance() {
        let mut list = List::new();
        for i in 0..100 {
            list = list.insert_at(i % 7, v(i));
            assert!(list.check_invariants());
        }
        for _ in 0..50 {
            list = list.remove_at(0);
            assert!(list.check_invariants());
        }
        assert_eq!(list.len(), 50);
    }

    #[test]
    fn set_at_overwrites_and_appends() {
        let list = List::new().append_last(v(1)).append_last(v(2));
        let updated = list.set_at(1, v(99));
        assert_eq!(updated.get_at(1), Some(&v(99)));
        assert_eq!(list.get_at(1), Some(&v(2)), "original untouched");
        let appended = list.set_at(2, v(3));
        assert_eq!(appended.len(), 3);
    }

    #[test]
    fn original_unchanged_by_mutation() {
        let original = List::new().append_last(v(1)).append_last(v(2));
        let _ = original.insert_at(1, v(42));
        assert_eq!(original.as_iterable(), vec![v(1), v(2)]);
    }

    #[test]
    fn head_and_tail_with_negative_n() {
        let list = (0..10).fold(List::new(), |l, i| l.append_last(v(i)));
        assert_eq!(
            list.head(-2).as_iterable(),
            (0..8).map(v).collect::<Vec<_>>()
        );
        assert_eq!(
            list.tail(-2).as_iterable(),
            (2..10).map(v).collect::<Vec<_>>()
        );
    }
}
