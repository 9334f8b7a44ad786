//! Copy-on-write hash-trie `HashDictionary` (spec.md §4.4.3): a HAMT keyed
//! by [`content_hash`], branching factor 32 (5 bits per level). [`Set`]
//! (see [`crate::set`]) is built directly on top of this structure.

use protobase_core::hash::content_hash;
use protobase_core::value::Value;
use std::sync::Arc;

const BITS_PER_LEVEL: u32 = 5;
const FANOUT: usize = 1 << BITS_PER_LEVEL;
const MAX_DEPTH: u32 = 64 / BITS_PER_LEVEL + 1;

fn index_at(hash: u64, depth: u32) -> usize {
    let shift = (depth * BITS_PER_LEVEL).min(63);
    ((hash >> shift) & (FANOUT as u64 - 1)) as usize
}

#[derive(Clone)]
enum Node {
    /// Interior node: up to 32 children, indexed by `BITS_PER_LEVEL` bits of
    /// the key hash at this depth.
    Branch(Arc<[Option<Arc<Node>>; FANOUT]>),
    /// Terminal bucket. Ordinarily holds one entry; holds more than one only
    /// when two keys' hashes collide for every bit used (exhausted depth, or
    /// a genuine `content_hash` collision).
    Leaf(Arc<Vec<(Value, Value)>>),
}

fn empty_branch() -> [Option<Arc<Node>>; FANOUT] {
    std::array::from_fn(|_| None)
}

fn insert(node: &Option<Arc<Node>>, hash: u64, depth: u32, key: Value, value: Value) -> Arc<Node> {
    match node {
        None => Arc::new(Node::Leaf(Arc::new(vec![(key, value)]))),
        Some(n) => match n.as_ref() {
            Node::Leaf(entries) => {
                if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
                    let mut new_entries = (**entries).clone();
                    new_entries[pos] = (key, value);
                    Arc::new(Node::Leaf(Arc::new(new_entries)))
                } else if depth >= MAX_DEPTH {
                    // Hash space exhausted: chain in the same leaf bucket.
                    let mut new_entries = (**entries).clone();
                    new_entries.push((key, value));
                    Arc::new(Node::Leaf(Arc::new(new_entries)))
                } else {
                    // Split the leaf into a branch and re-insert its entries
                    // alongside the new one.
                    let mut branch = empty_branch();
                    for (k, v) in entries.iter() {
                        let h = content_hash(k);
                        let idx = index_at(h, depth);
                        branch[idx] = Some(insert(&branch[idx], h, depth + 1, k.clone(), v.clone()));
                    }
                    let idx = index_at(hash, depth);
                    branch[idx] = Some(insert(&branch[idx], hash, depth + 1, key, value));
                    Arc::new(Node::Branch(Arc::new(branch)))
                }
            }
            Node::Branch(children) => {
                let idx = index_at(hash, depth);
                let mut new_children = (**children).clone();
                new_children[idx] = Some(insert(&children[idx], hash, depth + 1, key, value));
                Arc::new(Node::Branch(Arc::new(new_children)))
            }
        },
    }
}

fn get<'a>(node: &'a Option<Arc<Node>>, hash: u64, depth: u32, key: &Value) -> Option<&'a Value> {
    let n = node.as_ref()?;
    match n.as_ref() {
        Node::Leaf(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
        Node::Branch(children) => {
            let idx = index_at(hash, depth);
            get(&children[idx], hash, depth + 1, key)
        }
    }
}

fn remove(node: &Option<Arc<Node>>, hash: u64, depth: u32, key: &Value) -> Option<Arc<Node>> {
    let n = node.as_ref()?;
    match n.as_ref() {
        Node::Leaf(entries) => {
            let filtered: Vec<_> = entries.iter().filter(|(k, _)| k != key).cloned().collect();
            if filtered.is_empty() {
                None
            } else {
                Some(Arc::new(Node::Leaf(Arc::new(filtered))))
            }
        }
        Node::Branch(children) => {
            let idx = index_at(hash, depth);
            let mut new_children = (**children).clone();
            new_children[idx] = remove(&children[idx], hash, depth + 1, key);
            if new_children.iter().all(|c| c.is_none()) {
                None
            } else {
                Some(Arc::new(Node::Branch(Arc::new(new_children))))
            }
        }
    }
}

fn walk(node: &Option<Arc<Node>>, out: &mut Vec<(Value, Value)>) {
    let n = match node {
        None => return,
        Some(n) => n,
    };
    match n.as_ref() {
        Node::Leaf(entries) => out.extend(entries.iter().cloned()),
        Node::Branch(children) => {
            for child in children.iter() {
                walk(child, out);
            }
        }
    }
}

fn node_count(node: &Option<Arc<Node>>) -> u64 {
    let n = match node {
        None => return 0,
        Some(n) => n,
    };
    match n.as_ref() {
        Node::Leaf(entries) => entries.len() as u64,
        Node::Branch(children) => children.iter().map(node_count).sum(),
    }
}

/// Copy-on-write hash-trie map. Iteration order is unspecified (hash-bucket
/// order), unlike [`crate::dictionary::Dictionary`].
#[derive(Clone, Default)]
pub struct HashDictionary {
    root: Option<Arc<Node>>,
}

impl HashDictionary {
    /// An empty hash dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a hash dictionary from its flattened persisted form.
    pub fn from_entries<I: IntoIterator<Item = (Value, Value)>>(entries: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in entries {
            dict = dict.set_key(k, v);
        }
        dict
    }

    /// Number of key/value pairs.
    pub fn len(&self) -> u64 {
        node_count(&self.root)
    }

    /// Whether the dictionary holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set `key` to `value`, replacing any existing entry.
    pub fn set_key(&self, key: Value, value: Value) -> Self {
        let hash = content_hash(&key);
        Self {
            root: Some(insert(&self.root, hash, 0, key, value)),
        }
    }

    /// Look up `key`.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = content_hash(key);
        get(&self.root, hash, 0, key)
    }

    /// Whether `key` is present.
    pub fn has_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`. Absent key is a no-op.
    pub fn remove_key(&self, key: &Value) -> Self {
        let hash = content_hash(key);
        Self {
            root: remove(&self.root, hash, 0, key),
        }
    }

    /// All entries, in unspecified order.
    pub fn as_iterable(&self) -> Vec<(Value, Value)> {
        let mut out = Vec::with_capacity(self.len() as usize);
        walk(&self.root, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lookup_remove() {
        let mut dict = HashDictionary::new();
        for i in 0..500 {
            dict = dict.set_key(Value::Int(i), Value::Int(i * 2));
        }
        assert_eq!(dict.len(), 500);
        for i in 0..500 {
            assert_eq!(dict.get(&Value::Int(i)), Some(&Value::Int(i * 2)));
        }
        for i in 0..250 {
            dict = dict.remove_key(&Value::Int(i));
        }
        assert_eq!(dict.len(), 250);
        assert_eq!(dict.get(&Value::Int(0)), None);
        assert_eq!(dict.get(&Value::Int(499)), Some(&Value::Int(998)));
    }

    #[test]
    fn overwrite_replaces_value_not_size() {
        let dict = HashDictionary::new().set_key(Value::from("a"), Value::Int(1));
        let updated = dict.set_key(Value::from("a"), Value::Int(2));
        assert_eq!(updated.len(), 1);
        assert_eq!(updated.get(&Value::from("a")), Some(&Value::Int(2)));
    }

    #[test]
    fn original_unaffected_by_mutation() {
        let original = HashDictionary::new().set_key(Value::Int(1), Value::Int(1));
        let _ = original.set_key(Value::Int(2), Value::Int(2));
        assert_eq!(original.len(), 1);
    }
}
