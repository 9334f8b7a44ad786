//! [`TransactionManager`]: snapshot isolation and CAS-based root
//! publication over a [`BlockProvider`] + [`AtomStore`] (spec.md §4.7).
//!
//! The root is a single `MapAtom` whose fields are the space's named root
//! objects, plus a `previous` field chaining to the prior root atom so the
//! history of commits can be walked backwards. Commit always goes through
//! [`BlockProvider::root_scope`], so only one commit can be validating and
//! publishing at a time; conflicting transactions either abort or, when
//! none of their own writes collide with what changed underneath them,
//! transparently rebase onto the new snapshot and retry.

use crate::transaction::{Transaction, Write};
use protobase_core::atom::{Atom, AtomKind};
use protobase_core::error::{Error, Result};
use protobase_core::hash::content_hash;
use protobase_core::pointer::AtomPointer;
use protobase_core::value::Value;
use protobase_durability::{BlockProvider, Format};
use protobase_storage::AtomStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const PREVIOUS_FIELD: &str = "previous";

/// How many times [`TransactionManager::commit`] will transparently rebase
/// a transaction onto a newer snapshot before giving up (spec.md §4.7 open
/// question: rebase is bounded, not unbounded retry).
pub const MAX_REBASE_ATTEMPTS: u32 = 8;

/// A conflict detected during commit validation: `field` was read (or
/// written) by the transaction but has since changed underneath it.
#[derive(Debug, Clone)]
pub struct Conflict {
    /// Name of the conflicting root field.
    pub field: String,
}

/// Coordinates snapshot-isolated transactions against a single root.
pub struct TransactionManager {
    provider: Arc<dyn BlockProvider>,
    store: Arc<AtomStore>,
    format: Format,
    next_id: AtomicU64,
}

impl TransactionManager {
    /// Build a manager over `provider`'s root and `store`'s atoms, encoding
    /// new root atoms with `format`.
    pub fn new(provider: Arc<dyn BlockProvider>, store: Arc<AtomStore>, format: Format) -> Self {
        Self {
            provider,
            store,
            format,
            next_id: AtomicU64::new(1),
        }
    }

    fn load_root(&self, ptr: Option<AtomPointer>) -> Result<BTreeMap<String, Value>> {
        match ptr {
            None => Ok(BTreeMap::new()),
            Some(ptr) => {
                let atom = self.store.get_atom(ptr)?;
                let mut fields: BTreeMap<String, Value> = atom.fields.clone().into_iter().collect();
                fields.remove(PREVIOUS_FIELD);
                Ok(fields)
            }
        }
    }

    /// Begin a transaction against the current committed root.
    pub fn begin(&self) -> Result<Transaction> {
        let root_ptr = self.provider.read_root_ptr()?;
        let fields = self.load_root(root_ptr)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(txn_id = id, "began transaction");
        Ok(Transaction::new(id, fields))
    }

    /// Validate `txn`'s read set against `current`, returning every field
    /// whose value has changed since the transaction observed it.
    fn conflicts(txn: &Transaction, current: &BTreeMap<String, Value>) -> Vec<Conflict> {
        txn.read_set
            .iter()
            .filter_map(|(field, observed_hash)| {
                let current_hash = current
                    .get(field)
                    .map(content_hash)
                    .unwrap_or_else(|| content_hash(&Value::Null));
                (current_hash != *observed_hash).then(|| Conflict { field: field.clone() })
            })
            .collect()
    }

    fn apply_writes(txn: &Transaction, mut fields: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        for (field, write) in &txn.write_set {
            match write {
                Write::Set(v) => {
                    fields.insert(field.clone(), v.clone());
                }
                Write::Remove => {
                    fields.remove(field);
                }
            }
        }
        fields
    }

    /// Commit `txn`. On a read-write conflict where none of the conflicting
    /// fields were themselves written by this transaction, transparently
    /// rebases onto the new snapshot and retries (up to
    /// [`MAX_REBASE_ATTEMPTS`]); otherwise aborts with [`Error::Conflict`].
    pub fn commit(&self, txn: &mut Transaction) -> Result<AtomPointer> {
        if !txn.is_active() {
            return Err(Error::validation(format!(
                "transaction {} is not active",
                txn.id
            )));
        }

        for attempt in 0..=MAX_REBASE_ATTEMPTS {
            let scope = self.provider.root_scope()?;
            let current_ptr = self.provider.read_root_ptr()?;
            let current_fields = self.load_root(current_ptr)?;

            let conflicts = Self::conflicts(txn, &current_fields);
            if conflicts.is_empty() {
                let new_fields = Self::apply_writes(txn, current_fields);
                let mut atom = Atom::new(AtomKind::MapAtom);
                for (k, v) in new_fields {
                    atom = atom.with_field(k, v);
                }
                atom = atom.with_field(
                    PREVIOUS_FIELD,
                    current_ptr.map(Value::Ref).unwrap_or(Value::Null),
                );
                let new_ptr = self.store.push_atom(&atom, self.format)?;
                self.provider.write_root_ptr(new_ptr)?;
                drop(scope);
                txn.mark_committed();
                info!(txn_id = txn.id, attempt, pointer = %new_ptr, "committed transaction");
                return Ok(new_ptr);
            }

            let hard_conflict = conflicts.iter().any(|c| txn.write_set.contains_key(&c.field));
            drop(scope);
            if hard_conflict || attempt == MAX_REBASE_ATTEMPTS {
                let fields: Vec<_> = conflicts.into_iter().map(|c| c.field).collect();
                txn.mark_aborted(format!("conflict on fields: {}", fields.join(", ")));
                return Err(Error::conflict(format!(
                    "transaction {} conflicts on: {}",
                    txn.id,
                    fields.join(", ")
                )));
            }

            debug!(txn_id = txn.id, attempt, "rebasing onto newer snapshot");
            let merged = conflicts
                .iter()
                .map(|c| c.field.clone())
                .fold(txn.snapshot.clone(), |mut acc, field| {
                    match current_fields.get(&field) {
                        Some(v) => {
                            acc.insert(field, v.clone());
                        }
                        None => {
                            acc.remove(&field);
                        }
                    }
                    acc
                });
            txn.absorb_snapshot(merged);
            for field in txn.read_set.keys().cloned().collect::<Vec<_>>() {
                let hash = current_fields
                    .get(&field)
                    .map(content_hash)
                    .unwrap_or_else(|| content_hash(&Value::Null));
                txn.read_set.insert(field, hash);
            }
        }

        unreachable!("loop always returns by MAX_REBASE_ATTEMPTS")
    }

    /// Abort `txn`, discarding its buffered writes.
    pub fn abort(&self, txn: &mut Transaction, reason: impl Into<String>) {
        txn.mark_aborted(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_durability::MemoryBlockProvider;

    fn manager() -> TransactionManager {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new());
        let store = Arc::new(AtomStore::open(provider.clone(), &Default::default()).unwrap());
        TransactionManager::new(provider, store, Format::JsonUtf8)
    }

    #[test]
    fn commit_persists_writes_visible_to_next_transaction() {
        let mgr = manager();
        let mut txn = mgr.begin().unwrap();
        txn.set("name", Value::from("alice"));
        mgr.commit(&mut txn).unwrap();

        let mut next = mgr.begin().unwrap();
        assert_eq!(next.get("name"), Some(Value::from("alice")));
    }

    #[test]
    fn concurrent_writers_to_disjoint_fields_both_commit() {
        let mgr = manager();
        let mut seed = mgr.begin().unwrap();
        seed.set("a", Value::Int(1));
        mgr.commit(&mut seed).unwrap();

        let mut t1 = mgr.begin().unwrap();
        let mut t2 = mgr.begin().unwrap();
        t1.get("a");
        t2.get("a");
        t1.set("b", Value::Int(2));
        t2.set("c", Value::Int(3));

        mgr.commit(&mut t1).unwrap();
        // t2 read "a" which hasn't changed, and wrote a disjoint field, so
        // this should rebase onto t1's commit and succeed rather than abort.
        mgr.commit(&mut t2).unwrap();

        let mut check = mgr.begin().unwrap();
        assert_eq!(check.get("a"), Some(Value::Int(1)));
        assert_eq!(check.get("b"), Some(Value::Int(2)));
        assert_eq!(check.get("c"), Some(Value::Int(3)));
    }

    #[test]
    fn concurrent_writers_to_same_field_conflict() {
        let mgr = manager();
        let mut seed = mgr.begin().unwrap();
        seed.set("x", Value::Int(0));
        mgr.commit(&mut seed).unwrap();

        let mut t1 = mgr.begin().unwrap();
        let mut t2 = mgr.begin().unwrap();
        t1.get("x");
        t2.get("x");
        t1.set("x", Value::Int(1));
        t2.set("x", Value::Int(2));

        mgr.commit(&mut t1).unwrap();
        let result = mgr.commit(&mut t2);
        assert!(result.is_err());
        assert!(matches!(t2.status(), crate::transaction::TransactionStatus::Aborted { .. }));
    }
}
