//! A single transaction's buffered reads and writes over the root object
//! (spec.md §4.7): snapshot-isolated, optimistic, validated at commit.

use protobase_core::hash::content_hash;
use protobase_core::value::Value;
use std::collections::BTreeMap;

/// Lifecycle state of a [`Transaction`]. Mirrors the active/validating/
/// committed/aborted states used across the durability and storage layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Open for reads and writes.
    Active,
    /// Committed successfully; the transaction is now read-only history.
    Committed,
    /// Aborted, with a human-readable reason.
    Aborted {
        /// Why the transaction did not commit.
        reason: String,
    },
}

/// A buffered write: either a new value for a root field, or its removal.
#[derive(Debug, Clone)]
pub enum Write {
    /// Set the field to this value.
    Set(Value),
    /// Remove the field entirely.
    Remove,
}

/// One transaction's view of the root object: the snapshot it started
/// from, the fields it has read (tracked by content hash for conflict
/// detection at commit), and the writes it intends to apply.
pub struct Transaction {
    /// Opaque sequence number, unique within a [`crate::manager::TransactionManager`].
    pub id: u64,
    /// Root fields present when this transaction began (`None` if the space
    /// had never committed a root).
    pub(crate) snapshot: BTreeMap<String, Value>,
    /// Field -> hash of the value read (or `None`'s hash if absent) when
    /// first observed by this transaction.
    pub(crate) read_set: BTreeMap<String, u64>,
    /// Field -> pending write, applied atomically at commit.
    pub(crate) write_set: BTreeMap<String, Write>,
    status: TransactionStatus,
}

fn hash_of(value: Option<&Value>) -> u64 {
    match value {
        Some(v) => content_hash(v),
        None => content_hash(&Value::Null),
    }
}

impl Transaction {
    pub(crate) fn new(id: u64, snapshot: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            snapshot,
            read_set: BTreeMap::new(),
            write_set: BTreeMap::new(),
            status: TransactionStatus::Active,
        }
    }

    /// Current status.
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Whether this transaction can still accept reads/writes.
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Read `field`, preferring this transaction's own uncommitted write
    /// (read-your-writes) and otherwise falling back to the snapshot,
    /// tracking the observed value in the read set for commit-time
    /// validation.
    pub fn get(&mut self, field: &str) -> Option<Value> {
        if let Some(write) = self.write_set.get(field) {
            return match write {
                Write::Set(v) => Some(v.clone()),
                Write::Remove => None,
            };
        }
        let value = self.snapshot.get(field).cloned();
        self.read_set.entry(field.to_string()).or_insert_with(|| hash_of(value.as_ref()));
        value
    }

    /// Buffer setting `field` to `value`. Not visible to other transactions
    /// until commit.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.write_set.insert(field.into(), Write::Set(value));
    }

    /// Buffer removing `field`.
    pub fn remove(&mut self, field: impl Into<String>) {
        self.write_set.insert(field.into(), Write::Remove);
    }

    /// Number of fields read and tracked for conflict detection.
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of fields with a pending write.
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    pub(crate) fn mark_committed(&mut self) {
        self.status = TransactionStatus::Committed;
    }

    pub(crate) fn mark_aborted(&mut self, reason: impl Into<String>) {
        self.status = TransactionStatus::Aborted { reason: reason.into() };
        self.write_set.clear();
    }

    /// Merge `extra` reads into this transaction's read set — used when
    /// rebasing onto a newer snapshot absorbs fields the caller never
    /// explicitly read (spec.md §4.7 rebase-on-conflict).
    pub(crate) fn absorb_snapshot(&mut self, fields: BTreeMap<String, Value>) {
        self.snapshot = fields;
    }
}
