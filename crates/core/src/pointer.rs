//! `AtomPointer`: the stable identity of a persisted atom (spec.md §3).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a single WAL segment (one segment per transaction, per
/// spec.md §4.2: `AtomPointer = (transaction_id, offset)`).
pub type WalId = Uuid;

/// `(transaction_id, offset)`: unique within a space, immutable once
/// assigned. Used as stable identity for hashing, equality, and indexing of
/// persisted atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AtomPointer {
    /// The WAL segment (transaction) this atom was written under.
    pub transaction_id: WalId,
    /// Byte offset of the frame's length prefix within that segment.
    pub offset: u64,
}

impl AtomPointer {
    /// Construct a pointer from its components.
    pub fn new(transaction_id: WalId, offset: u64) -> Self {
        Self {
            transaction_id,
            offset,
        }
    }

    /// Canonical 64-bit hash of this pointer, stable across process
    /// restarts — used as the hash of a persisted atom (spec.md §4.4.6).
    pub fn canonical_hash(&self) -> u64 {
        let mut buf = [0u8; 24];
        buf[0..16].copy_from_slice(self.transaction_id.as_bytes());
        buf[16..24].copy_from_slice(&self.offset.to_be_bytes());
        xxhash_rust::xxh3::xxh3_64(&buf)
    }
}

impl fmt::Display for AtomPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.transaction_id, self.offset)
    }
}
