//! `Atom`: an immutable record with a type tag and a field payload
//! (spec.md §3, §9 "dynamic dispatch / duck typing").

use crate::pointer::AtomPointer;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Discriminates the kind of persistent structure an atom's payload encodes.
/// Modeled as a closed sum type (spec.md §9) rather than an open-ended class
/// hierarchy — every collection kind the engine knows about is enumerated
/// here, and `protobase-primitives` exhaustively matches on it wherever a
/// collection is loaded back from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomKind {
    /// AVL list node.
    List,
    /// Ordered-binary dictionary node.
    Dictionary,
    /// Hash-trie node.
    HashDictionary,
    /// Set (hash-dictionary of elements).
    Set,
    /// `Dictionary<String, Set>`.
    RepeatedKeysDictionary,
    /// Opaque byte blob with no further structure.
    BytesAtom,
    /// Generic string-keyed map with no collection semantics of its own
    /// (root-history atoms, root-maps, and user records are `MapAtom`s).
    MapAtom,
}

/// An immutable record: a type tag plus a field payload. Once assigned a
/// pointer by the store, an atom's serialized bytes never change — a
/// logical edit always produces a new atom (structural sharing, spec.md §3).
///
/// Field order is a `BTreeMap` (lexicographic by key) rather than insertion
/// order: spec.md §4.2 requires "canonical map ordering ... to stabilize
/// hashing", and a `BTreeMap` gives that for free on every serialization
/// without a separate normalization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// What kind of collection/record this atom represents.
    pub kind: AtomKind,
    /// Field name -> value.
    pub fields: BTreeMap<String, Value>,
    /// Present once the atom has been persisted at least once.
    #[serde(skip)]
    pub pointer: Option<AtomPointer>,
}

impl Atom {
    /// Construct a fresh, not-yet-persisted atom.
    pub fn new(kind: AtomKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
            pointer: None,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Read a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether this atom has already been written to the WAL.
    pub fn is_persisted(&self) -> bool {
        self.pointer.is_some()
    }
}
