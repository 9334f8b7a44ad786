//! Persistent, copy-on-write collections and the index registry
//! (spec.md §4.4, §4.5).
//!
//! Every collection here follows the same contract: mutating methods take
//! `&self` and return a new value, sharing unaffected structure with the
//! receiver through `Arc`. Nothing in this crate touches storage directly —
//! conversion to/from `Atom` for persistence lives at the layer that owns
//! an `AtomStore`.

#![warn(missing_docs)]

pub mod dictionary;
pub mod hash_dictionary;
pub mod index_registry;
pub mod list;
pub mod repeated_keys_dictionary;
pub mod set;

pub use dictionary::Dictionary;
pub use hash_dictionary::HashDictionary;
pub use index_registry::{IndexDefinition, IndexRegistry};
pub use list::List;
pub use repeated_keys_dictionary::RepeatedKeysDictionary;
pub use set::Set;
