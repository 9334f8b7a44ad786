//! Persistence bridge between `protobase-primitives` collections and
//! `Atom` (spec.md §4.4, §9 "ephemeral vs persistent staging"). Collections
//! are flattened to their iterable form, JSON-encoded into a single
//! `entries` field, and rebuilt with the matching `from_values`/
//! `from_entries` constructor on read — the node graph itself is never
//! walked atom-by-atom, so a whole collection round-trips as one `Atom`.

use protobase_core::atom::{Atom, AtomKind};
use protobase_core::error::{Error, Result};
use protobase_core::value::Value;
use protobase_primitives::{Dictionary, HashDictionary, List, RepeatedKeysDictionary, Set};

const ENTRIES_FIELD: &str = "entries";

fn encode(values: impl serde::Serialize) -> Result<Value> {
    let bytes = serde_json::to_vec(&values).map_err(|e| Error::corruption(format!("encode: {e}")))?;
    Ok(Value::Bytes(bytes))
}

fn decode<T: serde::de::DeserializeOwned>(atom: &Atom) -> Result<T> {
    let Some(Value::Bytes(bytes)) = atom.get(ENTRIES_FIELD) else {
        return Err(Error::corruption(format!("atom missing `{ENTRIES_FIELD}` field")));
    };
    serde_json::from_slice(bytes).map_err(|e| Error::corruption(format!("decode: {e}")))
}

/// Flatten `list` into a `List`-kind atom.
pub fn list_to_atom(list: &List) -> Result<Atom> {
    Ok(Atom::new(AtomKind::List).with_field(ENTRIES_FIELD, encode(list.as_iterable())?))
}

/// Rebuild a `List` from a `List`-kind atom.
pub fn atom_to_list(atom: &Atom) -> Result<List> {
    Ok(List::from_values(decode::<Vec<Value>>(atom)?))
}

/// Flatten `dict` into a `Dictionary`-kind atom.
pub fn dictionary_to_atom(dict: &Dictionary) -> Result<Atom> {
    Ok(Atom::new(AtomKind::Dictionary).with_field(ENTRIES_FIELD, encode(dict.as_iterable())?))
}

/// Rebuild a `Dictionary` from a `Dictionary`-kind atom.
pub fn atom_to_dictionary(atom: &Atom) -> Result<Dictionary> {
    Ok(Dictionary::from_entries(decode::<Vec<(Value, Value)>>(atom)?))
}

/// Flatten `dict` into a `HashDictionary`-kind atom.
pub fn hash_dictionary_to_atom(dict: &HashDictionary) -> Result<Atom> {
    Ok(Atom::new(AtomKind::HashDictionary).with_field(ENTRIES_FIELD, encode(dict.as_iterable())?))
}

/// Rebuild a `HashDictionary` from a `HashDictionary`-kind atom.
pub fn atom_to_hash_dictionary(atom: &Atom) -> Result<HashDictionary> {
    Ok(HashDictionary::from_entries(decode::<Vec<(Value, Value)>>(atom)?))
}

/// Flatten `set` into a `Set`-kind atom.
pub fn set_to_atom(set: &Set) -> Result<Atom> {
    Ok(Atom::new(AtomKind::Set).with_field(ENTRIES_FIELD, encode(set.as_iterable())?))
}

/// Rebuild a `Set` from a `Set`-kind atom.
pub fn atom_to_set(atom: &Atom) -> Result<Set> {
    Ok(Set::from_values(decode::<Vec<Value>>(atom)?))
}

/// Flatten `dict` into a `RepeatedKeysDictionary`-kind atom. Each key's
/// bucket is serialized as its own flattened element list so membership
/// round-trips without re-hashing pointers through a nested `Set` atom.
pub fn repeated_keys_dictionary_to_atom(dict: &RepeatedKeysDictionary) -> Result<Atom> {
    let entries: Vec<(Value, Vec<Value>)> = dict
        .as_iterable()
        .into_iter()
        .map(|(key, set)| (key, set.as_iterable()))
        .collect();
    Ok(Atom::new(AtomKind::RepeatedKeysDictionary).with_field(ENTRIES_FIELD, encode(entries)?))
}

/// Rebuild a `RepeatedKeysDictionary` from a `RepeatedKeysDictionary`-kind atom.
pub fn atom_to_repeated_keys_dictionary(atom: &Atom) -> Result<RepeatedKeysDictionary> {
    let entries: Vec<(Value, Vec<Value>)> = decode(atom)?;
    let mut dict = RepeatedKeysDictionary::new();
    for (key, values) in entries {
        for value in values {
            dict = dict.add(key.clone(), value);
        }
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_round_trips_through_an_atom() {
        let list = List::from_values([Value::Int(1), Value::Int(2), Value::Int(3)]);
        let atom = list_to_atom(&list).unwrap();
        assert_eq!(atom.kind, AtomKind::List);
        let restored = atom_to_list(&atom).unwrap();
        assert_eq!(restored.as_iterable(), list.as_iterable());
    }

    #[test]
    fn set_round_trips_through_an_atom() {
        let set = Set::from_values([Value::Int(1), Value::Int(2)]);
        let atom = set_to_atom(&set).unwrap();
        let restored = atom_to_set(&atom).unwrap();
        assert_eq!(restored.len(), set.len());
        assert!(restored.contains(&Value::Int(1)));
        assert!(restored.contains(&Value::Int(2)));
    }

    #[test]
    fn repeated_keys_dictionary_round_trips_buckets() {
        let dict = RepeatedKeysDictionary::new()
            .add(Value::from("tools"), Value::Int(1))
            .add(Value::from("tools"), Value::Int(2))
            .add(Value::from("books"), Value::Int(3));
        let atom = repeated_keys_dictionary_to_atom(&dict).unwrap();
        let restored = atom_to_repeated_keys_dictionary(&atom).unwrap();
        assert_eq!(restored.get(&Value::from("tools")).len(), 2);
        assert_eq!(restored.get(&Value::from("books")).len(), 1);
    }

    #[test]
    fn decoding_an_atom_without_entries_is_corruption() {
        let atom = Atom::new(AtomKind::List);
        assert!(atom_to_list(&atom).is_err());
    }
}
