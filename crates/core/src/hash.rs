//! Hashing rules for keys and set/hash-dictionary elements (spec.md §4.4.6).
//!
//! Three distinct rules apply depending on what is being hashed:
//!
//! 1. A persisted atom hashes by its [`AtomPointer`](crate::pointer::AtomPointer)
//!    (stable across sessions).
//! 2. An unpersisted atom referenced from a set/hash structure must first be
//!    persisted to obtain a pointer — callers should route through a staging
//!    area (see `protobase-concurrency`'s transaction draft) to avoid
//!    persisting purely ephemeral values.
//! 3. Non-atom keys (strings, integers, ...) hash by a deterministic
//!    content-based serialization, never by identity.

use crate::value::Value;

/// A 64-bit canonical hash used to key hash-tries, sets, and index buckets.
///
/// Implementers MUST NOT use identity-based hashing (e.g. pointer addresses)
/// for non-atom values; this mixer is content-based and deterministic across
/// processes and platforms.
pub fn content_hash(value: &Value) -> u64 {
    let mut bytes = Vec::with_capacity(16);
    canonical_encode(value, &mut bytes);
    xxhash_rust::xxh3::xxh3_64(&bytes)
}

/// Content hash of an arbitrary string key (dictionary / index keys).
pub fn content_hash_str(key: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64(key.as_bytes())
}

/// Deterministic, type-tagged encoding used as input to the mixer. Not a
/// public wire format — only required to be stable within one process
/// family and to distinguish values of different types that might otherwise
/// collide (e.g. the string `"1"` vs the integer `1`).
fn canonical_encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(0),
        Value::Bool(b) => {
            out.push(1);
            out.push(*b as u8);
        }
        Value::Int(i) => {
            out.push(2);
            out.extend_from_slice(&i.to_be_bytes());
        }
        Value::Float(f) => {
            out.push(3);
            out.extend_from_slice(&f.to_be_bytes());
        }
        Value::Str(s) => {
            out.push(4);
            out.extend_from_slice(&(s.len() as u64).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(5);
            out.extend_from_slice(&(b.len() as u64).to_be_bytes());
            out.extend_from_slice(b);
        }
        Value::Ref(ptr) => {
            out.push(6);
            out.extend_from_slice(ptr.transaction_id.as_bytes());
            out.extend_from_slice(&ptr.offset.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_string_and_int_keys() {
        let h1 = content_hash(&Value::Str("1".into()));
        let h2 = content_hash(&Value::Int(1));
        assert_ne!(h1, h2);
    }

    #[test]
    fn deterministic_across_calls() {
        let v = Value::Str("category".into());
        assert_eq!(content_hash(&v), content_hash(&v));
    }
}
