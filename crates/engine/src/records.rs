//! A `DataSource` over a root-object list of record pointers (spec.md
//! §4.6): `protobase-query`'s planner only knows how to resolve fields
//! through this trait, so the engine is the layer that actually walks atom
//! pointers to answer a scan.

use protobase_core::pointer::AtomPointer;
use protobase_core::value::Value;
use protobase_query::DataSource;
use protobase_storage::AtomStore;
use std::sync::Arc;

/// Resolves records (each a `Value::Ref` to a `MapAtom`) against a fixed
/// `AtomStore` snapshot. Built fresh per query from the root's record list.
pub struct RecordSource {
    store: Arc<AtomStore>,
    records: Vec<Value>,
}

impl RecordSource {
    /// Wrap `records` (each expected to be a `Value::Ref`) for querying
    /// against `store`.
    pub fn new(store: Arc<AtomStore>, records: Vec<Value>) -> Self {
        Self { store, records }
    }
}

impl DataSource for RecordSource {
    fn all_records(&self) -> Vec<Value> {
        self.records.clone()
    }

    fn field(&self, record: &Value, field: &str) -> Option<Value> {
        let Value::Ref(ptr) = record else { return None };
        resolve_field(&self.store, *ptr, field)
    }
}

fn resolve_field(store: &Arc<AtomStore>, ptr: AtomPointer, field: &str) -> Option<Value> {
    store.get_atom(ptr).ok()?.get(field).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_core::atom::{Atom, AtomKind};
    use protobase_core::config::CacheConfig;
    use protobase_durability::{BlockProvider, Format, MemoryBlockProvider};

    fn store() -> Arc<AtomStore> {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new());
        Arc::new(AtomStore::open(provider, &CacheConfig::default()).unwrap())
    }

    #[test]
    fn resolves_fields_through_the_store() {
        let store = store();
        let atom = Atom::new(AtomKind::MapAtom).with_field("category", Value::from("tools"));
        let ptr = store.push_atom(&atom, Format::JsonUtf8).unwrap();
        let source = RecordSource::new(store, vec![Value::Ref(ptr)]);
        assert_eq!(
            source.field(&Value::Ref(ptr), "category"),
            Some(Value::from("tools"))
        );
        assert_eq!(source.field(&Value::Ref(ptr), "missing"), None);
    }

    #[test]
    fn all_records_returns_the_snapshot_list() {
        let store = store();
        let source = RecordSource::new(store, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(source.all_records(), vec![Value::Int(1), Value::Int(2)]);
    }
}
