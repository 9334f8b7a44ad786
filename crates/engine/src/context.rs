//! `StorageContext` (spec.md §9 "avoid implicit singletons; pass a handle
//! explicitly"): owns the `BlockProvider`, `AtomStore`, `TransactionManager`,
//! index registry, and background scheduler for one space, grounded in the
//! teacher's `engine::database::Database` open/close facade.

use crate::background::{BackgroundScheduler, TaskPriority};
use crate::records::RecordSource;
use parking_lot::Mutex;
use protobase_concurrency::{Transaction, TransactionManager};
use protobase_core::config::Config;
use protobase_core::error::Result;
use protobase_core::pointer::AtomPointer;
use protobase_core::value::Value;
use protobase_durability::{BlockProvider, Format};
use protobase_primitives::{IndexDefinition, IndexRegistry};
use protobase_query::{explain, optimize, Expression, PlanNode};
use protobase_storage::AtomStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Owns every long-lived component backing one ProtoBase space. Created via
/// [`StorageContext::open`]; call [`StorageContext::close`] (or let it
/// drop) to stop background work and release handles.
pub struct StorageContext {
    provider: Arc<dyn BlockProvider>,
    store: Arc<AtomStore>,
    txn_manager: Arc<TransactionManager>,
    indexes: Mutex<IndexRegistry>,
    background: BackgroundScheduler,
    config: Config,
    closed: AtomicBool,
}

impl StorageContext {
    /// Open a context over `provider`, replaying nothing explicitly — the
    /// root pointer `provider.read_root_ptr()` already reflects prior WAL
    /// state, since recovery is the provider backend's responsibility
    /// (spec.md §4.1).
    pub fn open(provider: Arc<dyn BlockProvider>, config: Config) -> Result<Self> {
        let store = Arc::new(AtomStore::open(provider.clone(), &config.cache)?);
        let txn_manager = Arc::new(TransactionManager::new(
            provider.clone(),
            store.clone(),
            Format::JsonUtf8,
        ));
        let background = BackgroundScheduler::new(2, 256);
        info!("storage context opened");
        Ok(Self {
            provider,
            store,
            txn_manager,
            indexes: Mutex::new(IndexRegistry::new()),
            background,
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Begin a snapshot-isolated transaction against the current root.
    pub fn begin(&self) -> Result<Transaction> {
        self.txn_manager.begin()
    }

    /// Commit `txn`, rebasing or aborting on conflict per
    /// `protobase-concurrency`'s bounded retry policy.
    pub fn commit(&self, txn: &mut Transaction) -> Result<AtomPointer> {
        self.txn_manager.commit(txn)
    }

    /// Declare that `field` should be indexed. Registers the field only;
    /// existing records are not backfilled automatically, since indexing
    /// is caller-driven (see `DESIGN.md`) — call
    /// [`StorageContext::index_insert`] for each existing record that
    /// should be visible to future indexed queries on `field`.
    pub fn define_index(&self, field: impl Into<String>) {
        let definition = IndexDefinition::new(field);
        let mut indexes = self.indexes.lock();
        *indexes = indexes.define_index(&definition);
    }

    /// Record that `pointer` holds `value` for `field` in the index.
    pub fn index_insert(&self, field: &str, value: Value, pointer: Value) {
        let mut indexes = self.indexes.lock();
        *indexes = indexes.index_insert(field, value, pointer);
    }

    /// Remove the record that `pointer` held `value` for `field`.
    pub fn index_remove(&self, field: &str, value: &Value, pointer: &Value) {
        let mut indexes = self.indexes.lock();
        *indexes = indexes.index_remove(field, value, pointer);
    }

    /// Current index registry snapshot (cheap: an `Arc` clone).
    pub fn indexes(&self) -> IndexRegistry {
        self.indexes.lock().clone()
    }

    /// Optimize and execute `expr` against `records`, using whatever
    /// indexes are currently defined to avoid a full scan where possible.
    pub fn query(&self, expr: &Expression, records: Vec<Value>) -> Vec<Value> {
        let indexes = self.indexes();
        let source = RecordSource::new(self.store.clone(), records);
        let plan = optimize(expr, &indexes);
        plan.execute(&source, &indexes)
    }

    /// Render the plan `expr` would optimize into, without executing it
    /// (spec.md §4.6 `explain() → tree`).
    pub fn explain_query(&self, expr: &Expression) -> PlanNode {
        let indexes = self.indexes();
        explain(&optimize(expr, &indexes))
    }

    /// Submit `work` to the background scheduler (index rebuilds, orphan
    /// GC, WAL housekeeping).
    pub fn submit_background(
        &self,
        priority: TaskPriority,
        work: impl FnOnce() + Send + 'static,
    ) -> std::result::Result<(), crate::background::BackpressureError> {
        self.background.submit(priority, work)
    }

    /// The configuration this context was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Direct access to the underlying atom store, for callers building
    /// higher-level record/collection types on top of `StorageContext`.
    pub fn store(&self) -> &Arc<AtomStore> {
        &self.store
    }

    /// Direct access to the block provider backing this context.
    pub fn provider(&self) -> &Arc<dyn BlockProvider> {
        &self.provider
    }

    /// Force durability of everything written so far.
    pub fn sync(&self) -> Result<()> {
        self.store.sync()
    }

    /// Stop background work, sync, and release resources. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.background.close();
        self.store.close()?;
        self.provider.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_durability::MemoryBlockProvider;

    fn context() -> StorageContext {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new());
        StorageContext::open(provider, Config::default()).unwrap()
    }

    #[test]
    fn begin_and_commit_roundtrip_a_root_field() {
        let ctx = context();
        let mut txn = ctx.begin().unwrap();
        txn.set("greeting", Value::from("hello"));
        ctx.commit(&mut txn).unwrap();

        let mut next = ctx.begin().unwrap();
        assert_eq!(next.get("greeting"), Some(Value::from("hello")));
    }

    #[test]
    fn query_uses_an_index_when_one_is_defined() {
        let ctx = context();
        ctx.define_index("category");
        ctx.index_insert("category", Value::from("tools"), Value::Int(1));

        let plan_description = ctx.explain_query(&Expression::eq("category", Value::from("tools")));
        assert!(plan_description.to_string().contains("IndexedSearchPlan"));
    }

    #[test]
    fn close_is_idempotent() {
        let ctx = context();
        ctx.close().unwrap();
        ctx.close().unwrap();
    }
}
