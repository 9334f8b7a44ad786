//! ProtoBase: an embedded, transactional, object-oriented storage engine
//! with WAL durability, persistent copy-on-write collections, and an
//! index-aware query planner.
//!
//! [`Space`] is the top-level handle: open one against a directory for
//! durable storage or in memory for tests, then use it to run transactions
//! and queries against a [`StorageContext`].

#![warn(missing_docs)]

use protobase_core::error::Result;
use protobase_durability::{FileBlockProvider, MemoryBlockProvider};
use protobase_engine::StorageContext;
use std::path::Path;
use std::sync::Arc;

pub use protobase_concurrency::{Transaction, TransactionStatus};
pub use protobase_core::atom::{Atom, AtomKind};
pub use protobase_core::config::{CacheConfig, Config, ParallelConfig, WalConfig};
pub use protobase_core::error::Error;
pub use protobase_core::pointer::AtomPointer;
pub use protobase_core::value::Value;
pub use protobase_engine::{parallel_scan, sequential_scan, BackgroundScheduler, TaskPriority};
pub use protobase_primitives::{
    Dictionary, HashDictionary, IndexDefinition, IndexRegistry, List, RepeatedKeysDictionary, Set,
};
pub use protobase_query::{
    explain, optimize, AggregateOp, AggregateSpec, CmpOp, DataSource, Expression, JoinKind,
    PhysicalPlan, PlanNode,
};

/// A single on-disk (or in-memory) ProtoBase instance, mirroring the
/// teacher's top-level `Strata::open` entry point.
pub struct Space {
    context: StorageContext,
}

impl Space {
    /// Open a durable space rooted at `path`, creating it if absent.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let provider = Arc::new(FileBlockProvider::open(path.as_ref())?);
        Ok(Self { context: StorageContext::open(provider, config)? })
    }

    /// Open an in-memory space. Nothing persists past process exit; useful
    /// for tests and ephemeral caches.
    pub fn open_in_memory(config: Config) -> Result<Self> {
        let provider = Arc::new(MemoryBlockProvider::new());
        Ok(Self { context: StorageContext::open(provider, config)? })
    }

    /// The underlying storage context, for callers who need direct access
    /// to transactions, indexes, or queries.
    pub fn context(&self) -> &StorageContext {
        &self.context
    }

    /// Force durability of everything written so far.
    pub fn sync(&self) -> Result<()> {
        self.context.sync()
    }

    /// Stop background work and release resources. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.context.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_space_begins_empty() {
        let space = Space::open_in_memory(Config::default()).unwrap();
        let mut txn = space.context().begin().unwrap();
        assert_eq!(txn.get("anything"), None);
    }
}
