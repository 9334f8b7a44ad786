//! Single-flight load deduplication (spec.md §4.3): concurrent misses for
//! the same key share one in-flight load; followers wait then read from
//! cache rather than repeating the backing-store read.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use protobase_core::error::{Error, Result};
use std::hash::Hash;
use std::sync::Arc;

struct Waiter<V> {
    done: Mutex<bool>,
    cond: Condvar,
    result: Mutex<Option<std::result::Result<V, String>>>,
}

impl<V> Waiter<V> {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cond: Condvar::new(),
            result: Mutex::new(None),
        }
    }

    fn finish(&self, result: std::result::Result<V, String>) {
        *self.result.lock() = Some(result);
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self) -> std::result::Result<V, String>
    where
        V: Clone,
    {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
        self.result.lock().clone().expect("waiter marked done without a result")
    }
}

/// Deduplicates concurrent loads for the same key. One caller becomes the
/// "leader" and actually runs the loader closure; any caller that arrives
/// while a load for the same key is in flight becomes a "follower" and
/// blocks on the leader's result instead.
pub struct SingleFlight<K, V> {
    inflight: DashMap<K, Arc<Waiter<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A fresh, empty single-flight table.
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Run `loader` for `key`, or wait for a concurrently-running load of
    /// the same key to finish. Returns `true` as the second element if this
    /// call was a follower (deduplicated) rather than the leader.
    pub fn load_or_join(
        &self,
        key: K,
        loader: impl FnOnce() -> Result<V>,
    ) -> Result<(V, bool)> {
        // Fast path: try to become the leader by being first to insert.
        let mut became_leader = false;
        let waiter = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| {
                became_leader = true;
                Arc::new(Waiter::new())
            })
            .clone();

        if became_leader {
            let outcome = loader();
            waiter.finish(outcome.as_ref().map(|v| v.clone()).map_err(|e| e.to_string()));
            self.inflight.remove(&key);
            outcome.map(|v| (v, false))
        } else {
            waiter
                .wait()
                .map(|v| (v, true))
                .map_err(|msg| Error::io(format!("single-flight leader failed: {msg}")))
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
