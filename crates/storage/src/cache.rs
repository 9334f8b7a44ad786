//! Generic striped 2Q cache (spec.md §4.3): two per-stripe LRU queues
//! (probation, protected), promotion on a hit while in probation, tail
//! eviction preferring probation over protected.
//!
//! `BytesCache` and `ObjectCache` (see [`crate::atom_store`]) are both thin
//! specializations of [`TwoQCache`] over different key/value types.

use crate::metrics::{CacheKind, EvictionReason, MetricsSink};
use protobase_core::config::CacheConfig;
use rustc_hash::FxHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone)]
struct Entry<V> {
    value: V,
    size: usize,
    in_protected: bool,
}

struct Shard<K, V> {
    probation: VecDeque<K>,
    protected: VecDeque<K>,
    entries: HashMap<K, Entry<V>>,
    bytes: usize,
}

impl<K: Eq + Hash + Clone, V> Shard<K, V> {
    fn new() -> Self {
        Self {
            probation: VecDeque::new(),
            protected: VecDeque::new(),
            entries: HashMap::new(),
            bytes: 0,
        }
    }

    fn touch_front(queue: &mut VecDeque<K>, key: &K)
    where
        K: PartialEq,
    {
        if let Some(pos) = queue.iter().position(|k| k == key) {
            let k = queue.remove(pos).unwrap();
            queue.push_front(k);
        }
    }
}

/// Tunable capacity parameters for one [`TwoQCache`] instance.
#[derive(Debug, Clone, Copy)]
pub struct CacheLimits {
    /// Number of independent stripes.
    pub stripes: usize,
    /// Max entries, summed across all stripes.
    pub max_entries: usize,
    /// Max total bytes, summed across all stripes.
    pub max_bytes: usize,
}

impl CacheLimits {
    fn per_shard_entries(&self) -> usize {
        (self.max_entries / self.stripes.max(1)).max(1)
    }

    fn per_shard_bytes(&self) -> usize {
        (self.max_bytes / self.stripes.max(1)).max(1)
    }
}

/// Build cache/object limits from the shared [`CacheConfig`] for whichever
/// of the two caches is being constructed.
pub fn bytes_limits(cfg: &CacheConfig) -> CacheLimits {
    CacheLimits {
        stripes: cfg.cache_stripes,
        max_entries: cfg.bytes_cache_max_entries,
        max_bytes: cfg.bytes_cache_max_bytes,
    }
}

/// See [`bytes_limits`].
pub fn object_limits(cfg: &CacheConfig) -> CacheLimits {
    CacheLimits {
        stripes: cfg.cache_stripes,
        max_entries: cfg.object_cache_max_entries,
        max_bytes: cfg.object_cache_max_bytes,
    }
}

/// A striped cache with 2Q admission/eviction (probation + protected LRU
/// queues per stripe).
pub struct TwoQCache<K, V> {
    shards: Vec<parking_lot::Mutex<Shard<K, V>>>,
    limits: CacheLimits,
    kind: CacheKind,
    metrics: Arc<dyn MetricsSink>,
}

impl<K, V> TwoQCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Construct a cache with the given limits, reporting events to `metrics`.
    pub fn new(limits: CacheLimits, kind: CacheKind, metrics: Arc<dyn MetricsSink>) -> Self {
        let stripes = limits.stripes.max(1);
        let shards = (0..stripes)
            .map(|_| parking_lot::Mutex::new(Shard::new()))
            .collect();
        Self {
            shards,
            limits,
            kind,
            metrics,
        }
    }

    fn stripe_index(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Look up `key`. On a hit, promotes probation entries to protected and
    /// refreshes MRU order; reports the event to the metrics sink.
    pub fn get(&self, key: &K) -> Option<V> {
        let idx = self.stripe_index(key);
        let mut shard = self.shards[idx].lock();
        if let Some(entry) = shard.entries.get(key).cloned() {
            if entry.in_protected {
                Shard::<K, V>::touch_front(&mut shard.protected, key);
            } else {
                // A hit while the entry sits in probation promotes it
                // (spec.md §4.3 2Q policy).
                if let Some(pos) = shard.probation.iter().position(|k| k == key) {
                    shard.probation.remove(pos);
                }
                shard.protected.push_front(key.clone());
                if let Some(e) = shard.entries.get_mut(key) {
                    e.in_protected = true;
                }
            }
            self.metrics.on_hit(self.kind);
            Some(entry.value)
        } else {
            self.metrics.on_miss(self.kind);
            None
        }
    }

    /// Insert a freshly-loaded value into the probation queue, evicting
    /// from probation (then protected) tails until back within limits.
    pub fn insert(&self, key: K, value: V, size: usize) {
        let idx = self.stripe_index(&key);
        let mut shard = self.shards[idx].lock();
        if shard.entries.contains_key(&key) {
            return;
        }
        shard.entries.insert(
            key.clone(),
            Entry {
                value,
                size,
                in_protected: false,
            },
        );
        shard.probation.push_front(key);
        shard.bytes += size;

        let max_entries = self.limits.per_shard_entries();
        let max_bytes = self.limits.per_shard_bytes();
        while shard.entries.len() > max_entries || shard.bytes > max_bytes {
            let (evicted, reason) = if let Some(k) = shard.probation.pop_back() {
                (Some(k), EvictionReason::Probation)
            } else if let Some(k) = shard.protected.pop_back() {
                (Some(k), EvictionReason::Protected)
            } else {
                (None, EvictionReason::Probation)
            };
            match evicted {
                Some(k) => {
                    if let Some(e) = shard.entries.remove(&k) {
                        shard.bytes = shard.bytes.saturating_sub(e.size);
                    }
                    self.metrics.on_eviction(self.kind, reason);
                }
                None => break,
            }
        }
    }

    /// Current total entry count across all stripes (for tests/diagnostics).
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetricsSink;

    fn single_stripe_cache(max_entries: usize) -> TwoQCache<i32, &'static str> {
        TwoQCache::new(
            CacheLimits {
                stripes: 1,
                max_entries,
                max_bytes: usize::MAX,
            },
            CacheKind::Object,
            Arc::new(NoopMetricsSink),
        )
    }

    #[test]
    fn promotion_and_eviction_scenario() {
        // spec.md §8 test 2: object_cache_max_entries=3, probation_ratio=0.5.
        let cache = single_stripe_cache(3);
        cache.insert(1, "p1", 1);
        cache.insert(2, "p2", 1);
        cache.insert(3, "p3", 1);
        assert_eq!(cache.get(&1), Some("p1")); // promotes p1 to protected
        cache.insert(4, "p4", 1);
        cache.insert(5, "p5", 1);

        // p1 retained (promoted, never touched by probation eviction).
        assert_eq!(cache.get(&1), Some("p1"));
        // p2 was the least-recently-used probation entry and is gone.
        assert_eq!(cache.get(&2), None);
    }
}
