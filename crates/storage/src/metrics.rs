//! Pluggable cache metrics sink (spec.md §4.3, §6.2).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Which cache an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Raw-payload cache.
    Bytes,
    /// Deserialized-object cache.
    Object,
}

/// Why an entry was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Evicted from the probation queue tail.
    Probation,
    /// Evicted from the protected queue tail (probation was empty and the
    /// stripe was still overfull).
    Protected,
}

/// Which latency a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyKind {
    /// Time to resolve `get_atom`/`get_bytes` from cache or backing store.
    ObjectLookup,
    /// Time to resolve the raw-bytes read from cache or backing store.
    BytesLookup,
    /// Time to deserialize a payload into an object.
    Deserialize,
}

/// Minimal callback sink for cache observability (spec.md §6.2).
pub trait MetricsSink: Send + Sync {
    /// A cache lookup was served from the cache.
    fn on_hit(&self, cache: CacheKind);
    /// A cache lookup required a backing-store load.
    fn on_miss(&self, cache: CacheKind);
    /// An entry was evicted from a cache.
    fn on_eviction(&self, cache: CacheKind, reason: EvictionReason);
    /// A single-flight load was deduplicated (a follower waited for a
    /// leader instead of issuing its own backing-store read).
    fn on_single_flight_dedup(&self, cache: CacheKind);
    /// Record a latency sample for a lookup/deserialize operation.
    fn on_latency(&self, kind: LatencyKind, duration: Duration);
}

/// A sink that discards every event; the default when no observability is
/// wired up.
#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn on_hit(&self, _cache: CacheKind) {}
    fn on_miss(&self, _cache: CacheKind) {}
    fn on_eviction(&self, _cache: CacheKind, _reason: EvictionReason) {}
    fn on_single_flight_dedup(&self, _cache: CacheKind) {}
    fn on_latency(&self, _kind: LatencyKind, _duration: Duration) {}
}

/// An in-memory counters sink, used by tests and by callers that want a
/// cheap snapshot without standing up a full metrics pipeline.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    bytes_hits: AtomicU64,
    bytes_misses: AtomicU64,
    object_hits: AtomicU64,
    object_misses: AtomicU64,
    evictions: AtomicU64,
    dedups: AtomicU64,
}

impl InMemoryMetricsSink {
    /// Construct an empty counters sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current object-cache hit count.
    pub fn object_hits(&self) -> u64 {
        self.object_hits.load(Ordering::Relaxed)
    }

    /// Current object-cache miss count.
    pub fn object_misses(&self) -> u64 {
        self.object_misses.load(Ordering::Relaxed)
    }

    /// Current bytes-cache hit count.
    pub fn bytes_hits(&self) -> u64 {
        self.bytes_hits.load(Ordering::Relaxed)
    }

    /// Current bytes-cache miss count.
    pub fn bytes_misses(&self) -> u64 {
        self.bytes_misses.load(Ordering::Relaxed)
    }

    /// Total evictions across both caches.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Total single-flight deduplications across both caches.
    pub fn single_flight_dedups(&self) -> u64 {
        self.dedups.load(Ordering::Relaxed)
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn on_hit(&self, cache: CacheKind) {
        match cache {
            CacheKind::Bytes => self.bytes_hits.fetch_add(1, Ordering::Relaxed),
            CacheKind::Object => self.object_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn on_miss(&self, cache: CacheKind) {
        match cache {
            CacheKind::Bytes => self.bytes_misses.fetch_add(1, Ordering::Relaxed),
            CacheKind::Object => self.object_misses.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn on_eviction(&self, _cache: CacheKind, _reason: EvictionReason) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn on_single_flight_dedup(&self, _cache: CacheKind) {
        self.dedups.fetch_add(1, Ordering::Relaxed);
    }

    fn on_latency(&self, _kind: LatencyKind, _duration: Duration) {}
}
