//! Recognized configuration (spec.md §6.5), mirroring the shape of the
//! teacher's `DurabilityMode`/`Limits` style config structs: plain,
//! serde-derived, `Default`-constructible, overridden programmatically.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a `Space`/`StorageContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Atom cache tuning.
    pub cache: CacheConfig,
    /// WAL tuning.
    pub wal: WalConfig,
    /// Parallel scan tuning.
    pub parallel: ParallelConfig,
    /// Isolates object-cache entries when bumped; `None` means "don't key by
    /// schema epoch" (spec.md §4.3).
    pub schema_epoch: Option<u64>,
    /// Whether `commit()` forces an `fsync` before returning.
    pub commit_fsync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            wal: WalConfig::default(),
            parallel: ParallelConfig::default(),
            schema_epoch: None,
            commit_fsync: false,
        }
    }
}

/// `AtomCache` tuning (spec.md §4.3, §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Activate the deserialized-object cache.
    pub enable_object_cache: bool,
    /// Activate the raw-bytes cache.
    pub enable_bytes_cache: bool,
    /// Max entries held by the object cache.
    pub object_cache_max_entries: usize,
    /// Max total bytes (of decoded payload) held by the object cache.
    pub object_cache_max_bytes: usize,
    /// Max entries held by the bytes cache.
    pub bytes_cache_max_entries: usize,
    /// Max total bytes held by the bytes cache.
    pub bytes_cache_max_bytes: usize,
    /// Number of independent stripes each cache is sharded into.
    pub cache_stripes: usize,
    /// Fraction of each stripe's capacity budget given to the probation
    /// queue in the 2Q policy; the remainder goes to protected.
    pub cache_probation_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_object_cache: true,
            enable_bytes_cache: true,
            object_cache_max_entries: 50_000,
            object_cache_max_bytes: 256 * 1024 * 1024,
            bytes_cache_max_entries: 20_000,
            bytes_cache_max_bytes: 128 * 1024 * 1024,
            cache_stripes: 64,
            cache_probation_ratio: 0.5,
        }
    }
}

/// WAL tuning (spec.md §6.5, §9 open question on rotation policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalConfig {
    /// Size threshold past which a segment is rotated. The exact rotation
    /// trigger is implementation-defined per spec.md §9's open question; we
    /// document and implement a size-based policy only.
    pub wal_segment_max_bytes: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            wal_segment_max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Parallel scan tuning (spec.md §5, §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Upper bound on worker threads.
    pub max_workers: usize,
    /// Scheduler strategy.
    pub scheduler: ParallelScheduler,
    /// Initial chunk size handed to each worker.
    pub initial_chunk_size: usize,
    /// Smallest chunk size the adaptive controller will shrink to.
    pub min_chunk_size: usize,
    /// Largest chunk size the adaptive controller will grow to.
    pub max_chunk_size: usize,
    /// Lower bound of the target per-chunk service-time band, in ms.
    pub target_ms_low: f64,
    /// Upper bound of the target per-chunk service-time band, in ms.
    pub target_ms_high: f64,
    /// EMA smoothing factor for observed chunk service times.
    pub chunk_ema_alpha: f64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(4),
            scheduler: ParallelScheduler::WorkStealing,
            initial_chunk_size: 1000,
            min_chunk_size: 128,
            max_chunk_size: 8192,
            target_ms_low: 0.5,
            target_ms_high: 2.0,
            chunk_ema_alpha: 0.2,
        }
    }
}

/// Parallel scan scheduler strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelScheduler {
    /// Per-worker deques with top-steal (default).
    WorkStealing,
    /// Fixed thread pool with a shared work queue.
    ThreadPool,
}
