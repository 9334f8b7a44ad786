//! `AtomStore`: persists and retrieves atoms through a [`BlockProvider`]'s
//! WAL, fronted by the striped 2Q [`TwoQCache`] pair (spec.md §4.2, §4.3).

use crate::cache::{bytes_limits, object_limits, TwoQCache};
use crate::metrics::{CacheKind, LatencyKind, MetricsSink, NoopMetricsSink};
use crate::single_flight::SingleFlight;
use protobase_core::atom::Atom;
use protobase_core::config::CacheConfig;
use protobase_core::error::{Error, Result};
use protobase_core::pointer::{AtomPointer, WalId};
use protobase_durability::{decode_atom_payload, encode_atom_payload, encode_frame, Format};
use protobase_durability::{read_frame, BlockProvider, WriteStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// Object-cache key: a pointer plus the schema epoch active when the entry
/// was inserted, so bumping the epoch isolates stale decoded objects
/// without touching the bytes cache (spec.md §4.3).
type ObjectKey = (AtomPointer, Option<u64>);

/// What the bytes cache actually stores: the post-frame payload plus the
/// format it was framed with, so `get_atom` can decode a bytes-cache hit
/// without re-reading the frame header from the backing store.
#[derive(Clone)]
struct CachedBytes {
    format: Format,
    payload: Arc<[u8]>,
}

struct CurrentSegment {
    wal_id: WalId,
    writer: Box<dyn WriteStream>,
}

/// Persists and retrieves atoms. Background-flushes buffered writes;
/// `sync()` forces an `fsync` for callers that need durability before
/// proceeding (spec.md §4.2, §5).
pub struct AtomStore {
    provider: Arc<dyn BlockProvider>,
    current: Mutex<CurrentSegment>,
    bytes_cache: Option<TwoQCache<AtomPointer, CachedBytes>>,
    object_cache: Option<TwoQCache<ObjectKey, Arc<Atom>>>,
    bytes_single_flight: SingleFlight<AtomPointer, CachedBytes>,
    object_single_flight: SingleFlight<ObjectKey, Arc<Atom>>,
    schema_epoch: Option<u64>,
    metrics: Arc<dyn MetricsSink>,
    wal_segment_max_bytes: u64,
    closed: AtomicBool,
}

impl AtomStore {
    /// Open a store over `provider` with default (no-op) metrics, allocating
    /// its first WAL segment.
    pub fn open(provider: Arc<dyn BlockProvider>, cache_cfg: &CacheConfig) -> Result<Self> {
        Self::open_with_metrics(
            provider,
            cache_cfg,
            None,
            Arc::new(NoopMetricsSink),
            64 * 1024 * 1024,
        )
    }

    /// Open a store with an explicit schema epoch and metrics sink.
    pub fn open_with_metrics(
        provider: Arc<dyn BlockProvider>,
        cache_cfg: &CacheConfig,
        schema_epoch: Option<u64>,
        metrics: Arc<dyn MetricsSink>,
        wal_segment_max_bytes: u64,
    ) -> Result<Self> {
        let (wal_id, _) = provider.allocate_wal()?;
        let writer = provider.open_writer(wal_id)?;
        let bytes_cache = cache_cfg
            .enable_bytes_cache
            .then(|| TwoQCache::new(bytes_limits(cache_cfg), CacheKind::Bytes, metrics.clone()));
        let object_cache = cache_cfg.enable_object_cache.then(|| {
            TwoQCache::new(object_limits(cache_cfg), CacheKind::Object, metrics.clone())
        });
        Ok(Self {
            provider,
            current: Mutex::new(CurrentSegment { wal_id, writer }),
            bytes_cache,
            object_cache,
            bytes_single_flight: SingleFlight::new(),
            object_single_flight: SingleFlight::new(),
            schema_epoch,
            metrics,
            wal_segment_max_bytes,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed("atom store is closed"));
        }
        Ok(())
    }

    fn rotate_if_needed(&self, current: &mut CurrentSegment) -> Result<()> {
        if current.writer.len()? >= self.wal_segment_max_bytes {
            let (wal_id, _) = self.provider.allocate_wal()?;
            let writer = self.provider.open_writer(wal_id)?;
            debug!(old = %current.wal_id, new = %wal_id, "rotated WAL segment");
            *current = CurrentSegment { wal_id, writer };
        }
        Ok(())
    }

    /// Persist `atom`, encoding its fields per `format`. Returns the pointer
    /// assigned to the write. Completes once the bytes are queued in the
    /// segment's buffer — call [`AtomStore::sync`] to force durability.
    pub fn push_atom(&self, atom: &Atom, format: Format) -> Result<AtomPointer> {
        self.ensure_open()?;
        let payload = encode_atom_payload(atom, format)?;
        let ptr = self.push_framed(format, &payload)?;
        let payload: Arc<[u8]> = Arc::from(payload.into_boxed_slice());
        if let Some(cache) = &self.bytes_cache {
            cache.insert(
                ptr,
                CachedBytes {
                    format,
                    payload: payload.clone(),
                },
                payload.len(),
            );
        }
        if let Some(cache) = &self.object_cache {
            let mut persisted = atom.clone();
            persisted.pointer = Some(ptr);
            cache.insert((ptr, self.schema_epoch), Arc::new(persisted), 0);
        }
        Ok(ptr)
    }

    /// Persist opaque bytes framed as `format` (typically `Format::Raw`).
    pub fn push_bytes(&self, bytes: &[u8], format: Format) -> Result<AtomPointer> {
        self.ensure_open()?;
        let ptr = self.push_framed(format, bytes)?;
        if let Some(cache) = &self.bytes_cache {
            cache.insert(
                ptr,
                CachedBytes {
                    format,
                    payload: Arc::from(bytes.to_vec().into_boxed_slice()),
                },
                bytes.len(),
            );
        }
        Ok(ptr)
    }

    fn push_framed(&self, format: Format, payload: &[u8]) -> Result<AtomPointer> {
        let frame = encode_frame(format, payload);
        let mut current = self.current.lock().unwrap();
        self.rotate_if_needed(&mut current)?;
        let offset = current.writer.append(&frame)?;
        current.writer.flush()?;
        Ok(AtomPointer::new(current.wal_id, offset))
    }

    /// Resolve `ptr` to its deserialized atom, consulting both caches
    /// before falling back to the backing store (spec.md §4.3 read path).
    pub fn get_atom(&self, ptr: AtomPointer) -> Result<Arc<Atom>> {
        self.ensure_open()?;
        let object_key = (ptr, self.schema_epoch);
        if let Some(cache) = &self.object_cache {
            if let Some(hit) = cache.get(&object_key) {
                return Ok(hit);
            }
        }

        let cached_bytes = self.load_cached_bytes(ptr)?;
        let start = Instant::now();
        let mut atom = decode_atom_payload(cached_bytes.format, &cached_bytes.payload)?;
        atom.pointer = Some(ptr);
        self.metrics
            .on_latency(LatencyKind::Deserialize, start.elapsed());
        let atom = Arc::new(atom);
        if let Some(cache) = &self.object_cache {
            cache.insert(object_key, atom.clone(), 0);
        }
        Ok(atom)
    }

    /// Resolve `ptr` to its raw post-frame payload bytes.
    pub fn get_bytes(&self, ptr: AtomPointer) -> Result<Arc<[u8]>> {
        self.ensure_open()?;
        Ok(self.load_cached_bytes(ptr)?.payload)
    }

    fn load_cached_bytes(&self, ptr: AtomPointer) -> Result<CachedBytes> {
        let start = Instant::now();
        if let Some(cache) = &self.bytes_cache {
            if let Some(hit) = cache.get(&ptr) {
                self.metrics
                    .on_latency(LatencyKind::BytesLookup, start.elapsed());
                return Ok(hit);
            }
        }

        let provider = &self.provider;
        let (cached, deduped) = self
            .bytes_single_flight
            .load_or_join(ptr, || load_frame_from_store(provider, ptr))?;
        if deduped {
            self.metrics.on_single_flight_dedup(CacheKind::Bytes);
        }
        if let Some(cache) = &self.bytes_cache {
            cache.insert(ptr, cached.clone(), cached.payload.len());
        }
        self.metrics
            .on_latency(LatencyKind::BytesLookup, start.elapsed());
        Ok(cached)
    }

    /// Force an `fsync` of the current segment.
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.current.lock().unwrap().writer.fsync()
    }

    /// Stop background work, sync, and release resources. Idempotent calls
    /// after the first return `ClosedError`.
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::closed("atom store already closed"));
        }
        let mut current = self.current.lock().unwrap();
        if let Err(e) = current.writer.fsync() {
            warn!(error = %e, "failed to fsync on close");
        }
        Ok(())
    }
}

fn load_frame_from_store(provider: &Arc<dyn BlockProvider>, ptr: AtomPointer) -> Result<CachedBytes> {
    let mut reader = provider.open_reader(ptr.transaction_id, ptr.offset)?;
    let frame = read_frame(&mut reader)?;
    Ok(CachedBytes {
        format: frame.format,
        payload: Arc::from(frame.bytes.into_boxed_slice()),
    })
}
