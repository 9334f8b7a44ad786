//! `BlockProvider`: abstracts WAL segment storage and root-pointer
//! persistence (spec.md §4.1, §6.1). Concrete backends ([`crate::file`],
//! [`crate::memory`]) are interchangeable; cloud/cluster variants are
//! external collaborators per spec.md §1.

use protobase_core::error::Result;
use protobase_core::pointer::{AtomPointer, WalId};
use std::io::{Read, Seek};

/// Positional reader over a WAL segment. `open_reader` must return a stable
/// byte view for the requested range even if the writer concurrently
/// appends (spec.md §6.1).
pub trait ReadStream: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadStream for T {}

/// Append-only writer over a WAL segment.
pub trait WriteStream: Send {
    /// Append `bytes` to the segment, returning the offset they were
    /// written at.
    fn append(&mut self, bytes: &[u8]) -> Result<u64>;
    /// Flush buffered writes to the OS (not necessarily to disk).
    fn flush(&mut self) -> Result<()>;
    /// Force the buffered writes to durable storage.
    fn fsync(&mut self) -> Result<()>;
    /// Current length of the segment.
    fn len(&self) -> Result<u64>;
}

/// RAII guard for the mutual-exclusion scope returned by
/// [`BlockProvider::root_scope`]. Dropping the guard releases the lock on
/// every exit path, including panics unwinding through it.
pub trait RootScopeGuard: Send {}

/// Supplies append streams for WAL segments, random-read access to existing
/// segments, and a single durable "current root pointer" with scoped mutual
/// exclusion (spec.md §4.1).
pub trait BlockProvider: Send + Sync {
    /// Allocate a new WAL segment identity and its initial byte offset
    /// (usually `0`).
    fn allocate_wal(&self) -> Result<(WalId, u64)>;

    /// Open a positional reader over an existing segment.
    fn open_reader(&self, wal_id: WalId, offset: u64) -> Result<Box<dyn ReadStream>>;

    /// Open an append-only writer over a segment.
    fn open_writer(&self, wal_id: WalId) -> Result<Box<dyn WriteStream>>;

    /// Read the currently published root pointer, tolerating transient
    /// replace windows with a brief internal retry. `None` means the space
    /// has never committed a root.
    fn read_root_ptr(&self) -> Result<Option<AtomPointer>>;

    /// Atomically publish a new root pointer. Durable backends use
    /// `tmp + fsync + rename + fsync(dir)`; in-memory backends perform a
    /// lock-guarded swap. Must be all-or-nothing.
    fn write_root_ptr(&self, ptr: AtomPointer) -> Result<()>;

    /// Acquire the root-update mutual-exclusion scope. Acquisition is
    /// best-effort blocking with backoff; the returned guard releases on
    /// drop along every exit path.
    fn root_scope(&self) -> Result<Box<dyn RootScopeGuard>>;

    /// Flush buffers and release all streams.
    fn close(&self) -> Result<()>;
}
