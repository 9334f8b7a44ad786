//! In-memory `BlockProvider`: WAL segments held as growable byte buffers,
//! root pointer guarded by a process-local mutex. Useful for tests and for
//! ephemeral spaces that need no on-disk durability.

use crate::lock::SharedLock;
use crate::provider::{BlockProvider, ReadStream, RootScopeGuard, WriteStream};
use parking_lot::Mutex;
use protobase_core::error::{Error, Result};
use protobase_core::pointer::{AtomPointer, WalId};
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

type Segment = Arc<Mutex<Vec<u8>>>;

/// `BlockProvider` backed entirely by process memory.
pub struct MemoryBlockProvider {
    segments: Mutex<HashMap<WalId, Segment>>,
    root: Mutex<Option<AtomPointer>>,
    root_lock: Arc<SharedLock>,
    closed: Mutex<bool>,
}

impl MemoryBlockProvider {
    /// Create an empty in-memory space.
    pub fn new() -> Self {
        Self {
            segments: Mutex::new(HashMap::new()),
            root: Mutex::new(None),
            root_lock: SharedLock::new(),
            closed: Mutex::new(false),
        }
    }

    fn segment(&self, wal_id: WalId) -> Segment {
        self.segments
            .lock()
            .entry(wal_id)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

impl Default for MemoryBlockProvider {
    fn default() -> Self {
        Self::new()
    }
}

struct MemReader {
    segment: Segment,
    pos: u64,
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.segment.lock();
        let start = self.pos as usize;
        if start >= data.len() {
            return Ok(0);
        }
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.segment.lock().len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(d) => len + d,
            SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start",
            ));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

struct MemWriter {
    segment: Segment,
}

impl WriteStream for MemWriter {
    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let mut data = self.segment.lock();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn fsync(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.segment.lock().len() as u64)
    }
}

impl BlockProvider for MemoryBlockProvider {
    fn allocate_wal(&self) -> Result<(WalId, u64)> {
        let wal_id = uuid::Uuid::new_v4();
        self.segment(wal_id);
        Ok((wal_id, 0))
    }

    fn open_reader(&self, wal_id: WalId, offset: u64) -> Result<Box<dyn ReadStream>> {
        Ok(Box::new(MemReader {
            segment: self.segment(wal_id),
            pos: offset,
        }))
    }

    fn open_writer(&self, wal_id: WalId) -> Result<Box<dyn WriteStream>> {
        Ok(Box::new(MemWriter {
            segment: self.segment(wal_id),
        }))
    }

    fn read_root_ptr(&self) -> Result<Option<AtomPointer>> {
        Ok(*self.root.lock())
    }

    fn write_root_ptr(&self, ptr: AtomPointer) -> Result<()> {
        *self.root.lock() = Some(ptr);
        Ok(())
    }

    fn root_scope(&self) -> Result<Box<dyn RootScopeGuard>> {
        Ok(Box::new(self.root_lock.acquire()))
    }

    fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        if *closed {
            return Err(Error::closed("memory block provider already closed"));
        }
        *closed = true;
        Ok(())
    }
}
