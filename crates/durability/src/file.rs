//! On-disk `BlockProvider`: WAL segments are regular files under a space
//! directory; the root pointer is a small fixed-layout file published via
//! `tmp + fsync + rename + fsync(dir)` (spec.md §4.1, §6.4).

use crate::lock::SharedLock;
use crate::provider::{BlockProvider, ReadStream, RootScopeGuard, WriteStream};
use crate::root_pointer;
use fs2::FileExt;
use parking_lot::Mutex;
use protobase_core::error::{Error, Result};
use protobase_core::pointer::{AtomPointer, WalId};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const ROOT_FILE_NAME: &str = "ROOT";
const SEGMENT_EXT: &str = "wal";

/// `BlockProvider` backed by a directory of WAL segment files plus one
/// root-pointer file.
pub struct FileBlockProvider {
    dir: PathBuf,
    writers: Mutex<std::collections::HashMap<WalId, Arc<Mutex<BufWriter<File>>>>>,
    root_lock: Arc<SharedLock>,
    closed: Mutex<bool>,
}

impl FileBlockProvider {
    /// Open (creating if necessary) a space directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::io(format!("creating space dir: {e}")))?;
        Ok(Self {
            dir,
            writers: Mutex::new(std::collections::HashMap::new()),
            root_lock: SharedLock::new(),
            closed: Mutex::new(false),
        })
    }

    fn segment_path(&self, wal_id: WalId) -> PathBuf {
        self.dir.join(format!("{wal_id}.{SEGMENT_EXT}"))
    }

    fn root_path(&self) -> PathBuf {
        self.dir.join(ROOT_FILE_NAME)
    }

    fn root_tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{ROOT_FILE_NAME}.tmp"))
    }
}

struct FileWriteStream {
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl WriteStream for FileWriteStream {
    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let mut writer = self.writer.lock();
        let offset = writer
            .get_ref()
            .metadata()
            .map_err(|e| Error::io(format!("stat segment: {e}")))?
            .len();
        writer
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::io(format!("seek segment: {e}")))?;
        writer
            .write_all(bytes)
            .map_err(|e| Error::io(format!("append to segment: {e}")))?;
        Ok(offset)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .lock()
            .flush()
            .map_err(|e| Error::io(format!("flush segment: {e}")))
    }

    fn fsync(&mut self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer
            .flush()
            .map_err(|e| Error::io(format!("flush before fsync: {e}")))?;
        writer
            .get_ref()
            .sync_data()
            .map_err(|e| Error::io(format!("fsync segment: {e}")))
    }

    fn len(&self) -> Result<u64> {
        let writer = self.writer.lock();
        Ok(writer
            .get_ref()
            .metadata()
            .map_err(|e| Error::io(format!("stat segment: {e}")))?
            .len())
    }
}

impl BlockProvider for FileBlockProvider {
    fn allocate_wal(&self) -> Result<(WalId, u64)> {
        let wal_id = uuid::Uuid::new_v4();
        let path = self.segment_path(wal_id);
        File::create(&path).map_err(|e| Error::io(format!("creating segment {path:?}: {e}")))?;
        Ok((wal_id, 0))
    }

    fn open_reader(&self, wal_id: WalId, offset: u64) -> Result<Box<dyn ReadStream>> {
        let path = self.segment_path(wal_id);
        let mut file =
            File::open(&path).map_err(|e| Error::io(format!("opening segment {path:?}: {e}")))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io(format!("seeking segment {path:?}: {e}")))?;
        Ok(Box::new(file))
    }

    fn open_writer(&self, wal_id: WalId) -> Result<Box<dyn WriteStream>> {
        let mut writers = self.writers.lock();
        let writer = writers
            .entry(wal_id)
            .or_insert_with(|| {
                let path = self.segment_path(wal_id);
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .expect("segment was allocated before being written to");
                Arc::new(Mutex::new(BufWriter::new(file)))
            })
            .clone();
        Ok(Box::new(FileWriteStream { writer }))
    }

    fn read_root_ptr(&self) -> Result<Option<AtomPointer>> {
        let path = self.root_path();
        if !path.exists() {
            return Ok(None);
        }
        // Tolerate the brief window between the rename in `write_root_ptr`
        // and the new file becoming visible: retry a few times rather than
        // surfacing a transient short-read as corruption.
        let mut last_err = None;
        for attempt in 0..3 {
            match fs::read(&path) {
                Ok(bytes) if bytes.len() == root_pointer::ENCODED_LEN => {
                    return root_pointer::decode(&bytes).map(Some);
                }
                Ok(_) if attempt < 2 => {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    continue;
                }
                Ok(bytes) => {
                    return Err(Error::corruption(format!(
                        "root pointer file has {} bytes",
                        bytes.len()
                    )))
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(Error::io(format!(
            "reading root pointer: {}",
            last_err.unwrap()
        )))
    }

    fn write_root_ptr(&self, ptr: AtomPointer) -> Result<()> {
        let tmp_path = self.root_tmp_path();
        let final_path = self.root_path();
        let encoded = root_pointer::encode(&ptr);

        let mut tmp = File::create(&tmp_path)
            .map_err(|e| Error::io(format!("creating root tmp file: {e}")))?;
        tmp.write_all(&encoded)
            .map_err(|e| Error::io(format!("writing root tmp file: {e}")))?;
        tmp.sync_all()
            .map_err(|e| Error::io(format!("fsync root tmp file: {e}")))?;
        drop(tmp);

        fs::rename(&tmp_path, &final_path)
            .map_err(|e| Error::io(format!("renaming root pointer into place: {e}")))?;

        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        debug!(%ptr, "published root pointer");
        Ok(())
    }

    fn root_scope(&self) -> Result<Box<dyn RootScopeGuard>> {
        // In-process threads serialize on the shared lock first; the OS
        // advisory lock additionally protects against other processes
        // opening the same space directory concurrently.
        let guard = self.root_lock.acquire();
        let lock_path = self.dir.join("ROOT.lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| Error::io(format!("opening root lock file: {e}")))?;
        file.lock_exclusive()
            .map_err(|e| Error::io(format!("acquiring root advisory lock: {e}")))?;
        Ok(Box::new(FileRootScopeGuard {
            _shared: guard,
            file,
        }))
    }

    fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        if *closed {
            return Err(Error::closed("file block provider already closed"));
        }
        for (_, writer) in self.writers.lock().drain() {
            let mut w = writer.lock();
            if let Err(e) = w.flush() {
                warn!(error = %e, "failed to flush segment during close");
            }
        }
        *closed = true;
        Ok(())
    }
}

struct FileRootScopeGuard {
    _shared: crate::lock::SharedLockGuard,
    file: File,
}

impl Drop for FileRootScopeGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl RootScopeGuard for FileRootScopeGuard {}
