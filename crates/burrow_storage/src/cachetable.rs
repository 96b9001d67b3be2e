//! Shared cache of open table files.
//!
//! Every table handle in an environment goes through one [`CacheTable`], so
//! two handles on the same file share one [`SortedTable`] and see each
//! other's provisional writes. Entries are reference counted; a file leaves
//! the cache when its last opener releases it.

use crate::compare::KeyComparator;
use crate::error::{StorageError, StorageResult};
use crate::table::SortedTable;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct CachedFile {
    table: Arc<SortedTable>,
    refs: usize,
}

/// Reference-counted registry of open table files.
pub struct CacheTable {
    capacity: u64,
    files: Mutex<HashMap<PathBuf, CachedFile>>,
    closed: AtomicBool,
}

impl CacheTable {
    /// Creates a cache with a nominal byte capacity.
    ///
    /// The capacity is advisory and reported back through
    /// [`CacheTable::capacity`]; tables are held entirely in memory.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            files: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The configured capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Opens `path`, or shares the already open table.
    ///
    /// `cmp` is only used when the file is not yet open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after [`CacheTable::close`], or the
    /// table's load error.
    pub fn open_table(&self, path: &Path, cmp: KeyComparator) -> StorageResult<Arc<SortedTable>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        let mut files = self.files.lock();
        if let Some(cached) = files.get_mut(path) {
            cached.refs += 1;
            return Ok(Arc::clone(&cached.table));
        }

        let table = Arc::new(SortedTable::open(path, cmp)?);
        debug!(path = %path.display(), "table file opened");
        files.insert(
            path.to_path_buf(),
            CachedFile {
                table: Arc::clone(&table),
                refs: 1,
            },
        );
        Ok(table)
    }

    /// Drops one reference to `path`. Releasing an unknown path is a no-op.
    pub fn release(&self, path: &Path) {
        let mut files = self.files.lock();
        let last = match files.get_mut(path) {
            Some(cached) => {
                cached.refs = cached.refs.saturating_sub(1);
                cached.refs == 0
            }
            None => false,
        };
        if last {
            files.remove(path);
            debug!(path = %path.display(), "table file closed");
        }
    }

    /// Whether `path` is currently open.
    #[must_use]
    pub fn is_open(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    /// Number of open files.
    #[must_use]
    pub fn open_file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Deletes the file at `path`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InUse`] if the file is open, or the I/O error.
    pub fn remove_file(&self, path: &Path) -> StorageResult<()> {
        let files = self.files.lock();
        if files.contains_key(path) {
            return Err(StorageError::InUse {
                path: path.to_path_buf(),
            });
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "table file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Syncs every open table.
    ///
    /// # Errors
    ///
    /// Returns the first sync failure.
    pub fn sync_all(&self) -> StorageResult<()> {
        let tables: Vec<Arc<SortedTable>> = self
            .files
            .lock()
            .values()
            .map(|c| Arc::clone(&c.table))
            .collect();
        for table in tables {
            table.sync()?;
        }
        Ok(())
    }

    /// Closes the cache. Repeated calls succeed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Busy`] while files are still open.
    pub fn close(&self) -> StorageResult<()> {
        let files = self.files.lock();
        if !files.is_empty() {
            return Err(StorageError::Busy { count: files.len() });
        }
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(capacity = self.capacity, "cache table closed");
        }
        Ok(())
    }

    /// Drops every cached table regardless of references.
    ///
    /// Used when an environment is torn down without a clean close.
    pub fn force_close(&self) {
        let dropped = {
            let mut files = self.files.lock();
            let n = files.len();
            files.clear();
            n
        };
        self.closed.store(true, Ordering::Release);
        if dropped > 0 {
            debug!(dropped, "cache table force-closed");
        }
    }
}

impl std::fmt::Debug for CacheTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTable")
            .field("capacity", &self.capacity)
            .field("open_files", &self.open_file_count())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
