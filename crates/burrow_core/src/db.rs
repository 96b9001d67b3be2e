//! Table handles.

use crate::cursor::Cursor;
use crate::env::{Environment, TableRef};
use crate::error::{EnvError, EnvResult};
use crate::flags::{CursorFlags, DbFlags, PutFlags};
use crate::locks::{KeyRange, LockMode};
use crate::txn::{read_plan, Txn, TxnNode};
use crate::types::{DictionaryId, HandleId, Isolation};
use burrow_storage::{KeyComparator, ReadView, RecordBuf, Seek, Visibility};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// A secondary index build running against a table.
///
/// While one is attached the table handle refuses to close.
pub trait IndexBuild: Send + Sync {
    /// Name of the index being built.
    fn name(&self) -> &str;
}

struct OpenDb {
    dname: String,
    handle: HandleId,
    table: Arc<TableRef>,
}

/// A handle on one named table.
///
/// Created unopened with [`Db::create`]; [`Db::open`] binds it to a table.
/// Operations taking `txn: None` run in an internal transaction that
/// commits before returning.
pub struct Db {
    env: Environment,
    cmp: Option<KeyComparator>,
    open: Option<OpenDb>,
    indexer: Option<Arc<dyn IndexBuild>>,
    scratch: Mutex<RecordBuf>,
}

impl Db {
    /// Creates an unopened handle.
    #[must_use]
    pub fn create(env: &Environment) -> Self {
        Self {
            env: env.clone(),
            cmp: None,
            open: None,
            indexer: None,
            scratch: Mutex::new(RecordBuf::new()),
        }
    }

    /// Sets the key order. Only allowed before [`Db::open`].
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] on an open handle, or the panic error.
    pub fn set_comparison(&mut self, cmp: KeyComparator) -> EnvResult<()> {
        self.env.shared.latch.check()?;
        if self.open.is_some() {
            return Err(self
                .env
                .do_error(EnvError::invalid("comparison must be set before open")));
        }
        self.cmp = Some(cmp);
        Ok(())
    }

    /// Opens table `dname`, creating it with [`DbFlags::CREATE`].
    ///
    /// The directory entry is locked under `txn` (write-locked when
    /// creating), so a table created in an uncommitted transaction is
    /// invisible to others and disappears if it aborts.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] for unknown flags, an empty name, or an
    ///   already open handle
    /// - [`EnvError::NoEntry`] if `dname` does not exist and `CREATE` is not
    ///   set
    /// - [`EnvError::Exists`] with `CREATE | EXCL` if it does
    /// - [`EnvError::NoSpace`] when creating while space is critical
    pub fn open(&mut self, txn: Option<&Txn>, dname: &str, flags: DbFlags) -> EnvResult<()> {
        let result = self.open_inner(txn, dname, flags);
        self.env.report(result)
    }

    fn open_inner(&mut self, txn: Option<&Txn>, dname: &str, flags: DbFlags) -> EnvResult<()> {
        flags.check_allowed("db_open")?;
        self.env.check_usable()?;
        if self.open.is_some() {
            return Err(EnvError::invalid("handle is already open"));
        }
        if dname.is_empty() {
            return Err(EnvError::invalid("table name must not be empty"));
        }
        let create = flags.contains(DbFlags::CREATE);
        let exclusive = flags.contains(DbFlags::EXCL);

        let env = &self.env;
        let mut registered = None;
        let opened = env.with_txn(txn, |node| {
            let directory = &env.shared.directory;
            node.touch(directory);
            let mode = if create { LockMode::Write } else { LockMode::Read };
            env.lock(node, directory, KeyRange::point(dname.as_bytes()), mode)?;

            let iname = match env.lookup_iname(node, dname) {
                Some(_) if create && exclusive => return Err(EnvError::exists(dname)),
                Some(iname) => iname,
                None if !create => return Err(EnvError::no_entry(dname)),
                None => {
                    env.shared.space.admit_write("db_open")?;
                    let iname = env.reserve_iname(dname, node.id);
                    env.txn_write(node, directory, dname.as_bytes(), Some(iname.as_bytes()))?;
                    node.note_created(iname.clone());
                    debug!(txn = %node.id, dname, iname, "table created");
                    iname
                }
            };
            let table = env.open_table_ref(&iname, self.cmp.as_ref())?;
            // Registered before the directory lock is released, so removal
            // and rename see the handle.
            let handle = env.next_handle_id();
            env.note_db_opened(dname, handle);
            registered = Some(handle);
            Ok((table, handle))
        });
        let (table, handle) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                if let Some(handle) = registered {
                    env.note_db_closed(dname, handle);
                }
                return Err(err);
            }
        };

        debug!(dname, iname = %table.iname, %handle, "table opened");
        self.open = Some(OpenDb {
            dname: dname.to_string(),
            handle,
            table,
        });
        Ok(())
    }

    /// Reads `key` and hands the borrowed key and value to `f`.
    ///
    /// The slices live in this handle's scratch buffers and are only valid
    /// inside `f`, which must not call back into this handle.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::NotFound`] if the key is not visible, a lock
    /// conflict under serializable isolation, or the panic error.
    pub fn getf_set<R>(
        &self,
        txn: Option<&Txn>,
        key: &[u8],
        f: impl FnOnce(&[u8], &[u8]) -> R,
    ) -> EnvResult<R> {
        let result = self.getf_set_inner(txn, key, f);
        self.env.report(result)
    }

    fn getf_set_inner<R>(
        &self,
        txn: Option<&Txn>,
        key: &[u8],
        f: impl FnOnce(&[u8], &[u8]) -> R,
    ) -> EnvResult<R> {
        self.env.check_usable()?;
        let table = self.table()?;
        let node = self.txn_node(txn)?;

        let isolation = node.map_or(Isolation::ReadCommitted, |n| n.isolation);
        let (visibility, read_lock) = read_plan(node, isolation);
        if let Some(node) = node {
            node.touch(table);
            if read_lock {
                self.env
                    .lock(node, table, KeyRange::point(key), LockMode::Read)?;
            }
        }

        let view = view_for(node, visibility);
        let mut scratch = self.scratch.lock();
        if !table.table.position(Seek::Exact(key), &view, &mut scratch) {
            return Err(EnvError::NotFound);
        }
        self.env.shared.stats.record_read();
        Ok(f(scratch.key(), scratch.value()))
    }

    /// Reads `key` into an owned value.
    ///
    /// # Errors
    ///
    /// As [`Db::getf_set`].
    pub fn get(&self, txn: Option<&Txn>, key: &[u8]) -> EnvResult<Vec<u8>> {
        self.getf_set(txn, key, |_, value| value.to_vec())
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// - [`EnvError::KeyExists`] with [`PutFlags::NOOVERWRITE`] if the key
    ///   is visible
    /// - [`EnvError::NoSpace`] while space is critical
    /// - a lock conflict, or the panic error
    pub fn put(&self, txn: Option<&Txn>, key: &[u8], value: &[u8], flags: PutFlags) -> EnvResult<()> {
        let result = flags
            .check_allowed("put")
            .and_then(|()| self.env.check_usable())
            .and_then(|()| self.table())
            .and_then(|table| {
                self.env.shared.space.admit_write("put")?;
                self.env.with_txn(txn, |node| {
                    if flags.contains(PutFlags::NOOVERWRITE) {
                        node.touch(table);
                        self.env
                            .lock(node, table, KeyRange::point(key), LockMode::Write)?;
                        let view = node.view(Visibility::LatestCommitted);
                        if table.table.lookup(key, &view).is_some() {
                            return Err(EnvError::KeyExists);
                        }
                    }
                    self.env.txn_write(node, table, key, Some(value))
                })
            });
        if result.is_ok() {
            self.env.shared.stats.record_write();
        }
        self.env.report(result)
    }

    /// Deletes `key`.
    ///
    /// # Errors
    ///
    /// - [`EnvError::NotFound`] if the key is not visible
    /// - [`EnvError::NoSpace`] while space is critical
    /// - a lock conflict, or the panic error
    pub fn del(&self, txn: Option<&Txn>, key: &[u8]) -> EnvResult<()> {
        let result = self
            .env
            .check_usable()
            .and_then(|()| self.table())
            .and_then(|table| {
                self.env.shared.space.admit_write("del")?;
                self.env.with_txn(txn, |node| {
                    node.touch(table);
                    self.env
                        .lock(node, table, KeyRange::point(key), LockMode::Write)?;
                    let view = node.view(Visibility::LatestCommitted);
                    if table.table.lookup(key, &view).is_none() {
                        return Err(EnvError::NotFound);
                    }
                    self.env.txn_write(node, table, key, None)
                })
            });
        if result.is_ok() {
            self.env.shared.stats.record_delete();
        }
        self.env.report(result)
    }

    /// Opens a cursor over this table.
    ///
    /// [`CursorFlags::RMW`] makes positioning take write locks. An isolation
    /// flag reads through a different level than the transaction's;
    /// snapshot reads need a snapshot transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] for bad flags, an unopened handle, or a
    /// transaction with an open child.
    pub fn cursor<'a>(&'a self, txn: Option<&'a Txn>, flags: CursorFlags) -> EnvResult<Cursor<'a>> {
        let result = self.cursor_inner(txn, flags);
        self.env.report(result)
    }

    fn cursor_inner<'a>(&'a self, txn: Option<&'a Txn>, flags: CursorFlags) -> EnvResult<Cursor<'a>> {
        flags.check_allowed("cursor")?;
        self.env.check_usable()?;
        let table = Arc::clone(self.table()?);
        let node = self.txn_node(txn)?;
        let base = node.map_or(Isolation::ReadCommitted, |n| n.isolation);
        let isolation = match flags.isolation()? {
            None => base,
            Some(Isolation::Snapshot) if base != Isolation::Snapshot => {
                return Err(EnvError::invalid(
                    "a snapshot cursor needs a snapshot transaction",
                ));
            }
            Some(level) => level,
        };
        Ok(Cursor::new(
            self,
            txn,
            table,
            isolation,
            flags.contains(CursorFlags::RMW),
        ))
    }

    /// Write-locks the whole table for `txn`.
    ///
    /// Allowed while `txn` has an open child.
    ///
    /// # Errors
    ///
    /// Returns a lock conflict if another transaction holds any lock on the
    /// table, or [`EnvError::Invalid`] for a finished transaction.
    pub fn pre_acquire_table_lock(&self, txn: &Txn) -> EnvResult<()> {
        let result = self.env.check_usable().and_then(|()| {
            let table = self.table()?;
            self.env.check_same_env(txn)?;
            let node = txn.node();
            node.check_live()?;
            node.touch(table);
            self.env
                .lock(node, table, KeyRange::everything(), LockMode::Write)
        });
        self.env.report(result)
    }

    /// Attaches (or with `None`, detaches) an index build.
    ///
    /// # Errors
    ///
    /// Returns the panic error once the environment has panicked.
    pub fn set_indexer(&mut self, indexer: Option<Arc<dyn IndexBuild>>) -> EnvResult<()> {
        self.env.shared.latch.check()?;
        self.indexer = indexer;
        Ok(())
    }

    /// The attached index build, if any.
    #[must_use]
    pub fn indexer(&self) -> Option<&Arc<dyn IndexBuild>> {
        self.indexer.as_ref()
    }

    /// The table name, once open.
    #[must_use]
    pub fn dname(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.dname.as_str())
    }

    /// The internal file name, once open.
    #[must_use]
    pub fn iname(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.table.iname.as_str())
    }

    /// The dictionary id used for locking, once open.
    #[must_use]
    pub fn dictionary_id(&self) -> Option<DictionaryId> {
        self.open.as_ref().map(|open| open.table.dict)
    }

    /// The registry id, once open.
    #[must_use]
    pub fn handle_id(&self) -> Option<HandleId> {
        self.open.as_ref().map(|open| open.handle)
    }

    /// Whether [`Db::set_comparison`] was called.
    #[must_use]
    pub fn has_custom_comparison(&self) -> bool {
        self.cmp.is_some()
    }

    /// Whether the handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// The owning environment.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Closes the handle.
    ///
    /// Closing an unopened handle succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] while an index build is attached, or
    /// the panic error (after the handle has been released).
    pub fn close(&mut self) -> EnvResult<()> {
        if let Some(indexer) = &self.indexer {
            let err = EnvError::invalid(format!(
                "index build {} is still attached",
                indexer.name()
            ));
            return Err(self.env.do_error(err));
        }
        if let Some(open) = self.open.take() {
            self.env.note_db_closed(&open.dname, open.handle);
            debug!(dname = %open.dname, handle = %open.handle, "table closed");
        }
        self.env.shared.latch.check()
    }

    pub(crate) fn table(&self) -> EnvResult<&Arc<TableRef>> {
        self.open
            .as_ref()
            .map(|open| &open.table)
            .ok_or_else(|| EnvError::invalid("table handle is not open"))
    }

    pub(crate) fn txn_node<'t>(&self, txn: Option<&'t Txn>) -> EnvResult<Option<&'t TxnNode>> {
        match txn {
            Some(txn) => {
                self.env.check_same_env(txn)?;
                txn.node().check_workable()?;
                Ok(Some(txn.node().as_ref()))
            }
            None => Ok(None),
        }
    }
}

pub(crate) fn view_for(node: Option<&TxnNode>, visibility: Visibility) -> ReadView<'_> {
    match node {
        Some(node) => node.view(visibility),
        None => ReadView::new(visibility, &[]),
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if let Some(open) = self.open.take() {
            self.env.note_db_closed(&open.dname, open.handle);
        }
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("dname", &self.dname())
            .field("iname", &self.iname())
            .field("handle", &self.handle_id())
            .field("custom_comparison", &self.has_custom_comparison())
            .finish_non_exhaustive()
    }
}
