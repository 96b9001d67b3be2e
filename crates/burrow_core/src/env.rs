//! The environment: root owner of every shared resource.

use crate::catalog::{self, Settings};
use crate::config::{Config, ErrCall};
use crate::dir::{DirLocks, EnvDirs, EnvLayout};
use crate::error::{status, EnvError, EnvResult};
use crate::flags::{CommitFlags, EnvFlags, TxnFlags};
use crate::locks::{KeyRange, LockManager, LockMode};
use crate::panic::{ErrorSink, PanicLatch};
use crate::recovery::{self, RecoveryReport};
use crate::registry::HandleRegistry;
use crate::space::{Fs2Probe, SpaceMonitor, SpacePoller, SpaceState, SpaceStatus};
use crate::stats::{EngineStatus, StatusSnapshot};
use crate::txn::{Txn, TxnNode};
use crate::types::{DictionaryId, HandleId, SequenceNumber, TxnId};
use crate::wal::{LogManager, LogRecord};
use burrow_storage::{
    bytewise, CacheTable, FileBackend, KeyComparator, ReadView, RecordBuf, Seek, SortedTable,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};

/// One reference to an open table file.
///
/// Holds one cache-table reference, dropped with the value (or earlier by
/// [`TableRef::detach`]).
pub(crate) struct TableRef {
    pub(crate) dict: DictionaryId,
    pub(crate) iname: String,
    pub(crate) path: PathBuf,
    pub(crate) table: Arc<SortedTable>,
    cache: Arc<CacheTable>,
    attached: AtomicBool,
}

impl TableRef {
    fn open(
        cache: &Arc<CacheTable>,
        layout: &EnvLayout,
        iname: &str,
        dict: DictionaryId,
        cmp: KeyComparator,
    ) -> EnvResult<Arc<Self>> {
        let path = layout.table_path(iname);
        let table = cache.open_table(&path, cmp)?;
        Ok(Arc::new(Self {
            dict,
            iname: iname.to_string(),
            path,
            table,
            cache: Arc::clone(cache),
            attached: AtomicBool::new(true),
        }))
    }

    pub(crate) fn comparator(&self) -> &KeyComparator {
        self.table.comparator()
    }

    /// Gives the cache reference back. Later calls do nothing.
    pub(crate) fn detach(&self) {
        if self.attached.swap(false, Ordering::AcqRel) {
            self.cache.release(&self.path);
        }
    }
}

impl Drop for TableRef {
    fn drop(&mut self) {
        self.detach();
    }
}

pub(crate) struct EnvShared {
    pub(crate) config: Config,
    pub(crate) flags: EnvFlags,
    pub(crate) layout: EnvLayout,
    pub(crate) latch: PanicLatch,
    pub(crate) sink: Arc<ErrorSink>,
    pub(crate) space: Arc<SpaceMonitor>,
    poller: Mutex<Option<SpacePoller>>,
    pub(crate) cache: Arc<CacheTable>,
    pub(crate) log: LogManager,
    pub(crate) locks: LockManager,
    pub(crate) registry: HandleRegistry,
    /// Live transactions. Lock after `commit_lock` when both are needed.
    pub(crate) txns: Mutex<HashMap<TxnId, Arc<TxnNode>>>,
    /// Sequence of the last root commit; held while committing.
    pub(crate) commit_lock: Mutex<SequenceNumber>,
    pub(crate) next_txn: AtomicU64,
    next_handle: AtomicU64,
    next_dict: AtomicU64,
    /// Dictionary ids by internal name, kept for the environment's life.
    dictionaries: Mutex<HashMap<String, DictionaryId>>,
    pub(crate) directory: Arc<TableRef>,
    settings_table: Arc<TableRef>,
    settings: OnceLock<Settings>,
    pub(crate) default_cmp: KeyComparator,
    pub(crate) stats: EngineStatus,
    recovery: RecoveryReport,
    closed: AtomicBool,
    dir_locks: Mutex<Option<DirLocks>>,
}

impl Drop for EnvShared {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(mut poller) = self.poller.get_mut().take() {
            poller.stop();
        }
        if !self.latch.is_set() {
            if let Err(err) = self.log.flush() {
                warn!(error = %err, "log flush failed during teardown");
            }
        }
        self.cache.force_close();
        debug!(home = %self.layout.home.display(), "environment torn down without close");
    }
}

/// An open environment.
///
/// Cloning is cheap; every table handle and transaction holds a clone, so
/// the shared state lives until the last of them is gone.
#[derive(Clone)]
pub struct Environment {
    pub(crate) shared: Arc<EnvShared>,
}

impl Environment {
    /// Opens (or with [`EnvFlags::CREATE`], creates) the environment in
    /// `dirs`.
    ///
    /// Recovery runs on every open: committed work found only in the log is
    /// applied to its tables before anything else reads them.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] for unknown flags or a bad configuration
    /// - [`EnvError::NoEntry`] if the environment does not exist and
    ///   `CREATE` is not set
    /// - [`EnvError::EnvironmentLocked`] if another process has it open
    /// - [`EnvError::Incompatible`] if it was created with another format
    /// - I/O and log corruption errors
    pub fn open(dirs: EnvDirs, flags: EnvFlags, config: Config) -> EnvResult<Self> {
        flags.check_allowed("env_open")?;
        config.validate()?;

        let create = flags.contains(EnvFlags::CREATE);
        let layout = dirs.resolve();
        layout.prepare(create)?;
        if !create && !layout.settings_exist() {
            return Err(EnvError::no_entry(
                layout.table_path(layout.settings_iname()).display().to_string(),
            ));
        }
        let dir_locks = DirLocks::acquire(&layout)?;

        let cache = Arc::new(CacheTable::new(config.cache_size));
        let log = LogManager::new(Box::new(FileBackend::open_with_create_dirs(
            &layout.log_path(),
        )?));
        let default_cmp = config.default_comparator.clone().unwrap_or_else(bytewise);
        let report = recovery::recover(&log, &cache, &layout, &default_cmp)?;

        let directory = TableRef::open(
            &cache,
            &layout,
            layout.directory_iname(),
            DictionaryId::new(1),
            bytewise(),
        )?;
        let settings_table = TableRef::open(
            &cache,
            &layout,
            layout.settings_iname(),
            DictionaryId::new(2),
            bytewise(),
        )?;
        let last_seq = report
            .last_seq
            .max(directory.table.applied_seq())
            .max(settings_table.table.applied_seq());

        let sink = Arc::new(ErrorSink::new(config.errpfx.clone(), config.errcall.clone()));
        let probe = config
            .space_probe
            .clone()
            .unwrap_or_else(|| Arc::new(Fs2Probe));
        let space = Arc::new(SpaceMonitor::new(
            probe,
            &layout.polled_dirs(),
            config.redzone_percent,
            Arc::clone(&sink),
        ));

        let mut dictionaries = HashMap::new();
        dictionaries.insert(directory.iname.clone(), directory.dict);
        dictionaries.insert(settings_table.iname.clone(), settings_table.dict);

        let env = Self {
            shared: Arc::new(EnvShared {
                locks: LockManager::new(config.lock_wait_timeout),
                flags,
                layout,
                latch: PanicLatch::new(),
                sink,
                space,
                poller: Mutex::new(None),
                cache,
                log,
                registry: HandleRegistry::new(),
                txns: Mutex::new(HashMap::new()),
                commit_lock: Mutex::new(last_seq),
                next_txn: AtomicU64::new(1),
                next_handle: AtomicU64::new(1),
                next_dict: AtomicU64::new(3),
                dictionaries: Mutex::new(dictionaries),
                directory,
                settings_table,
                settings: OnceLock::new(),
                default_cmp,
                stats: EngineStatus::new(),
                recovery: report,
                closed: AtomicBool::new(false),
                dir_locks: Mutex::new(Some(dir_locks)),
                config,
            }),
        };

        env.load_or_record_settings(create)?;
        env.start_poller()?;

        debug!(
            home = %env.shared.layout.home.display(),
            last_seq = %last_seq,
            "environment opened"
        );
        Ok(env)
    }

    fn load_or_record_settings(&self, create: bool) -> EnvResult<()> {
        let shared = &self.shared;
        let table = &shared.settings_table.table;
        let view = ReadView::latest_committed();

        let settings = if table.count(&view) == 0 {
            if !create {
                return Err(EnvError::no_entry(shared.settings_table.iname.clone()));
            }
            let settings = Settings::fresh(&shared.config);
            self.with_txn(None, |node| {
                for (key, value) in settings.to_entries() {
                    self.txn_write(
                        node,
                        &shared.settings_table,
                        key.as_bytes(),
                        Some(value.as_bytes()),
                    )?;
                }
                Ok(())
            })?;
            info!(environment_id = %settings.environment_id, "environment created");
            settings
        } else {
            let settings = Settings::from_entries(|key| table.lookup(key.as_bytes(), &view))?;
            settings.check_compatible(shared.config.format_version)?;
            settings
        };
        // Only ever set here, once per environment.
        let _ = shared.settings.set(settings);
        Ok(())
    }

    fn start_poller(&self) -> EnvResult<()> {
        let interval = self.shared.config.fs_poll_interval;
        if interval.is_zero() {
            return Ok(());
        }
        self.shared.space.poll();
        let poller = SpacePoller::start(Arc::clone(&self.shared.space), interval)?;
        *self.shared.poller.lock() = Some(poller);
        Ok(())
    }

    /// Closes the environment.
    ///
    /// Stops the space poller, checkpoints, closes the cache table and log,
    /// and releases the directory locks. Closing again succeeds.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Panicked`] if the environment has panicked
    /// - [`EnvError::Invalid`] while transactions or table handles are open
    pub fn close(&self) -> EnvResult<()> {
        let shared = &self.shared;
        shared.latch.check()?;
        if shared.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let open_txns = self.open_txn_count();
        if open_txns > 0 {
            return Err(self.do_error(EnvError::invalid(format!(
                "cannot close environment with {open_txns} open transactions"
            ))));
        }
        let open_handles = shared.registry.len();
        if open_handles > 0 {
            return Err(self.do_error(EnvError::invalid(format!(
                "cannot close environment with {open_handles} open table handles"
            ))));
        }

        if let Some(mut poller) = shared.poller.lock().take() {
            poller.stop();
        }
        self.checkpoint()?;
        shared.directory.detach();
        shared.settings_table.detach();
        shared.cache.close()?;
        shared.log.sync()?;
        if let Some(locks) = shared.dir_locks.lock().take() {
            locks.release();
        }
        shared.closed.store(true, Ordering::Release);

        debug!(home = %shared.layout.home.display(), "environment closed");
        Ok(())
    }

    /// Begins a transaction, nested under `parent` if given.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] for unknown or conflicting flags, an
    ///   environment opened without [`EnvFlags::INIT_TXN`], or a parent that
    ///   already has an open child
    /// - [`EnvError::Panicked`] if the environment has panicked
    pub fn txn_begin(&self, parent: Option<&Txn>, flags: TxnFlags) -> EnvResult<Txn> {
        let result = flags
            .check_allowed("txn_begin")
            .and_then(|()| self.check_usable())
            .and_then(|()| {
                if self.shared.flags.contains(EnvFlags::INIT_TXN) {
                    Ok(())
                } else {
                    Err(EnvError::invalid("environment was opened without INIT_TXN"))
                }
            })
            .and_then(|()| self.begin_node(parent, flags));
        self.report(result)
    }

    /// Removes table `dname`.
    ///
    /// The directory entry is deleted under `txn` (or an internal
    /// transaction); the table file is removed when the outermost
    /// transaction commits.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] while a handle on `dname` is open
    /// - [`EnvError::NoEntry`] if `dname` does not exist
    /// - [`EnvError::NoSpace`] while file system space is critical
    pub fn dbremove(&self, txn: Option<&Txn>, dname: &str) -> EnvResult<()> {
        let result = self.check_usable().and_then(|()| {
            self.shared.space.admit_write("dbremove")?;
            self.with_txn(txn, |node| {
                let directory = &self.shared.directory;
                node.touch(directory);
                self.lock(node, directory, KeyRange::point(dname.as_bytes()), LockMode::Write)?;
                // Opens register while holding a read lock on the entry.
                if self.shared.registry.is_open(dname) {
                    return Err(EnvError::invalid(format!(
                        "cannot remove {dname} while a handle on it is open"
                    )));
                }
                let iname = self
                    .lookup_iname(node, dname)
                    .ok_or_else(|| EnvError::no_entry(dname))?;

                self.txn_write(node, directory, dname.as_bytes(), None)?;
                self.shared.log.append(&LogRecord::Unlink {
                    txn: node.id,
                    iname: iname.clone(),
                })?;
                debug!(txn = %node.id, dname, iname, "table removal pending");
                node.note_unlink(iname);
                Ok(())
            })
        });
        self.report(result)
    }

    /// Renames table `dname` to `new_dname`.
    ///
    /// Only the directory mapping changes; the table file and its dictionary
    /// id stay the same.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] while a handle on either name is open
    /// - [`EnvError::NoEntry`] if `dname` does not exist
    /// - [`EnvError::Exists`] if `new_dname` already exists
    /// - [`EnvError::NoSpace`] while file system space is critical
    pub fn dbrename(&self, txn: Option<&Txn>, dname: &str, new_dname: &str) -> EnvResult<()> {
        let result = self.check_usable().and_then(|()| {
            self.shared.space.admit_write("dbrename")?;
            if new_dname.is_empty() {
                return Err(EnvError::invalid("table name must not be empty"));
            }
            self.with_txn(txn, |node| {
                let directory = &self.shared.directory;
                node.touch(directory);
                self.lock(node, directory, KeyRange::point(dname.as_bytes()), LockMode::Write)?;
                self.lock(
                    node,
                    directory,
                    KeyRange::point(new_dname.as_bytes()),
                    LockMode::Write,
                )?;
                if self.shared.registry.is_open(dname) || self.shared.registry.is_open(new_dname) {
                    return Err(EnvError::invalid(format!(
                        "cannot rename {dname} while a handle on it is open"
                    )));
                }
                let iname = self
                    .lookup_iname(node, dname)
                    .ok_or_else(|| EnvError::no_entry(dname))?;
                if self.lookup_iname(node, new_dname).is_some() {
                    return Err(EnvError::exists(new_dname));
                }

                self.txn_write(node, directory, dname.as_bytes(), None)?;
                self.txn_write(node, directory, new_dname.as_bytes(), Some(iname.as_bytes()))?;
                debug!(txn = %node.id, from = dname, to = new_dname, "table renamed");
                Ok(())
            })
        });
        self.report(result)
    }

    /// Makes every table file durable and trims the log.
    ///
    /// With no transaction open the log is emptied and restarted at the
    /// last commit; otherwise a checkpoint record is appended.
    ///
    /// # Errors
    ///
    /// Returns the panic error, or an I/O error.
    pub fn checkpoint(&self) -> EnvResult<()> {
        self.shared.latch.check()?;
        let shared = &self.shared;
        let last = shared.commit_lock.lock();
        let txns = shared.txns.lock();
        shared.cache.sync_all()?;
        if txns.is_empty() {
            shared.log.restart(*last)?;
        } else {
            shared
                .log
                .append(&LogRecord::Checkpoint { sequence: *last })?;
            shared.log.flush()?;
        }
        shared.stats.record_checkpoint();
        debug!(sequence = %*last, open_txns = txns.len(), "checkpoint");
        Ok(())
    }

    /// Whether the environment has panicked. Never blocks.
    #[must_use]
    pub fn is_panicked(&self) -> bool {
        self.shared.latch.is_set()
    }

    /// The message recorded when the environment panicked.
    #[must_use]
    pub fn panic_message(&self) -> Option<String> {
        self.shared.latch.message().map(str::to_string)
    }

    /// Poisons the environment. Only the first call's message and cause are
    /// kept.
    pub fn panic(&self, cause: i32, message: impl Into<String>) {
        let message = message.into();
        if self.shared.latch.trip(cause, message.clone()) {
            error!(cause, message = %message, "environment panicked");
            self.shared
                .sink
                .report_message(&format!("environment panicked: {message}"));
        }
    }

    /// Reports `err` through the error callback and `tracing`, then returns
    /// it for the caller to propagate.
    pub fn do_error(&self, err: EnvError) -> EnvError {
        if !err.is_not_found() {
            self.shared.stats.record_error();
        }
        self.shared.sink.report(&err);
        err
    }

    /// Replaces the error callback.
    pub fn set_errcall(&self, callback: Option<ErrCall>) {
        self.shared.sink.set_callback(callback);
    }

    /// Current file system space level. Lock-free.
    #[must_use]
    pub fn space_state(&self) -> SpaceState {
        self.shared.space.state()
    }

    /// Space level and admission counters.
    #[must_use]
    pub fn space_status(&self) -> SpaceStatus {
        self.shared.space.status()
    }

    /// Samples file system space now instead of waiting for the poller.
    ///
    /// # Errors
    ///
    /// Returns the panic error, or [`EnvError::Invalid`] after close.
    pub fn poll_space_now(&self) -> EnvResult<SpaceState> {
        self.check_usable()?;
        Ok(self.shared.space.poll())
    }

    /// Number of transactions begun and not yet finished.
    #[must_use]
    pub fn open_txn_count(&self) -> usize {
        self.shared.txns.lock().len()
    }

    /// Open table handles, ordered by table name then handle id.
    #[must_use]
    pub fn open_db_handles(&self) -> Vec<(String, HandleId)> {
        self.shared.registry.snapshot()
    }

    /// Records an opened table handle.
    pub fn note_db_opened(&self, dname: &str, handle: HandleId) {
        self.shared.registry.insert(dname, handle);
    }

    /// Forgets a closed table handle. Safe to call during teardown and for
    /// handles that were never recorded.
    pub fn note_db_closed(&self, dname: &str, handle: HandleId) {
        self.shared.registry.remove(dname, handle);
    }

    /// Counters and gauges.
    #[must_use]
    pub fn stats(&self) -> StatusSnapshot {
        let shared = &self.shared;
        let space = shared.space.status();
        StatusSnapshot {
            open_txns: self.open_txn_count() as u64,
            open_handles: shared.registry.len() as u64,
            open_files: shared.cache.open_file_count() as u64,
            space_state: Some(space.state),
            rejected_while_critical: space.rejected_while_critical,
            locks_held: shared.locks.lock_count() as u64,
            ..shared.stats.snapshot()
        }
    }

    /// Every table name with its internal file name, in name order.
    ///
    /// # Errors
    ///
    /// Returns the panic error, or [`EnvError::Invalid`] after close.
    pub fn list_tables(&self) -> EnvResult<Vec<(String, String)>> {
        self.check_usable()?;
        let table = &self.shared.directory.table;
        let view = ReadView::latest_committed();
        let mut buf = RecordBuf::new();
        let mut tables = Vec::new();

        let mut found = table.position(Seek::First, &view, &mut buf);
        while found {
            tables.push((
                String::from_utf8_lossy(buf.key()).into_owned(),
                String::from_utf8_lossy(buf.value()).into_owned(),
            ));
            let key = buf.key().to_vec();
            found = table.position(Seek::After(&key), &view, &mut buf);
        }
        Ok(tables)
    }

    /// The settings recorded when the environment was created.
    ///
    /// # Errors
    ///
    /// Returns the panic error.
    pub fn settings(&self) -> EnvResult<Settings> {
        self.shared.latch.check()?;
        self.shared
            .settings
            .get()
            .cloned()
            .ok_or_else(|| EnvError::invalid("environment settings are not loaded"))
    }

    /// What recovery did when the environment was opened.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.shared.recovery
    }

    /// Resolved directories.
    #[must_use]
    pub fn layout(&self) -> &EnvLayout {
        &self.shared.layout
    }

    /// Home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.shared.layout.home
    }

    /// The configuration the environment was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // === crate-internal plumbing ===

    /// Fails if the environment has panicked or been closed.
    pub(crate) fn check_usable(&self) -> EnvResult<()> {
        self.shared.latch.check()?;
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(EnvError::invalid("environment is closed"));
        }
        Ok(())
    }

    pub(crate) fn check_same_env(&self, txn: &Txn) -> EnvResult<()> {
        if Arc::ptr_eq(&self.shared, &txn.env().shared) {
            Ok(())
        } else {
            Err(EnvError::invalid(
                "transaction belongs to a different environment",
            ))
        }
    }

    /// Routes an error result through [`Environment::do_error`].
    pub(crate) fn report<T>(&self, result: EnvResult<T>) -> EnvResult<T> {
        result.map_err(|err| self.do_error(err))
    }

    pub(crate) fn next_handle_id(&self) -> HandleId {
        HandleId::new(self.shared.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn lock(
        &self,
        node: &TxnNode,
        table: &TableRef,
        range: KeyRange,
        mode: LockMode,
    ) -> EnvResult<()> {
        self.shared
            .locks
            .acquire(table.dict, table.comparator(), &node.lineage, range, mode)
            .inspect_err(|_| self.shared.stats.record_lock_conflict())
    }

    /// Write-locks `key`, logs the change and records it provisionally.
    pub(crate) fn txn_write(
        &self,
        node: &TxnNode,
        table: &Arc<TableRef>,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> EnvResult<()> {
        node.touch(table);
        self.lock(node, table, KeyRange::point(key), LockMode::Write)?;
        let record = match value {
            Some(value) => LogRecord::Insert {
                txn: node.id,
                iname: table.iname.clone(),
                key: key.to_vec(),
                value: value.to_vec(),
            },
            None => LogRecord::Delete {
                txn: node.id,
                iname: table.iname.clone(),
                key: key.to_vec(),
            },
        };
        self.shared.log.append(&record)?;
        table.table.write(node.id, key, value.map(<[u8]>::to_vec));
        Ok(())
    }

    /// Runs `work` under `txn`, or under an internal transaction that is
    /// committed on success and aborted on failure.
    pub(crate) fn with_txn<T>(
        &self,
        txn: Option<&Txn>,
        work: impl FnOnce(&Arc<TxnNode>) -> EnvResult<T>,
    ) -> EnvResult<T> {
        match txn {
            Some(txn) => {
                self.check_same_env(txn)?;
                txn.node().check_workable()?;
                work(txn.node())
            }
            None => {
                let auto = self.begin_node(None, TxnFlags::NONE)?;
                match work(auto.node()) {
                    Ok(value) => {
                        auto.commit(CommitFlags::NONE)?;
                        Ok(value)
                    }
                    Err(err) => {
                        if let Err(abort_err) = auto.abort() {
                            debug!(error = %abort_err, "internal transaction abort failed");
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    /// The internal name `dname` maps to, as seen by `node`.
    pub(crate) fn lookup_iname(&self, node: &TxnNode, dname: &str) -> Option<String> {
        let view = node.view(burrow_storage::Visibility::LatestCommitted);
        self.shared
            .directory
            .table
            .lookup(dname.as_bytes(), &view)
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
    }

    /// Picks an unused internal name for a new table and gives it a
    /// dictionary id.
    pub(crate) fn reserve_iname(&self, dname: &str, txn: TxnId) -> String {
        let mut dictionaries = self.shared.dictionaries.lock();
        let layout = &self.shared.layout;
        let iname = catalog::make_iname(dname, txn, |candidate| {
            dictionaries.contains_key(candidate) || layout.table_path(candidate).exists()
        });
        let dict = DictionaryId::new(self.shared.next_dict.fetch_add(1, Ordering::Relaxed));
        dictionaries.insert(iname.clone(), dict);
        iname
    }

    fn dictionary_for(&self, iname: &str) -> DictionaryId {
        *self
            .shared
            .dictionaries
            .lock()
            .entry(iname.to_string())
            .or_insert_with(|| {
                DictionaryId::new(self.shared.next_dict.fetch_add(1, Ordering::Relaxed))
            })
    }

    /// Opens the table file behind `iname`.
    pub(crate) fn open_table_ref(
        &self,
        iname: &str,
        cmp: Option<&KeyComparator>,
    ) -> EnvResult<Arc<TableRef>> {
        let cmp = cmp.unwrap_or(&self.shared.default_cmp).clone();
        TableRef::open(
            &self.shared.cache,
            &self.shared.layout,
            iname,
            self.dictionary_for(iname),
            cmp,
        )
    }

    /// Escalates an unrecoverable storage failure.
    pub(crate) fn panic_on(&self, what: &str, err: &EnvError) -> EnvError {
        let cause = match err.status() {
            code if code > 0 => code,
            _ => status::EIO,
        };
        self.panic(cause, format!("{what}: {err}"));
        self.shared.latch.error()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("home", &self.shared.layout.home)
            .field("flags", &self.shared.flags)
            .field("panicked", &self.is_panicked())
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
