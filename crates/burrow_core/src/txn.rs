//! Transactions.
//!
//! A transaction may have at most one open child. While the child is open
//! the parent accepts no work and cannot finish. A child's commit hands its
//! provisional writes and locks to the parent; only a root commit makes
//! work durable and visible.
//!
//! Dropping an unfinished [`Txn`] aborts it along with any open
//! descendants.

use crate::env::{Environment, TableRef};
use crate::error::{EnvError, EnvResult};
use crate::flags::{CommitFlags, TxnFlags};
use crate::types::{DictionaryId, Isolation, SequenceNumber, TxnId};
use crate::wal::LogRecord;
use burrow_storage::{ReadView, Visibility};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Work a transaction collected, taken when it finishes.
#[derive(Default)]
struct Work {
    touched: BTreeMap<DictionaryId, Arc<TableRef>>,
    unlinks: Vec<String>,
    created: Vec<String>,
}

#[derive(Default)]
struct TxnInner {
    child: Option<TxnId>,
    work: Work,
    finished: bool,
}

pub(crate) struct TxnNode {
    pub(crate) id: TxnId,
    pub(crate) parent: Option<TxnId>,
    /// This transaction, then its ancestors up to the root.
    pub(crate) lineage: Vec<TxnId>,
    pub(crate) isolation: Isolation,
    /// Commit sequence a snapshot transaction reads at.
    pub(crate) snapshot: Option<SequenceNumber>,
    /// Commit durability requested at begin, if any.
    durability: Option<bool>,
    inner: Mutex<TxnInner>,
}

impl TxnNode {
    /// Fails unless the transaction can do work right now.
    pub(crate) fn check_workable(&self) -> EnvResult<()> {
        let inner = self.inner.lock();
        if inner.finished {
            return Err(EnvError::invalid(format!("{} has already finished", self.id)));
        }
        if let Some(child) = inner.child {
            return Err(EnvError::invalid(format!(
                "{} has an open child {child}",
                self.id
            )));
        }
        Ok(())
    }

    /// Fails only if the transaction has finished.
    pub(crate) fn check_live(&self) -> EnvResult<()> {
        if self.is_finished() {
            Err(EnvError::invalid(format!("{} has already finished", self.id)))
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    /// Keeps `table` open until the transaction finishes.
    pub(crate) fn touch(&self, table: &Arc<TableRef>) {
        self.inner
            .lock()
            .work
            .touched
            .entry(table.dict)
            .or_insert_with(|| Arc::clone(table));
    }

    pub(crate) fn note_unlink(&self, iname: String) {
        self.inner.lock().work.unlinks.push(iname);
    }

    pub(crate) fn note_created(&self, iname: String) {
        self.inner.lock().work.created.push(iname);
    }

    pub(crate) fn view(&self, visibility: Visibility) -> ReadView<'_> {
        ReadView::new(visibility, &self.lineage)
    }

    fn finish(&self) -> Option<Work> {
        let mut inner = self.inner.lock();
        if inner.finished {
            return None;
        }
        inner.finished = true;
        Some(mem::take(&mut inner.work))
    }
}

/// How a read sees data: the visibility rule and whether it takes a read
/// lock.
pub(crate) fn read_plan(node: Option<&TxnNode>, isolation: Isolation) -> (Visibility, bool) {
    match (node, isolation) {
        (_, Isolation::ReadUncommitted) => (Visibility::Uncommitted, false),
        (Some(node), Isolation::Snapshot) => (
            node.snapshot
                .map_or(Visibility::LatestCommitted, Visibility::Snapshot),
            false,
        ),
        (Some(_), Isolation::Serializable) => (Visibility::LatestCommitted, true),
        _ => (Visibility::LatestCommitted, false),
    }
}

/// Picks a new transaction's isolation level.
fn resolve_isolation(
    requested: Option<Isolation>,
    inherit: bool,
    parent: Option<Isolation>,
    default: Isolation,
) -> EnvResult<Isolation> {
    match (requested, parent) {
        (Some(level), Some(Isolation::Snapshot)) if level != Isolation::Snapshot => {
            Err(EnvError::invalid(format!(
                "a child of a snapshot transaction cannot use {level}"
            )))
        }
        (Some(level), _) => Ok(level),
        (None, Some(level)) if inherit || level == Isolation::Snapshot => Ok(level),
        (None, _) => Ok(default),
    }
}

/// An open transaction.
///
/// Finish it with [`Txn::commit`] or [`Txn::abort`]. Both consume the
/// handle; dropping it unfinished aborts.
pub struct Txn {
    env: Environment,
    node: Arc<TxnNode>,
}

impl Txn {
    /// The transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.node.id
    }

    /// The parent's id, for nested transactions.
    #[must_use]
    pub fn parent_id(&self) -> Option<TxnId> {
        self.node.parent
    }

    /// Isolation level in force.
    #[must_use]
    pub fn isolation(&self) -> Isolation {
        self.node.isolation
    }

    /// Nesting depth; `0` for a root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.node.lineage.len() - 1
    }

    /// Whether a child transaction is open.
    #[must_use]
    pub fn has_child(&self) -> bool {
        self.node.inner.lock().child.is_some()
    }

    /// Commits.
    ///
    /// A root commit writes a commit record to the log (flushed or synced
    /// per `flags`, the begin flags, then the environment default), makes
    /// the writes visible and releases every lock. A nested commit merges
    /// everything into the parent.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] if a child is still open (the transaction and
    ///   its descendants are then aborted), or for bad flags
    /// - [`EnvError::Panicked`] if the environment has panicked, including
    ///   when this commit's own log write fails
    pub fn commit(self, flags: CommitFlags) -> EnvResult<()> {
        let result = self.env.commit_node(&self.node, flags);
        self.env.report(result)
    }

    /// Aborts, discarding every write and releasing every lock.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] if a child is still open (the transaction and
    ///   its descendants are then aborted anyway)
    /// - [`EnvError::Panicked`] if the environment has panicked
    pub fn abort(self) -> EnvResult<()> {
        let result = self.env.abort_node(&self.node);
        self.env.report(result)
    }

    pub(crate) fn node(&self) -> &Arc<TxnNode> {
        &self.node
    }

    pub(crate) fn env(&self) -> &Environment {
        &self.env
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if !self.node.is_finished() {
            self.env.abort_tree(&self.node);
        }
    }
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("id", &self.node.id)
            .field("parent", &self.node.parent)
            .field("isolation", &self.node.isolation)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Begins a transaction without the `INIT_TXN` check.
    pub(crate) fn begin_node(&self, parent: Option<&Txn>, flags: TxnFlags) -> EnvResult<Txn> {
        let shared = &self.shared;
        let requested = flags.isolation()?;
        let durability = match (
            flags.contains(TxnFlags::SYNC),
            flags.contains(TxnFlags::NOSYNC),
        ) {
            (true, true) => return Err(EnvError::invalid("SYNC and NOSYNC are exclusive")),
            (true, false) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        };

        let parent = match parent {
            Some(parent) => {
                self.check_same_env(parent)?;
                Some(Arc::clone(parent.node()))
            }
            None => None,
        };
        let isolation = resolve_isolation(
            requested,
            flags.contains(TxnFlags::INHERIT_ISOLATION),
            parent.as_ref().map(|p| p.isolation),
            shared.config.default_isolation,
        )?;

        let id = TxnId::new(shared.next_txn.fetch_add(1, Ordering::Relaxed));
        if let Some(parent) = &parent {
            let mut inner = parent.inner.lock();
            if inner.finished {
                return Err(EnvError::invalid(format!(
                    "parent {} has already finished",
                    parent.id
                )));
            }
            if let Some(child) = inner.child {
                return Err(EnvError::invalid(format!(
                    "parent {} already has an open child {child}",
                    parent.id
                )));
            }
            inner.child = Some(id);
        }

        // Held until the transaction is registered, so commits cannot prune
        // the versions its snapshot needs.
        let last_commit = (isolation == Isolation::Snapshot).then(|| shared.commit_lock.lock());
        let snapshot = last_commit.as_ref().map(|last| {
            parent
                .as_ref()
                .and_then(|p| p.snapshot)
                .unwrap_or(**last)
        });

        let lineage: Vec<TxnId> = std::iter::once(id)
            .chain(parent.iter().flat_map(|p| p.lineage.iter().copied()))
            .collect();
        let node = Arc::new(TxnNode {
            id,
            parent: parent.as_ref().map(|p| p.id),
            lineage,
            isolation,
            snapshot,
            durability,
            inner: Mutex::new(TxnInner::default()),
        });

        {
            let mut txns = shared.txns.lock();
            let logged = shared.log.append(&LogRecord::Begin {
                txn: id,
                parent: node.parent,
            });
            if let Err(err) = logged {
                drop(txns);
                if let Some(parent) = &parent {
                    parent.inner.lock().child = None;
                }
                return Err(err);
            }
            txns.insert(id, Arc::clone(&node));
        }
        drop(last_commit);

        shared.stats.record_txn_begin();
        debug!(txn = %id, parent = ?node.parent, %isolation, "transaction begun");
        Ok(Txn {
            env: self.clone(),
            node,
        })
    }

    pub(crate) fn commit_node(&self, node: &Arc<TxnNode>, flags: CommitFlags) -> EnvResult<()> {
        flags.check_allowed("txn_commit")?;
        if flags.contains(CommitFlags::SYNC | CommitFlags::NOSYNC) {
            return Err(EnvError::invalid("SYNC and NOSYNC are exclusive"));
        }
        if self.shared.latch.is_set() {
            self.finish_panicked(node);
            return Err(self.shared.latch.error());
        }
        node.check_workable()?;

        match node.parent {
            Some(parent) => self.commit_child(node, parent),
            None => {
                let sync = if flags.contains(CommitFlags::SYNC) {
                    true
                } else if flags.contains(CommitFlags::NOSYNC) {
                    false
                } else {
                    node.durability
                        .unwrap_or(self.shared.config.sync_on_commit)
                };
                self.commit_root(node, sync)
            }
        }
    }

    fn commit_child(&self, node: &Arc<TxnNode>, parent_id: TxnId) -> EnvResult<()> {
        let shared = &self.shared;
        let parent = shared
            .txns
            .lock()
            .get(&parent_id)
            .cloned()
            .ok_or_else(|| EnvError::invalid(format!("parent {parent_id} has finished")))?;
        let Some(work) = node.finish() else {
            return Err(EnvError::invalid(format!("{} has already finished", node.id)));
        };

        let mut transferred = 0;
        for (dict, table) in &work.touched {
            table.table.promote(node.id, parent.id);
            transferred += shared.locks.transfer(*dict, node.id, parent.id);
        }
        {
            let mut inner = parent.inner.lock();
            for (dict, table) in work.touched {
                inner.work.touched.entry(dict).or_insert(table);
            }
            inner.work.unlinks.extend(work.unlinks);
            inner.work.created.extend(work.created);
            if inner.child == Some(node.id) {
                inner.child = None;
            }
        }

        self.deregister(node.id);
        shared.stats.record_txn_commit();
        debug!(txn = %node.id, parent = %parent.id, locks = transferred, "nested transaction committed");
        Ok(())
    }

    fn commit_root(&self, node: &Arc<TxnNode>, sync: bool) -> EnvResult<()> {
        let shared = &self.shared;
        let Some(work) = node.finish() else {
            return Err(EnvError::invalid(format!("{} has already finished", node.id)));
        };

        let wrote = !work.unlinks.is_empty()
            || work
                .touched
                .values()
                .any(|table| table.table.has_provisional(node.id));
        let mut sequence = None;
        if wrote {
            let mut last = shared.commit_lock.lock();
            let seq = last.next();
            let logged = shared
                .log
                .append(&LogRecord::Commit { txn: node.id, sequence: seq })
                .and_then(|_| if sync { shared.log.sync() } else { shared.log.flush() });
            if let Err(err) = logged {
                drop(last);
                self.deregister(node.id);
                return Err(self.panic_on(&format!("logging commit of {}", node.id), &err));
            }
            *last = seq;

            let oldest = self.oldest_snapshot();
            for table in work.touched.values() {
                if let Err(err) = table.table.commit(node.id, seq, oldest) {
                    drop(last);
                    self.deregister(node.id);
                    return Err(self.panic_on(
                        &format!("applying commit of {} to {}", node.id, table.iname),
                        &EnvError::from(err),
                    ));
                }
            }
            sequence = Some(seq);
        }

        for dict in work.touched.keys() {
            shared.locks.release_all(*dict, node.id);
        }
        drop(work.touched);
        for iname in &work.unlinks {
            if let Err(err) = shared.cache.remove_file(&shared.layout.table_path(iname)) {
                warn!(iname, error = %err, "table file left in place after removal");
            }
        }

        self.deregister(node.id);
        shared.stats.record_txn_commit();
        debug!(txn = %node.id, sequence = ?sequence, sync, "transaction committed");
        Ok(())
    }

    pub(crate) fn abort_node(&self, node: &Arc<TxnNode>) -> EnvResult<()> {
        if self.shared.latch.is_set() {
            self.finish_panicked(node);
            return Err(self.shared.latch.error());
        }
        node.check_live()?;
        let child = node.inner.lock().child;
        self.abort_tree(node);
        match child {
            Some(child) => Err(EnvError::invalid(format!(
                "{} had an open child {child}; both were aborted",
                node.id
            ))),
            None => Ok(()),
        }
    }

    /// Aborts `node` and its open descendants, innermost first.
    pub(crate) fn abort_tree(&self, node: &Arc<TxnNode>) {
        let child = node.inner.lock().child;
        if let Some(child) = child.and_then(|id| self.shared.txns.lock().get(&id).cloned()) {
            self.abort_tree(&child);
        }

        let shared = &self.shared;
        if shared.latch.is_set() {
            self.finish_panicked(node);
            return;
        }
        let Some(work) = node.finish() else {
            return;
        };

        let mut rolled_back = 0;
        for (dict, table) in &work.touched {
            rolled_back += table.table.rollback(node.id);
            shared.locks.release_all(*dict, node.id);
        }
        drop(work.touched);

        if let Err(err) = shared.log.append(&LogRecord::Abort { txn: node.id }) {
            if node.parent.is_some() {
                // Recovery would otherwise count the child's writes as the
                // parent's.
                self.panic_on(&format!("logging abort of {}", node.id), &err);
            } else {
                warn!(txn = %node.id, error = %err, "abort record not logged");
            }
        }
        for iname in &work.created {
            if let Err(err) = shared.cache.remove_file(&shared.layout.table_path(iname)) {
                debug!(iname, error = %err, "created table file left in place");
            }
        }

        self.clear_parent_link(node);
        self.deregister(node.id);
        shared.stats.record_txn_abort();
        debug!(txn = %node.id, rolled_back, "transaction aborted");
    }

    /// Marks `node` finished without touching storage.
    fn finish_panicked(&self, node: &Arc<TxnNode>) {
        drop(node.finish());
        self.clear_parent_link(node);
        self.deregister(node.id);
    }

    fn clear_parent_link(&self, node: &TxnNode) {
        let Some(parent_id) = node.parent else {
            return;
        };
        let parent = self.shared.txns.lock().get(&parent_id).cloned();
        if let Some(parent) = parent {
            let mut inner = parent.inner.lock();
            if inner.child == Some(node.id) {
                inner.child = None;
            }
        }
    }

    fn deregister(&self, id: TxnId) {
        self.shared.txns.lock().remove(&id);
    }

    /// Oldest sequence a live snapshot transaction reads at.
    fn oldest_snapshot(&self) -> Option<SequenceNumber> {
        self.shared
            .txns
            .lock()
            .values()
            .filter_map(|node| node.snapshot)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Db;
    use crate::dir::EnvDirs;
    use crate::flags::{CursorFlags, DbFlags, EnvFlags, PutFlags};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn open_env() -> (TempDir, Environment) {
        let temp = tempdir().unwrap();
        let env = Environment::open(
            EnvDirs::new(temp.path()),
            EnvFlags::TRANSACTIONAL,
            Config::new().fs_poll_interval(Duration::ZERO),
        )
        .unwrap();
        (temp, env)
    }

    fn open_db(env: &Environment, name: &str) -> Db {
        let mut db = Db::create(env);
        db.open(None, name, DbFlags::CREATE).unwrap();
        db
    }

    #[test]
    fn isolation_resolution() {
        use Isolation::*;
        assert_eq!(resolve_isolation(None, false, None, Serializable).unwrap(), Serializable);
        assert_eq!(resolve_isolation(None, true, Some(ReadCommitted), Serializable).unwrap(), ReadCommitted);
        assert_eq!(resolve_isolation(None, false, Some(ReadCommitted), Serializable).unwrap(), Serializable);
        assert_eq!(resolve_isolation(None, false, Some(Snapshot), Serializable).unwrap(), Snapshot);
        assert!(resolve_isolation(Some(ReadCommitted), false, Some(Snapshot), Serializable).is_err());
        assert_eq!(resolve_isolation(Some(Snapshot), false, Some(ReadCommitted), Serializable).unwrap(), Snapshot);
    }

    #[test]
    fn read_plans() {
        assert_eq!(read_plan(None, Isolation::Serializable), (Visibility::LatestCommitted, false));
        assert_eq!(read_plan(None, Isolation::ReadUncommitted), (Visibility::Uncommitted, false));
    }

    #[test]
    fn one_child_at_a_time() {
        let (_temp, env) = open_env();
        let root = env.txn_begin(None, TxnFlags::NONE).unwrap();
        let child = env.txn_begin(Some(&root), TxnFlags::NONE).unwrap();
        assert!(root.has_child());
        assert_eq!(child.depth(), 1);
        assert_eq!(child.parent_id(), Some(root.id()));

        assert!(matches!(
            env.txn_begin(Some(&root), TxnFlags::NONE),
            Err(EnvError::Invalid { .. })
        ));
        let grandchild = env.txn_begin(Some(&child), TxnFlags::NONE).unwrap();
        assert_eq!(grandchild.depth(), 2);

        grandchild.commit(CommitFlags::NONE).unwrap();
        child.commit(CommitFlags::NONE).unwrap();
        assert!(!root.has_child());
        root.commit(CommitFlags::NONE).unwrap();
        assert_eq!(env.open_txn_count(), 0);
    }

    #[test]
    fn parent_with_open_child_cannot_commit() {
        let (_temp, env) = open_env();
        let db = open_db(&env, "t");
        let root = env.txn_begin(None, TxnFlags::NONE).unwrap();
        let child = env.txn_begin(Some(&root), TxnFlags::NONE).unwrap();
        db.put(Some(&child), b"k", b"v", PutFlags::NONE).unwrap();

        assert!(matches!(
            db.put(Some(&root), b"x", b"y", PutFlags::NONE),
            Err(EnvError::Invalid { .. })
        ));
        assert!(matches!(
            root.commit(CommitFlags::NONE),
            Err(EnvError::Invalid { .. })
        ));
        // The failed commit aborted the whole tree.
        assert!(matches!(
            child.commit(CommitFlags::NONE),
            Err(EnvError::Invalid { .. })
        ));
        assert_eq!(env.open_txn_count(), 0);
        assert!(matches!(db.get(None, b"k"), Err(EnvError::NotFound)));
    }

    #[test]
    fn parent_is_usable_again_once_child_finishes() {
        let (_temp, env) = open_env();
        let db = open_db(&env, "t");
        db.put(None, b"a", b"1", PutFlags::NONE).unwrap();
        db.put(None, b"b", b"2", PutFlags::NONE).unwrap();
        let root = env.txn_begin(None, TxnFlags::NONE).unwrap();
        let mut cursor = db.cursor(Some(&root), CursorFlags::NONE).unwrap();

        for finish_by_commit in [true, false] {
            let child = env.txn_begin(Some(&root), TxnFlags::NONE).unwrap();
            assert!(matches!(db.get(Some(&root), b"a"), Err(EnvError::Invalid { .. })));
            assert!(matches!(
                db.put(Some(&root), b"c", b"3", PutFlags::NONE),
                Err(EnvError::Invalid { .. })
            ));
            assert!(matches!(db.del(Some(&root), b"b"), Err(EnvError::Invalid { .. })));
            assert!(matches!(cursor.first(), Err(EnvError::Invalid { .. })));
            assert!(matches!(cursor.seek(b"a"), Err(EnvError::Invalid { .. })));
            assert!(matches!(
                db.cursor(Some(&root), CursorFlags::NONE),
                Err(EnvError::Invalid { .. })
            ));

            if finish_by_commit {
                child.commit(CommitFlags::NONE).unwrap();
            } else {
                child.abort().unwrap();
            }
            assert_eq!(db.get(Some(&root), b"a").unwrap(), b"1");
            assert_eq!(cursor.first().unwrap().0, b"a");
            assert_eq!(cursor.seek(b"a").unwrap().1, b"1");
            db.cursor(Some(&root), CursorFlags::NONE).unwrap();
        }

        db.put(Some(&root), b"c", b"3", PutFlags::NONE).unwrap();
        db.del(Some(&root), b"b").unwrap();
        drop(cursor);
        root.commit(CommitFlags::NONE).unwrap();
        assert_eq!(db.get(None, b"c").unwrap(), b"3");
        assert!(matches!(db.get(None, b"b"), Err(EnvError::NotFound)));
    }

    #[test]
    fn child_commit_is_undone_by_parent_abort() {
        let (_temp, env) = open_env();
        let db = open_db(&env, "t");
        let root = env.txn_begin(None, TxnFlags::NONE).unwrap();
        let child = env.txn_begin(Some(&root), TxnFlags::NONE).unwrap();
        db.put(Some(&child), b"k", b"v", PutFlags::NONE).unwrap();
        child.commit(CommitFlags::NONE).unwrap();

        assert_eq!(db.get(Some(&root), b"k").unwrap(), b"v");
        root.abort().unwrap();
        assert!(matches!(db.get(None, b"k"), Err(EnvError::NotFound)));
    }

    #[test]
    fn child_abort_keeps_parent_work() {
        let (_temp, env) = open_env();
        let db = open_db(&env, "t");
        let root = env.txn_begin(None, TxnFlags::NONE).unwrap();
        db.put(Some(&root), b"a", b"1", PutFlags::NONE).unwrap();
        let child = env.txn_begin(Some(&root), TxnFlags::NONE).unwrap();
        db.put(Some(&child), b"a", b"2", PutFlags::NONE).unwrap();
        db.put(Some(&child), b"b", b"2", PutFlags::NONE).unwrap();
        child.abort().unwrap();
        root.commit(CommitFlags::NONE).unwrap();

        assert_eq!(db.get(None, b"a").unwrap(), b"1");
        assert!(matches!(db.get(None, b"b"), Err(EnvError::NotFound)));
    }

    #[test]
    fn dropping_a_txn_aborts_it() {
        let (_temp, env) = open_env();
        let db = open_db(&env, "t");
        {
            let txn = env.txn_begin(None, TxnFlags::NONE).unwrap();
            db.put(Some(&txn), b"k", b"v", PutFlags::NONE).unwrap();
        }
        assert_eq!(env.open_txn_count(), 0);
        assert!(matches!(db.get(None, b"k"), Err(EnvError::NotFound)));
        assert_eq!(env.stats().txns_aborted, 1);
    }

    #[test]
    fn snapshot_reads_ignore_later_commits() {
        let (_temp, env) = open_env();
        let db = open_db(&env, "t");
        db.put(None, b"k", b"old", PutFlags::NONE).unwrap();

        let reader = env.txn_begin(None, TxnFlags::SNAPSHOT).unwrap();
        db.put(None, b"k", b"new", PutFlags::NONE).unwrap();
        assert_eq!(db.get(Some(&reader), b"k").unwrap(), b"old");

        let child = env.txn_begin(Some(&reader), TxnFlags::NONE).unwrap();
        assert_eq!(child.isolation(), Isolation::Snapshot);
        assert_eq!(db.get(Some(&child), b"k").unwrap(), b"old");
        child.commit(CommitFlags::NONE).unwrap();
        reader.commit(CommitFlags::NONE).unwrap();

        assert_eq!(db.get(None, b"k").unwrap(), b"new");
    }

    #[test]
    fn snapshot_parent_rejects_weaker_child() {
        let (_temp, env) = open_env();
        let root = env.txn_begin(None, TxnFlags::SNAPSHOT).unwrap();
        assert!(matches!(
            env.txn_begin(Some(&root), TxnFlags::READ_COMMITTED),
            Err(EnvError::Invalid { .. })
        ));
        assert!(!root.has_child());
        root.abort().unwrap();
    }

    #[test]
    fn conflicting_sync_flags() {
        let (_temp, env) = open_env();
        assert!(env
            .txn_begin(None, TxnFlags::SYNC | TxnFlags::NOSYNC)
            .is_err());
        let txn = env.txn_begin(None, TxnFlags::NONE).unwrap();
        let err = env
            .commit_node(txn.node(), CommitFlags::SYNC | CommitFlags::NOSYNC)
            .unwrap_err();
        assert!(matches!(err, EnvError::Invalid { .. }));
        txn.commit(CommitFlags::NOSYNC).unwrap();
    }

    #[test]
    fn txn_from_another_environment_is_rejected() {
        let (_temp_a, env_a) = open_env();
        let (_temp_b, env_b) = open_env();
        let foreign = env_b.txn_begin(None, TxnFlags::NONE).unwrap();
        assert!(matches!(
            env_a.txn_begin(Some(&foreign), TxnFlags::NONE),
            Err(EnvError::Invalid { .. })
        ));
        foreign.abort().unwrap();
    }

    #[test]
    fn read_only_commit_takes_no_sequence() {
        let (_temp, env) = open_env();
        let before = *env.shared.commit_lock.lock();
        let txn = env.txn_begin(None, TxnFlags::NONE).unwrap();
        txn.commit(CommitFlags::NONE).unwrap();
        assert_eq!(*env.shared.commit_lock.lock(), before);
    }
}
