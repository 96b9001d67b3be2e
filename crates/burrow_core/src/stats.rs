//! Engine status counters.
//!
//! Counters are atomic and monotonically increasing; the gauges in
//! [`StatusSnapshot`] (open transactions, handles, files, space) are filled
//! in by the environment when a snapshot is taken.
//!
//! ```rust,ignore
//! let status = env.stats();
//! println!("commits: {}", status.txns_committed);
//! println!("lock conflicts: {}", status.lock_conflicts);
//! ```

use crate::space::SpaceState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-wide counters.
#[derive(Debug, Default)]
pub struct EngineStatus {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    cursor_ops: AtomicU64,

    txns_begun: AtomicU64,
    txns_committed: AtomicU64,
    txns_aborted: AtomicU64,

    lock_conflicts: AtomicU64,
    checkpoints: AtomicU64,
    errors: AtomicU64,
}

impl EngineStatus {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cursor_op(&self) {
        self.cursor_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_txn_begin(&self) {
        self.txns_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_txn_commit(&self) {
        self.txns_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_txn_abort(&self) {
        self.txns_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_conflict(&self) {
        self.lock_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the counters. Gauges are left at their defaults.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            cursor_ops: self.cursor_ops.load(Ordering::Relaxed),
            txns_begun: self.txns_begun.load(Ordering::Relaxed),
            txns_committed: self.txns_committed.load(Ordering::Relaxed),
            txns_aborted: self.txns_aborted.load(Ordering::Relaxed),
            lock_conflicts: self.lock_conflicts.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            ..StatusSnapshot::default()
        }
    }
}

/// A point-in-time copy of the engine status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    /// Point reads and cursor reads that found a record.
    pub reads: u64,
    /// Successful puts.
    pub writes: u64,
    /// Successful deletes.
    pub deletes: u64,
    /// Cursor positioning calls.
    pub cursor_ops: u64,
    /// Transactions begun.
    pub txns_begun: u64,
    /// Transactions committed (root and nested).
    pub txns_committed: u64,
    /// Transactions aborted.
    pub txns_aborted: u64,
    /// Lock requests refused.
    pub lock_conflicts: u64,
    /// Checkpoints taken.
    pub checkpoints: u64,
    /// Errors reported (not-found excluded).
    pub errors: u64,

    /// Transactions currently open.
    pub open_txns: u64,
    /// Table handles currently open.
    pub open_handles: u64,
    /// Table files currently held by the cache table.
    pub open_files: u64,
    /// Current file system space level.
    pub space_state: Option<SpaceState>,
    /// Writes refused while space was critical.
    pub rejected_while_critical: u64,
    /// Locks currently held.
    pub locks_held: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counters_start_at_zero() {
        let snap = EngineStatus::new().snapshot();
        assert_eq!(snap, StatusSnapshot::default());
    }

    #[test]
    fn snapshot_copies_counters() {
        let status = EngineStatus::new();
        status.record_txn_begin();
        status.record_txn_begin();
        status.record_txn_commit();
        status.record_txn_abort();
        status.record_lock_conflict();

        let snap = status.snapshot();
        assert_eq!(snap.txns_begun, 2);
        assert_eq!(snap.txns_committed, 1);
        assert_eq!(snap.txns_aborted, 1);
        assert_eq!(snap.lock_conflicts, 1);
        assert_eq!(snap.space_state, None);
    }

    #[test]
    fn concurrent_updates() {
        let status = Arc::new(EngineStatus::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let status = Arc::clone(&status);
                thread::spawn(move || {
                    for _ in 0..100 {
                        status.record_read();
                        status.record_write();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snap = status.snapshot();
        assert_eq!(snap.reads, 800);
        assert_eq!(snap.writes, 800);
    }
}
