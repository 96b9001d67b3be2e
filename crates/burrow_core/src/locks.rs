//! Row and range locks.
//!
//! The [`LockManager`] keeps, per dictionary, the list of key ranges each
//! transaction holds in read or write mode. Two locks conflict when their
//! ranges overlap, at least one is a write lock, and the holder is not in
//! the requester's lineage (a transaction never conflicts with its own
//! ancestors).
//!
//! A request that conflicts waits on a condition variable until a release
//! or transfer, bounded by the configured wait timeout; there is no
//! deadlock detector. A request still blocked at the deadline fails with
//! [`EnvError::LockConflict`].

use crate::error::{EnvError, EnvResult};
use crate::types::{DictionaryId, TxnId};
use burrow_storage::KeyComparator;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// One end of a key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    /// Before every key.
    NegInf,
    /// A concrete key.
    Key(Vec<u8>),
    /// After every key.
    PosInf,
}

/// An inclusive key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower end.
    pub start: Bound,
    /// Upper end.
    pub end: Bound,
}

impl KeyRange {
    /// The single key `key`.
    #[must_use]
    pub fn point(key: &[u8]) -> Self {
        Self {
            start: Bound::Key(key.to_vec()),
            end: Bound::Key(key.to_vec()),
        }
    }

    /// Every key.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            start: Bound::NegInf,
            end: Bound::PosInf,
        }
    }

    /// From `start` to `end`, both included.
    #[must_use]
    pub fn new(start: Bound, end: Bound) -> Self {
        Self { start, end }
    }
}

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    /// Shared.
    Read,
    /// Exclusive.
    Write,
}

/// A lock as reported by [`LockManager::holders`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldLock {
    /// Holding transaction.
    pub txn: TxnId,
    /// Locked range.
    pub range: KeyRange,
    /// Mode.
    pub mode: LockMode,
}

fn compare_bounds(cmp: &KeyComparator, a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::NegInf, Bound::NegInf) | (Bound::PosInf, Bound::PosInf) => Ordering::Equal,
        (Bound::NegInf, _) | (_, Bound::PosInf) => Ordering::Less,
        (_, Bound::NegInf) | (Bound::PosInf, _) => Ordering::Greater,
        (Bound::Key(x), Bound::Key(y)) => cmp(x, y),
    }
}

fn overlaps(cmp: &KeyComparator, a: &KeyRange, b: &KeyRange) -> bool {
    compare_bounds(cmp, &a.start, &b.end).is_le() && compare_bounds(cmp, &b.start, &a.end).is_le()
}

fn covers(cmp: &KeyComparator, outer: &KeyRange, inner: &KeyRange) -> bool {
    compare_bounds(cmp, &outer.start, &inner.start).is_le()
        && compare_bounds(cmp, &inner.end, &outer.end).is_le()
}

struct DictLocks {
    cmp: KeyComparator,
    held: Vec<HeldLock>,
}

impl DictLocks {
    fn conflicting_holder(&self, lineage: &[TxnId], range: &KeyRange, mode: LockMode) -> Option<TxnId> {
        self.held
            .iter()
            .find(|lock| {
                !lineage.contains(&lock.txn)
                    && (mode == LockMode::Write || lock.mode == LockMode::Write)
                    && overlaps(&self.cmp, &lock.range, range)
            })
            .map(|lock| lock.txn)
    }

    fn already_held(&self, txn: TxnId, range: &KeyRange, mode: LockMode) -> bool {
        self.held
            .iter()
            .any(|lock| lock.txn == txn && lock.mode >= mode && covers(&self.cmp, &lock.range, range))
    }
}

/// Range lock table shared by every transaction of an environment.
pub struct LockManager {
    tables: Mutex<HashMap<DictionaryId, DictLocks>>,
    released: Condvar,
    wait_timeout: Duration,
}

impl LockManager {
    /// Creates a lock manager whose requests wait at most `wait_timeout`.
    #[must_use]
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            wait_timeout,
        }
    }

    /// Acquires `range` in `mode` on `dict` for the first transaction of
    /// `lineage`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::LockConflict`] if a conflicting lock is still held
    /// when the wait timeout expires.
    pub fn acquire(
        &self,
        dict: DictionaryId,
        cmp: &KeyComparator,
        lineage: &[TxnId],
        range: KeyRange,
        mode: LockMode,
    ) -> EnvResult<()> {
        let Some(&txn) = lineage.first() else {
            return Err(EnvError::invalid("lock requested without a transaction"));
        };
        let deadline = Instant::now() + self.wait_timeout;
        let mut tables = self.tables.lock();

        loop {
            let locks = tables.entry(dict).or_insert_with(|| DictLocks {
                cmp: cmp.clone(),
                held: Vec::new(),
            });
            let Some(holder) = locks.conflicting_holder(lineage, &range, mode) else {
                if !locks.already_held(txn, &range, mode) {
                    locks.held.push(HeldLock { txn, range, mode });
                }
                trace!(%dict, %txn, ?mode, "lock granted");
                return Ok(());
            };

            if self.wait_timeout.is_zero()
                || self.released.wait_until(&mut tables, deadline).timed_out()
            {
                let still_blocked = tables
                    .get(&dict)
                    .and_then(|locks| locks.conflicting_holder(lineage, &range, mode))
                    .is_some();
                if still_blocked {
                    debug!(%dict, %txn, %holder, ?mode, "lock not granted");
                    return Err(EnvError::LockConflict { dictionary: dict });
                }
            }
        }
    }

    /// Releases every lock `txn` holds on `dict`. Returns how many.
    pub fn release_all(&self, dict: DictionaryId, txn: TxnId) -> usize {
        let mut tables = self.tables.lock();
        let Some(locks) = tables.get_mut(&dict) else {
            return 0;
        };
        let before = locks.held.len();
        locks.held.retain(|lock| lock.txn != txn);
        let released = before - locks.held.len();
        if locks.held.is_empty() {
            tables.remove(&dict);
        }
        drop(tables);

        if released > 0 {
            self.released.notify_all();
        }
        released
    }

    /// Hands every lock `child` holds on `dict` to `parent`.
    pub fn transfer(&self, dict: DictionaryId, child: TxnId, parent: TxnId) -> usize {
        let mut tables = self.tables.lock();
        let Some(locks) = tables.get_mut(&dict) else {
            return 0;
        };
        let mut moved = 0;
        for lock in locks.held.iter_mut().filter(|lock| lock.txn == child) {
            lock.txn = parent;
            moved += 1;
        }
        drop(tables);

        if moved > 0 {
            self.released.notify_all();
        }
        moved
    }

    /// Every lock currently held on `dict`.
    #[must_use]
    pub fn holders(&self, dict: DictionaryId) -> Vec<HeldLock> {
        self.tables
            .lock()
            .get(&dict)
            .map(|locks| locks.held.clone())
            .unwrap_or_default()
    }

    /// Total number of locks held across all dictionaries.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.tables.lock().values().map(|locks| locks.held.len()).sum()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("locks", &self.lock_count())
            .field("wait_timeout", &self.wait_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_storage::bytewise;
    use std::sync::Arc;

    const D: DictionaryId = DictionaryId(1);

    fn key(k: &[u8]) -> Bound {
        Bound::Key(k.to_vec())
    }

    #[test]
    fn readers_share_writers_exclude() {
        let locks = LockManager::new(Duration::ZERO);
        let cmp = bytewise();

        locks
            .acquire(D, &cmp, &[TxnId(1)], KeyRange::point(b"k"), LockMode::Read)
            .unwrap();
        locks
            .acquire(D, &cmp, &[TxnId(2)], KeyRange::point(b"k"), LockMode::Read)
            .unwrap();

        let err = locks
            .acquire(D, &cmp, &[TxnId(3)], KeyRange::point(b"k"), LockMode::Write)
            .unwrap_err();
        assert!(matches!(err, EnvError::LockConflict { dictionary } if dictionary == D));

        locks
            .acquire(D, &cmp, &[TxnId(3)], KeyRange::point(b"other"), LockMode::Write)
            .unwrap();
    }

    #[test]
    fn ranges_protect_gaps() {
        let locks = LockManager::new(Duration::ZERO);
        let cmp = bytewise();

        locks
            .acquire(
                D,
                &cmp,
                &[TxnId(1)],
                KeyRange::new(key(b"b"), key(b"d")),
                LockMode::Read,
            )
            .unwrap();

        assert!(locks
            .acquire(D, &cmp, &[TxnId(2)], KeyRange::point(b"c"), LockMode::Write)
            .is_err());
        assert!(locks
            .acquire(D, &cmp, &[TxnId(2)], KeyRange::point(b"e"), LockMode::Write)
            .is_ok());
        assert!(locks
            .acquire(
                D,
                &cmp,
                &[TxnId(2)],
                KeyRange::new(key(b"d"), Bound::PosInf),
                LockMode::Write
            )
            .is_err());
    }

    #[test]
    fn ancestors_never_conflict() {
        let locks = LockManager::new(Duration::ZERO);
        let cmp = bytewise();
        let parent = TxnId(10);
        let child = TxnId(11);

        locks
            .acquire(D, &cmp, &[parent], KeyRange::everything(), LockMode::Write)
            .unwrap();
        locks
            .acquire(D, &cmp, &[child, parent], KeyRange::point(b"x"), LockMode::Write)
            .unwrap();

        assert_eq!(locks.transfer(D, child, parent), 1);
        assert!(locks.holders(D).iter().all(|held| held.txn == parent));
        assert_eq!(locks.release_all(D, parent), 2);
        assert_eq!(locks.lock_count(), 0);
    }

    #[test]
    fn covered_requests_are_not_duplicated() {
        let locks = LockManager::new(Duration::ZERO);
        let cmp = bytewise();
        locks
            .acquire(D, &cmp, &[TxnId(1)], KeyRange::everything(), LockMode::Write)
            .unwrap();
        locks
            .acquire(D, &cmp, &[TxnId(1)], KeyRange::point(b"a"), LockMode::Read)
            .unwrap();
        assert_eq!(locks.holders(D).len(), 1);
    }

    #[test]
    fn waiter_is_granted_after_release() {
        let locks = Arc::new(LockManager::new(Duration::from_secs(5)));
        let cmp = bytewise();
        locks
            .acquire(D, &cmp, &[TxnId(1)], KeyRange::point(b"k"), LockMode::Write)
            .unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            let cmp = cmp.clone();
            std::thread::spawn(move || {
                locks.acquire(D, &cmp, &[TxnId(2)], KeyRange::point(b"k"), LockMode::Write)
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        locks.release_all(D, TxnId(1));

        waiter.join().unwrap().unwrap();
        assert_eq!(locks.holders(D)[0].txn, TxnId(2));
    }

    #[test]
    fn bounded_wait_times_out() {
        let locks = LockManager::new(Duration::from_millis(20));
        let cmp = bytewise();
        locks
            .acquire(D, &cmp, &[TxnId(1)], KeyRange::point(b"k"), LockMode::Write)
            .unwrap();

        let started = Instant::now();
        assert!(locks
            .acquire(D, &cmp, &[TxnId(2)], KeyRange::point(b"k"), LockMode::Read)
            .is_err());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
