//! Cursors.
//!
//! Every positioning call locks the key range it observed, from the
//! starting point to the record it lands on (or to the end of the table
//! when it finds nothing). Under serializable isolation these are read
//! locks; with [`CursorFlags::RMW`](crate::CursorFlags::RMW) they are write
//! locks. If taking the lock changed what the call would find, it is
//! repeated until the answer is stable.

use crate::db::{view_for, Db};
use crate::env::TableRef;
use crate::error::{EnvError, EnvResult};
use crate::locks::{Bound, KeyRange, LockMode};
use crate::txn::{read_plan, Txn};
use crate::types::Isolation;
use burrow_storage::{RecordBuf, Seek};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Step<'k> {
    First,
    Last,
    Next,
    Prev,
    Current,
    Exact(&'k [u8]),
    Range(&'k [u8]),
}

/// Range observed by a positioning call that started at `from` (the
/// current key, for relative steps) and landed on `found`.
fn observed_range(step: Step<'_>, from: &[u8], found: Option<&[u8]>) -> KeyRange {
    let key = |k: &[u8]| Bound::Key(k.to_vec());
    match (step, found) {
        (Step::First, Some(found)) => KeyRange::new(Bound::NegInf, key(found)),
        (Step::Last, Some(found)) => KeyRange::new(key(found), Bound::PosInf),
        (Step::First | Step::Last, None) => KeyRange::everything(),
        (Step::Next, Some(found)) => KeyRange::new(key(from), key(found)),
        (Step::Next, None) => KeyRange::new(key(from), Bound::PosInf),
        (Step::Prev, Some(found)) => KeyRange::new(key(found), key(from)),
        (Step::Prev, None) => KeyRange::new(Bound::NegInf, key(from)),
        (Step::Current, _) => KeyRange::point(from),
        (Step::Exact(k), _) => KeyRange::point(k),
        (Step::Range(k), Some(found)) => KeyRange::new(key(k), key(found)),
        (Step::Range(k), None) => KeyRange::new(key(k), Bound::PosInf),
    }
}

/// A position in one table, read through one transaction.
///
/// Returned key and value slices borrow the cursor's buffers and stay
/// valid until the next call on it.
pub struct Cursor<'a> {
    db: &'a Db,
    txn: Option<&'a Txn>,
    table: Arc<TableRef>,
    isolation: Isolation,
    rmw: bool,
    current: RecordBuf,
    probe: RecordBuf,
    positioned: bool,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(
        db: &'a Db,
        txn: Option<&'a Txn>,
        table: Arc<TableRef>,
        isolation: Isolation,
        rmw: bool,
    ) -> Self {
        Self {
            db,
            txn,
            table,
            isolation,
            rmw,
            current: RecordBuf::new(),
            probe: RecordBuf::new(),
            positioned: false,
        }
    }

    /// Moves to the smallest key.
    ///
    /// # Errors
    ///
    /// [`EnvError::NotFound`] on an empty table, a lock conflict, or the
    /// panic error.
    pub fn first(&mut self) -> EnvResult<(&[u8], &[u8])> {
        self.step(Step::First)
    }

    /// Moves to the largest key.
    ///
    /// # Errors
    ///
    /// As [`Cursor::first`].
    pub fn last(&mut self) -> EnvResult<(&[u8], &[u8])> {
        self.step(Step::Last)
    }

    /// Moves to the next key, or the first if unpositioned.
    ///
    /// # Errors
    ///
    /// [`EnvError::NotFound`] past the end; the cursor keeps its position.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> EnvResult<(&[u8], &[u8])> {
        if self.positioned {
            self.step(Step::Next)
        } else {
            self.step(Step::First)
        }
    }

    /// Moves to the previous key, or the last if unpositioned.
    ///
    /// # Errors
    ///
    /// [`EnvError::NotFound`] before the start; the cursor keeps its
    /// position.
    pub fn prev(&mut self) -> EnvResult<(&[u8], &[u8])> {
        if self.positioned {
            self.step(Step::Prev)
        } else {
            self.step(Step::Last)
        }
    }

    /// Moves to exactly `key`.
    ///
    /// # Errors
    ///
    /// [`EnvError::NotFound`] if `key` is not visible.
    pub fn seek(&mut self, key: &[u8]) -> EnvResult<(&[u8], &[u8])> {
        self.step(Step::Exact(key))
    }

    /// Moves to the smallest key at or after `key`.
    ///
    /// # Errors
    ///
    /// [`EnvError::NotFound`] if there is none.
    pub fn seek_range(&mut self, key: &[u8]) -> EnvResult<(&[u8], &[u8])> {
        self.step(Step::Range(key))
    }

    /// Re-reads the record under the cursor.
    ///
    /// # Errors
    ///
    /// [`EnvError::Invalid`] if unpositioned, [`EnvError::NotFound`] if the
    /// record has since been deleted.
    pub fn get_current(&mut self) -> EnvResult<(&[u8], &[u8])> {
        let db = self.db;
        if !self.positioned {
            return Err(db
                .env()
                .do_error(EnvError::invalid("cursor is not positioned")));
        }
        self.step(Step::Current)
    }

    /// Stores `value` under `key` and positions the cursor there.
    ///
    /// # Errors
    ///
    /// As [`Db::put`].
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> EnvResult<()> {
        let db = self.db;
        let env = db.env();
        let table = &self.table;
        let result = env.check_usable().and_then(|()| {
            env.shared.space.admit_write("cursor_put")?;
            env.with_txn(self.txn, |node| env.txn_write(node, table, key, Some(value)))
        });
        if result.is_ok() {
            env.shared.stats.record_write();
            self.current.fill(key, value);
            self.positioned = true;
        }
        env.report(result)
    }

    /// Deletes the record under the cursor. The cursor stays where it was,
    /// so [`Cursor::next`] continues after the deleted key.
    ///
    /// # Errors
    ///
    /// [`EnvError::Invalid`] if unpositioned, [`EnvError::NotFound`] if the
    /// record is already gone, or as [`Db::del`].
    pub fn del(&mut self) -> EnvResult<()> {
        let db = self.db;
        let env = db.env();
        if !self.positioned {
            return Err(env.do_error(EnvError::invalid("cursor is not positioned")));
        }
        let table = &self.table;
        let key = self.current.key();
        let result = env.check_usable().and_then(|()| {
            env.shared.space.admit_write("cursor_del")?;
            env.with_txn(self.txn, |node| {
                node.touch(table);
                env.lock(node, table, KeyRange::point(key), LockMode::Write)?;
                if table
                    .table
                    .lookup(key, &node.view(burrow_storage::Visibility::LatestCommitted))
                    .is_none()
                {
                    return Err(EnvError::NotFound);
                }
                env.txn_write(node, table, key, None)
            })
        });
        if result.is_ok() {
            env.shared.stats.record_delete();
        }
        env.report(result)
    }

    /// Closes the cursor. Locks it took stay with the transaction.
    ///
    /// # Errors
    ///
    /// Returns the panic error once the environment has panicked; the
    /// cursor is released either way.
    pub fn close(self) -> EnvResult<()> {
        self.db.env().shared.latch.check()
    }

    fn step(&mut self, step: Step<'_>) -> EnvResult<(&[u8], &[u8])> {
        let db = self.db;
        let env = db.env();
        let result = self.locate(step);
        match result {
            Ok(()) => {
                self.positioned = true;
                env.shared.stats.record_read();
                Ok(self.current.pair())
            }
            Err(err) => Err(env.do_error(err)),
        }
    }

    fn locate(&mut self, step: Step<'_>) -> EnvResult<()> {
        let Self {
            db,
            txn,
            table,
            isolation,
            rmw,
            current,
            probe,
            ..
        } = self;
        let env = db.env();
        env.check_usable()?;
        let node = db.txn_node(*txn)?;
        env.shared.stats.record_cursor_op();

        let (visibility, read_lock) = read_plan(node, *isolation);
        let mode = if *rmw {
            Some(LockMode::Write)
        } else if read_lock {
            Some(LockMode::Read)
        } else {
            None
        };
        let view = view_for(node, visibility);
        let from = current.key();
        let seek = match step {
            Step::First => Seek::First,
            Step::Last => Seek::Last,
            Step::Next => Seek::After(from),
            Step::Prev => Seek::Before(from),
            Step::Current => Seek::Exact(from),
            Step::Exact(key) => Seek::Exact(key),
            Step::Range(key) => Seek::AtLeast(key),
        };

        let mut found = table
            .table
            .position(seek, &view, probe)
            .then(|| probe.key().to_vec());
        if let (Some(node), Some(mode)) = (node, mode) {
            node.touch(table);
            loop {
                let range = observed_range(step, from, found.as_deref());
                env.lock(node, table, range, mode)?;
                let again = table
                    .table
                    .position(seek, &view, probe)
                    .then(|| probe.key().to_vec());
                if again == found {
                    break;
                }
                found = again;
            }
        }

        if found.is_none() {
            return Err(EnvError::NotFound);
        }
        std::mem::swap(current, probe);
        Ok(())
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("iname", &self.table.iname)
            .field("isolation", &self.isolation)
            .field("rmw", &self.rmw)
            .field("positioned", &self.positioned)
            .finish_non_exhaustive()
    }
}
