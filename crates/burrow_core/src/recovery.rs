//! Crash recovery.
//!
//! Table files are appended at commit, after the `Commit` record is
//! durable. A crash in between leaves committed writes that exist only in
//! the log; recovery finds them and appends them to their tables.
//!
//! A logged write counts as committed when no transaction on its chain up
//! to the root aborted and the root has a `Commit` record. Its sequence is
//! the root's commit sequence. Each table receives the committed records at
//! or above its applied sequence (a commit torn inside a table file is
//! re-applied whole). Committed unlinks are completed. Finally the log is
//! restarted with a checkpoint at the last known sequence.

use crate::dir::EnvLayout;
use crate::error::EnvResult;
use crate::types::{SequenceNumber, TxnId};
use crate::wal::{LogManager, LogRecord};
use burrow_storage::{CacheTable, KeyComparator, TableRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// What recovery did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Highest commit sequence seen in the log or its checkpoint.
    pub last_seq: SequenceNumber,
    /// Root commits found in the log.
    pub commits: usize,
    /// Records appended to table files.
    pub replayed: usize,
    /// Table files removed by committed unlinks.
    pub unlinked: usize,
    /// Transactions with logged work that never committed.
    pub discarded: usize,
}

struct Outcomes {
    parents: HashMap<TxnId, Option<TxnId>>,
    aborted: HashSet<TxnId>,
    commits: HashMap<TxnId, SequenceNumber>,
}

impl Outcomes {
    /// Commit sequence covering `txn`'s work, if that work survived.
    fn committed_at(&self, txn: TxnId) -> Option<SequenceNumber> {
        let mut current = txn;
        for _ in 0..=self.parents.len() {
            if self.aborted.contains(&current) {
                return None;
            }
            match self.parents.get(&current).copied().flatten() {
                Some(parent) => current = parent,
                None => return self.commits.get(&current).copied(),
            }
        }
        None
    }
}

/// Replays committed log records into table files and restarts the log.
///
/// Tables are opened through `cache` with `cmp` and released again before
/// returning.
pub(crate) fn recover(
    log: &LogManager,
    cache: &CacheTable,
    layout: &EnvLayout,
    cmp: &KeyComparator,
) -> EnvResult<RecoveryReport> {
    let records = log.read_all()?;
    let mut report = RecoveryReport::default();

    let mut outcomes = Outcomes {
        parents: HashMap::new(),
        aborted: HashSet::new(),
        commits: HashMap::new(),
    };
    let mut last_seq = SequenceNumber::ZERO;
    for (_, record) in &records {
        match record {
            LogRecord::Begin { txn, parent } => {
                outcomes.parents.insert(*txn, *parent);
            }
            LogRecord::Abort { txn } => {
                outcomes.aborted.insert(*txn);
            }
            LogRecord::Commit { txn, sequence } => {
                outcomes.commits.insert(*txn, *sequence);
                last_seq = last_seq.max(*sequence);
            }
            LogRecord::Checkpoint { sequence } => last_seq = last_seq.max(*sequence),
            LogRecord::Insert { .. } | LogRecord::Delete { .. } | LogRecord::Unlink { .. } => {}
        }
    }
    report.commits = outcomes.commits.len();
    report.last_seq = last_seq;

    let mut per_table: BTreeMap<String, Vec<TableRecord>> = BTreeMap::new();
    let mut unlinks: BTreeSet<String> = BTreeSet::new();
    let mut discarded: HashSet<TxnId> = HashSet::new();
    for (_, record) in records {
        let Some(txn) = record.txn() else {
            continue;
        };
        let (iname, key, value) = match record {
            LogRecord::Insert {
                iname, key, value, ..
            } => (iname, key, Some(value)),
            LogRecord::Delete { iname, key, .. } => (iname, key, None),
            LogRecord::Unlink { iname, .. } => {
                if outcomes.committed_at(txn).is_some() {
                    unlinks.insert(iname);
                } else {
                    discarded.insert(txn);
                }
                continue;
            }
            _ => continue,
        };
        match outcomes.committed_at(txn) {
            Some(seq) => per_table
                .entry(iname)
                .or_default()
                .push(TableRecord::new(seq, key, value)),
            None => {
                discarded.insert(txn);
            }
        }
    }
    report.discarded = discarded.len();

    for (iname, mut pending) in per_table {
        if unlinks.contains(&iname) {
            continue;
        }
        let path = layout.table_path(&iname);
        let table = cache.open_table(&path, cmp.clone())?;
        let applied = table.applied_seq();
        pending.retain(|record| record.sequence >= applied);
        // Stable: log order is kept among writes of one commit.
        pending.sort_by_key(|record| record.sequence);
        let count = pending.len();
        let replayed = table.replay(pending).and_then(|()| table.sync());
        cache.release(&path);
        replayed?;

        if count > 0 {
            debug!(iname, records = count, %applied, "replayed table");
        }
        report.replayed += count;
    }

    for iname in &unlinks {
        cache.remove_file(&layout.table_path(iname))?;
        report.unlinked += 1;
    }

    log.restart(last_seq)?;

    if report.replayed > 0 || report.unlinked > 0 || report.discarded > 0 {
        info!(
            last_seq = %report.last_seq,
            commits = report.commits,
            replayed = report.replayed,
            unlinked = report.unlinked,
            discarded = report.discarded,
            "recovery complete"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::EnvDirs;
    use burrow_storage::{bytewise, InMemoryBackend, ReadView, SortedTable};
    use tempfile::tempdir;

    fn insert(txn: u64, iname: &str, key: &[u8], value: &[u8]) -> LogRecord {
        LogRecord::Insert {
            txn: TxnId::new(txn),
            iname: iname.into(),
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    fn begin(txn: u64, parent: Option<u64>) -> LogRecord {
        LogRecord::Begin {
            txn: TxnId::new(txn),
            parent: parent.map(TxnId::new),
        }
    }

    fn commit(txn: u64, seq: u64) -> LogRecord {
        LogRecord::Commit {
            txn: TxnId::new(txn),
            sequence: SequenceNumber::new(seq),
        }
    }

    fn read(layout: &EnvLayout, iname: &str, key: &[u8]) -> Option<Vec<u8>> {
        let table = SortedTable::open(&layout.table_path(iname), bytewise()).unwrap();
        table.lookup(key, &ReadView::latest_committed())
    }

    #[test]
    fn replays_only_committed_work() {
        let temp = tempdir().unwrap();
        let layout = EnvDirs::new(temp.path()).resolve();
        let cache = CacheTable::new(1 << 20);
        let log = LogManager::new(Box::new(InMemoryBackend::new()));

        for record in [
            begin(1, None),
            insert(1, "t.tbl", b"kept", b"1"),
            begin(2, Some(1)),
            insert(2, "t.tbl", b"child", b"2"),
            LogRecord::Abort { txn: TxnId::new(2) },
            begin(3, Some(1)),
            insert(3, "t.tbl", b"promoted", b"3"),
            commit(1, 7),
            begin(4, None),
            insert(4, "t.tbl", b"lost", b"4"),
        ] {
            log.append(&record).unwrap();
        }

        let report = recover(&log, &cache, &layout, &bytewise()).unwrap();
        assert_eq!(report.last_seq, SequenceNumber::new(7));
        assert_eq!(report.commits, 1);
        assert_eq!(report.replayed, 2);
        assert_eq!(report.discarded, 2);
        assert_eq!(cache.open_file_count(), 0);

        assert_eq!(read(&layout, "t.tbl", b"kept").as_deref(), Some(&b"1"[..]));
        assert_eq!(read(&layout, "t.tbl", b"promoted").as_deref(), Some(&b"3"[..]));
        assert_eq!(read(&layout, "t.tbl", b"child"), None);
        assert_eq!(read(&layout, "t.tbl", b"lost"), None);

        let remaining = log.read_all().unwrap();
        assert_eq!(
            remaining[0].1,
            LogRecord::Checkpoint {
                sequence: SequenceNumber::new(7)
            }
        );
    }

    #[test]
    fn recovery_is_idempotent() {
        let temp = tempdir().unwrap();
        let layout = EnvDirs::new(temp.path()).resolve();
        let cache = CacheTable::new(1 << 20);
        let log = LogManager::new(Box::new(InMemoryBackend::new()));
        log.append(&begin(1, None)).unwrap();
        log.append(&insert(1, "t.tbl", b"k", b"v")).unwrap();
        log.append(&commit(1, 1)).unwrap();

        recover(&log, &cache, &layout, &bytewise()).unwrap();
        let again = recover(&log, &cache, &layout, &bytewise()).unwrap();
        assert_eq!(again.replayed, 0);
        assert_eq!(again.last_seq, SequenceNumber::new(1));
        assert_eq!(read(&layout, "t.tbl", b"k").as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn committed_unlink_removes_the_file() {
        let temp = tempdir().unwrap();
        let layout = EnvDirs::new(temp.path()).resolve();
        let cache = CacheTable::new(1 << 20);
        std::fs::write(layout.table_path("gone.tbl"), b"").unwrap();
        std::fs::write(layout.table_path("kept.tbl"), b"").unwrap();

        let log = LogManager::new(Box::new(InMemoryBackend::new()));
        for record in [
            begin(1, None),
            LogRecord::Unlink {
                txn: TxnId::new(1),
                iname: "gone.tbl".into(),
            },
            commit(1, 3),
            begin(2, None),
            LogRecord::Unlink {
                txn: TxnId::new(2),
                iname: "kept.tbl".into(),
            },
        ] {
            log.append(&record).unwrap();
        }

        let report = recover(&log, &cache, &layout, &bytewise()).unwrap();
        assert_eq!(report.unlinked, 1);
        assert!(!layout.table_path("gone.tbl").exists());
        assert!(layout.table_path("kept.tbl").exists());
    }
}
