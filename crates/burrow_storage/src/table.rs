//! Multi-version sorted tables.
//!
//! A [`SortedTable`] keeps, per key, a stack of committed versions (each
//! tagged with its commit sequence) and a stack of provisional versions
//! (each tagged with the transaction that wrote it). Which version a reader
//! sees is decided by its [`ReadView`].
//!
//! Only committed versions reach the table file. Provisional versions live
//! in memory until the control layer calls [`SortedTable::commit`],
//! [`SortedTable::promote`] or [`SortedTable::rollback`].
//!
//! The table does no locking of its own beyond its internal `RwLock`:
//! deciding who may write a key is the lock manager's job. In particular the
//! table assumes that provisional versions of one key all belong to one
//! transaction lineage at a time.

use crate::backend::StorageBackend;
use crate::compare::KeyComparator;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use crate::record::TableRecord;
use crate::types::{SequenceNumber, TxnId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which committed versions a reader may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The newest version of any kind, including other transactions'
    /// provisional writes.
    Uncommitted,
    /// The reader's own provisional writes, else the newest committed version.
    LatestCommitted,
    /// The reader's own provisional writes, else the newest version committed
    /// at or before the given sequence.
    Snapshot(SequenceNumber),
}

/// A reader's point of view: a visibility rule plus the transaction lineage
/// (the reader first, then its ancestors) whose provisional writes count as
/// its own.
#[derive(Debug, Clone, Copy)]
pub struct ReadView<'a> {
    /// Visibility rule.
    pub visibility: Visibility,
    /// Reader and ancestors, innermost first.
    pub lineage: &'a [TxnId],
}

impl ReadView<'static> {
    /// A view of committed data only, outside any transaction.
    #[must_use]
    pub const fn latest_committed() -> Self {
        Self {
            visibility: Visibility::LatestCommitted,
            lineage: &[],
        }
    }
}

impl<'a> ReadView<'a> {
    /// Creates a view.
    #[must_use]
    pub const fn new(visibility: Visibility, lineage: &'a [TxnId]) -> Self {
        Self {
            visibility,
            lineage,
        }
    }
}

/// Where a positioning request lands.
#[derive(Debug, Clone, Copy)]
pub enum Seek<'k> {
    /// Smallest visible key.
    First,
    /// Largest visible key.
    Last,
    /// Smallest visible key strictly greater than the given one.
    After(&'k [u8]),
    /// Largest visible key strictly smaller than the given one.
    Before(&'k [u8]),
    /// Exactly the given key.
    Exact(&'k [u8]),
    /// Smallest visible key greater than or equal to the given one.
    AtLeast(&'k [u8]),
}

/// Reusable key/value buffers filled by positioning calls.
#[derive(Debug, Default, Clone)]
pub struct RecordBuf {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl RecordBuf {
    /// Creates empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites both buffers, keeping their allocations.
    pub fn fill(&mut self, key: &[u8], value: &[u8]) {
        self.key.clear();
        self.key.extend_from_slice(key);
        self.value.clear();
        self.value.extend_from_slice(value);
    }

    /// The last materialized key.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The last materialized value.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Both buffers as borrowed views.
    #[must_use]
    pub fn pair(&self) -> (&[u8], &[u8]) {
        (&self.key, &self.value)
    }
}

#[derive(Debug)]
struct Committed {
    seq: SequenceNumber,
    value: Option<Vec<u8>>,
}

#[derive(Debug)]
struct Provisional {
    txn: TxnId,
    value: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Versions {
    /// Ascending by sequence.
    committed: Vec<Committed>,
    /// Outermost writer first.
    provisional: Vec<Provisional>,
}

impl Versions {
    fn visible(&self, view: &ReadView<'_>) -> Option<&[u8]> {
        let chosen = match view.visibility {
            Visibility::Uncommitted => self
                .provisional
                .last()
                .map(|p| &p.value)
                .or_else(|| self.committed.last().map(|c| &c.value)),
            Visibility::LatestCommitted | Visibility::Snapshot(_) => {
                let own = self
                    .provisional
                    .iter()
                    .rev()
                    .find(|p| view.lineage.contains(&p.txn))
                    .map(|p| &p.value);
                own.or_else(|| match view.visibility {
                    Visibility::Snapshot(at) => self
                        .committed
                        .iter()
                        .rev()
                        .find(|c| c.seq <= at)
                        .map(|c| &c.value),
                    _ => self.committed.last().map(|c| &c.value),
                })
            }
        };
        chosen.and_then(|value| value.as_deref())
    }

    /// Drops committed versions no live snapshot can reach.
    fn prune(&mut self, oldest_snapshot: Option<SequenceNumber>) {
        let keep_from = match oldest_snapshot {
            Some(at) => self
                .committed
                .iter()
                .rposition(|c| c.seq <= at)
                .unwrap_or(0),
            None => self.committed.len().saturating_sub(1),
        };
        self.committed.drain(..keep_from);

        let lone_tombstone = matches!(self.committed.as_slice(), [only] if only.value.is_none());
        if oldest_snapshot.is_none() && lone_tombstone && self.provisional.is_empty() {
            self.committed.clear();
        }
    }

    fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.provisional.is_empty()
    }
}

#[derive(Debug)]
struct Entry {
    key: Vec<u8>,
    versions: Versions,
}

struct TableState {
    /// Sorted by the table comparator.
    entries: Vec<Entry>,
    /// Keys carrying provisional versions, per writer.
    owned: HashMap<TxnId, HashSet<Vec<u8>>>,
    applied_seq: SequenceNumber,
    backend: Box<dyn StorageBackend>,
}

/// A sorted, multi-version key/value table.
pub struct SortedTable {
    path: Option<PathBuf>,
    cmp: KeyComparator,
    state: RwLock<TableState>,
}

fn search(cmp: &KeyComparator, entries: &[Entry], key: &[u8]) -> Result<usize, usize> {
    entries.binary_search_by(|entry| cmp(&entry.key, key))
}

impl SortedTable {
    /// Opens the table file at `path`, loading every committed record.
    ///
    /// A torn record at the end of the file (a crash mid-append) is cut
    /// off. Any other damage is an error.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a damaged record.
    pub fn open(path: &Path, cmp: KeyComparator) -> StorageResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        Self::from_backend(Some(path.to_path_buf()), Box::new(backend), cmp)
    }

    /// Creates an empty table that is never written to disk.
    #[must_use]
    pub fn in_memory(cmp: KeyComparator) -> Self {
        Self {
            path: None,
            cmp,
            state: RwLock::new(TableState {
                entries: Vec::new(),
                owned: HashMap::new(),
                applied_seq: SequenceNumber::ZERO,
                backend: Box::new(InMemoryBackend::new()),
            }),
        }
    }

    /// Loads a table from an arbitrary byte store.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a damaged record.
    pub fn from_backend(
        path: Option<PathBuf>,
        mut backend: Box<dyn StorageBackend>,
        cmp: KeyComparator,
    ) -> StorageResult<Self> {
        let size = backend.size()?;
        let mut offset = 0u64;
        let mut records = Vec::new();

        while offset < size {
            if size - offset < 4 {
                break;
            }
            let header = backend.read_at(offset, 4)?;
            let len = TableRecord::peek_len(&header)
                .ok_or_else(|| StorageError::corrupted("unreadable record length"))?;
            if len < TableRecord::HEADER_SIZE + TableRecord::CRC_SIZE {
                return Err(StorageError::corrupted(format!(
                    "record at offset {offset} claims {len} bytes"
                )));
            }
            if offset + len as u64 > size {
                break;
            }
            let data = backend.read_at(offset, len)?;
            records.push(TableRecord::decode(&data)?);
            offset += len as u64;
        }

        if offset < size {
            warn!(
                path = ?path,
                torn_bytes = size - offset,
                "discarding torn record at end of table file"
            );
            backend.truncate(offset)?;
        }

        let applied_seq = records
            .iter()
            .map(|r| r.sequence)
            .max()
            .unwrap_or(SequenceNumber::ZERO);

        // Stable sort keeps file (commit) order among versions of one key.
        records.sort_by(|a, b| cmp(&a.key, &b.key));
        let mut entries: Vec<Entry> = Vec::new();
        for record in records {
            let sequence = record.sequence;
            let same_key = entries
                .last()
                .is_some_and(|last| cmp(&last.key, &record.key).is_eq());
            if !same_key {
                entries.push(Entry {
                    key: record.key.clone(),
                    versions: Versions::default(),
                });
            }
            if let Some(last) = entries.last_mut() {
                last.versions.committed.push(Committed {
                    seq: sequence,
                    value: record.into_value(),
                });
            }
        }
        for entry in &mut entries {
            entry.versions.prune(None);
        }
        entries.retain(|e| !e.versions.is_empty());

        debug!(path = ?path, keys = entries.len(), %applied_seq, "table loaded");

        Ok(Self {
            path,
            cmp,
            state: RwLock::new(TableState {
                entries,
                owned: HashMap::new(),
                applied_seq,
                backend,
            }),
        })
    }

    /// The table file, if the table is persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The comparator ordering this table.
    #[must_use]
    pub fn comparator(&self) -> &KeyComparator {
        &self.cmp
    }

    /// Sequence of the newest commit persisted in this table.
    #[must_use]
    pub fn applied_seq(&self) -> SequenceNumber {
        self.state.read().applied_seq
    }

    /// Returns the value of `key` visible to `view`.
    #[must_use]
    pub fn lookup(&self, key: &[u8], view: &ReadView<'_>) -> Option<Vec<u8>> {
        let state = self.state.read();
        let idx = search(&self.cmp, &state.entries, key).ok()?;
        state.entries[idx].versions.visible(view).map(<[u8]>::to_vec)
    }

    /// Positions on the record selected by `seek` and copies it into `out`.
    ///
    /// Returns `false`, leaving `out` untouched, if no visible record matches.
    pub fn position(&self, seek: Seek<'_>, view: &ReadView<'_>, out: &mut RecordBuf) -> bool {
        let state = self.state.read();
        let entries = &state.entries;
        let visible = |i: usize| entries[i].versions.visible(view).map(|v| (i, v));

        let found = match seek {
            Seek::First => (0..entries.len()).find_map(visible),
            Seek::Last => (0..entries.len()).rev().find_map(visible),
            Seek::After(key) => {
                let start = match search(&self.cmp, entries, key) {
                    Ok(i) => i + 1,
                    Err(i) => i,
                };
                (start..entries.len()).find_map(visible)
            }
            Seek::AtLeast(key) => {
                let start = search(&self.cmp, entries, key).unwrap_or_else(|i| i);
                (start..entries.len()).find_map(visible)
            }
            Seek::Before(key) => {
                let end = search(&self.cmp, entries, key).unwrap_or_else(|i| i);
                (0..end).rev().find_map(visible)
            }
            Seek::Exact(key) => search(&self.cmp, entries, key).ok().and_then(visible),
        };

        match found {
            Some((i, value)) => {
                out.fill(&entries[i].key, value);
                true
            }
            None => false,
        }
    }

    /// Records a provisional write of `key` by `txn`; `None` deletes.
    ///
    /// A second write by the same transaction replaces its first.
    pub fn write(&self, txn: TxnId, key: &[u8], value: Option<Vec<u8>>) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let idx = match search(&self.cmp, &state.entries, key) {
            Ok(i) => i,
            Err(i) => {
                state.entries.insert(
                    i,
                    Entry {
                        key: key.to_vec(),
                        versions: Versions::default(),
                    },
                );
                i
            }
        };

        let provisional = &mut state.entries[idx].versions.provisional;
        match provisional.last_mut() {
            Some(top) if top.txn == txn => top.value = value,
            _ => provisional.push(Provisional { txn, value }),
        }
        state.owned.entry(txn).or_default().insert(key.to_vec());
    }

    /// Whether `txn` holds provisional writes here.
    #[must_use]
    pub fn has_provisional(&self, txn: TxnId) -> bool {
        self.state.read().owned.contains_key(&txn)
    }

    /// Turns every provisional write of `txn` into a committed version at
    /// `seq` and appends those versions to the table file.
    ///
    /// Versions older than what `oldest_snapshot` can still read are dropped
    /// from memory. Returns the number of keys committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table file cannot be written; memory is left
    /// unchanged in that case.
    pub fn commit(
        &self,
        txn: TxnId,
        seq: SequenceNumber,
        oldest_snapshot: Option<SequenceNumber>,
    ) -> StorageResult<usize> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(keys) = state.owned.get(&txn) else {
            return Ok(0);
        };

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Ok(idx) = search(&self.cmp, &state.entries, key) else {
                continue;
            };
            let versions = &state.entries[idx].versions;
            if let Some(p) = versions.provisional.iter().rev().find(|p| p.txn == txn) {
                records.push(TableRecord::new(seq, key.clone(), p.value.clone()));
            }
        }

        let mut encoded = Vec::new();
        for record in &records {
            encoded.extend_from_slice(&record.encode()?);
        }
        if !encoded.is_empty() {
            state.backend.append(&encoded)?;
            state.backend.flush()?;
        }

        state.owned.remove(&txn);
        let committed = records.len();
        for record in records {
            let Ok(idx) = search(&self.cmp, &state.entries, &record.key) else {
                continue;
            };
            let versions = &mut state.entries[idx].versions;
            versions.provisional.retain(|p| p.txn != txn);
            versions.committed.push(Committed {
                seq,
                value: record.into_value(),
            });
            versions.prune(oldest_snapshot);
            if versions.is_empty() {
                state.entries.remove(idx);
            }
        }
        state.applied_seq = state.applied_seq.max(seq);
        Ok(committed)
    }

    /// Re-tags the provisional writes of `child` as writes of `parent`.
    ///
    /// Where the parent had already written a key, the child's version
    /// replaces it.
    pub fn promote(&self, child: TxnId, parent: TxnId) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(keys) = state.owned.remove(&child) else {
            return;
        };

        for key in &keys {
            let Ok(idx) = search(&self.cmp, &state.entries, key) else {
                continue;
            };
            let provisional = &mut state.entries[idx].versions.provisional;
            if let Some(pos) = provisional.iter().rposition(|p| p.txn == child) {
                let mut promoted = provisional.remove(pos);
                provisional.retain(|p| p.txn != parent && p.txn != child);
                promoted.txn = parent;
                provisional.push(promoted);
            }
        }
        state.owned.entry(parent).or_default().extend(keys);
    }

    /// Discards every provisional write of `txn`. Returns the number of keys
    /// rolled back.
    pub fn rollback(&self, txn: TxnId) -> usize {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(keys) = state.owned.remove(&txn) else {
            return 0;
        };

        for key in &keys {
            let Ok(idx) = search(&self.cmp, &state.entries, key) else {
                continue;
            };
            let versions = &mut state.entries[idx].versions;
            versions.provisional.retain(|p| p.txn != txn);
            if versions.is_empty() {
                state.entries.remove(idx);
            }
        }
        keys.len()
    }

    /// Installs committed records recovered from the log.
    ///
    /// The caller passes only records newer than [`SortedTable::applied_seq`],
    /// in commit order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table file cannot be written.
    pub fn replay(&self, records: Vec<TableRecord>) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut guard = self.state.write();
        let state = &mut *guard;

        let mut encoded = Vec::new();
        for record in &records {
            encoded.extend_from_slice(&record.encode()?);
        }
        state.backend.append(&encoded)?;
        state.backend.flush()?;

        for record in records {
            let seq = record.sequence;
            let idx = match search(&self.cmp, &state.entries, &record.key) {
                Ok(i) => i,
                Err(i) => {
                    state.entries.insert(
                        i,
                        Entry {
                            key: record.key.clone(),
                            versions: Versions::default(),
                        },
                    );
                    i
                }
            };
            let versions = &mut state.entries[idx].versions;
            versions.committed.push(Committed {
                seq,
                value: record.into_value(),
            });
            versions.prune(None);
            if versions.is_empty() {
                state.entries.remove(idx);
            }
            state.applied_seq = state.applied_seq.max(seq);
        }
        Ok(())
    }

    /// Counts the keys visible to `view`.
    #[must_use]
    pub fn count(&self, view: &ReadView<'_>) -> usize {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.versions.visible(view).is_some())
            .count()
    }

    /// Forces the table file to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.state.write().backend.sync()
    }
}

impl fmt::Debug for SortedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("SortedTable")
            .field("path", &self.path)
            .field("keys", &state.entries.len())
            .field("applied_seq", &state.applied_seq)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::bytewise;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    const T1: TxnId = TxnId(1);
    const T2: TxnId = TxnId(2);

    fn committed(table: &SortedTable, key: &[u8]) -> Option<Vec<u8>> {
        table.lookup(key, &ReadView::latest_committed())
    }

    #[test]
    fn provisional_write_is_private_until_commit() {
        let table = SortedTable::in_memory(bytewise());
        table.write(T1, b"a", Some(b"1".to_vec()));

        let own = [T1];
        let other = [T2];
        assert_eq!(
            table.lookup(b"a", &ReadView::new(Visibility::LatestCommitted, &own)),
            Some(b"1".to_vec())
        );
        assert_eq!(
            table.lookup(b"a", &ReadView::new(Visibility::LatestCommitted, &other)),
            None
        );
        assert_eq!(
            table.lookup(b"a", &ReadView::new(Visibility::Uncommitted, &other)),
            Some(b"1".to_vec())
        );

        assert_eq!(table.commit(T1, SequenceNumber::new(1), None).unwrap(), 1);
        assert_eq!(committed(&table, b"a"), Some(b"1".to_vec()));
        assert!(!table.has_provisional(T1));
    }

    #[test]
    fn rollback_discards_writes() {
        let table = SortedTable::in_memory(bytewise());
        table.write(T1, b"a", Some(b"1".to_vec()));
        table.commit(T1, SequenceNumber::new(1), None).unwrap();

        table.write(T2, b"a", None);
        table.write(T2, b"b", Some(b"2".to_vec()));
        assert_eq!(table.rollback(T2), 2);

        assert_eq!(committed(&table, b"a"), Some(b"1".to_vec()));
        assert_eq!(committed(&table, b"b"), None);
        assert_eq!(table.count(&ReadView::latest_committed()), 1);
    }

    #[test]
    fn snapshot_sees_versions_at_or_before_its_sequence() {
        let table = SortedTable::in_memory(bytewise());
        table.write(T1, b"k", Some(b"old".to_vec()));
        table.commit(T1, SequenceNumber::new(1), None).unwrap();
        table.write(T2, b"k", Some(b"new".to_vec()));
        table
            .commit(T2, SequenceNumber::new(2), Some(SequenceNumber::new(1)))
            .unwrap();

        let view = ReadView::new(Visibility::Snapshot(SequenceNumber::new(1)), &[]);
        assert_eq!(table.lookup(b"k", &view), Some(b"old".to_vec()));
        assert_eq!(committed(&table, b"k"), Some(b"new".to_vec()));
    }

    #[test]
    fn promote_hands_writes_to_parent() {
        let table = SortedTable::in_memory(bytewise());
        let parent = TxnId(10);
        let child = TxnId(11);
        table.write(parent, b"k", Some(b"p".to_vec()));
        table.write(child, b"k", Some(b"c".to_vec()));
        table.write(child, b"only-child", Some(b"x".to_vec()));

        table.promote(child, parent);
        assert!(!table.has_provisional(child));

        let lineage = [parent];
        let view = ReadView::new(Visibility::LatestCommitted, &lineage);
        assert_eq!(table.lookup(b"k", &view), Some(b"c".to_vec()));

        assert_eq!(table.rollback(parent), 2);
        assert_eq!(table.count(&ReadView::latest_committed()), 0);
    }

    #[test]
    fn positioning_skips_deleted_keys() {
        let table = SortedTable::in_memory(bytewise());
        for key in [b"a", b"b", b"c", b"d"] {
            table.write(T1, key, Some(key.to_vec()));
        }
        table.commit(T1, SequenceNumber::new(1), None).unwrap();
        table.write(T2, b"b", None);

        let lineage = [T2];
        let view = ReadView::new(Visibility::LatestCommitted, &lineage);
        let mut buf = RecordBuf::new();

        assert!(table.position(Seek::After(b"a"), &view, &mut buf));
        assert_eq!(buf.key(), b"c");
        assert!(table.position(Seek::Before(b"c"), &view, &mut buf));
        assert_eq!(buf.key(), b"a");
        assert!(table.position(Seek::AtLeast(b"bb"), &view, &mut buf));
        assert_eq!(buf.key(), b"c");
        assert!(!table.position(Seek::Exact(b"b"), &view, &mut buf));
        assert!(table.position(Seek::Last, &view, &mut buf));
        assert_eq!(buf.pair(), (&b"d"[..], &b"d"[..]));
        assert!(!table.position(Seek::After(b"d"), &view, &mut buf));
        assert_eq!(buf.key(), b"d");
    }

    #[test]
    fn custom_comparator_orders_entries() {
        let reverse: KeyComparator = std::sync::Arc::new(|a: &[u8], b: &[u8]| b.cmp(a));
        let table = SortedTable::in_memory(reverse);
        table.write(T1, b"a", Some(vec![]));
        table.write(T1, b"z", Some(vec![]));
        table.commit(T1, SequenceNumber::new(1), None).unwrap();

        let mut buf = RecordBuf::new();
        assert!(table.position(Seek::First, &ReadView::latest_committed(), &mut buf));
        assert_eq!(buf.key(), b"z");
    }

    #[test]
    fn committed_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        {
            let table = SortedTable::open(&path, bytewise()).unwrap();
            table.write(T1, b"keep", Some(b"v1".to_vec()));
            table.write(T1, b"drop", Some(b"x".to_vec()));
            table.commit(T1, SequenceNumber::new(4), None).unwrap();
            table.write(T2, b"drop", None);
            table.write(T2, b"keep", Some(b"v2".to_vec()));
            table.commit(T2, SequenceNumber::new(5), None).unwrap();
            table.write(TxnId(3), b"never", Some(b"x".to_vec()));
        }

        let table = SortedTable::open(&path, bytewise()).unwrap();
        assert_eq!(table.applied_seq(), SequenceNumber::new(5));
        assert_eq!(committed(&table, b"keep"), Some(b"v2".to_vec()));
        assert_eq!(committed(&table, b"drop"), None);
        assert_eq!(committed(&table, b"never"), None);
    }

    #[test]
    fn torn_tail_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        {
            let table = SortedTable::open(&path, bytewise()).unwrap();
            table.write(T1, b"k", Some(b"v".to_vec()));
            table.commit(T1, SequenceNumber::new(1), None).unwrap();
        }
        let whole = std::fs::metadata(&path).unwrap().len();
        let torn = TableRecord::new(SequenceNumber::new(2), b"k2".to_vec(), Some(b"v2".to_vec()))
            .encode()
            .unwrap();
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&torn[..torn.len() - 3]).unwrap();
        }

        let table = SortedTable::open(&path, bytewise()).unwrap();
        assert_eq!(committed(&table, b"k"), Some(b"v".to_vec()));
        assert_eq!(committed(&table, b"k2"), None);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), whole);
    }

    #[test]
    fn replay_installs_recovered_records() {
        let backend = InMemoryBackend::new();
        let table =
            SortedTable::from_backend(None, Box::new(backend.clone()), bytewise()).unwrap();
        table
            .replay(vec![
                TableRecord::new(SequenceNumber::new(7), b"a".to_vec(), Some(b"1".to_vec())),
                TableRecord::new(SequenceNumber::new(8), b"a".to_vec(), None),
                TableRecord::new(SequenceNumber::new(8), b"b".to_vec(), Some(b"2".to_vec())),
            ])
            .unwrap();
        assert_eq!(table.applied_seq(), SequenceNumber::new(8));
        assert_eq!(committed(&table, b"a"), None);

        let reopened = SortedTable::from_backend(None, Box::new(backend), bytewise()).unwrap();
        assert_eq!(committed(&reopened, b"b"), Some(b"2".to_vec()));
        assert_eq!(reopened.applied_seq(), SequenceNumber::new(8));
    }

    proptest! {
        #[test]
        fn committed_state_matches_model(
            ops in prop::collection::vec(
                (prop::collection::vec(0u8..4, 1..3), prop::option::of(any::<u8>()), any::<bool>()),
                1..40,
            )
        ) {
            let table = SortedTable::in_memory(bytewise());
            let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

            for (i, (key, value, keep)) in ops.into_iter().enumerate() {
                let txn = TxnId(i as u64 + 1);
                table.write(txn, &key, value.map(|v| vec![v]));
                if keep {
                    table.commit(txn, SequenceNumber::new(i as u64 + 1), None).unwrap();
                    match value {
                        Some(v) => { model.insert(key, vec![v]); }
                        None => { model.remove(&key); }
                    }
                } else {
                    table.rollback(txn);
                }
            }

            let view = ReadView::latest_committed();
            prop_assert_eq!(table.count(&view), model.len());
            let mut buf = RecordBuf::new();
            let mut found = table.position(Seek::First, &view, &mut buf);
            for (key, value) in &model {
                prop_assert!(found);
                prop_assert_eq!(buf.key(), key.as_slice());
                prop_assert_eq!(buf.value(), value.as_slice());
                let current = buf.key().to_vec();
                found = table.position(Seek::After(&current), &view, &mut buf);
            }
            prop_assert!(!found);
        }
    }
}
