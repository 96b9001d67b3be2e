//! # Burrow Storage
//!
//! The storage collaborators consumed by the BurrowDB control layer.
//!
//! This crate knows nothing about environments, locks or isolation
//! policy. It provides:
//!
//! - [`StorageBackend`]: an opaque append-only byte store, with
//!   [`FileBackend`] and [`InMemoryBackend`] implementations
//! - [`SortedTable`]: a multi-version sorted key/value table. Writes are
//!   *provisional* (tagged with the writing transaction) until the control
//!   layer commits, promotes or rolls them back
//! - [`CacheTable`]: the process-wide registry of open table files
//!
//! ## Example
//!
//! ```rust
//! use burrow_storage::{ReadView, SortedTable, TxnId, SequenceNumber, bytewise};
//!
//! let table = SortedTable::in_memory(bytewise());
//! let txn = TxnId::new(7);
//! table.write(txn, b"k", Some(b"v".to_vec()));
//! table.commit(txn, SequenceNumber::new(1), None).unwrap();
//!
//! let value = table.lookup(b"k", &ReadView::latest_committed());
//! assert_eq!(value.as_deref(), Some(&b"v"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cachetable;
mod checksum;
mod compare;
mod error;
mod file;
mod memory;
mod record;
mod table;
mod types;

pub use backend::StorageBackend;
pub use cachetable::CacheTable;
pub use checksum::compute_crc32;
pub use compare::{bytewise, KeyComparator};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use record::{RecordFlags, TableRecord};
pub use table::{ReadView, RecordBuf, Seek, SortedTable, Visibility};
pub use types::{SequenceNumber, TxnId};
