//! # Burrow Core
//!
//! The transactional control layer of BurrowDB.
//!
//! This crate provides:
//! - [`Environment`]: directories, locking, recovery, the persistent
//!   directory and settings tables, the space poller and the panic latch
//! - [`Db`]: handles on named tables
//! - [`Txn`]: nested transactions with four isolation levels
//! - [`Cursor`]: ordered access with range locking
//! - [`LockManager`]: per-table key range locks
//!
//! ## Example
//!
//! ```rust,no_run
//! use burrow_core::{CommitFlags, Config, Db, DbFlags, EnvDirs, EnvFlags, Environment, PutFlags, TxnFlags};
//!
//! let env = Environment::open(EnvDirs::new("/tmp/burrow"), EnvFlags::TRANSACTIONAL, Config::new())?;
//! let mut users = Db::create(&env);
//! users.open(None, "users", DbFlags::CREATE)?;
//!
//! let txn = env.txn_begin(None, TxnFlags::NONE)?;
//! users.put(Some(&txn), b"alice", b"admin", PutFlags::NONE)?;
//! txn.commit(CommitFlags::NONE)?;
//!
//! assert_eq!(users.get(None, b"alice")?, b"admin");
//! users.close()?;
//! env.close()?;
//! # Ok::<(), burrow_core::EnvError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod cursor;
mod db;
mod dir;
mod env;
mod error;
mod flags;
mod locks;
mod panic;
mod recovery;
mod registry;
mod rows;
mod space;
mod stats;
mod txn;
mod types;
mod wal;

pub use catalog::Settings;
pub use config::{Config, DelRowFn, ErrCall, PutRowFn, UpdateAction, UpdateFn};
pub use cursor::Cursor;
pub use db::{Db, IndexBuild};
pub use dir::{DirLocks, EnvDirs, EnvLayout};
pub use env::Environment;
pub use error::{status, status_of, EnvError, EnvResult};
pub use flags::{CommitFlags, CursorFlags, DbFlags, EnvFlags, PutFlags, TxnFlags};
pub use locks::{Bound, HeldLock, KeyRange, LockManager, LockMode};
pub use panic::{ErrorSink, PanicLatch};
pub use recovery::RecoveryReport;
pub use registry::HandleRegistry;
pub use space::{Fs2Probe, SpaceMonitor, SpacePoller, SpaceProbe, SpaceSample, SpaceState, SpaceStatus};
pub use stats::{EngineStatus, StatusSnapshot};
pub use txn::Txn;
pub use types::{DictionaryId, HandleId, Isolation, SequenceNumber, TxnId};
pub use wal::{LogManager, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};

pub use burrow_storage::{bytewise, KeyComparator};
