//! Write-ahead log.
//!
//! Every provisional write is logged before it reaches a table, and a root
//! commit is durable once its `Commit` record is flushed. Table files are
//! written at commit, so after a crash the log holds at most the commits
//! whose table appends did not finish; recovery replays exactly those.
//!
//! ## Record Format
//!
//! ```text
//! | magic "BLOG" (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery Policy
//!
//! - A record cut short at the end of the log is a crash mid-append: it is
//!   discarded and the log truncated before it.
//! - A checksum mismatch, bad magic, unknown type or newer version is
//!   corruption and the environment does not open.
//!
//! After recovery and at every checkpoint the log is emptied and restarted
//! with a single `Checkpoint` record.

mod record;
mod writer;

pub use record::{LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub use writer::LogManager;
