//! Error types and status codes for the control layer.
//!
//! Every public operation returns an [`EnvResult`]. Callers that need the
//! numeric status of the classic key/value API use [`EnvError::status`] or
//! [`status_of`]; `0` always means success.

use crate::types::DictionaryId;
use burrow_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for control-layer operations.
pub type EnvResult<T> = Result<T, EnvError>;

/// Numeric status codes.
pub mod status {
    /// No such file or table.
    pub const ENOENT: i32 = 2;
    /// I/O failure without a more specific operating-system code.
    pub const EIO: i32 = 5;
    /// Resource temporarily unavailable (directory already locked).
    pub const EWOULDBLOCK: i32 = 11;
    /// Table already exists.
    pub const EEXIST: i32 = 17;
    /// Invalid argument, illegal operation, or panicked environment.
    pub const EINVAL: i32 = 22;
    /// Writes refused because file system space is critically low.
    pub const ENOSPC: i32 = 28;
    /// Key already present with no-overwrite requested.
    pub const DB_KEYEXIST: i32 = -30996;
    /// A lock could not be granted.
    pub const DB_LOCK_NOTGRANTED: i32 = -30994;
    /// Key not found.
    pub const DB_NOTFOUND: i32 = -30989;
}

/// Errors returned by environments, tables, transactions and cursors.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Unknown flags, an operation on a closed handle, or work attempted
    /// where it is not allowed.
    #[error("invalid operation: {message}")]
    Invalid {
        /// What was wrong.
        message: String,
    },

    /// The environment has panicked and accepts no further work.
    #[error("environment panicked: {message}")]
    Panicked {
        /// The message recorded when the environment panicked.
        message: String,
    },

    /// The key does not exist.
    #[error("key not found")]
    NotFound,

    /// The key exists and overwriting was not allowed.
    #[error("key already exists")]
    KeyExists,

    /// Another transaction holds a conflicting lock.
    #[error("lock not granted on dictionary {dictionary}")]
    LockConflict {
        /// The dictionary the lock was requested on.
        dictionary: DictionaryId,
    },

    /// A write was refused because file system space is critically low.
    #[error("no space: {operation} refused while file system space is critical")]
    NoSpace {
        /// The refused operation.
        operation: String,
    },

    /// A table with this name already exists.
    #[error("table already exists: {name}")]
    Exists {
        /// The table name.
        name: String,
    },

    /// No table, directory or file with this name exists.
    #[error("no such table or directory: {name}")]
    NoEntry {
        /// The missing name.
        name: String,
    },

    /// Another process holds one of the environment's directory locks.
    #[error("environment locked by another process: {}", path.display())]
    EnvironmentLocked {
        /// The lock file that could not be locked.
        path: PathBuf,
    },

    /// The environment on disk was created with incompatible settings.
    #[error("incompatible environment: {message}")]
    Incompatible {
        /// What did not match.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage engine error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The log holds a record that cannot be decoded.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the damage.
        message: String,
    },
}

impl EnvError {
    /// Creates an invalid-operation error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Creates a missing-name error.
    pub fn no_entry(name: impl Into<String>) -> Self {
        Self::NoEntry { name: name.into() }
    }

    /// Creates an already-exists error.
    pub fn exists(name: impl Into<String>) -> Self {
        Self::Exists { name: name.into() }
    }

    /// Creates an incompatibility error.
    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::Incompatible {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Returns the numeric status for this error.
    #[must_use]
    pub fn status(&self) -> i32 {
        match self {
            Self::Invalid { .. } | Self::Panicked { .. } | Self::Incompatible { .. } => {
                status::EINVAL
            }
            Self::NotFound => status::DB_NOTFOUND,
            Self::KeyExists => status::DB_KEYEXIST,
            Self::LockConflict { .. } => status::DB_LOCK_NOTGRANTED,
            Self::NoSpace { .. } => status::ENOSPC,
            Self::Exists { .. } => status::EEXIST,
            Self::NoEntry { .. } => status::ENOENT,
            Self::EnvironmentLocked { .. } => status::EWOULDBLOCK,
            Self::Io(err) => err.raw_os_error().unwrap_or(status::EIO),
            Self::Storage(err) => err.raw_os_error().unwrap_or(status::EIO),
            Self::LogCorruption { .. } => status::EIO,
        }
    }

    /// Whether this is the ordinary "no such key" outcome, which is never
    /// reported as an anomaly.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Returns `0` for success or the error's status.
#[must_use]
pub fn status_of<T>(result: &EnvResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_and_panic_share_einval() {
        assert_eq!(EnvError::invalid("x").status(), status::EINVAL);
        let panicked = EnvError::Panicked {
            message: "log write failed".into(),
        };
        assert_eq!(panicked.status(), status::EINVAL);
    }

    #[test]
    fn io_errors_keep_os_errno() {
        let err = EnvError::from(io::Error::from_raw_os_error(13));
        assert_eq!(err.status(), 13);

        let opaque = EnvError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(opaque.status(), status::EIO);
    }

    #[test]
    fn status_of_success_is_zero() {
        let ok: EnvResult<u8> = Ok(1);
        let missing: EnvResult<u8> = Err(EnvError::NotFound);
        assert_eq!(status_of(&ok), 0);
        assert_eq!(status_of(&missing), status::DB_NOTFOUND);
        assert!(EnvError::NotFound.is_not_found());
    }

    #[test]
    fn messages_name_the_subject() {
        let err = EnvError::LockConflict {
            dictionary: DictionaryId::new(4),
        };
        assert_eq!(err.to_string(), "lock not granted on dictionary dict:4");
        assert_eq!(
            EnvError::no_entry("orders").to_string(),
            "no such table or directory: orders"
        );
    }
}
