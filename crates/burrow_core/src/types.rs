//! Core type definitions.

use std::fmt;

pub use burrow_storage::{SequenceNumber, TxnId};

/// Stable integer naming one table to the lock manager.
///
/// Assigned per internal file name for the life of an environment, so
/// renaming a table never invalidates the locks taken on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DictionaryId(pub u64);

impl DictionaryId {
    /// Creates a dictionary id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DictionaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dict:{}", self.0)
    }
}

/// Identity of one open table handle.
///
/// Breaks ties between handles on the same table name in the open-handle
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(pub u64);

impl HandleId {
    /// Creates a handle id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db:{}", self.0)
    }
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Isolation {
    /// Reads take range locks; no phantoms, no lost updates.
    Serializable,
    /// Reads see the committed state as of the transaction's start.
    Snapshot,
    /// Reads see the latest committed version; no read locks are kept.
    ReadCommitted,
    /// Reads see the newest version, committed or not.
    ReadUncommitted,
}

impl Isolation {
    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Serializable => "serializable",
            Self::Snapshot => "snapshot",
            Self::ReadCommitted => "read-committed",
            Self::ReadUncommitted => "read-uncommitted",
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display() {
        assert_eq!(DictionaryId::new(3).to_string(), "dict:3");
        assert_eq!(HandleId::new(9).to_string(), "db:9");
        assert_eq!(Isolation::ReadCommitted.to_string(), "read-committed");
    }

    #[test]
    fn handle_ids_order_numerically() {
        assert!(HandleId::new(2) < HandleId::new(10));
    }
}
