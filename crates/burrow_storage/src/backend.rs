//! Byte store trait.

use crate::error::StorageResult;

/// An append-only byte store underneath a table file or the log.
///
/// Backends never interpret what they hold. Table records and log records
/// are framed and checksummed by their owners.
///
/// # Invariants
///
/// - `append` returns the offset of the first byte written
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `flush` returns, appended bytes survive process exit
/// - implementations are `Send + Sync` so a table can be shared by threads
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the store.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data`, returning the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended bytes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size, which is also the next append offset.
    fn size(&self) -> StorageResult<u64>;

    /// Forces data and metadata to stable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops everything after `new_size`.
    ///
    /// Used to cut a torn tail after a crash and to empty the log after a
    /// checkpoint.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
