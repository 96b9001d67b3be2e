//! Key comparison functions.

use std::cmp::Ordering;
use std::sync::Arc;

/// A key ordering for one table.
///
/// Tables, their cursors and the lock ranges taken on them all order keys
/// with the same comparator. It must be a total order and must not change
/// for a table once data has been written.
pub type KeyComparator = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Returns the default comparator: lexicographic byte order.
#[must_use]
pub fn bytewise() -> KeyComparator {
    Arc::new(|a: &[u8], b: &[u8]| a.cmp(b))
}
