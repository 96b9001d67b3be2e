//! Identifiers shared between the storage engine and the control layer.

use std::fmt;

/// Identifier of a transaction.
///
/// Allocated by the environment, monotonically increasing, never reused
/// within one environment lifetime. Provisional versions in a table are
/// tagged with the id of the transaction that wrote them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Creates a transaction id.
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

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{:x}", self.0)
    }
}

/// Commit sequence number.
///
/// Every root commit gets the next sequence number. Committed versions in a
/// table carry the sequence of the commit that produced them, which is what
/// snapshot reads compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence before any commit.
    pub const ZERO: Self = Self(0);

    /// Creates a sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_id_display_is_hex() {
        assert_eq!(TxnId::new(255).to_string(), "txn:ff");
    }

    #[test]
    fn sequence_next() {
        assert_eq!(SequenceNumber::ZERO.next(), SequenceNumber::new(1));
    }
}
