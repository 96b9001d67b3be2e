//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for short keys drawn from a small alphabet, so that operations
/// collide often.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(b"abcd".to_vec()), 1..4)
}

/// Strategy for values (arbitrary bytes).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for valid table names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_./ -]{0,31}").expect("Invalid regex")
}

/// One write in a generated batch.
#[derive(Debug, Clone)]
pub enum TableOp {
    /// Store a value.
    Put(Vec<u8>, Vec<u8>),
    /// Delete a key (which may be absent).
    Del(Vec<u8>),
}

/// Strategy for a single operation.
pub fn table_op_strategy() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(k, v)| TableOp::Put(k, v)),
        1 => key_strategy().prop_map(TableOp::Del),
    ]
}

/// A batch of operations applied in one transaction, which then commits
/// or aborts.
#[derive(Debug, Clone)]
pub struct TxnBatch {
    /// Operations in order.
    pub ops: Vec<TableOp>,
    /// Whether the transaction commits.
    pub commit: bool,
}

/// Strategy for a sequence of transaction batches.
pub fn txn_batches_strategy(max_batches: usize) -> impl Strategy<Value = Vec<TxnBatch>> {
    prop::collection::vec(
        (prop::collection::vec(table_op_strategy(), 1..8), prop::bool::weighted(0.7))
            .prop_map(|(ops, commit)| TxnBatch { ops, commit }),
        1..=max_batches,
    )
}
