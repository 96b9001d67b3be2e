//! Log record types and payload encoding.

use crate::error::{EnvError, EnvResult};
use crate::types::{SequenceNumber, TxnId};

/// Magic bytes opening every log record.
pub const LOG_MAGIC: [u8; 4] = *b"BLOG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// Type byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A transaction began.
    Begin = 1,
    /// A key was written.
    Insert = 2,
    /// A key was deleted.
    Delete = 3,
    /// A table file is to be removed at commit.
    Unlink = 4,
    /// A root transaction committed.
    Commit = 5,
    /// A transaction aborted.
    Abort = 6,
    /// Every table file is current up to a sequence.
    Checkpoint = 7,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Insert),
            3 => Some(Self::Delete),
            4 => Some(Self::Unlink),
            5 => Some(Self::Commit),
            6 => Some(Self::Abort),
            7 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One entry of the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A transaction began, nested under `parent` if set.
    Begin {
        /// Transaction.
        txn: TxnId,
        /// Enclosing transaction.
        parent: Option<TxnId>,
    },

    /// `key` was set to `value` in table `iname`.
    Insert {
        /// Writing transaction.
        txn: TxnId,
        /// Internal file name of the table.
        iname: String,
        /// Key.
        key: Vec<u8>,
        /// Value.
        value: Vec<u8>,
    },

    /// `key` was deleted from table `iname`.
    Delete {
        /// Writing transaction.
        txn: TxnId,
        /// Internal file name of the table.
        iname: String,
        /// Key.
        key: Vec<u8>,
    },

    /// Table file `iname` is removed if `txn` commits.
    Unlink {
        /// Removing transaction.
        txn: TxnId,
        /// Internal file name of the table.
        iname: String,
    },

    /// A root transaction committed at `sequence`.
    Commit {
        /// Transaction.
        txn: TxnId,
        /// Commit sequence.
        sequence: SequenceNumber,
    },

    /// A transaction aborted.
    Abort {
        /// Transaction.
        txn: TxnId,
    },

    /// Table files hold every commit up to `sequence`.
    Checkpoint {
        /// Last commit sequence at checkpoint time.
        sequence: SequenceNumber,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Begin { .. } => LogRecordType::Begin,
            Self::Insert { .. } => LogRecordType::Insert,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Unlink { .. } => LogRecordType::Unlink,
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Abort { .. } => LogRecordType::Abort,
            Self::Checkpoint { .. } => LogRecordType::Checkpoint,
        }
    }

    /// The transaction this record belongs to.
    #[must_use]
    pub fn txn(&self) -> Option<TxnId> {
        match self {
            Self::Begin { txn, .. }
            | Self::Insert { txn, .. }
            | Self::Delete { txn, .. }
            | Self::Unlink { txn, .. }
            | Self::Commit { txn, .. }
            | Self::Abort { txn } => Some(*txn),
            Self::Checkpoint { .. } => None,
        }
    }

    /// Serializes the payload (without framing).
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] if a name, key or value does not fit a
    /// 4-byte length.
    pub fn encode_payload(&self) -> EnvResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Begin { txn, parent } => {
                put_u64(&mut buf, txn.as_u64());
                put_u64(&mut buf, parent.map_or(0, TxnId::as_u64));
            }
            Self::Insert {
                txn,
                iname,
                key,
                value,
            } => {
                put_u64(&mut buf, txn.as_u64());
                put_bytes(&mut buf, iname.as_bytes())?;
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, value)?;
            }
            Self::Delete { txn, iname, key } => {
                put_u64(&mut buf, txn.as_u64());
                put_bytes(&mut buf, iname.as_bytes())?;
                put_bytes(&mut buf, key)?;
            }
            Self::Unlink { txn, iname } => {
                put_u64(&mut buf, txn.as_u64());
                put_bytes(&mut buf, iname.as_bytes())?;
            }
            Self::Commit { txn, sequence } => {
                put_u64(&mut buf, txn.as_u64());
                put_u64(&mut buf, sequence.as_u64());
            }
            Self::Abort { txn } => put_u64(&mut buf, txn.as_u64()),
            Self::Checkpoint { sequence } => put_u64(&mut buf, sequence.as_u64()),
        }
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::LogCorruption`] if the payload is short, has
    /// trailing bytes, or holds a table name that is not UTF-8.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> EnvResult<Self> {
        let mut reader = PayloadReader::new(payload);
        let record = match record_type {
            LogRecordType::Begin => {
                let txn = TxnId::new(reader.u64()?);
                let parent = match reader.u64()? {
                    0 => None,
                    id => Some(TxnId::new(id)),
                };
                Self::Begin { txn, parent }
            }
            LogRecordType::Insert => Self::Insert {
                txn: TxnId::new(reader.u64()?),
                iname: reader.name()?,
                key: reader.bytes()?,
                value: reader.bytes()?,
            },
            LogRecordType::Delete => Self::Delete {
                txn: TxnId::new(reader.u64()?),
                iname: reader.name()?,
                key: reader.bytes()?,
            },
            LogRecordType::Unlink => Self::Unlink {
                txn: TxnId::new(reader.u64()?),
                iname: reader.name()?,
            },
            LogRecordType::Commit => Self::Commit {
                txn: TxnId::new(reader.u64()?),
                sequence: SequenceNumber::new(reader.u64()?),
            },
            LogRecordType::Abort => Self::Abort {
                txn: TxnId::new(reader.u64()?),
            },
            LogRecordType::Checkpoint => Self::Checkpoint {
                sequence: SequenceNumber::new(reader.u64()?),
            },
        };
        reader.finish(record_type)?;
        Ok(record)
    }
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> EnvResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| EnvError::invalid("log record field larger than 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, pos: 0 }
    }

    fn take(&mut self, len: usize) -> EnvResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| EnvError::log_corruption("unexpected end of payload"))?;
        let slice = &self.payload[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u64(&mut self) -> EnvResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| EnvError::log_corruption("invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn bytes(&mut self) -> EnvResult<Vec<u8>> {
        let len: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| EnvError::log_corruption("invalid length"))?;
        Ok(self.take(u32::from_le_bytes(len) as usize)?.to_vec())
    }

    fn name(&mut self) -> EnvResult<String> {
        String::from_utf8(self.bytes()?)
            .map_err(|_| EnvError::log_corruption("table name is not UTF-8"))
    }

    fn finish(self, record_type: LogRecordType) -> EnvResult<()> {
        if self.pos == self.payload.len() {
            Ok(())
        } else {
            Err(EnvError::log_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                self.pos,
                self.payload.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(record: &LogRecord) -> LogRecord {
        let payload = record.encode_payload().unwrap();
        LogRecord::decode_payload(record.record_type(), &payload).unwrap()
    }

    #[test]
    fn record_type_bytes() {
        for b in 1..=7 {
            assert_eq!(LogRecordType::from_byte(b).unwrap().as_byte(), b);
        }
        assert_eq!(LogRecordType::from_byte(0), None);
        assert_eq!(LogRecordType::from_byte(8), None);
    }

    #[test]
    fn nested_begin_keeps_parent() {
        let root = LogRecord::Begin {
            txn: TxnId::new(3),
            parent: None,
        };
        let child = LogRecord::Begin {
            txn: TxnId::new(4),
            parent: Some(TxnId::new(3)),
        };
        assert_eq!(roundtrip(&root), root);
        assert_eq!(roundtrip(&child), child);
    }

    #[test]
    fn insert_carries_name_key_and_value() {
        let record = LogRecord::Insert {
            txn: TxnId::new(9),
            iname: "orders_9_0.tbl".into(),
            key: b"k".to_vec(),
            value: Vec::new(),
        };
        assert_eq!(roundtrip(&record), record);
        assert_eq!(record.txn(), Some(TxnId::new(9)));
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = LogRecord::Abort { txn: TxnId::new(1) }
            .encode_payload()
            .unwrap();
        payload.push(0);
        let err = LogRecord::decode_payload(LogRecordType::Abort, &payload).unwrap_err();
        assert!(matches!(err, EnvError::LogCorruption { .. }));
    }

    #[test]
    fn short_payload_is_corruption() {
        let payload = LogRecord::Unlink {
            txn: TxnId::new(1),
            iname: "t.tbl".into(),
        }
        .encode_payload()
        .unwrap();
        let err = LogRecord::decode_payload(LogRecordType::Unlink, &payload[..payload.len() - 1])
            .unwrap_err();
        assert!(matches!(err, EnvError::LogCorruption { .. }));
    }
}
