//! Committed records as they are laid out in a table file.
//!
//! ```text
//! | record_len (4) | flags (1) | sequence (8) | key_len (4) | key (K) | value (V) | crc32 (4) |
//! ```
//!
//! `record_len` covers the whole record including itself and the checksum.
//! A tombstone carries no value bytes.

use crate::checksum::compute_crc32;
use crate::error::{StorageError, StorageResult};
use crate::types::SequenceNumber;

/// Flags stored with a table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// A live value.
    pub const NONE: Self = Self(0);
    /// The key was deleted at this sequence.
    pub const TOMBSTONE: Self = Self(0x01);

    /// Builds flags from the stored byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the stored byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Whether the tombstone bit is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & Self::TOMBSTONE.0 != 0
    }
}

/// One committed version of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    /// Sequence of the commit that produced this version.
    pub sequence: SequenceNumber,
    /// Record flags.
    pub flags: RecordFlags,
    /// The key.
    pub key: Vec<u8>,
    /// The value, empty for tombstones.
    pub value: Vec<u8>,
}

impl TableRecord {
    /// record_len (4) + flags (1) + sequence (8) + key_len (4)
    pub const HEADER_SIZE: usize = 17;
    /// Trailing checksum.
    pub const CRC_SIZE: usize = 4;

    /// Creates a record for a committed write; `None` means delete.
    #[must_use]
    pub fn new(sequence: SequenceNumber, key: Vec<u8>, value: Option<Vec<u8>>) -> Self {
        match value {
            Some(value) => Self {
                sequence,
                flags: RecordFlags::NONE,
                key,
                value,
            },
            None => Self {
                sequence,
                flags: RecordFlags::TOMBSTONE,
                key,
                value: Vec::new(),
            },
        }
    }

    /// Whether this record deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Returns the value, or `None` for a tombstone.
    #[must_use]
    pub fn into_value(self) -> Option<Vec<u8>> {
        if self.is_tombstone() {
            None
        } else {
            Some(self.value)
        }
    }

    /// Returns the encoded length.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.key.len() + self.value.len() + Self::CRC_SIZE
    }

    /// Encodes the record.
    ///
    /// # Errors
    ///
    /// Fails if the record would not fit the 32-bit length fields.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let record_len = u32::try_from(self.encoded_size())
            .map_err(|_| StorageError::corrupted("record exceeds 4 GiB"))?;
        let key_len = u32::try_from(self.key.len())
            .map_err(|_| StorageError::corrupted("key exceeds 4 GiB"))?;

        let mut buf = Vec::with_capacity(record_len as usize);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Reads the total record length from the first four bytes of a record.
    ///
    /// Returns `None` when fewer than four bytes are available.
    #[must_use]
    pub fn peek_len(data: &[u8]) -> Option<usize> {
        let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes) as usize)
    }

    /// Decodes one record from the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ChecksumMismatch`] for a damaged record and
    /// [`StorageError::Corrupted`] for impossible lengths.
    pub fn decode(data: &[u8]) -> StorageResult<Self> {
        let record_len =
            Self::peek_len(data).ok_or_else(|| StorageError::corrupted("record too short"))?;
        if record_len < Self::HEADER_SIZE + Self::CRC_SIZE || data.len() < record_len {
            return Err(StorageError::corrupted(format!(
                "record length {record_len} does not fit {} available bytes",
                data.len()
            )));
        }

        let body = &data[..record_len - Self::CRC_SIZE];
        let stored = u32::from_le_bytes(
            data[record_len - Self::CRC_SIZE..record_len]
                .try_into()
                .map_err(|_| StorageError::corrupted("short checksum"))?,
        );
        let computed = compute_crc32(body);
        if stored != computed {
            return Err(StorageError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let flags = RecordFlags::from_byte(body[4]);
        let sequence = SequenceNumber::new(u64::from_le_bytes(
            body[5..13]
                .try_into()
                .map_err(|_| StorageError::corrupted("short sequence"))?,
        ));
        let key_len = u32::from_le_bytes(
            body[13..17]
                .try_into()
                .map_err(|_| StorageError::corrupted("short key length"))?,
        ) as usize;
        let key_end = Self::HEADER_SIZE
            .checked_add(key_len)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| StorageError::corrupted("key length exceeds record"))?;

        Ok(Self {
            sequence,
            flags,
            key: body[Self::HEADER_SIZE..key_end].to_vec(),
            value: body[key_end..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_has_no_value() {
        let record = TableRecord::new(SequenceNumber::new(3), b"gone".to_vec(), None);
        assert!(record.is_tombstone());

        let decoded = TableRecord::decode(&record.encode().unwrap()).unwrap();
        assert!(decoded.is_tombstone());
        assert_eq!(decoded.into_value(), None);
    }

    #[test]
    fn empty_value_is_not_a_tombstone() {
        let record = TableRecord::new(SequenceNumber::new(1), b"k".to_vec(), Some(Vec::new()));
        let decoded = TableRecord::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded.into_value(), Some(Vec::new()));
    }

    #[test]
    fn detects_bit_flip() {
        let record = TableRecord::new(SequenceNumber::new(9), b"key".to_vec(), Some(b"val".to_vec()));
        let mut encoded = record.encode().unwrap();
        encoded[18] ^= 0x40;

        assert!(matches!(
            TableRecord::decode(&encoded),
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_lying_key_length() {
        let record = TableRecord::new(SequenceNumber::new(1), b"k".to_vec(), Some(b"v".to_vec()));
        let mut encoded = record.encode().unwrap();
        encoded[13..17].copy_from_slice(&100u32.to_le_bytes());
        let len = encoded.len();
        let crc = compute_crc32(&encoded[..len - 4]);
        encoded[len - 4..].copy_from_slice(&crc.to_le_bytes());

        assert!(matches!(
            TableRecord::decode(&encoded),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn encoded_size_matches() {
        let record = TableRecord::new(SequenceNumber::new(1), b"abc".to_vec(), Some(b"de".to_vec()));
        assert_eq!(record.encode().unwrap().len(), record.encoded_size());
    }
}
