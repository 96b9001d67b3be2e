//! Log appends and recovery reads.

use crate::error::{EnvError, EnvResult};
use crate::types::SequenceNumber;
use crate::wal::record::{LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
use burrow_storage::{compute_crc32, StorageBackend};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// The environment's write-ahead log.
///
/// Appends are serialized by an internal mutex. Nothing is durable until
/// [`LogManager::flush`] or [`LogManager::sync`] returns.
pub struct LogManager {
    backend: Mutex<Box<dyn StorageBackend>>,
}

impl LogManager {
    /// Creates a log over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Appends a record and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    pub fn append(&self, record: &LogRecord) -> EnvResult<u64> {
        let data = frame(record)?;
        let offset = self.backend.lock().append(&data)?;
        trace!(offset, kind = ?record.record_type(), "log append");
        Ok(offset)
    }

    /// Pushes appended records to the operating system.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn flush(&self) -> EnvResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Forces the log to stable storage.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn sync(&self) -> EnvResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn size(&self) -> EnvResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads every complete record.
    ///
    /// A record cut short at the end of the log (a crash mid-append) ends
    /// the read and is truncated away. A bad checksum, bad magic, unknown
    /// type or newer version anywhere is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::LogCorruption`] for damaged records, or the
    /// backend's error.
    pub fn read_all(&self) -> EnvResult<Vec<(u64, LogRecord)>> {
        let mut backend = self.backend.lock();
        let size = backend.size()?;
        let mut offset = 0u64;
        let mut records = Vec::new();

        while size - offset >= HEADER_SIZE as u64 {
            let header = backend.read_at(offset, HEADER_SIZE)?;
            if header[0..4] != LOG_MAGIC {
                return Err(EnvError::log_corruption(format!(
                    "invalid magic at offset {offset}"
                )));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version > LOG_VERSION {
                return Err(EnvError::log_corruption(format!(
                    "unsupported version {version} at offset {offset}"
                )));
            }
            let type_byte = header[6];
            let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
                EnvError::log_corruption(format!(
                    "unknown record type {type_byte} at offset {offset}"
                ))
            })?;
            let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

            let total = HEADER_SIZE + len + CRC_SIZE;
            if size - offset < total as u64 {
                break;
            }
            let data = backend.read_at(offset, total)?;
            let body = &data[..HEADER_SIZE + len];
            let stored = u32::from_le_bytes([
                data[HEADER_SIZE + len],
                data[HEADER_SIZE + len + 1],
                data[HEADER_SIZE + len + 2],
                data[HEADER_SIZE + len + 3],
            ]);
            let computed = compute_crc32(body);
            if stored != computed {
                return Err(EnvError::log_corruption(format!(
                    "checksum mismatch at offset {offset}: expected {stored:#010x}, got {computed:#010x}"
                )));
            }

            let record = LogRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
            records.push((offset, record));
            offset += total as u64;
        }

        if offset < size {
            warn!(torn_bytes = size - offset, "discarding torn record at end of log");
            backend.truncate(offset)?;
        }
        Ok(records)
    }

    /// Empties the log and starts it over with a `Checkpoint` at `sequence`.
    ///
    /// The caller must have synced every table holding commits up to
    /// `sequence` first.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn restart(&self, sequence: SequenceNumber) -> EnvResult<()> {
        let data = frame(&LogRecord::Checkpoint { sequence })?;
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        backend.append(&data)?;
        backend.sync()?;
        debug!(%sequence, "log restarted at checkpoint");
        Ok(())
    }
}

fn frame(record: &LogRecord) -> EnvResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| EnvError::invalid("log record payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(record.record_type().as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);
    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager").finish_non_exhaustive()
    }
}
