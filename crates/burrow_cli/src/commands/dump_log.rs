//! Dump-log command implementation.
//!
//! The environment's directory locks are taken for the duration of the
//! dump, so it refuses to run against an environment that is open.

use super::{format_size, CliResult};
use burrow_core::{DirLocks, EnvDirs, LogManager, LogRecord};
use burrow_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction id (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn: Option<u64>,
    /// Parent transaction id (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    /// Table file name (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iname: Option<String>,
    /// Key, hex encoded (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Value size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
    /// Commit or checkpoint sequence (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl LogRecordInfo {
    fn new(offset: u64, record: LogRecord) -> Self {
        let mut info = Self {
            offset,
            record_type: format!("{:?}", record.record_type()).to_uppercase(),
            txn: record.txn().map(|txn| txn.as_u64()),
            parent: None,
            iname: None,
            key: None,
            value_size: None,
            sequence: None,
        };
        match record {
            LogRecord::Begin { parent, .. } => info.parent = parent.map(|p| p.as_u64()),
            LogRecord::Insert {
                iname, key, value, ..
            } => {
                info.iname = Some(iname);
                info.key = Some(hex(&key));
                info.value_size = Some(value.len());
            }
            LogRecord::Delete { iname, key, .. } => {
                info.iname = Some(iname);
                info.key = Some(hex(&key));
            }
            LogRecord::Unlink { iname, .. } => info.iname = Some(iname),
            LogRecord::Commit { sequence, .. } | LogRecord::Checkpoint { sequence } => {
                info.sequence = Some(sequence.as_u64());
            }
            LogRecord::Abort { .. } => {}
        }
        info
    }
}

/// Reads up to `limit` records from the log of the environment at `path`.
pub fn collect(path: &Path, limit: Option<usize>) -> CliResult<Vec<LogRecordInfo>> {
    let layout = EnvDirs::new(path).resolve();
    let log_path = layout.log_path();
    if !log_path.exists() {
        return Err(format!("No log found at {}", log_path.display()).into());
    }

    let locks = DirLocks::acquire(&layout)?;
    let log = LogManager::new(Box::new(FileBackend::open(&log_path)?));
    let records = log.read_all();
    locks.release();

    Ok(records?
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(offset, record)| LogRecordInfo::new(offset, record))
        .collect())
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> CliResult<()> {
    let records = collect(path, limit)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => print_text_output(&records),
    }
    Ok(())
}

fn print_text_output(records: &[LogRecordInfo]) {
    println!("{:>10}  {:<10}  {:>6}  DETAILS", "OFFSET", "TYPE", "TXN");
    for record in records {
        let txn = record.txn.map_or_else(|| "-".to_string(), |t| t.to_string());
        let mut details = Vec::new();
        if let Some(parent) = record.parent {
            details.push(format!("parent={parent}"));
        }
        if let Some(iname) = &record.iname {
            details.push(format!("table={iname}"));
        }
        if let Some(key) = &record.key {
            details.push(format!("key={key}"));
        }
        if let Some(size) = record.value_size {
            details.push(format!("value={}", format_size(size as u64)));
        }
        if let Some(seq) = record.sequence {
            details.push(format!("seq={seq}"));
        }
        println!(
            "{:>10}  {:<10}  {:>6}  {}",
            record.offset,
            record.record_type,
            txn,
            details.join(" ")
        );
    }
    println!();
    println!("{} records", records.len());
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::create_env;
    use burrow_core::{Config, EnvFlags, Environment};
    use std::time::Duration;

    #[test]
    fn closed_environment_holds_one_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        create_env(dir.path(), &["t"]);

        let records = collect(dir.path(), None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, "CHECKPOINT");
        assert!(records[0].sequence.unwrap() > 0);
    }

    #[test]
    fn open_environment_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::open(
            EnvDirs::new(dir.path()),
            EnvFlags::TRANSACTIONAL,
            Config::new().fs_poll_interval(Duration::ZERO),
        )
        .unwrap();
        assert!(collect(dir.path(), None).is_err());
        env.close().unwrap();
        assert!(collect(dir.path(), Some(0)).unwrap().is_empty());
    }

    #[test]
    fn write_records_are_described() {
        let info = LogRecordInfo::new(
            11,
            LogRecord::Insert {
                txn: burrow_core::TxnId::new(4),
                iname: "t.tbl".into(),
                key: b"\x01k".to_vec(),
                value: vec![0; 3],
            },
        );
        assert_eq!(info.record_type, "INSERT");
        assert_eq!(info.txn, Some(4));
        assert_eq!(info.key.as_deref(), Some("016b"));
        assert_eq!(info.value_size, Some(3));
    }
}
