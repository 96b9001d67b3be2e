//! Serializable dumps of an environment's committed contents.
//!
//! Two dumps compare equal exactly when the environments hold the same
//! tables with the same committed records, so a dump taken before a
//! reopen or crash can be checked against one taken after.

use burrow_core::{CursorFlags, Db, DbFlags, EnvError, EnvResult, Environment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Committed records of one table, keys and values hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDump {
    /// Table name.
    pub dname: String,
    /// Records in key order.
    pub records: Vec<(String, String)>,
}

/// Every user table of an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDump {
    /// Tables in name order.
    pub tables: Vec<TableDump>,
}

impl EnvDump {
    /// Pretty JSON for golden files and failure messages.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("dump is always serializable")
    }

    /// Records of `dname` as raw bytes.
    pub fn table(&self, dname: &str) -> Option<BTreeMap<Vec<u8>, Vec<u8>>> {
        self.tables.iter().find(|t| t.dname == dname).map(|t| {
            t.records
                .iter()
                .map(|(k, v)| (unhex(k), unhex(v)))
                .collect()
        })
    }
}

/// Reads every table's committed records.
///
/// # Errors
///
/// Returns the first error opening or scanning a table.
pub fn dump_env(env: &Environment) -> EnvResult<EnvDump> {
    let mut tables = Vec::new();
    for (dname, _) in env.list_tables()? {
        let mut db = Db::create(env);
        db.open(None, &dname, DbFlags::NONE)?;
        let mut records = Vec::new();
        {
            let mut cursor = db.cursor(None, CursorFlags::NONE)?;
            loop {
                match cursor.next() {
                    Ok((key, value)) => records.push((hex(key), hex(value))),
                    Err(EnvError::NotFound) => break,
                    Err(err) => return Err(err),
                }
            }
        }
        db.close()?;
        tables.push(TableDump { dname, records });
    }
    Ok(EnvDump { tables })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(text: &str) -> Vec<u8> {
    (0..text.len())
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        assert_eq!(hex(b"\x00\xffA"), "00ff41");
        assert_eq!(unhex("00ff41"), b"\x00\xffA");
    }
}
