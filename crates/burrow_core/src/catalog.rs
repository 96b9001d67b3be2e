//! The persistent settings record and internal file names.
//!
//! Settings live as string entries in `environment.tbl`, written once when
//! the environment is created and checked at every reopen.

use crate::config::Config;
use crate::error::{EnvError, EnvResult};
use crate::types::TxnId;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const FORMAT_VERSION: &str = "format_version";
const ENVIRONMENT_ID: &str = "environment_id";
const CREATION_TIME: &str = "creation_time";
const CREATING_VERSION: &str = "creating_version";
const REDZONE: &str = "redzone";

const MAX_STEM: usize = 64;

/// Settings recorded when an environment is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// On-disk format version (major, minor).
    pub format_version: (u16, u16),
    /// Random identity of this environment.
    pub environment_id: Uuid,
    /// Creation time in seconds since the Unix epoch.
    pub creation_time: u64,
    /// Version of the crate that created the environment.
    pub creating_version: String,
    /// Red zone percentage in force at creation.
    pub redzone_percent: u8,
}

impl Settings {
    /// Settings for a new environment opened with `config`.
    #[must_use]
    pub fn fresh(config: &Config) -> Self {
        let creation_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self {
            format_version: config.format_version,
            environment_id: Uuid::new_v4(),
            creation_time,
            creating_version: env!("CARGO_PKG_VERSION").to_string(),
            redzone_percent: config.redzone_percent,
        }
    }

    /// The settings as key/value entries.
    #[must_use]
    pub fn to_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                FORMAT_VERSION,
                format!("{}.{}", self.format_version.0, self.format_version.1),
            ),
            (ENVIRONMENT_ID, self.environment_id.to_string()),
            (CREATION_TIME, self.creation_time.to_string()),
            (CREATING_VERSION, self.creating_version.clone()),
            (REDZONE, self.redzone_percent.to_string()),
        ]
    }

    /// Rebuilds settings from stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Incompatible`] if an entry is missing or
    /// unreadable.
    pub fn from_entries(lookup: impl Fn(&str) -> Option<Vec<u8>>) -> EnvResult<Self> {
        let text = |key: &str| -> EnvResult<String> {
            let raw = lookup(key)
                .ok_or_else(|| EnvError::incompatible(format!("settings lack {key}")))?;
            String::from_utf8(raw)
                .map_err(|_| EnvError::incompatible(format!("setting {key} is not text")))
        };
        let unreadable = |key: &str| EnvError::incompatible(format!("setting {key} is unreadable"));

        let version = text(FORMAT_VERSION)?;
        let (major, minor) = version
            .split_once('.')
            .ok_or_else(|| unreadable(FORMAT_VERSION))?;
        let format_version = (
            major.parse().map_err(|_| unreadable(FORMAT_VERSION))?,
            minor.parse().map_err(|_| unreadable(FORMAT_VERSION))?,
        );

        Ok(Self {
            format_version,
            environment_id: text(ENVIRONMENT_ID)?
                .parse()
                .map_err(|_| unreadable(ENVIRONMENT_ID))?,
            creation_time: text(CREATION_TIME)?
                .parse()
                .map_err(|_| unreadable(CREATION_TIME))?,
            creating_version: text(CREATING_VERSION)?,
            redzone_percent: text(REDZONE)?.parse().map_err(|_| unreadable(REDZONE))?,
        })
    }

    /// Checks that software expecting `requested` can use this environment.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Incompatible`] if the major versions differ.
    pub fn check_compatible(&self, requested: (u16, u16)) -> EnvResult<()> {
        if self.format_version.0 == requested.0 {
            Ok(())
        } else {
            Err(EnvError::incompatible(format!(
                "environment has format {}.{}, this build expects {}.{}",
                self.format_version.0, self.format_version.1, requested.0, requested.1
            )))
        }
    }
}

/// Builds an internal file name for a new table.
///
/// The name is `<stem>_<txn hex>_<n>.tbl`, with `n` the first counter for
/// which `taken` is false.
pub(crate) fn make_iname(dname: &str, txn: TxnId, taken: impl Fn(&str) -> bool) -> String {
    let mut stem: String = dname
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(MAX_STEM)
        .collect();
    if stem.is_empty() {
        stem.push_str("table");
    }

    let mut n = 0u32;
    loop {
        let candidate = format!("{stem}_{:x}_{n}.tbl", txn.as_u64());
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn settings_survive_entries() {
        let settings = Settings::fresh(&Config::default());
        let stored: HashMap<&str, Vec<u8>> = settings
            .to_entries()
            .into_iter()
            .map(|(k, v)| (k, v.into_bytes()))
            .collect();

        let loaded = Settings::from_entries(|key| stored.get(key).cloned()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_entry_is_incompatible() {
        let err = Settings::from_entries(|_| None).unwrap_err();
        assert!(matches!(err, EnvError::Incompatible { .. }));
    }

    #[test]
    fn major_version_must_match() {
        let settings = Settings::fresh(&Config::default().format_version(1, 3));
        assert!(settings.check_compatible((1, 0)).is_ok());
        assert!(settings.check_compatible((2, 0)).is_err());
    }

    #[test]
    fn iname_is_sanitized_and_unique() {
        let first = make_iname("sales/2024 q1", TxnId::new(0x1f), |_| false);
        assert_eq!(first, "sales_2024_q1_1f_0.tbl");

        let bumped = make_iname("t", TxnId::new(2), |name| name == "t_2_0.tbl");
        assert_eq!(bumped, "t_2_1.tbl");

        assert_eq!(make_iname("", TxnId::new(1), |_| false), "table_1_0.tbl");
    }
}
