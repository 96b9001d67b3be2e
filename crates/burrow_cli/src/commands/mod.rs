//! CLI command implementations.

pub mod dump_log;
pub mod fs_state;
pub mod inspect;
pub mod maintain;
pub mod tables;

use burrow_core::{Config, EnvDirs, EnvFlags, EnvResult, Environment};
use std::path::Path;
use std::time::Duration;

/// Result type shared by the commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Opens an existing environment without starting the space poller.
///
/// Recovery runs as part of the open.
pub fn open_env(path: &Path) -> EnvResult<Environment> {
    let flags =
        EnvFlags::INIT_TXN | EnvFlags::INIT_LOCK | EnvFlags::INIT_LOG | EnvFlags::INIT_MPOOL;
    Environment::open(
        EnvDirs::new(path),
        flags,
        Config::new().fs_poll_interval(Duration::ZERO),
    )
}

/// Size of the file at `path`, zero if it is missing.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map_or(0, |meta| meta.len())
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_scaled() {
        assert_eq!(format_size(512), "512");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn missing_environment_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("absent");
        assert!(open_env(&home).is_err());
        assert!(!home.join("burrow.log").exists());
    }
}
