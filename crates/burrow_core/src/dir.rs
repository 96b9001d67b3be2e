//! Environment directory layout and locking.
//!
//! ```text
//! <home>/
//! ├─ __burrow_lock_dont_delete_me_environment
//! <data_dir>/                      (defaults to home)
//! ├─ __burrow_lock_dont_delete_me_data
//! ├─ directory.tbl                 # dname -> iname
//! ├─ environment.tbl               # persistent settings
//! └─ <iname>.tbl ...               # one file per table
//! <log_dir>/                       (defaults to home)
//! ├─ __burrow_lock_dont_delete_me_logs
//! └─ burrow.log                    # write-ahead log
//! <tmp_dir>/                       (defaults to home)
//! └─ __burrow_lock_dont_delete_me_temp
//! ```
//!
//! Each role's lock file is locked exclusively with `fs2`, so a second
//! process opening any of these directories fails instead of sharing them.

use crate::error::{EnvError, EnvResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_PREFIX: &str = "__burrow_lock_dont_delete_me_";
const DIRECTORY_TABLE: &str = "directory.tbl";
const SETTINGS_TABLE: &str = "environment.tbl";
const LOG_FILE: &str = "burrow.log";

/// Directories requested for an environment.
///
/// Relative sub-directories are resolved against `home`; unset ones are
/// `home` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDirs {
    /// The environment home directory.
    pub home: PathBuf,
    /// Where table files live.
    pub data_dir: Option<PathBuf>,
    /// Where the log lives.
    pub log_dir: Option<PathBuf>,
    /// Where temporary files go.
    pub tmp_dir: Option<PathBuf>,
}

impl EnvDirs {
    /// Uses `home` for everything.
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            data_dir: None,
            log_dir: None,
            tmp_dir: None,
        }
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Sets the temp directory.
    #[must_use]
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    /// Resolves every directory to a concrete path.
    #[must_use]
    pub fn resolve(&self) -> EnvLayout {
        let under_home = |dir: &Option<PathBuf>| match dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.home.join(dir),
            None => self.home.clone(),
        };
        EnvLayout {
            home: self.home.clone(),
            data: under_home(&self.data_dir),
            log: under_home(&self.log_dir),
            tmp: under_home(&self.tmp_dir),
        }
    }
}

/// Resolved environment directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLayout {
    /// Home directory.
    pub home: PathBuf,
    /// Data directory.
    pub data: PathBuf,
    /// Log directory.
    pub log: PathBuf,
    /// Temp directory.
    pub tmp: PathBuf,
}

impl EnvLayout {
    /// Path of a table file.
    #[must_use]
    pub fn table_path(&self, iname: &str) -> PathBuf {
        self.data.join(iname)
    }

    /// Internal name of the directory table.
    #[must_use]
    pub fn directory_iname(&self) -> &'static str {
        DIRECTORY_TABLE
    }

    /// Internal name of the settings table.
    #[must_use]
    pub fn settings_iname(&self) -> &'static str {
        SETTINGS_TABLE
    }

    /// Path of the log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log.join(LOG_FILE)
    }

    /// Whether an environment has been created here.
    #[must_use]
    pub fn settings_exist(&self) -> bool {
        self.table_path(SETTINGS_TABLE).exists()
    }

    /// The data, log and temp directories, for space polling.
    #[must_use]
    pub fn polled_dirs(&self) -> Vec<PathBuf> {
        vec![self.data.clone(), self.log.clone(), self.tmp.clone()]
    }

    fn roles(&self) -> [(&'static str, &Path); 4] {
        [
            ("environment", &self.home),
            ("data", &self.data),
            ("logs", &self.log),
            ("temp", &self.tmp),
        ]
    }

    /// Verifies every directory exists, creating them when `create` is set.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::NoEntry`] for a missing directory without
    /// `create`, or the I/O error.
    pub fn prepare(&self, create: bool) -> EnvResult<()> {
        for (role, dir) in self.roles() {
            if !dir.exists() {
                if !create {
                    return Err(EnvError::no_entry(dir.display().to_string()));
                }
                fs::create_dir_all(dir)?;
                debug!(role, dir = %dir.display(), "created directory");
            }
            if !dir.is_dir() {
                return Err(EnvError::invalid(format!(
                    "{role} path is not a directory: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Exclusive advisory locks on the environment's directories.
///
/// Locks are released when this value is dropped.
#[derive(Debug)]
pub struct DirLocks {
    held: Vec<(PathBuf, File)>,
}

impl DirLocks {
    /// Locks the lock file of every role.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::EnvironmentLocked`] if another process holds one
    /// of them, or the I/O error.
    pub fn acquire(layout: &EnvLayout) -> EnvResult<Self> {
        let mut held = Vec::with_capacity(4);
        for (role, dir) in layout.roles() {
            let path = dir.join(format!("{LOCK_PREFIX}{role}"));
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            if file.try_lock_exclusive().is_err() {
                return Err(EnvError::EnvironmentLocked { path });
            }
            held.push((path, file));
        }
        Ok(Self { held })
    }

    /// The lock files held.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.held.iter().map(|(path, _)| path.as_path())
    }

    /// Unlocks every lock file now.
    pub fn release(self) {
        for (path, file) in self.held {
            if let Err(err) = FileExt::unlock(&file) {
                debug!(path = %path.display(), error = %err, "unlock failed, closing instead");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unset_dirs_default_to_home() {
        let layout = EnvDirs::new("/env").with_log_dir("logs").resolve();
        assert_eq!(layout.data, PathBuf::from("/env"));
        assert_eq!(layout.log, PathBuf::from("/env/logs"));
        assert_eq!(layout.log_path(), PathBuf::from("/env/logs/burrow.log"));
        assert_eq!(layout.table_path("t_1_0.tbl"), PathBuf::from("/env/t_1_0.tbl"));
    }

    #[test]
    fn absolute_dirs_are_kept() {
        let layout = EnvDirs::new("/env").with_tmp_dir("/scratch").resolve();
        assert_eq!(layout.tmp, PathBuf::from("/scratch"));
    }

    #[test]
    fn prepare_without_create_reports_missing() {
        let temp = tempdir().unwrap();
        let layout = EnvDirs::new(temp.path().join("missing")).resolve();
        assert!(matches!(layout.prepare(false), Err(EnvError::NoEntry { .. })));

        layout.prepare(true).unwrap();
        assert!(layout.home.is_dir());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let layout = EnvDirs::new(temp.path())
            .with_data_dir("data")
            .resolve();
        layout.prepare(true).unwrap();

        let first = DirLocks::acquire(&layout).unwrap();
        assert_eq!(first.paths().count(), 4);
        assert!(matches!(
            DirLocks::acquire(&layout),
            Err(EnvError::EnvironmentLocked { .. })
        ));

        first.release();
        let _again = DirLocks::acquire(&layout).unwrap();
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let layout = EnvDirs::new(temp.path()).resolve();
        {
            let _locks = DirLocks::acquire(&layout).unwrap();
        }
        let _locks = DirLocks::acquire(&layout).unwrap();
    }
}
