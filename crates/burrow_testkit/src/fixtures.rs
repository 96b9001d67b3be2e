//! Test fixtures and environment helpers.
//!
//! Fixtures panic on setup failures: they are only used from tests.

use burrow_core::{Config, Db, DbFlags, EnvDirs, EnvFlags, Environment};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration used by fixtures: no background poller.
#[must_use]
pub fn test_config() -> Config {
    Config::new().fs_poll_interval(Duration::ZERO)
}

/// A transactional environment in a temporary directory.
pub struct TestEnv {
    /// The environment.
    pub env: Environment,
    config: Config,
    temp_dir: TempDir,
}

impl TestEnv {
    /// Creates a fresh environment with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a fresh environment with `config`.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let env = Environment::open(
            EnvDirs::new(temp_dir.path()),
            EnvFlags::TRANSACTIONAL,
            config.clone(),
        )
        .expect("Failed to create environment");
        Self {
            env,
            config,
            temp_dir,
        }
    }

    /// The home directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens (creating if needed) table `dname` outside any transaction.
    pub fn table(&self, dname: &str) -> Db {
        open_table(&self.env, dname)
    }

    /// Closes the environment cleanly and opens it again.
    ///
    /// Every handle and transaction must be gone first.
    pub fn reopen(self) -> Self {
        self.env.close().expect("Failed to close environment");
        self.open_again()
    }

    /// Drops the environment without closing it, as a crash would, and
    /// opens it again so recovery runs.
    ///
    /// Every handle and transaction must be gone first, or the directory
    /// locks are still held.
    pub fn crash_and_reopen(self) -> Self {
        self.open_again()
    }

    /// Like [`TestEnv::crash_and_reopen`], but runs `damage` on the home
    /// directory while the environment is down.
    pub fn crash_and_reopen_with(self, damage: impl FnOnce(&Path)) -> Self {
        let Self {
            env,
            config,
            temp_dir,
        } = self;
        drop(env);
        damage(temp_dir.path());
        Self::reopen_in(temp_dir, config)
    }

    fn open_again(self) -> Self {
        let Self {
            env,
            config,
            temp_dir,
        } = self;
        drop(env);
        Self::reopen_in(temp_dir, config)
    }

    fn reopen_in(temp_dir: TempDir, config: Config) -> Self {
        let env = Environment::open(
            EnvDirs::new(temp_dir.path()),
            EnvFlags::TRANSACTIONAL,
            config.clone(),
        )
        .expect("Failed to reopen environment");
        Self {
            env,
            config,
            temp_dir,
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEnv {
    type Target = Environment;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

/// Opens (creating if needed) table `dname` outside any transaction.
pub fn open_table(env: &Environment, dname: &str) -> Db {
    let mut db = Db::create(env);
    db.open(None, dname, DbFlags::CREATE)
        .expect("Failed to open table");
    db
}

/// Runs a test against a temporary environment.
///
/// # Example
///
/// ```rust,ignore
/// use burrow_testkit::with_temp_env;
///
/// #[test]
/// fn my_test() {
///     with_temp_env(|env| {
///         let db = burrow_testkit::open_table(env, "t");
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_env<F, R>(f: F) -> R
where
    F: FnOnce(&Environment) -> R,
{
    let test_env = TestEnv::new();
    f(&test_env.env)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use burrow_core::PutFlags;

    /// Key of the `i`th populated record.
    pub fn populated_key(i: usize) -> Vec<u8> {
        format!("key{i:05}").into_bytes()
    }

    /// Creates table `dname` holding `count` committed records.
    pub fn populated_table(env: &Environment, dname: &str, count: usize) -> Db {
        let db = open_table(env, dname);
        for i in 0..count {
            db.put(None, &populated_key(i), format!("value{i}").as_bytes(), PutFlags::NONE)
                .expect("Failed to populate table");
        }
        db
    }
}
