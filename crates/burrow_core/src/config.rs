//! Environment configuration.

use crate::error::{EnvError, EnvResult};
use crate::space::SpaceProbe;
use crate::types::Isolation;
use burrow_storage::KeyComparator;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error callback: receives the configured prefix (possibly empty) and the
/// formatted diagnostic.
pub type ErrCall = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// What an update function does with the record it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    /// Leave the record as it is.
    Keep,
    /// Store this value.
    Set(Vec<u8>),
    /// Delete the record.
    Delete,
}

/// Update function: receives the table name, the key, the current value
/// (if any) and the caller's extra argument.
pub type UpdateFn = Arc<dyn Fn(&str, &[u8], Option<&[u8]>, &[u8]) -> UpdateAction + Send + Sync>;

/// Derives the row a destination table stores for a source row.
///
/// Called with the destination table name, the source table name, the
/// source key and the source value. `None` means the destination gets no
/// row.
pub type PutRowFn =
    Arc<dyn Fn(&str, &str, &[u8], &[u8]) -> EnvResult<Option<(Vec<u8>, Vec<u8>)>> + Send + Sync>;

/// Derives the key a destination table deletes when a source row goes.
/// Arguments as for [`PutRowFn`].
pub type DelRowFn =
    Arc<dyn Fn(&str, &str, &[u8], &[u8]) -> EnvResult<Option<Vec<u8>>> + Send + Sync>;

/// Configuration for opening an environment.
#[derive(Clone)]
pub struct Config {
    /// Nominal size of the cache table in bytes.
    pub cache_size: u64,

    /// Percentage of total file system space below which writes are refused.
    /// Twice this marks the caution threshold.
    pub redzone_percent: u8,

    /// Time between file system space polls (zero disables the poller).
    pub fs_poll_interval: Duration,

    /// Isolation for transactions that do not request one.
    pub default_isolation: Isolation,

    /// How long a lock request may wait for a conflicting holder
    /// (zero = fail immediately).
    pub lock_wait_timeout: Duration,

    /// Whether commits flush the log unless asked not to.
    pub sync_on_commit: bool,

    /// Format version recorded for new environments and required of
    /// existing ones (major must match).
    pub format_version: (u16, u16),

    /// Prefix passed to the error callback.
    pub errpfx: Option<String>,

    /// Receives every reported diagnostic.
    pub errcall: Option<ErrCall>,

    /// Key order for tables opened without their own comparison function.
    pub default_comparator: Option<KeyComparator>,

    /// Source of file system space samples; the operating system when unset.
    pub space_probe: Option<Arc<dyn SpaceProbe>>,

    /// Backs [`Db::update`](crate::Db::update).
    pub update_function: Option<UpdateFn>,

    /// Row generator for [`Environment::put_multiple`](crate::Environment::put_multiple).
    pub generate_row_for_put: Option<PutRowFn>,

    /// Key generator for [`Environment::del_multiple`](crate::Environment::del_multiple).
    pub generate_row_for_del: Option<DelRowFn>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_size: 64 * 1024 * 1024, // 64 MB
            redzone_percent: 5,
            fs_poll_interval: Duration::from_secs(5),
            default_isolation: Isolation::Serializable,
            lock_wait_timeout: Duration::ZERO,
            sync_on_commit: true,
            format_version: (1, 0),
            errpfx: None,
            errcall: None,
            default_comparator: None,
            space_probe: None,
            update_function: None,
            generate_row_for_put: None,
            generate_row_for_del: None,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache table size.
    #[must_use]
    pub const fn cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Sets the red zone percentage.
    #[must_use]
    pub const fn redzone_percent(mut self, percent: u8) -> Self {
        self.redzone_percent = percent;
        self
    }

    /// Sets the space poll interval.
    #[must_use]
    pub const fn fs_poll_interval(mut self, interval: Duration) -> Self {
        self.fs_poll_interval = interval;
        self
    }

    /// Sets the default isolation level.
    #[must_use]
    pub const fn default_isolation(mut self, isolation: Isolation) -> Self {
        self.default_isolation = isolation;
        self
    }

    /// Sets how long lock requests may wait.
    #[must_use]
    pub const fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }

    /// Sets whether commits flush the log.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the format version.
    #[must_use]
    pub const fn format_version(mut self, major: u16, minor: u16) -> Self {
        self.format_version = (major, minor);
        self
    }

    /// Sets the error prefix.
    #[must_use]
    pub fn errpfx(mut self, prefix: impl Into<String>) -> Self {
        self.errpfx = Some(prefix.into());
        self
    }

    /// Sets the error callback.
    #[must_use]
    pub fn errcall(mut self, callback: ErrCall) -> Self {
        self.errcall = Some(callback);
        self
    }

    /// Sets the default key comparator.
    #[must_use]
    pub fn default_comparator(mut self, cmp: KeyComparator) -> Self {
        self.default_comparator = Some(cmp);
        self
    }

    /// Sets the file system space probe.
    #[must_use]
    pub fn space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.space_probe = Some(probe);
        self
    }

    /// Sets the update function.
    #[must_use]
    pub fn update_function(mut self, update: UpdateFn) -> Self {
        self.update_function = Some(update);
        self
    }

    /// Sets the row generators used by multi-table writes.
    #[must_use]
    pub fn row_generators(mut self, put: PutRowFn, del: DelRowFn) -> Self {
        self.generate_row_for_put = Some(put);
        self.generate_row_for_del = Some(del);
        self
    }

    /// Checks values that have no sensible meaning.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] if the red zone leaves no room for the
    /// caution band.
    pub fn validate(&self) -> EnvResult<()> {
        if self.redzone_percent >= 50 {
            return Err(EnvError::invalid(format!(
                "redzone of {}% leaves no caution band",
                self.redzone_percent
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("cache_size", &self.cache_size)
            .field("redzone_percent", &self.redzone_percent)
            .field("fs_poll_interval", &self.fs_poll_interval)
            .field("default_isolation", &self.default_isolation)
            .field("lock_wait_timeout", &self.lock_wait_timeout)
            .field("sync_on_commit", &self.sync_on_commit)
            .field("format_version", &self.format_version)
            .field("errpfx", &self.errpfx)
            .field("errcall", &self.errcall.is_some())
            .field("default_comparator", &self.default_comparator.is_some())
            .field("space_probe", &self.space_probe.is_some())
            .field("update_function", &self.update_function.is_some())
            .field("generate_row_for_put", &self.generate_row_for_put.is_some())
            .field("generate_row_for_del", &self.generate_row_for_del.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.redzone_percent, 5);
        assert_eq!(config.fs_poll_interval, Duration::from_secs(5));
        assert_eq!(config.default_isolation, Isolation::Serializable);
        assert!(config.lock_wait_timeout.is_zero());
        assert!(config.sync_on_commit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .redzone_percent(10)
            .fs_poll_interval(Duration::ZERO)
            .default_isolation(Isolation::Snapshot)
            .errpfx("burrow");

        assert_eq!(config.redzone_percent, 10);
        assert!(config.fs_poll_interval.is_zero());
        assert_eq!(config.default_isolation, Isolation::Snapshot);
        assert_eq!(config.errpfx.as_deref(), Some("burrow"));
        assert!(config.update_function.is_none());

        let config = config
            .update_function(Arc::new(
                |_: &str, _: &[u8], _: Option<&[u8]>, _: &[u8]| UpdateAction::Keep,
            ))
            .row_generators(
                Arc::new(|_: &str, _: &str, _: &[u8], _: &[u8]| Ok(None)),
                Arc::new(|_: &str, _: &str, _: &[u8], _: &[u8]| Ok(None)),
            );
        assert!(config.update_function.is_some());
        assert!(config.generate_row_for_put.is_some());
        assert!(config.generate_row_for_del.is_some());
    }

    #[test]
    fn oversized_redzone_is_rejected() {
        assert!(Config::new().redzone_percent(50).validate().is_err());
    }
}
