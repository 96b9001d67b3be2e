//! The panic latch and the diagnostic sink.
//!
//! A panicked environment is poisoned for good: the latch is set once and
//! never cleared, and every later operation fails with
//! [`EnvError::Panicked`] carrying the first recorded message.

use crate::config::ErrCall;
use crate::error::{EnvError, EnvResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

/// One-way panic flag with its message and cause.
#[derive(Debug, Default)]
pub struct PanicLatch {
    set: AtomicBool,
    cause: AtomicI32,
    message: OnceLock<String>,
}

impl PanicLatch {
    /// Creates an unset latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latch. Returns `true` for the call that set it; later calls
    /// leave the first message and cause in place.
    pub fn trip(&self, cause: i32, message: impl Into<String>) -> bool {
        let first = self.message.set(message.into()).is_ok();
        if first {
            self.cause.store(cause, Ordering::Release);
        }
        self.set.store(true, Ordering::Release);
        first
    }

    /// Whether the latch is set. Never blocks.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// The recorded message, once set.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        if self.is_set() {
            self.message.get().map(String::as_str)
        } else {
            None
        }
    }

    /// The error number that caused the panic, once set.
    #[must_use]
    pub fn cause(&self) -> Option<i32> {
        self.is_set().then(|| self.cause.load(Ordering::Acquire))
    }

    /// Fails with [`EnvError::Panicked`] if the latch is set.
    ///
    /// # Errors
    ///
    /// Returns the panic error.
    pub fn check(&self) -> EnvResult<()> {
        if self.is_set() {
            Err(self.error())
        } else {
            Ok(())
        }
    }

    /// The error every operation returns after a panic.
    #[must_use]
    pub fn error(&self) -> EnvError {
        EnvError::Panicked {
            message: self
                .message
                .get()
                .cloned()
                .unwrap_or_else(|| "environment panicked".to_string()),
        }
    }
}

/// Routes diagnostics to the configured callback and to `tracing`.
pub struct ErrorSink {
    prefix: Option<String>,
    callback: RwLock<Option<ErrCall>>,
}

impl ErrorSink {
    /// Creates a sink.
    #[must_use]
    pub fn new(prefix: Option<String>, callback: Option<ErrCall>) -> Self {
        Self {
            prefix,
            callback: RwLock::new(callback),
        }
    }

    /// Replaces the callback.
    pub fn set_callback(&self, callback: Option<ErrCall>) {
        *self.callback.write() = callback;
    }

    /// Reports an error. Not-found outcomes are traced at `debug` only and
    /// never reach the callback.
    pub fn report(&self, err: &EnvError) {
        if err.is_not_found() {
            debug!(status = err.status(), "key not found");
            return;
        }
        warn!(status = err.status(), error = %err, "operation failed");
        self.deliver(&err.to_string());
    }

    /// Reports a free-form message at `error` level.
    pub fn report_message(&self, message: &str) {
        error!(prefix = self.prefix.as_deref().unwrap_or(""), "{message}");
        self.deliver(message);
    }

    fn deliver(&self, message: &str) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(self.prefix.as_deref().unwrap_or(""), message);
        }
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSink")
            .field("prefix", &self.prefix)
            .field("callback", &self.callback.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::status;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn first_message_wins() {
        let latch = PanicLatch::new();
        assert!(latch.check().is_ok());
        assert_eq!(latch.message(), None);

        assert!(latch.trip(status::EIO, "log flush failed"));
        assert!(!latch.trip(status::ENOSPC, "second"));

        assert!(latch.is_set());
        assert_eq!(latch.message(), Some("log flush failed"));
        assert_eq!(latch.cause(), Some(status::EIO));

        let err = latch.check().unwrap_err();
        assert_eq!(err.status(), status::EINVAL);
        assert!(err.to_string().contains("log flush failed"));
    }

    #[test]
    fn latch_is_visible_across_threads() {
        let latch = Arc::new(PanicLatch::new());
        let writer = Arc::clone(&latch);
        std::thread::spawn(move || {
            writer.trip(status::EIO, "from worker");
        })
        .join()
        .unwrap();
        assert!(latch.is_set());
        assert_eq!(latch.message(), Some("from worker"));
    }

    #[test]
    fn sink_prefixes_and_skips_not_found() {
        let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
        let record = Arc::clone(&seen);
        let sink = ErrorSink::new(
            Some("app".into()),
            Some(Arc::new(move |pfx: &str, msg: &str| {
                record.lock().push((pfx.to_string(), msg.to_string()));
            })),
        );

        sink.report(&EnvError::NotFound);
        sink.report(&EnvError::invalid("bad flags"));
        sink.report_message("space critical");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "app");
        assert_eq!(seen[0].1, "invalid operation: bad flags");
        assert_eq!(seen[1].1, "space critical");
    }
}
