//! File system space admission.
//!
//! A [`SpaceMonitor`] classifies free space on the environment's data, log
//! and temp file systems into three levels. While the level is
//! [`SpaceState::Critical`], write-admitting operations are refused with
//! [`EnvError::NoSpace`]; [`SpaceState::Caution`] is advisory only.
//!
//! Sampling goes through [`SpaceProbe`] so tests can script free space.
//! [`SpacePoller`] runs [`SpaceMonitor::poll`] on a timer in a named
//! background thread.

use crate::error::{EnvError, EnvResult};
use crate::panic::ErrorSink;
use parking_lot::{Condvar, Mutex};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Re-entry into a level is reported again only after this many polls.
const REPORT_QUIET_POLLS: u64 = 12;

/// Polls before this index always report.
const ALWAYS_REPORT_BEFORE: u64 = 3;

/// Free space severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SpaceState {
    /// Plenty of space.
    Normal = 0,
    /// Below twice the red zone; writes still admitted.
    Caution = 1,
    /// Below the red zone; writes refused.
    Critical = 2,
}

impl SpaceState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Critical,
            1 => Self::Caution,
            _ => Self::Normal,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Caution => "caution",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SpaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One file system sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceSample {
    /// Bytes available to unprivileged users.
    pub available: u64,
    /// Total size of the file system.
    pub total: u64,
}

impl SpaceSample {
    /// Classifies this sample against a red zone percentage.
    #[must_use]
    pub fn classify(self, redzone_percent: u8) -> SpaceState {
        let critical = u128::from(self.total) * u128::from(redzone_percent) / 100;
        let available = u128::from(self.available);
        if available < critical {
            SpaceState::Critical
        } else if available < critical * 2 {
            SpaceState::Caution
        } else {
            SpaceState::Normal
        }
    }
}

/// Source of file system space samples.
pub trait SpaceProbe: Send + Sync {
    /// Samples the file system holding `path`.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying stat call.
    fn sample(&self, path: &Path) -> io::Result<SpaceSample>;
}

/// Samples the operating system through `fs2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2Probe;

impl SpaceProbe for Fs2Probe {
    fn sample(&self, path: &Path) -> io::Result<SpaceSample> {
        Ok(SpaceSample {
            available: fs2::available_space(path)?,
            total: fs2::total_space(path)?,
        })
    }
}

/// Point-in-time view of the admission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceStatus {
    /// Current level.
    pub state: SpaceState,
    /// Polls executed so far.
    pub poll_count: u64,
    /// Poll index at which caution was last entered (0 = never).
    pub last_caution_entered: u64,
    /// Poll index at which critical was last entered (0 = never).
    pub last_critical_entered: u64,
    /// Operations refused while critical.
    pub rejected_while_critical: u64,
    /// Configured red zone percentage.
    pub redzone_percent: u8,
}

/// Admission state and counters.
pub struct SpaceMonitor {
    probe: Arc<dyn SpaceProbe>,
    paths: Vec<PathBuf>,
    redzone_percent: u8,
    sink: Arc<ErrorSink>,
    state: AtomicU8,
    poll_count: AtomicU64,
    last_caution_entered: AtomicU64,
    last_critical_entered: AtomicU64,
    rejected_while_critical: AtomicU64,
    /// Serializes polls so transitions are observed in order.
    polling: Mutex<()>,
}

impl SpaceMonitor {
    /// Creates a monitor sampling each distinct path in `paths`.
    #[must_use]
    pub fn new(
        probe: Arc<dyn SpaceProbe>,
        paths: &[PathBuf],
        redzone_percent: u8,
        sink: Arc<ErrorSink>,
    ) -> Self {
        let mut distinct: Vec<PathBuf> = Vec::with_capacity(paths.len());
        for path in paths {
            if !distinct.contains(path) {
                distinct.push(path.clone());
            }
        }
        Self {
            probe,
            paths: distinct,
            redzone_percent,
            sink,
            state: AtomicU8::new(SpaceState::Normal as u8),
            poll_count: AtomicU64::new(0),
            last_caution_entered: AtomicU64::new(0),
            last_critical_entered: AtomicU64::new(0),
            rejected_while_critical: AtomicU64::new(0),
            polling: Mutex::new(()),
        }
    }

    /// The current level. Lock-free.
    #[must_use]
    pub fn state(&self) -> SpaceState {
        SpaceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns the state and counters.
    #[must_use]
    pub fn status(&self) -> SpaceStatus {
        SpaceStatus {
            state: self.state(),
            poll_count: self.poll_count.load(Ordering::Acquire),
            last_caution_entered: self.last_caution_entered.load(Ordering::Acquire),
            last_critical_entered: self.last_critical_entered.load(Ordering::Acquire),
            rejected_while_critical: self.rejected_while_critical.load(Ordering::Acquire),
            redzone_percent: self.redzone_percent,
        }
    }

    /// Refuses a write-admitting operation while critical.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::NoSpace`] and counts the refusal when critical.
    pub fn admit_write(&self, operation: &str) -> EnvResult<()> {
        if self.state() != SpaceState::Critical {
            return Ok(());
        }
        let rejected = self.rejected_while_critical.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(operation, rejected, "write refused, space critical");
        Err(EnvError::NoSpace {
            operation: operation.to_string(),
        })
    }

    /// Samples every path once and updates the level.
    ///
    /// The worst sampled level wins. Failed samples are logged and skipped;
    /// if every sample fails the level is left unchanged.
    pub fn poll(&self) -> SpaceState {
        let _serial = self.polling.lock();
        let poll = self.poll_count.fetch_add(1, Ordering::AcqRel) + 1;

        let mut worst: Option<SpaceState> = None;
        for path in &self.paths {
            match self.probe.sample(path) {
                Ok(sample) => {
                    let level = sample.classify(self.redzone_percent);
                    worst = Some(worst.map_or(level, |w| w.max(level)));
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "file system space probe failed");
                }
            }
        }

        let Some(next) = worst else {
            return self.state();
        };
        let previous = SpaceState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            self.note_transition(previous, next, poll);
        }
        next
    }

    fn note_transition(&self, previous: SpaceState, next: SpaceState, poll: u64) {
        match next {
            SpaceState::Critical => {
                let last = self.last_critical_entered.swap(poll, Ordering::AcqRel);
                if should_report(last, poll) {
                    self.sink.report_message(&format!(
                        "file system space is critically low (under {}% free), writes are refused",
                        self.redzone_percent
                    ));
                }
            }
            SpaceState::Caution => {
                let last = self.last_caution_entered.swap(poll, Ordering::AcqRel);
                if previous == SpaceState::Critical {
                    info!(poll, "file system space above red zone, writes admitted again");
                } else if should_report(last, poll) {
                    warn!(
                        poll,
                        caution_percent = u16::from(self.redzone_percent) * 2,
                        "file system space is getting low"
                    );
                }
            }
            SpaceState::Normal => {
                info!(poll, from = %previous, "file system space recovered");
            }
        }
    }
}

fn should_report(last_entered: u64, poll: u64) -> bool {
    last_entered == 0 || poll < ALWAYS_REPORT_BEFORE || poll > last_entered + REPORT_QUIET_POLLS
}

impl std::fmt::Debug for SpaceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceMonitor")
            .field("paths", &self.paths)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

struct PollerSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Background thread running [`SpaceMonitor::poll`] on a fixed interval.
pub struct SpacePoller {
    signal: Arc<PollerSignal>,
    handle: Option<JoinHandle<()>>,
}

impl SpacePoller {
    /// Starts polling `monitor` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(monitor: Arc<SpaceMonitor>, interval: Duration) -> EnvResult<Self> {
        let signal = Arc::new(PollerSignal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name("burrow-fs-poller".to_string())
            .spawn(move || loop {
                {
                    let deadline = Instant::now() + interval;
                    let mut stopped = thread_signal.stopped.lock();
                    while !*stopped {
                        if thread_signal
                            .wake
                            .wait_until(&mut stopped, deadline)
                            .timed_out()
                        {
                            break;
                        }
                    }
                    if *stopped {
                        break;
                    }
                }
                monitor.poll();
            })?;

        debug!(interval_ms = interval.as_millis() as u64, "space poller started");
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Signals the thread and waits for it. Repeated calls are no-ops.
    pub fn stop(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("space poller thread panicked");
            } else {
                debug!("space poller stopped");
            }
        }
    }
}

impl Drop for SpacePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SpacePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpacePoller")
            .field("running", &self.handle.is_some())
            .finish()
    }
}
