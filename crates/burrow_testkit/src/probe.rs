//! A file system space probe driven by the test.

use burrow_core::{SpaceProbe, SpaceSample};
use parking_lot::Mutex;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Reports whatever free space the test last set, for every path.
#[derive(Debug)]
pub struct ScriptedProbe {
    sample: Mutex<Option<SpaceSample>>,
}

impl ScriptedProbe {
    /// Total size reported by [`ScriptedProbe::set_free_percent`].
    pub const TOTAL: u64 = 1_000_000;

    /// Starts with every byte free.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sample: Mutex::new(Some(SpaceSample {
                available: Self::TOTAL,
                total: Self::TOTAL,
            })),
        })
    }

    /// Reports `percent` of [`ScriptedProbe::TOTAL`] as available.
    pub fn set_free_percent(&self, percent: u64) {
        *self.sample.lock() = Some(SpaceSample {
            available: Self::TOTAL * percent / 100,
            total: Self::TOTAL,
        });
    }

    /// Makes every sample fail.
    pub fn fail(&self) {
        *self.sample.lock() = None;
    }
}

impl SpaceProbe for ScriptedProbe {
    fn sample(&self, _path: &Path) -> io::Result<SpaceSample> {
        (*self.sample.lock()).ok_or_else(|| io::Error::new(io::ErrorKind::Other, "probe failure"))
    }
}
