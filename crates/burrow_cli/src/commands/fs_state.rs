//! File system space command implementation.
//!
//! Samples the environment's directories directly, without opening the
//! environment, so it works while a server holds it open.

use super::CliResult;
use burrow_core::{EnvDirs, Fs2Probe, SpaceProbe, SpaceState};
use serde::Serialize;
use std::path::Path;

/// Space of one polled directory.
#[derive(Debug, Serialize)]
pub struct DirSpace {
    /// Directory.
    pub path: String,
    /// Bytes available.
    pub available: u64,
    /// File system size.
    pub total: u64,
    /// Level against the red zone.
    pub state: &'static str,
}

/// Result of a space sample.
#[derive(Debug, Serialize)]
pub struct SpaceReport {
    /// Red zone percentage used.
    pub redzone_percent: u8,
    /// Worst level over all directories.
    pub state: &'static str,
    /// Per-directory samples.
    pub dirs: Vec<DirSpace>,
}

/// Samples every directory of the environment at `path`.
pub fn collect(path: &Path, redzone_percent: u8, probe: &dyn SpaceProbe) -> CliResult<SpaceReport> {
    let layout = EnvDirs::new(path).resolve();
    let mut worst = SpaceState::Normal;
    let mut dirs = Vec::new();
    for dir in layout.polled_dirs() {
        let sample = probe.sample(&dir)?;
        let state = sample.classify(redzone_percent);
        worst = worst.max(state);
        dirs.push(DirSpace {
            path: dir.display().to_string(),
            available: sample.available,
            total: sample.total,
            state: state.name(),
        });
    }
    Ok(SpaceReport {
        redzone_percent,
        state: worst.name(),
        dirs,
    })
}

/// Runs the fs-state command.
pub fn run(path: &Path, redzone_percent: u8, format: &str) -> CliResult<()> {
    if redzone_percent >= 50 {
        return Err(format!("redzone of {redzone_percent}% leaves no caution band").into());
    }
    let report = collect(path, redzone_percent, &Fs2Probe)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("File system space: {}", report.state);
            println!("Red zone: {}%", report.redzone_percent);
            for dir in &report.dirs {
                println!(
                    "  {} {} of {} free ({})",
                    dir.path,
                    super::format_size(dir.available),
                    super::format_size(dir.total),
                    dir.state
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::SpaceSample;
    use std::io;

    struct Fixed(u64);

    impl SpaceProbe for Fixed {
        fn sample(&self, _path: &Path) -> io::Result<SpaceSample> {
            Ok(SpaceSample {
                available: self.0,
                total: 100,
            })
        }
    }

    #[test]
    fn classifies_every_directory() {
        let dir = tempfile::tempdir().unwrap();
        let report = collect(dir.path(), 5, &Fixed(8)).unwrap();
        assert_eq!(report.state, "caution");
        assert_eq!(report.dirs.len(), 3);

        let report = collect(dir.path(), 5, &Fixed(50)).unwrap();
        assert_eq!(report.state, "normal");
    }

    #[test]
    fn real_probe_reads_the_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let report = collect(dir.path(), 5, &Fs2Probe).unwrap();
        assert!(report.dirs.iter().all(|d| d.total > 0));
    }
}
