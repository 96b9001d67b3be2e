//! Inspect command implementation.

use super::tables::TableInfo;
use super::{file_size, format_size, open_env, CliResult};
use burrow_core::EnvDirs;
use serde::Serialize;
use std::path::Path;

/// Environment inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Home directory.
    pub path: String,
    /// Environment identity.
    pub environment_id: String,
    /// On-disk format version.
    pub format_version: String,
    /// Creation time, seconds since the Unix epoch.
    pub creation_time: u64,
    /// Version of the software that created the environment.
    pub creating_version: String,
    /// Red zone recorded at creation.
    pub redzone_percent: u8,
    /// Log size before this command opened the environment.
    pub log_size: u64,
    /// What recovery did while opening.
    pub recovery: RecoveryInfo,
    /// Tables in name order.
    pub tables: Vec<TableInfo>,
}

/// Recovery counters.
#[derive(Debug, Serialize)]
pub struct RecoveryInfo {
    /// Last commit sequence.
    pub last_seq: u64,
    /// Root commits found in the log.
    pub commits: usize,
    /// Records replayed into table files.
    pub replayed: usize,
    /// Table files removed.
    pub unlinked: usize,
    /// Uncommitted transactions discarded.
    pub discarded: usize,
}

/// Opens the environment at `path` and reads its metadata.
pub fn collect(path: &Path) -> CliResult<InspectResult> {
    let log_size = file_size(&EnvDirs::new(path).resolve().log_path());
    let env = open_env(path)?;
    let settings = env.settings()?;
    let report = env.recovery_report();

    let tables = env
        .list_tables()?
        .into_iter()
        .map(|(name, file)| TableInfo {
            size: file_size(&env.layout().table_path(&file)),
            name,
            file,
        })
        .collect();

    let result = InspectResult {
        path: path.display().to_string(),
        environment_id: settings.environment_id.to_string(),
        format_version: format!("{}.{}", settings.format_version.0, settings.format_version.1),
        creation_time: settings.creation_time,
        creating_version: settings.creating_version,
        redzone_percent: settings.redzone_percent,
        log_size,
        recovery: RecoveryInfo {
            last_seq: report.last_seq.as_u64(),
            commits: report.commits,
            replayed: report.replayed,
            unlinked: report.unlinked,
            discarded: report.discarded,
        },
        tables,
    };
    env.close()?;
    Ok(result)
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = collect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("BurrowDB Environment Inspection");
    println!("===============================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Settings:");
    println!("  Environment id:   {}", result.environment_id);
    println!("  Format version:   {}", result.format_version);
    println!("  Created at:       {}", result.creation_time);
    println!("  Created by:       {}", result.creating_version);
    println!("  Red zone:         {}%", result.redzone_percent);
    println!();
    println!("Recovery:");
    println!("  Log size:         {}", format_size(result.log_size));
    println!("  Last sequence:    {}", result.recovery.last_seq);
    println!("  Commits in log:   {}", result.recovery.commits);
    println!("  Records replayed: {}", result.recovery.replayed);
    println!("  Files unlinked:   {}", result.recovery.unlinked);
    println!("  Txns discarded:   {}", result.recovery.discarded);
    println!();
    println!("Tables ({}):", result.tables.len());
    for table in &result.tables {
        println!(
            "  {} -> {} ({})",
            table.name,
            table.file,
            format_size(table.size)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::create_env;

    #[test]
    fn reads_settings_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        create_env(dir.path(), &["users"]);

        let result = collect(dir.path()).unwrap();
        assert_eq!(result.format_version, "1.0");
        assert_eq!(result.redzone_percent, 5);
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].name, "users");
        assert_eq!(result.recovery.replayed, 0);
        assert!(result.recovery.last_seq > 0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["tables"][0]["name"], "users");
    }
}
