//! Tables command implementation.

use super::{file_size, format_size, open_env, CliResult};
use serde::Serialize;
use std::path::Path;

/// One table in the directory.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Internal file name.
    pub file: String,
    /// File size in bytes.
    pub size: u64,
}

/// Reads the directory of the environment at `path`.
pub fn collect(path: &Path) -> CliResult<Vec<TableInfo>> {
    let env = open_env(path)?;
    let tables = env
        .list_tables()?
        .into_iter()
        .map(|(name, file)| TableInfo {
            size: file_size(&env.layout().table_path(&file)),
            name,
            file,
        })
        .collect();
    env.close()?;
    Ok(tables)
}

/// Runs the tables command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let tables = collect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&tables)?),
        _ => {
            if tables.is_empty() {
                println!("No tables.");
            }
            for table in &tables {
                println!(
                    "{:<32} {:<40} {}",
                    table.name,
                    table.file,
                    format_size(table.size)
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::create_env;

    #[test]
    fn lists_tables_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        create_env(dir.path(), &["zeta", "alpha"]);

        let tables = collect(dir.path()).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert!(tables.iter().all(|t| t.size > 0));
    }
}
