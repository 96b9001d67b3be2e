//! Remove and rename commands.

use super::{open_env, CliResult};
use std::path::Path;
use tracing::info;

/// Removes table `name` and its file.
pub fn remove(path: &Path, name: &str) -> CliResult<()> {
    let env = open_env(path)?;
    let result = env.dbremove(None, name);
    env.close()?;
    result?;
    info!(table = name, "table removed");
    println!("Removed {name}");
    Ok(())
}

/// Renames table `from` to `to`.
pub fn rename(path: &Path, from: &str, to: &str) -> CliResult<()> {
    let env = open_env(path)?;
    let result = env.dbrename(None, from, to);
    env.close()?;
    result?;
    info!(from, to, "table renamed");
    println!("Renamed {from} to {to}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tables;
    use crate::commands::testutil::create_env;

    #[test]
    fn rename_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        create_env(dir.path(), &["old", "other"]);

        rename(dir.path(), "old", "new").unwrap();
        let names: Vec<String> = tables::collect(dir.path())
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["new", "other"]);

        remove(dir.path(), "new").unwrap();
        assert_eq!(tables::collect(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn missing_table_is_an_error_and_env_still_closes() {
        let dir = tempfile::tempdir().unwrap();
        create_env(dir.path(), &[]);

        assert!(remove(dir.path(), "ghost").is_err());
        assert!(rename(dir.path(), "ghost", "spirit").is_err());
        assert!(tables::collect(dir.path()).unwrap().is_empty());
    }
}
