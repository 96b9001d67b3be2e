//! BurrowDB CLI
//!
//! Operator tools for BurrowDB environments.
//!
//! # Commands
//!
//! - `inspect` - Display settings, tables, statistics and recovery results
//! - `tables` - List table names and their files
//! - `fs-state` - Sample file system space for the environment
//! - `remove` - Remove a table
//! - `rename` - Rename a table
//! - `dump-log` - Dump log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// BurrowDB command-line environment tools.
#[derive(Parser)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the environment home directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display settings, tables, statistics and recovery results
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List table names and their files
    Tables {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Sample file system space for the environment
    FsState {
        /// Red zone percentage to classify against
        #[arg(short, long, default_value = "5")]
        redzone: u8,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove a table and its file
    Remove {
        /// Table name
        name: String,
    },

    /// Rename a table
    Rename {
        /// Current table name
        from: String,

        /// New table name
        to: String,
    },

    /// Dump log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Environment path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Tables { format } => {
            let path = cli.path.ok_or("Environment path required for tables")?;
            commands::tables::run(&path, &format)?;
        }
        Commands::FsState { redzone, format } => {
            let path = cli.path.ok_or("Environment path required for fs-state")?;
            commands::fs_state::run(&path, redzone, &format)?;
        }
        Commands::Remove { name } => {
            let path = cli.path.ok_or("Environment path required for remove")?;
            commands::maintain::remove(&path, &name)?;
        }
        Commands::Rename { from, to } => {
            let path = cli.path.ok_or("Environment path required for rename")?;
            commands::maintain::rename(&path, &from, &to)?;
        }
        Commands::DumpLog { limit, format } => {
            let path = cli.path.ok_or("Environment path required for dump-log")?;
            commands::dump_log::run(&path, limit, &format)?;
        }
        Commands::Version => {
            println!("BurrowDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Log format v{}", burrow_core::LOG_VERSION);
        }
    }

    Ok(())
}
