//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DB_ENV, DEFAULT_TABLE, STAGING_DIR_ENV, TABLE_ENV};

pub mod commands;

/// Location argument meaning standard input or standard output.
pub const STDIO_MARKER: &str = "-";

/// tabxfer - Move one table between SQLite files
#[derive(Parser, Debug)]
#[command(name = "tabxfer", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Application database path (default: ~/.tabxfer/data/app.db)
    #[arg(long, global = true, env = DB_ENV)]
    pub db: Option<PathBuf>,

    /// Directory for staging files (default: per-user cache dir)
    #[arg(long, global = true, env = STAGING_DIR_ENV)]
    pub staging_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replace a table in the application database with the same table from a file
    Import {
        /// SQLite file to read (`-` for stdin)
        source: String,

        /// Table to transfer
        #[arg(long, short, env = TABLE_ENV, default_value = DEFAULT_TABLE)]
        table: String,

        /// Copy only the columns both tables share
        #[arg(long)]
        intersect: bool,
    },

    /// Write a table from the application database into a new SQLite file
    Export {
        /// File to write (`-` for stdout, default: tabla_<name>_<millis>.db)
        dest: Option<String>,

        /// Table to transfer
        #[arg(long, short, env = TABLE_ENV, default_value = DEFAULT_TABLE)]
        table: String,
    },

    /// List the tables in a SQLite file
    Inspect {
        /// SQLite file to read
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
