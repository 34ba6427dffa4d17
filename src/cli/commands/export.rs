//! Export command implementation.

use std::path::PathBuf;

use chrono::Utc;

use crate::cli::STDIO_MARKER;
use crate::config::default_export_file_name;
use crate::error::Result;
use crate::staging::{FileLocation, StdioLocation};
use crate::storage::SchemaPolicy;
use crate::validate::TableName;

/// Execute the export command.
///
/// Without a destination, writes `tabla_<name>_<millis>.db` in the current
/// directory.
///
/// # Errors
///
/// Returns an error if the table name is invalid or the transfer fails.
pub fn execute(
    dest: Option<&str>,
    table: &str,
    db_path: Option<&PathBuf>,
    staging_dir: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let table = TableName::parse(table)?;
    let coordinator = super::coordinator(db_path, staging_dir, SchemaPolicy::default())?;
    let rt = super::runtime()?;

    let to_stdout = dest == Some(STDIO_MARKER);
    let outcome = if to_stdout {
        rt.block_on(coordinator.export(table, StdioLocation))
    } else {
        let path = dest.map_or_else(
            || PathBuf::from(default_export_file_name(&table, Utc::now())),
            PathBuf::from,
        );
        rt.block_on(coordinator.export(table, FileLocation::new(path)))
    };

    let report = outcome.into_result()?;
    super::print_report(&report, json, to_stdout)
}
