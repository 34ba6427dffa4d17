//! Import command implementation.

use std::path::PathBuf;

use crate::cli::STDIO_MARKER;
use crate::error::Result;
use crate::staging::{FileLocation, StdioLocation};
use crate::storage::SchemaPolicy;
use crate::validate::TableName;

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the table name is invalid or the transfer fails.
pub fn execute(
    source: &str,
    table: &str,
    intersect: bool,
    db_path: Option<&PathBuf>,
    staging_dir: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let table = TableName::parse(table)?;
    let policy = if intersect {
        SchemaPolicy::Intersect
    } else {
        SchemaPolicy::Strict
    };

    let coordinator = super::coordinator(db_path, staging_dir, policy)?;
    let rt = super::runtime()?;

    let outcome = if source == STDIO_MARKER {
        rt.block_on(coordinator.import(StdioLocation, table))
    } else {
        rt.block_on(coordinator.import(FileLocation::new(source), table))
    };

    let report = outcome.into_result()?;
    super::print_report(&report, json, false)
}
