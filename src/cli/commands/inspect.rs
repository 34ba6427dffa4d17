//! Inspect command implementation.

use std::path::Path;

use colored::Colorize;

use crate::error::Result;
use crate::storage::inspect_database;

/// List the user tables of a SQLite file with their columns and row counts.
///
/// # Errors
///
/// Returns an error if the file cannot be opened as a database.
pub fn execute(file: &Path, json: bool) -> Result<()> {
    let tables = inspect_database(file)?;

    if json {
        let output = serde_json::json!({
            "path": file.display().to_string(),
            "tables": tables,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if tables.is_empty() {
        println!("No tables in {}", file.display());
        return Ok(());
    }

    println!("{}", file.display().to_string().bold());
    for table in &tables {
        println!(
            "  {} {}",
            table.name.cyan(),
            format!("({} rows)", table.rows).dimmed()
        );
        println!("    {}", table.columns.join(", "));
    }
    Ok(())
}
