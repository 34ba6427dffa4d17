//! Command implementations.

pub mod completions;
pub mod export;
pub mod import;
pub mod inspect;
pub mod version;

use std::path::PathBuf;

use colored::Colorize;

use crate::config::{resolve_db_path, resolve_staging_dir, TransferConfig};
use crate::error::{Error, Result};
use crate::storage::SchemaPolicy;
use crate::transfer::{Coordinator, TransferReport};

/// Build a coordinator from the global `--db` and `--staging-dir` options.
fn coordinator(
    db_path: Option<&PathBuf>,
    staging_dir: Option<&PathBuf>,
    policy: SchemaPolicy,
) -> Result<Coordinator> {
    let app_db = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config(
            "Could not determine the application database path. Pass --db or set TABXFER_DB."
                .to_string(),
        )
    })?;
    if !app_db.is_file() {
        return Err(Error::NotInitialized { path: app_db });
    }
    let staging_dir = resolve_staging_dir(staging_dir.map(PathBuf::as_path));

    let config = TransferConfig::new(app_db, staging_dir).with_schema_policy(policy);
    Coordinator::new(&config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Print a transfer summary.
///
/// When the transferred database itself went to stdout, the summary goes to
/// stderr so the two never mix.
fn print_report(report: &TransferReport, json: bool, to_stderr: bool) -> Result<()> {
    let text = if json {
        let output = serde_json::json!({
            "success": true,
            "report": report,
        });
        serde_json::to_string(&output)?
    } else {
        human_report(report)
    };

    if to_stderr {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
    Ok(())
}

fn human_report(report: &TransferReport) -> String {
    let verb = match report.direction {
        crate::transfer::Direction::Import => "Imported",
        crate::transfer::Direction::Export => "Exported",
    };
    let mut lines = vec![format!(
        "{} {} {} table '{}'",
        "✓".green(),
        verb,
        report.rows.to_string().bold(),
        report.table.cyan()
    )];

    let arrow = match report.direction {
        crate::transfer::Direction::Import => "from",
        crate::transfer::Direction::Export => "to",
    };
    lines.push(format!("  {arrow:<9} {}", report.external));
    if report.table_created {
        lines.push(format!("  {:<9} {}", "created", "table did not exist".dimmed()));
    }
    lines.push(format!("  {:<9} {}", "columns", report.columns.join(", ")));
    lines.push(format!("  {:<9} {} bytes", "size", report.bytes));
    lines.push(format!("  {:<9} {}", "sha256", report.sha256.dimmed()));
    lines.join("\n")
}
