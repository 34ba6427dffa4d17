//! Attach-merge engine.
//!
//! Both directions use one connection, one attached database and one
//! transaction:
//!
//! - **Import** opens the application database, attaches the staged external
//!   file, and replaces the destination table's rows with the source's rows.
//! - **Export** opens a fresh scratch database, attaches the application
//!   database, and snapshots the table with a single `CREATE TABLE … AS SELECT`.
//!
//! The attachment is made before the transaction begins and is always
//! detached afterwards, whether the transaction committed or rolled back.
//! Connections are scoped to one call and closed on every path.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_BUSY_TIMEOUT;
use crate::error::{Error, Result};
use crate::storage::schema::{plan_copy, table_columns, table_exists, SchemaPolicy};
use crate::validate::{quote_identifier, TableName};

/// Schema alias for the attached database.
pub const SOURCE_ALIAS: &str = "xfer_src";

/// Options shared by both directions.
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub busy_timeout: Duration,
    pub schema_policy: SchemaPolicy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            schema_policy: SchemaPolicy::default(),
        }
    }
}

/// What an import changed.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub table: String,
    pub rows_deleted: usize,
    pub rows_copied: usize,
    /// True when the destination table did not exist and was created.
    pub table_created: bool,
    /// Columns copied, in source order.
    pub columns: Vec<String>,
}

/// What an export wrote.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub table: String,
    pub rows_exported: u64,
    pub columns: Vec<String>,
}

/// Replace `table` in the application database with the external copy.
///
/// The destination is created from the source's shape if it is missing.
/// Every mutation happens inside one `IMMEDIATE` transaction: on failure
/// the destination keeps exactly its previous contents.
///
/// # Errors
///
/// - [`Error::OpenFailure`] if the application database is missing or invalid
/// - [`Error::AttachFailure`] if the external file cannot be attached
/// - [`Error::TableNotFound`] if the external file lacks the table
/// - [`Error::SchemaMismatch`] if the policy rejects the existing destination
/// - [`Error::TransactionFailure`] if any statement fails (rolled back)
pub fn import_table(
    app_db: &Path,
    external_db: &Path,
    table: &TableName,
    options: &MergeOptions,
) -> Result<ImportReport> {
    let mut conn = open_app(app_db, options.busy_timeout)?;
    attach(&conn, external_db, SOURCE_ALIAS)?;

    let result = replace_table(&mut conn, table, options.schema_policy);
    detach_logged(&conn, SOURCE_ALIAS);

    if let Ok(report) = &result {
        info!(
            table = %table,
            deleted = report.rows_deleted,
            copied = report.rows_copied,
            created = report.table_created,
            "Import committed"
        );
    }
    result
}

/// Snapshot `table` from the application database into a new scratch file.
///
/// The scratch database must be empty. After a failure its contents are
/// undefined and the caller discards it.
///
/// # Errors
///
/// - [`Error::OpenFailure`] if either database cannot be opened
/// - [`Error::AttachFailure`] if the application database cannot be attached
/// - [`Error::TableNotFound`] if the application database lacks the table
/// - [`Error::TransactionFailure`] if the snapshot statement fails
pub fn export_table(
    app_db: &Path,
    scratch_db: &Path,
    table: &TableName,
    options: &MergeOptions,
) -> Result<ExportReport> {
    // ATTACH would silently create a missing file, so probe first
    drop(open_app(app_db, options.busy_timeout)?);

    let mut conn = open_scratch(scratch_db, options.busy_timeout)?;
    attach(&conn, app_db, SOURCE_ALIAS)?;

    let result = snapshot_table(&mut conn, table);
    detach_logged(&conn, SOURCE_ALIAS);

    if let Ok(report) = &result {
        info!(table = %table, rows = report.rows_exported, "Export snapshot committed");
    }
    result
}

/// Open an existing database read-write. Never creates the file.
///
/// # Errors
///
/// Returns [`Error::OpenFailure`] if the file is missing, unreadable, or not
/// a database.
pub fn open_app(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let open_failure = |e: rusqlite::Error| Error::OpenFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(open_failure)?;
    conn.busy_timeout(busy_timeout).map_err(open_failure)?;

    // Opening is lazy; reading the schema is what rejects a non-database
    schema_object_count(&conn, "main").map_err(open_failure)?;
    Ok(conn)
}

/// Open (creating if needed) an empty scratch database.
///
/// # Errors
///
/// Returns [`Error::OpenFailure`] if the file cannot be opened or already
/// contains schema objects.
pub fn open_scratch(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let open_failure = |e: rusqlite::Error| Error::OpenFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let conn = Connection::open(path).map_err(open_failure)?;
    conn.busy_timeout(busy_timeout).map_err(open_failure)?;

    let objects = schema_object_count(&conn, "main").map_err(open_failure)?;
    if objects > 0 {
        return Err(Error::OpenFailure {
            path: path.to_path_buf(),
            reason: format!("scratch database is not empty ({objects} schema objects)"),
        });
    }
    Ok(conn)
}

/// Attach `path` to `conn` as `alias`.
///
/// The path is bound as a parameter. The attached schema is read once so
/// that a file which is not a database fails here rather than mid-merge.
///
/// # Errors
///
/// Returns [`Error::AttachFailure`] if the alias is already in use or the
/// file is not a valid database.
pub fn attach(conn: &Connection, path: &Path, alias: &str) -> Result<()> {
    let attach_failure = |reason: String| Error::AttachFailure {
        path: path.to_path_buf(),
        reason,
    };

    let path_str = path
        .to_str()
        .ok_or_else(|| attach_failure("path is not valid UTF-8".to_string()))?;

    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", quote_identifier(alias)),
        [path_str],
    )
    .map_err(|e| attach_failure(e.to_string()))?;

    if let Err(e) = schema_object_count(conn, alias) {
        detach_logged(conn, alias);
        return Err(attach_failure(e.to_string()));
    }

    debug!(alias, path = %path.display(), "Attached database");
    Ok(())
}

/// Detach `alias` from `conn`.
///
/// # Errors
///
/// Returns an error if the alias is not attached or is still in use by an
/// open transaction.
pub fn detach(conn: &Connection, alias: &str) -> Result<()> {
    conn.execute(&format!("DETACH DATABASE {}", quote_identifier(alias)), [])?;
    debug!(alias, "Detached database");
    Ok(())
}

fn detach_logged(conn: &Connection, alias: &str) {
    if let Err(e) = detach(conn, alias) {
        warn!(alias, error = %e, "Detach failed; connection close will release it");
    }
}

fn schema_object_count(conn: &Connection, schema: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT count(*) FROM {}.sqlite_master", quote_identifier(schema)),
        [],
        |row| row.get(0),
    )
}

/// The import transaction: ensure, delete, copy, commit.
pub(crate) fn replace_table(
    conn: &mut Connection,
    table: &TableName,
    policy: SchemaPolicy,
) -> Result<ImportReport> {
    let failed = |e: rusqlite::Error| Error::TransactionFailure {
        table: table.to_string(),
        source: e,
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(failed)?;

    if !table_exists(&tx, SOURCE_ALIAS, table).map_err(failed)? {
        return Err(Error::TableNotFound {
            schema: "external".to_string(),
            table: table.to_string(),
        });
    }

    let source_columns = table_columns(&tx, SOURCE_ALIAS, table).map_err(failed)?;
    let existing = if table_exists(&tx, "main", table).map_err(failed)? {
        Some(table_columns(&tx, "main", table).map_err(failed)?)
    } else {
        None
    };

    let columns = plan_copy(table, &source_columns, existing.as_deref(), policy)?;

    let quoted = table.quoted();
    let source = format!("{}.{quoted}", quote_identifier(SOURCE_ALIAS));

    let table_created = existing.is_none();
    if table_created {
        tx.execute(
            &format!("CREATE TABLE main.{quoted} AS SELECT * FROM {source} WHERE 0"),
            [],
        )
        .map_err(failed)?;
        debug!(table = %table, "Created destination table from source shape");
    }

    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let rows_deleted = tx
        .execute(&format!("DELETE FROM main.{quoted}"), [])
        .map_err(failed)?;
    let rows_copied = tx
        .execute(
            &format!(
                "INSERT INTO main.{quoted} ({column_list}) SELECT {column_list} FROM {source}"
            ),
            [],
        )
        .map_err(failed)?;

    tx.commit().map_err(failed)?;

    Ok(ImportReport {
        table: table.to_string(),
        rows_deleted,
        rows_copied,
        table_created,
        columns,
    })
}

/// The export transaction: one `CREATE TABLE … AS SELECT`, then commit.
fn snapshot_table(conn: &mut Connection, table: &TableName) -> Result<ExportReport> {
    let failed = |e: rusqlite::Error| Error::TransactionFailure {
        table: table.to_string(),
        source: e,
    };

    let tx = conn.transaction().map_err(failed)?;

    if !table_exists(&tx, SOURCE_ALIAS, table).map_err(failed)? {
        return Err(Error::TableNotFound {
            schema: "application".to_string(),
            table: table.to_string(),
        });
    }

    let quoted = table.quoted();
    tx.execute(
        &format!(
            "CREATE TABLE main.{quoted} AS SELECT * FROM {}.{quoted}",
            quote_identifier(SOURCE_ALIAS)
        ),
        [],
    )
    .map_err(failed)?;

    let rows: i64 = tx
        .query_row(&format!("SELECT count(*) FROM main.{quoted}"), [], |row| {
            row.get(0)
        })
        .map_err(failed)?;
    let columns = table_columns(&tx, "main", table)
        .map_err(failed)?
        .into_iter()
        .map(|c| c.name)
        .collect();

    tx.commit().map_err(failed)?;

    Ok(ExportReport {
        table: table.to_string(),
        rows_exported: rows.unsigned_abs(),
        columns,
    })
}
