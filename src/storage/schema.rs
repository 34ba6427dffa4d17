//! Table introspection and schema compatibility.
//!
//! Column lists come from `pragma_table_info`, which takes the table and
//! schema names as bound parameters. Only the schema name used to reach
//! `sqlite_master` is interpolated, and it is always an internal constant.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{Connection, OpenFlags, Result as SqlResult};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::validate::{quote_identifier, TableName};

/// What to do when the destination table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Both tables must have the same column names (case-insensitive, any order).
    #[default]
    Strict,
    /// Copy only the columns both tables share.
    Intersect,
}

/// One column of a table, as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type; empty when the column has none.
    pub decl_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Summary of one table in a database file.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: u64,
}

/// Whether `schema` holds an ordinary table named `table`.
///
/// # Errors
///
/// Returns an error if `sqlite_master` cannot be queried.
pub fn table_exists(conn: &Connection, schema: &str, table: &TableName) -> SqlResult<bool> {
    let sql = format!(
        "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        quote_identifier(schema)
    );
    let count: i64 = conn.query_row(&sql, [table.as_str()], |row| row.get(0))?;
    Ok(count > 0)
}

/// Columns of `schema.table` in declaration order.
///
/// # Errors
///
/// Returns an error if the pragma query fails.
pub fn table_columns(conn: &Connection, schema: &str, table: &TableName) -> SqlResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1, ?2) ORDER BY cid",
    )?;
    let rows = stmt.query_map([table.as_str(), schema], |row| {
        Ok(ColumnInfo {
            name: row.get(0)?,
            decl_type: row.get(1)?,
            not_null: row.get::<_, i64>(2)? != 0,
            primary_key: row.get::<_, i64>(3)? != 0,
        })
    })?;
    rows.collect()
}

/// Decide which columns an import copies.
///
/// With no existing destination, every source column is copied (the
/// destination is about to be created from the source's shape).
///
/// # Errors
///
/// Returns [`Error::SchemaMismatch`] when the policy rejects the pair.
pub fn plan_copy(
    table: &TableName,
    source: &[ColumnInfo],
    destination: Option<&[ColumnInfo]>,
    policy: SchemaPolicy,
) -> Result<Vec<String>> {
    let source_names: Vec<String> = source.iter().map(|c| c.name.clone()).collect();

    let Some(destination) = destination else {
        return Ok(source_names);
    };

    let dest_keys: HashSet<String> = destination.iter().map(|c| c.name.to_lowercase()).collect();
    let source_keys: HashSet<String> = source.iter().map(|c| c.name.to_lowercase()).collect();

    let missing: Vec<String> = source_names
        .iter()
        .filter(|n| !dest_keys.contains(&n.to_lowercase()))
        .cloned()
        .collect();
    let extra: Vec<String> = destination
        .iter()
        .filter(|c| !source_keys.contains(&c.name.to_lowercase()))
        .map(|c| c.name.clone())
        .collect();

    let shared: Vec<String> = source_names
        .into_iter()
        .filter(|n| dest_keys.contains(&n.to_lowercase()))
        .collect();

    let rejected = match policy {
        SchemaPolicy::Strict => !missing.is_empty() || !extra.is_empty(),
        SchemaPolicy::Intersect => shared.is_empty(),
    };

    if rejected {
        return Err(Error::SchemaMismatch {
            table: table.to_string(),
            missing,
            extra,
        });
    }

    Ok(shared)
}

/// Open a database file read-only and summarize its user tables.
///
/// # Errors
///
/// Returns [`Error::OpenFailure`] if the file cannot be opened or is not a
/// database.
pub fn inspect_database(path: &Path) -> Result<Vec<TableSummary>> {
    let open_failure = |e: rusqlite::Error| Error::OpenFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(open_failure)?;

    let names: Vec<String> = {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                 ORDER BY name",
            )
            .map_err(open_failure)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(open_failure)?;
        rows.collect::<SqlResult<_>>().map_err(open_failure)?
    };

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = {
            let mut stmt = conn.prepare(
                "SELECT name FROM pragma_table_info(?1, 'main') ORDER BY cid",
            )?;
            let rows = stmt.query_map([name.as_str()], |row| row.get(0))?;
            rows.collect::<SqlResult<Vec<String>>>()?
        };
        let rows: i64 = conn.query_row(
            &format!("SELECT count(*) FROM main.{}", quote_identifier(&name)),
            [],
            |row| row.get(0),
        )?;
        tables.push(TableSummary {
            name,
            columns,
            rows: rows.unsigned_abs(),
        });
    }

    Ok(tables)
}
