//! SQLite storage layer for tabxfer.
//!
//! This module provides the persistence side of a transfer:
//! - Scoped connections (one per operation, closed on every path)
//! - Attach/detach of the second database file
//! - Transaction discipline for the replace and snapshot sequences
//!
//! # Submodules
//!
//! - [`attach`] - The attach-merge engine (import and export transactions)
//! - [`schema`] - Table introspection and schema compatibility policy

pub mod attach;
pub mod schema;

pub use attach::{export_table, import_table, ExportReport, ImportReport, MergeOptions};
pub use schema::{inspect_database, ColumnInfo, SchemaPolicy, TableSummary};
