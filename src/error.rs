//! Error types for tabxfer.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=database, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! [`CleanupWarning`] is separate from [`Error`]: a staging file that could
//! not be deleted is reported, never propagated.

use std::path::PathBuf;
use thiserror::Error;

use crate::transfer::TransferFailure;

/// Result type alias for tabxfer operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    OpenFailure,
    AttachFailure,
    DatabaseError,

    // Not Found (exit 3)
    NotInitialized,
    TableNotFound,

    // Validation (exit 4)
    InvalidIdentifier,
    InvalidArgument,
    SchemaMismatch,

    // Transfer (exit 6)
    StagingError,
    TransactionFailure,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenFailure => "OPEN_FAILURE",
            Self::AttachFailure => "ATTACH_FAILURE",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::StagingError => "STAGING_ERROR",
            Self::TransactionFailure => "TRANSACTION_FAILURE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::OpenFailure | Self::AttachFailure | Self::DatabaseError => 2,
            Self::NotInitialized | Self::TableNotFound => 3,
            Self::InvalidIdentifier | Self::InvalidArgument | Self::SchemaMismatch => 4,
            Self::StagingError | Self::TransactionFailure => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a caller could reasonably retry the same request.
    ///
    /// True for transient failures (a busy database, an interrupted copy).
    /// False for anything that needs different input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StagingError | Self::TransactionFailure | Self::DatabaseError
        )
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while transferring a table.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Staging failed ({context}): {source}")]
    Staging {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open database {}: {reason}", path.display())]
    OpenFailure { path: PathBuf, reason: String },

    #[error("Cannot attach database {}: {reason}", path.display())]
    AttachFailure { path: PathBuf, reason: String },

    #[error("No application database at {}", path.display())]
    NotInitialized { path: PathBuf },

    #[error("Table not found: {schema}.{table}")]
    TableNotFound { schema: String, table: String },

    #[error(
        "Schema mismatch for table {table}: missing [{}], extra [{}]",
        missing.join(", "),
        extra.join(", ")
    )]
    SchemaMismatch {
        table: String,
        /// Source columns the destination lacks.
        missing: Vec<String>,
        /// Destination columns the source lacks.
        extra: Vec<String>,
    },

    #[error("Transaction on table {table} rolled back: {source}")]
    TransactionFailure {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid table name {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("{0}")]
    Transfer(TransferFailure),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Staging { .. } => ErrorCode::StagingError,
            Self::OpenFailure { .. } => ErrorCode::OpenFailure,
            Self::AttachFailure { .. } => ErrorCode::AttachFailure,
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::TransactionFailure { .. } => ErrorCode::TransactionFailure,
            Self::InvalidIdentifier { .. } => ErrorCode::InvalidIdentifier,
            Self::Transfer(failure) => failure.code,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::OpenFailure { path, .. } => Some(format!(
                "Check that {} exists and is a SQLite database, or pass --db <PATH>.",
                path.display()
            )),

            Self::NotInitialized { .. } => Some(
                "Pass --db <PATH> or set TABXFER_DB to an existing SQLite file.".to_string(),
            ),

            Self::AttachFailure { .. } => Some(
                "The external file is not a readable SQLite database. \
                 Use `tabxfer inspect <FILE>` to check it."
                    .to_string(),
            ),

            Self::TableNotFound { table, .. } => Some(format!(
                "No table named '{table}'. Use `tabxfer inspect <FILE>` to list tables, \
                 or pass --table <NAME>."
            )),

            Self::SchemaMismatch { .. } => Some(
                "Columns differ between source and destination. \
                 Re-run with --intersect to copy only the shared columns."
                    .to_string(),
            ),

            Self::InvalidIdentifier { .. } => Some(
                "Table names must be non-empty, at most 128 bytes, free of control \
                 characters, and must not start with `sqlite_`."
                    .to_string(),
            ),

            Self::Transfer(failure) => failure.hint.clone(),

            Self::Staging { .. }
            | Self::TransactionFailure { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        if let Self::Transfer(failure) = self {
            obj["error"]["stage"] = serde_json::Value::String(failure.stage.to_string());
        }

        obj
    }
}

/// A staging artifact that could not be removed.
///
/// Logged at `warn` and otherwise ignored: the transfer's own result
/// always wins over a failed cleanup.
#[derive(Error, Debug)]
#[error("Could not remove staging file {}: {source}", path.display())]
pub struct CleanupWarning {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
