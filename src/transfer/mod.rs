//! Transfer coordination.
//!
//! The [`Coordinator`] sequences one transfer end to end:
//!
//! - **Import**: stage the external source → merge into the application
//!   database → release the staging file
//! - **Export**: reserve a scratch file → snapshot the table into it →
//!   deliver it to the external destination → release the scratch file
//!
//! Staging files are released on every path, after the merge has either
//! committed or rolled back. A failed release is logged and never changes
//! the outcome.
//!
//! # Execution
//!
//! [`Coordinator::run_import`] and [`Coordinator::run_export`] block the
//! calling thread. [`Coordinator::import`] and [`Coordinator::export`] run the
//! same sequence on tokio's blocking pool and resolve to the [`Outcome`].
//!
//! # Example
//!
//! ```ignore
//! use tabxfer::config::TransferConfig;
//! use tabxfer::staging::FileLocation;
//! use tabxfer::transfer::{Coordinator, Outcome};
//! use tabxfer::validate::TableName;
//!
//! let coordinator = Coordinator::new(&TransferConfig::new("app.db", "/tmp/tabxfer"))?;
//! let table = TableName::parse("productos")?;
//!
//! match coordinator.import(FileLocation::new("backup.db"), table).await {
//!     Outcome::Success(report) => println!("{} rows imported", report.rows),
//!     Outcome::Failure(failure) => eprintln!("{failure}"),
//! }
//! ```

pub mod lock;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::staging::{file_digest, ExternalDestination, ExternalSource, StagingArea, StagingFile};
use crate::storage::{export_table, import_table, MergeOptions};
use crate::validate::TableName;

pub use lock::DatabaseLock;

/// Which way the table moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// External file → application database.
    Import,
    /// Application database → external file.
    Export,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Export => write!(f, "export"),
        }
    }
}

/// One transfer request, alive from invocation until its outcome is reported.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOperation {
    pub id: Uuid,
    pub direction: Direction,
    pub table: TableName,
    /// Caller's description of the external location.
    pub external: String,
    /// Engine-owned staging file, once one exists.
    #[serde(skip)]
    pub staging_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl TransferOperation {
    #[must_use]
    pub fn new(direction: Direction, table: TableName, external: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            table,
            external,
            staging_path: None,
            started_at: Utc::now(),
        }
    }
}

/// Where in the sequence a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Copying bytes in, or preparing local files. Nothing was mutated.
    Staging,
    /// The SQL transaction. Rolled back; the destination is unchanged.
    Merge,
    /// Writing the export to its destination. The application database was
    /// only read.
    Delivery,
    /// The background worker itself failed.
    Runtime,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staging => write!(f, "staging"),
            Self::Merge => write!(f, "merge"),
            Self::Delivery => write!(f, "delivery"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

/// A terminal failure, with enough detail to tell the stages apart.
#[derive(Debug, Clone, Serialize)]
pub struct TransferFailure {
    pub operation_id: Uuid,
    pub direction: Direction,
    pub stage: FailureStage,
    pub code: ErrorCode,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed during {}: {}",
            self.direction, self.stage, self.reason
        )
    }
}

/// What a successful transfer did.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub operation_id: Uuid,
    pub direction: Direction,
    pub table: String,
    pub external: String,
    /// Rows now in the destination table.
    pub rows: u64,
    pub columns: Vec<String>,
    /// Import only: the destination table was created.
    pub table_created: bool,
    /// Size of the database file that crossed the boundary.
    pub bytes: u64,
    /// SHA256 of the database file that crossed the boundary.
    pub sha256: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Terminal result of one transfer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success(TransferReport),
    Failure(TransferFailure),
}

impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a `Result`, for callers that propagate with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transfer`] for a failed outcome.
    pub fn into_result(self) -> Result<TransferReport> {
        match self {
            Self::Success(report) => Ok(report),
            Self::Failure(failure) => Err(Error::Transfer(failure)),
        }
    }
}

type StepResult<T> = std::result::Result<T, (FailureStage, Error)>;

fn at<T>(stage: FailureStage, result: Result<T>) -> StepResult<T> {
    result.map_err(|e| (stage, e))
}

/// Runs transfers against one application database.
#[derive(Debug, Clone)]
pub struct Coordinator {
    app_db: PathBuf,
    staging: StagingArea,
    options: MergeOptions,
}

impl Coordinator {
    /// Build a coordinator, creating the staging directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] if the staging directory cannot be created.
    pub fn new(config: &TransferConfig) -> Result<Self> {
        Ok(Self {
            app_db: config.app_db.clone(),
            staging: StagingArea::new(&config.staging_dir)?,
            options: MergeOptions {
                busy_timeout: config.busy_timeout,
                schema_policy: config.schema_policy,
            },
        })
    }

    #[must_use]
    pub fn app_db(&self) -> &Path {
        &self.app_db
    }

    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        self.staging.dir()
    }

    /// Import `table` from an external source, blocking until done.
    pub fn run_import(&self, source: &dyn ExternalSource, table: &TableName) -> Outcome {
        let mut op = TransferOperation::new(Direction::Import, table.clone(), source.describe());
        let span = info_span!("transfer", op_id = %op.id, direction = %op.direction, table = %table);
        let _enter = span.enter();
        info!(source = %op.external, "Transfer started");

        let staged = match self.staging.stage_in(source, table) {
            Ok(staged) => staged,
            Err(e) => return self.finish(&op, Err((FailureStage::Staging, e))),
        };
        op.staging_path = Some(staged.path().to_path_buf());

        let result = self.merge_staged(&op, &staged);
        staged.release_logged();

        self.finish(&op, result)
    }

    /// Export `table` to an external destination, blocking until done.
    pub fn run_export(&self, table: &TableName, destination: &dyn ExternalDestination) -> Outcome {
        let mut op =
            TransferOperation::new(Direction::Export, table.clone(), destination.describe());
        let span = info_span!("transfer", op_id = %op.id, direction = %op.direction, table = %table);
        let _enter = span.enter();
        info!(destination = %op.external, "Transfer started");

        if let Some(path) = destination.local_path() {
            if self.is_app_database(path) {
                let err = Error::InvalidArgument(format!(
                    "export destination {} is the application database",
                    path.display()
                ));
                return self.finish(&op, Err((FailureStage::Staging, err)));
            }
        }

        let scratch = match self.staging.create_scratch(table) {
            Ok(scratch) => scratch,
            Err(e) => return self.finish(&op, Err((FailureStage::Staging, e))),
        };
        op.staging_path = Some(scratch.path().to_path_buf());

        let result = self.snapshot_and_deliver(&op, &scratch, destination);
        scratch.release_logged();

        self.finish(&op, result)
    }

    /// Import on the blocking pool; resolves to the outcome.
    pub async fn import<S>(&self, source: S, table: TableName) -> Outcome
    where
        S: ExternalSource + 'static,
    {
        let this = self.clone();
        let handle = tokio::task::spawn_blocking(move || this.run_import(&source, &table));
        handle
            .await
            .unwrap_or_else(|e| runtime_failure(Direction::Import, &e))
    }

    /// Export on the blocking pool; resolves to the outcome.
    pub async fn export<D>(&self, table: TableName, destination: D) -> Outcome
    where
        D: ExternalDestination + 'static,
    {
        let this = self.clone();
        let handle = tokio::task::spawn_blocking(move || this.run_export(&table, &destination));
        handle
            .await
            .unwrap_or_else(|e| runtime_failure(Direction::Export, &e))
    }

    /// Whether `path` is the application database or one of its SQLite sidecars.
    fn is_app_database(&self, path: &Path) -> bool {
        if lock::same_file(path, &self.app_db) {
            return true;
        }
        ["-journal", "-wal", "-shm"].iter().any(|suffix| {
            let mut sidecar = self.app_db.as_os_str().to_os_string();
            sidecar.push(suffix);
            lock::same_file(path, Path::new(&sidecar))
        })
    }

    fn merge_staged(&self, op: &TransferOperation, staged: &StagingFile) -> StepResult<TransferReport> {
        let (bytes, sha256) = at(FailureStage::Staging, file_digest(staged.path()))?;

        let report = {
            let _lock = DatabaseLock::acquire(&self.app_db);
            at(
                FailureStage::Merge,
                import_table(&self.app_db, staged.path(), &op.table, &self.options),
            )?
        };

        Ok(TransferReport {
            operation_id: op.id,
            direction: op.direction,
            table: report.table,
            external: op.external.clone(),
            rows: report.rows_copied as u64,
            columns: report.columns,
            table_created: report.table_created,
            bytes,
            sha256,
            started_at: op.started_at,
            finished_at: Utc::now(),
        })
    }

    fn snapshot_and_deliver(
        &self,
        op: &TransferOperation,
        scratch: &StagingFile,
        destination: &dyn ExternalDestination,
    ) -> StepResult<TransferReport> {
        let report = {
            let _lock = DatabaseLock::acquire(&self.app_db);
            at(
                FailureStage::Merge,
                export_table(&self.app_db, scratch.path(), &op.table, &self.options),
            )?
        };

        let (bytes, sha256) = at(FailureStage::Staging, file_digest(scratch.path()))?;
        at(FailureStage::Delivery, self.staging.stage_out(scratch, destination))?;

        Ok(TransferReport {
            operation_id: op.id,
            direction: op.direction,
            table: report.table,
            external: op.external.clone(),
            rows: report.rows_exported,
            columns: report.columns,
            table_created: false,
            bytes,
            sha256,
            started_at: op.started_at,
            finished_at: Utc::now(),
        })
    }

    #[allow(clippy::unused_self)]
    fn finish(&self, op: &TransferOperation, result: StepResult<TransferReport>) -> Outcome {
        match result {
            Ok(report) => {
                info!(rows = report.rows, bytes = report.bytes, "Transfer complete");
                Outcome::Success(report)
            }
            Err((stage, error)) => {
                warn!(%stage, error = %error, "Transfer failed");
                Outcome::Failure(TransferFailure {
                    operation_id: op.id,
                    direction: op.direction,
                    stage,
                    code: error.error_code(),
                    reason: error.to_string(),
                    hint: error.hint(),
                })
            }
        }
    }
}

fn runtime_failure(direction: Direction, error: &tokio::task::JoinError) -> Outcome {
    warn!(%direction, error = %error, "Transfer worker failed");
    Outcome::Failure(TransferFailure {
        operation_id: Uuid::new_v4(),
        direction,
        stage: FailureStage::Runtime,
        code: ErrorCode::InternalError,
        reason: error.to_string(),
        hint: None,
    })
}
