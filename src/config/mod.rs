//! Configuration management.
//!
//! This module resolves the locations a transfer needs and aggregates the
//! coordinator's settings.
//!
//! # Architecture
//!
//! - **Application database**: long-lived, owned by the host application.
//!   Defaults to `~/.tabxfer/data/app.db`.
//! - **Staging directory**: private scratch space for staged imports and
//!   export snapshots. Defaults to `<system temp>/tabxfer`.
//!
//! Every location follows the same priority: explicit flag, then
//! environment variable, then platform default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::storage::SchemaPolicy;
use crate::validate::TableName;

/// Table transferred when the caller does not name one.
pub const DEFAULT_TABLE: &str = "productos";

/// Environment variable overriding the application database path.
pub const DB_ENV: &str = "TABXFER_DB";

/// Environment variable overriding the staging directory.
pub const STAGING_DIR_ENV: &str = "TABXFER_STAGING_DIR";

/// Environment variable overriding the default table.
pub const TABLE_ENV: &str = "TABXFER_TABLE";

/// How long a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Get the global tabxfer directory location (`~/.tabxfer/`).
#[must_use]
pub fn global_tabxfer_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tabxfer"))
}

/// Resolve the application database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `TABXFER_DB` environment variable
/// 3. Global location: `~/.tabxfer/data/app.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(path) = non_empty_env(DB_ENV) {
        return Some(PathBuf::from(path));
    }

    global_tabxfer_dir().map(|dir| dir.join("data").join("app.db"))
}

/// Resolve the staging directory.
///
/// Priority:
/// 1. If `explicit_dir` is provided, use it directly
/// 2. `TABXFER_STAGING_DIR` environment variable
/// 3. Per-user cache: `<cache dir>/tabxfer/staging` (e.g. `~/.cache/tabxfer/staging`)
/// 4. `<system temp>/tabxfer-staging` when no home directory is known
///
/// The directory is not created here; [`crate::staging::StagingArea`] does
/// that, owner-only, and refuses one that other users can write to.
#[must_use]
pub fn resolve_staging_dir(explicit_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit_dir {
        return dir.to_path_buf();
    }

    if let Some(dir) = non_empty_env(STAGING_DIR_ENV) {
        return PathBuf::from(dir);
    }

    directories::BaseDirs::new().map_or_else(
        || std::env::temp_dir().join("tabxfer-staging"),
        |b| b.cache_dir().join("tabxfer").join("staging"),
    )
}

/// Default file name for an export whose destination the caller left open.
///
/// `tabla_<table>_<unix millis>.db`, so repeated exports never collide.
#[must_use]
pub fn default_export_file_name(table: &TableName, now: DateTime<Utc>) -> String {
    format!("tabla_{}_{}.db", table.file_label(), now.timestamp_millis())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Settings for a [`crate::transfer::Coordinator`].
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// The application database every transfer reads from or writes to.
    pub app_db: PathBuf,
    /// Where staging files live.
    pub staging_dir: PathBuf,
    /// Busy timeout applied to every connection.
    pub busy_timeout: Duration,
    /// What to do when the destination table already exists with other columns.
    pub schema_policy: SchemaPolicy,
}

impl TransferConfig {
    /// Configuration with default timeout and strict schema policy.
    #[must_use]
    pub fn new(app_db: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_db: app_db.into(),
            staging_dir: staging_dir.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            schema_policy: SchemaPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.schema_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/app.db");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_default_location() {
        // Only meaningful when the environment does not override it
        if std::env::var(DB_ENV).is_ok() {
            return;
        }
        let path = resolve_db_path(None).unwrap();
        assert!(path.ends_with("app.db"));
        assert!(path.to_string_lossy().contains(".tabxfer"));
    }

    #[test]
    fn test_resolve_staging_dir_with_explicit() {
        let dir = PathBuf::from("/scratch/here");
        assert_eq!(resolve_staging_dir(Some(&dir)), dir);
    }

    #[test]
    fn test_resolve_staging_dir_default_is_per_user() {
        if std::env::var(STAGING_DIR_ENV).is_ok() {
            return;
        }
        let dir = resolve_staging_dir(None);
        assert!(dir.ends_with("tabxfer/staging") || dir.ends_with("tabxfer-staging"));
        assert_ne!(dir, std::env::temp_dir().join("tabxfer"));
        if let Some(base) = directories::BaseDirs::new() {
            assert!(dir.starts_with(base.cache_dir()));
        }
    }

    #[test]
    fn test_default_export_file_name() {
        let table = TableName::parse("productos").unwrap();
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            default_export_file_name(&table, now),
            "tabla_productos_1700000000123.db"
        );
    }

    #[test]
    fn test_transfer_config_builders() {
        let config = TransferConfig::new("/db/app.db", "/tmp/stage")
            .with_busy_timeout(Duration::from_millis(250))
            .with_schema_policy(SchemaPolicy::Intersect);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.schema_policy, SchemaPolicy::Intersect);
        assert_eq!(config.app_db, PathBuf::from("/db/app.db"));
    }
}
