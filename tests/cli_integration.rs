use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use rusqlite::Connection;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            dir: tempdir().expect("tempdir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn database(&self, name: &str, sql: &str) -> PathBuf {
        let path = self.path(name);
        Connection::open(&path)
            .expect("open fixture db")
            .execute_batch(sql)
            .expect("seed fixture db");
        path
    }

    /// A `tabxfer` command isolated from the caller's environment.
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tabxfer").expect("binary built");
        cmd.current_dir(self.dir.path())
            .env_remove("TABXFER_DB")
            .env_remove("TABXFER_TABLE")
            .env_remove("RUST_LOG")
            .env("TABXFER_STAGING_DIR", self.path("staging"));
        cmd
    }

    fn staging_is_empty(&self) -> bool {
        let dir = self.path("staging");
        !dir.exists() || fs::read_dir(dir).expect("read staging").next().is_none()
    }
}

fn count(db: &Path, table: &str) -> i64 {
    Connection::open(db)
        .expect("open db")
        .query_row(&format!("SELECT count(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .expect("count rows")
}

/// Last JSON line of the output; log lines may precede it on stderr.
fn parse_json(bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes);
    let line = text
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON object in output:\n{text}"));
    serde_json::from_str(line.trim()).expect("valid JSON")
}

const APP_SQL: &str = "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                       INSERT INTO items VALUES (1, 'a');";
const EXT_SQL: &str = "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);
                       INSERT INTO items VALUES (1, 'a'), (2, 'b');";

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

#[test]
fn import_reports_json_summary() {
    let env = Env::new();
    let app = env.database("app.db", APP_SQL);
    let ext = env.database("ext.db", EXT_SQL);

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&app)
        .arg("import")
        .arg(&ext)
        .args(["--table", "items"])
        .output()
        .expect("run import");

    assert!(
        output.status.success(),
        "import failed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json = parse_json(&output.stdout);
    assert_eq!(json["success"], true);
    assert_eq!(json["report"]["rows"], 2);
    assert_eq!(json["report"]["table"], "items");
    assert_eq!(json["report"]["sha256"].as_str().map(str::len), Some(64));
    assert_eq!(count(&app, "items"), 2);
    assert!(env.staging_is_empty());
}

#[test]
fn import_reads_table_name_from_env() {
    let env = Env::new();
    let app = env.database("app.db", APP_SQL);
    let ext = env.database("ext.db", EXT_SQL);

    env.cmd()
        .env("TABXFER_DB", &app)
        .env("TABXFER_TABLE", "items")
        .arg("import")
        .arg(&ext)
        .assert()
        .success();

    assert_eq!(count(&app, "items"), 2);
}

#[test]
fn import_from_stdin() {
    let env = Env::new();
    let app = env.database("app.db", APP_SQL);
    let ext = env.database("ext.db", EXT_SQL);
    let bytes = fs::read(&ext).expect("read ext");

    env.cmd()
        .arg("--db")
        .arg(&app)
        .args(["import", "-", "--table", "items"])
        .write_stdin(bytes)
        .assert()
        .success();

    assert_eq!(count(&app, "items"), 2);
    assert!(env.staging_is_empty());
}

#[test]
fn schema_mismatch_exits_with_validation_code() {
    let env = Env::new();
    let app = env.database(
        "app.db",
        "CREATE TABLE items (id INTEGER PRIMARY KEY, sku TEXT); INSERT INTO items VALUES (1, 'x');",
    );
    let ext = env.database("ext.db", EXT_SQL);

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&app)
        .arg("import")
        .arg(&ext)
        .args(["--table", "items"])
        .output()
        .expect("run import");

    assert_eq!(output.status.code(), Some(4));
    let json = parse_json(&output.stderr);
    assert_eq!(json["error"]["code"], "SCHEMA_MISMATCH");
    assert_eq!(json["error"]["stage"], "merge");
    assert!(json["error"]["hint"].as_str().unwrap_or_default().contains("--intersect"));
    assert_eq!(count(&app, "items"), 1);
}

#[test]
fn intersect_flag_allows_partial_overlap() {
    let env = Env::new();
    let app = env.database(
        "app.db",
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, sku TEXT);",
    );
    let ext = env.database("ext.db", EXT_SQL);

    env.cmd()
        .arg("--db")
        .arg(&app)
        .arg("import")
        .arg(&ext)
        .args(["--table", "items", "--intersect"])
        .assert()
        .success();

    assert_eq!(count(&app, "items"), 2);
}

#[test]
fn reserved_table_name_is_rejected() {
    let env = Env::new();
    let app = env.database("app.db", APP_SQL);
    let ext = env.database("ext.db", EXT_SQL);

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&app)
        .arg("import")
        .arg(&ext)
        .args(["--table", "sqlite_master"])
        .output()
        .expect("run import");

    assert_eq!(output.status.code(), Some(4));
    let json = parse_json(&output.stderr);
    assert_eq!(json["error"]["code"], "INVALID_IDENTIFIER");
}

#[test]
fn missing_application_database_exits_not_found() {
    let env = Env::new();
    let ext = env.database("ext.db", EXT_SQL);
    let absent = env.path("absent.db");

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&absent)
        .arg("import")
        .arg(&ext)
        .output()
        .expect("run import");

    assert_eq!(output.status.code(), Some(3));
    let json = parse_json(&output.stderr);
    assert_eq!(json["error"]["code"], "NOT_INITIALIZED");
    assert!(!absent.exists());
}

// ---------------------------------------------------------------------------
// export
// ---------------------------------------------------------------------------

#[test]
fn export_to_named_file() {
    let env = Env::new();
    let app = env.database("app.db", EXT_SQL);
    let dest = env.path("backup/items.db");

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&app)
        .arg("export")
        .arg(&dest)
        .args(["--table", "items"])
        .output()
        .expect("run export");

    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["report"]["rows"], 2);
    assert_eq!(json["report"]["direction"], "export");
    assert_eq!(count(&dest, "items"), 2);
    assert!(env.staging_is_empty());
}

#[test]
fn export_uses_default_file_name() {
    let env = Env::new();
    let app = env.database("app.db", EXT_SQL);

    env.cmd()
        .arg("--db")
        .arg(&app)
        .args(["export", "--table", "items"])
        .assert()
        .success();

    let exported: Vec<PathBuf> = fs::read_dir(env.dir.path())
        .expect("read workspace")
        .map(|e| e.expect("entry").path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("tabla_items_") && n.ends_with(".db"))
        })
        .collect();
    assert_eq!(exported.len(), 1, "exported files: {exported:?}");
    assert_eq!(count(&exported[0], "items"), 2);
}

#[test]
fn export_to_stdout_keeps_summary_on_stderr() {
    let env = Env::new();
    let app = env.database("app.db", EXT_SQL);

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&app)
        .args(["export", "-", "--table", "items"])
        .output()
        .expect("run export");

    assert!(output.status.success());
    assert!(output.stdout.starts_with(b"SQLite format 3\0"));
    let json = parse_json(&output.stderr);
    assert_eq!(json["report"]["external"], "<stdout>");
    assert_eq!(
        json["report"]["bytes"].as_u64(),
        Some(output.stdout.len() as u64)
    );

    // The streamed bytes are a usable database
    let copy = env.path("streamed.db");
    fs::write(&copy, &output.stdout).expect("write copy");
    assert_eq!(count(&copy, "items"), 2);
}

#[test]
fn export_over_application_database_is_refused() {
    let env = Env::new();
    let app = env.database(
        "app.db",
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO items VALUES (1, 'a');
         CREATE TABLE customers (id INTEGER PRIMARY KEY);",
    );

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&app)
        .args(["export", "app.db", "--table", "items"])
        .output()
        .expect("run export");

    assert_eq!(output.status.code(), Some(4));
    let json = parse_json(&output.stderr);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");
    assert_eq!(json["error"]["stage"], "staging");
    assert_eq!(count(&app, "customers"), 0);
}

#[test]
fn export_of_missing_table_exits_not_found() {
    let env = Env::new();
    let app = env.database("app.db", "CREATE TABLE other (x);");
    let dest = env.path("items.db");

    let output = env
        .cmd()
        .args(["--json", "--db"])
        .arg(&app)
        .arg("export")
        .arg(&dest)
        .args(["--table", "items"])
        .output()
        .expect("run export");

    assert_eq!(output.status.code(), Some(3));
    let json = parse_json(&output.stderr);
    assert_eq!(json["error"]["code"], "TABLE_NOT_FOUND");
    assert!(!dest.exists());
}

// ---------------------------------------------------------------------------
// inspect, version, completions
// ---------------------------------------------------------------------------

#[test]
fn inspect_lists_tables() {
    let env = Env::new();
    let db = env.database(
        "shop.db",
        "CREATE TABLE productos (id INTEGER PRIMARY KEY, nombre TEXT);
         INSERT INTO productos (nombre) VALUES ('pan'), ('leche'), ('queso');",
    );

    let output = env
        .cmd()
        .args(["--json", "inspect"])
        .arg(&db)
        .output()
        .expect("run inspect");

    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["tables"][0]["name"], "productos");
    assert_eq!(json["tables"][0]["rows"], 3);
    assert_eq!(json["tables"][0]["columns"][1], "nombre");
}

#[test]
fn inspect_rejects_non_database() {
    let env = Env::new();
    let junk = env.path("junk.db");
    fs::write(&junk, "not a database\n".repeat(512)).expect("write junk");

    env.cmd()
        .arg("inspect")
        .arg(&junk)
        .assert()
        .failure()
        .code(2);
}

#[test]
fn version_json() {
    let env = Env::new();
    let output = env
        .cmd()
        .args(["--json", "version"])
        .output()
        .expect("run version");

    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["sqlite"].is_string());
}

#[test]
fn completions_name_the_binary() {
    let env = Env::new();
    let output = env
        .cmd()
        .args(["completions", "bash"])
        .output()
        .expect("run completions");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("tabxfer"));
}
