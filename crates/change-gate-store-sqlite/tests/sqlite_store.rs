// crates/change-gate-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Change Store Tests
// Description: Audit tables, schema inspection, locking, and rollback.
// Purpose: Exercise the runtime end to end against real SQLite files.
// ============================================================================

//! ## Overview
//! Integration tests for the `SQLite` backends:
//! - Audit schema bootstrap and version validation
//! - Apply ordering and duplicate rejection
//! - Schema inspection for preconditions
//! - Advisory mutex exclusion across handles on one file
//! - Update, snapshot, and rollback through the core runtime

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use change_gate_core::AuditStore;
use change_gate_core::CatalogSource;
use change_gate_core::ChangeEngine;
use change_gate_core::ChangeEngineConfig;
use change_gate_core::DistributedMutex;
use change_gate_core::ErrorKind;
use change_gate_core::ExecType;
use change_gate_core::NewAppliedRecord;
use change_gate_core::RecordingEventSink;
use change_gate_core::RollbackManager;
use change_gate_core::RollbackRequest;
use change_gate_core::RollbackStatus;
use change_gate_core::RunStatus;
use change_gate_core::SchemaInspector;
use change_gate_core::StatementExecutor;
use change_gate_core::StoreError;
use change_gate_core::UpdateRequest;
use change_gate_store_sqlite::DEFAULT_SNAPSHOT_LABEL;
use change_gate_store_sqlite::SqliteAdvisoryMutex;
use change_gate_store_sqlite::SqliteBackupRestorer;
use change_gate_store_sqlite::SqliteChangeStore;
use change_gate_store_sqlite::SqliteStoreConfig;
use change_gate_store_sqlite::SqliteStoreError;
use change_gate_store_sqlite::create_snapshot;
use change_gate_store_sqlite::list_snapshots;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens a store in a fresh directory.
fn open_store(dir: &TempDir) -> SqliteChangeStore {
    SqliteChangeStore::open(SqliteStoreConfig::new(db_path(dir))).unwrap()
}

/// Database path inside `dir`.
fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("target.sqlite")
}

/// Writes a file under `root`.
fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Writes a manifest of `(id, sql)` changesets authored by `ops`.
fn write_catalog(root: &Path, changesets: &[(&str, &str, &str)]) -> CatalogSource {
    let mut manifest = String::from("databaseChangeLog:\n");
    for (id, sql, extra) in changesets {
        let file = format!("sql/{id}.sql");
        write(root, &file, sql);
        manifest.push_str(&format!(
            "  - changeSet:\n      id: \"{id}\"\n      author: ops\n      sqlFile: {file}\n"
        ));
        for line in extra.lines() {
            manifest.push_str("      ");
            manifest.push_str(line);
            manifest.push('\n');
        }
    }
    write(root, "changelog/changelog.yml", &manifest);
    CatalogSource::new(root)
}

/// Builds an engine over `store` with its own mutex handle.
fn engine(
    store: &SqliteChangeStore,
    lock_timeout: Duration,
) -> ChangeEngine<SqliteChangeStore, SqliteAdvisoryMutex> {
    ChangeEngine::new(
        store.clone(),
        SqliteAdvisoryMutex::for_database(store.path()),
        Arc::new(RecordingEventSink::new()),
        ChangeEngineConfig {
            lock_timeout,
            ..ChangeEngineConfig::default()
        },
    )
    .unwrap()
}

/// Builds an applied record fixture.
fn applied(id: &str) -> NewAppliedRecord {
    NewAppliedRecord {
        id: id.to_string(),
        author: "ops".to_string(),
        filename: format!("sql/{id}.sql"),
        executed_at: 1,
        exec_type: ExecType::Executed,
        checksum: "abc".to_string(),
        labels: String::new(),
        contexts: "dev,prod".to_string(),
    }
}

// ============================================================================
// SECTION: Audit Tables
// ============================================================================

#[test]
fn audit_schema_is_created_idempotently() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.ensure_schema().unwrap();
    store.ensure_schema().unwrap();
    let tables =
        ["DATABASECHANGELOG", "DATABASECHANGELOGLOCK", "ops_migration_runs", "ops_rollback_runs"];
    for table in tables {
        assert!(store.table_exists(table).unwrap(), "missing {table}");
    }
    assert!(!store.lock_record().unwrap().locked);
}

#[test]
fn unsupported_schema_version_fails_closed() {
    let dir = TempDir::new().unwrap();
    drop(open_store(&dir));
    let raw = Connection::open(db_path(&dir)).unwrap();
    raw.execute("UPDATE change_gate_meta SET version = 99", []).unwrap();
    drop(raw);

    let err = SqliteChangeStore::open(SqliteStoreConfig::new(db_path(&dir))).unwrap_err();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let err = SqliteChangeStore::open(SqliteStoreConfig::new(dir.path())).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn apply_order_is_strictly_increasing_and_unique() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let orders: Vec<i64> = ["001", "002", "003"]
        .into_iter()
        .map(|id| store.append_applied(applied(id)).unwrap().order_executed)
        .collect();
    assert_eq!(orders, vec![1, 2, 3]);

    let err = store.append_applied(applied("002")).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));

    let removed = store.delete_applied_after(1).unwrap();
    let removed_ids: Vec<&str> = removed.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(removed_ids, vec!["002", "003"]);
    assert_eq!(store.append_applied(applied("004")).unwrap().order_executed, 2);
}

#[test]
fn lock_row_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.mark_locked("ci@prod", 42).unwrap();
    let lock = store.lock_record().unwrap();
    assert!(lock.locked);
    assert_eq!(lock.granted_at, Some(42));
    assert_eq!(lock.locked_by.as_deref(), Some("ci@prod"));
    store.clear_lock().unwrap();
    assert_eq!(store.lock_record().unwrap(), change_gate_core::LockRecord::default());
}

// ============================================================================
// SECTION: Schema Inspection
// ============================================================================

#[test]
fn inspector_sees_real_schema() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.execute_statement("CREATE TABLE Users (id INTEGER, Email TEXT)").unwrap();
    store.execute_statement("CREATE INDEX idx_users_email ON Users (Email)").unwrap();
    store.execute_statement("INSERT INTO Users VALUES (1, 'a@example.com')").unwrap();

    assert!(store.table_exists("users").unwrap());
    assert!(!store.table_exists("orders").unwrap());
    assert!(store.column_exists("USERS", "email").unwrap());
    assert!(!store.column_exists("users", "age").unwrap());
    assert!(store.index_exists("users", "IDX_USERS_EMAIL").unwrap());
    assert!(!store.index_exists("users", "idx_missing").unwrap());

    assert_eq!(store.query_scalar("SELECT COUNT(*) FROM users").unwrap().as_deref(), Some("1"));
    assert_eq!(
        store.query_scalar("SELECT email FROM users WHERE id = 1").unwrap().as_deref(),
        Some("a@example.com")
    );
    assert_eq!(store.query_scalar("SELECT id FROM users WHERE id = 2").unwrap(), None);
    assert_eq!(store.query_scalar("SELECT NULL").unwrap().as_deref(), Some("NULL"));
}

#[test]
fn failing_statement_surfaces_store_error() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    assert!(store.execute_statement("INSERT INTO nowhere VALUES (1)").is_err());
}

// ============================================================================
// SECTION: Advisory Mutex
// ============================================================================

#[test]
fn advisory_mutex_excludes_other_handles() {
    let dir = TempDir::new().unwrap();
    let first = SqliteAdvisoryMutex::for_database(&db_path(&dir));
    let second = SqliteAdvisoryMutex::for_database(&db_path(&dir));
    assert!(first.path().to_string_lossy().ends_with("target.sqlite.advisory-lock"));

    assert!(first.try_acquire(Duration::from_millis(50)).unwrap());
    assert!(first.try_acquire(Duration::ZERO).unwrap());
    assert!(!second.try_acquire(Duration::from_millis(50)).unwrap());

    first.release().unwrap();
    assert!(!first.is_held().unwrap());
    assert!(second.try_acquire(Duration::from_millis(50)).unwrap());
    second.release().unwrap();
}

#[test]
fn second_runner_fails_fast_with_lock_contention() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("catalog");
    let source = write_catalog(&root, &[("001", "CREATE TABLE t1 (id INTEGER);", "")]);
    let store = open_store(&dir);
    let holder = SqliteAdvisoryMutex::for_database(store.path());
    assert!(holder.try_acquire(Duration::ZERO).unwrap());

    let other_handle = SqliteChangeStore::open(SqliteStoreConfig::new(db_path(&dir))).unwrap();
    let blocked = engine(&other_handle, Duration::from_millis(50));
    let err = blocked.update(&UpdateRequest::new(source.clone())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockContention);
    assert!(store.applied_records().unwrap().is_empty());
    assert_eq!(store.recent_runs(1).unwrap()[0].status, RunStatus::Failed);

    holder.release().unwrap();
    assert_eq!(blocked.update(&UpdateRequest::new(source)).unwrap().applied_count(), 1);
}

// ============================================================================
// SECTION: End to End
// ============================================================================

#[test]
fn update_applies_and_evaluates_preconditions_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("catalog");
    let source = write_catalog(
        &root,
        &[
            ("001", "CREATE TABLE users (id INTEGER);\nINSERT INTO users VALUES (1);", ""),
            (
                "002",
                "ALTER TABLE users ADD COLUMN email TEXT;",
                "preconditions:\n  - tableExists:\n      tableName: users\n  - sqlCheck:\n      \
                 sql: SELECT COUNT(*) FROM users\n      expectedResult: 1",
            ),
            (
                "003",
                "CREATE TABLE legacy (id INTEGER);",
                "preconditions:\n  - tableExists:\n      tableName: legacy_archive\n    onFail: \
                 MARK_RAN",
            ),
        ],
    );
    let store = open_store(&dir);
    let runner = engine(&store, Duration::from_millis(500));

    let report = runner.update(&UpdateRequest::new(source.clone())).unwrap();
    assert_eq!(report.applied_count(), 2);
    assert!(store.column_exists("users", "email").unwrap());
    assert!(!store.table_exists("legacy").unwrap());

    let records = store.applied_records().unwrap();
    let settled: Vec<(&str, ExecType, i64)> = records
        .iter()
        .map(|record| (record.id.as_str(), record.exec_type, record.order_executed))
        .collect();
    assert_eq!(
        settled,
        vec![
            ("001", ExecType::Executed, 1),
            ("002", ExecType::Executed, 2),
            ("003", ExecType::MarkRan, 3),
        ]
    );
    assert!(!store.lock_record().unwrap().locked);

    let again = runner.update(&UpdateRequest::new(source.clone())).unwrap();
    assert_eq!(again.applied_count(), 0);
    assert_eq!(runner.verify(&source).unwrap().checked, 2);
}

#[test]
fn rollback_restores_snapshot_and_prunes_changelog() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("catalog");
    let store = open_store(&dir);
    let runner = engine(&store, Duration::from_millis(500));
    let changesets = [
        ("001", "CREATE TABLE t1 (id INTEGER);", ""),
        ("002", "CREATE TABLE t2 (id INTEGER);", ""),
        ("003", "CREATE TABLE t3 (id INTEGER);", ""),
        ("004", "CREATE TABLE t4 (id INTEGER);", ""),
    ];

    let first_two = write_catalog(&root, &changesets[..2]);
    runner.update(&UpdateRequest::new(first_two)).unwrap();
    let backups = dir.path().join("backups");
    let snapshot = create_snapshot(&store, &backups, "pre deploy").unwrap();
    let listed = list_snapshots(&backups).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].label, "pre-deploy");
    assert_eq!(listed[0].path, snapshot);

    let all = write_catalog(&root, &changesets);
    runner.update(&UpdateRequest::new(all)).unwrap();
    assert!(store.table_exists("t4").unwrap());

    let manager = RollbackManager::new(
        store.clone(),
        SqliteBackupRestorer::new(store.clone()),
        Arc::new(RecordingEventSink::new()),
    );
    let report = manager
        .rollback(&RollbackRequest {
            target_id: "002".to_string(),
            author: None,
            backup_ref: snapshot.to_string_lossy().into_owned(),
        })
        .unwrap();
    assert_eq!(report.target_order, 2);
    assert!(report.removed_ids.is_empty());
    assert!(!store.table_exists("t3").unwrap());
    assert!(!store.table_exists("t4").unwrap());
    assert_eq!(store.applied_records().unwrap().len(), 2);

    let record = store.rollback_run(&report.run_id).unwrap().unwrap();
    assert_eq!(record.status, RollbackStatus::Completed);
}

#[test]
fn snapshot_labels_never_contain_the_timestamp_separator() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let backups = dir.path().join("backups");
    create_snapshot(&store, &backups, "nightly_full").unwrap();
    create_snapshot(&store, &backups, "   ").unwrap();

    let mut labels: Vec<String> =
        list_snapshots(&backups).unwrap().into_iter().map(|entry| entry.label).collect();
    labels.sort();
    let mut expected = vec!["nightly-full".to_string(), DEFAULT_SNAPSHOT_LABEL.to_string()];
    expected.sort();
    assert_eq!(labels, expected);
}

#[test]
fn rollback_prunes_records_after_target_in_a_full_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    for id in ["001", "002", "003", "004"] {
        store.append_applied(applied(id)).unwrap();
    }
    let backups = dir.path().join("backups");
    let snapshot = create_snapshot(&store, &backups, "full").unwrap();

    let manager = RollbackManager::new(
        store.clone(),
        SqliteBackupRestorer::new(store.clone()),
        Arc::new(RecordingEventSink::new()),
    );
    let report = manager
        .rollback(&RollbackRequest {
            target_id: "002".to_string(),
            author: None,
            backup_ref: snapshot.to_string_lossy().into_owned(),
        })
        .unwrap();
    assert_eq!(report.removed_ids, vec!["003".to_string(), "004".to_string()]);
    let record = store.rollback_run(&report.run_id).unwrap().unwrap();
    assert_eq!(record.removed_ids, report.removed_ids);

    let missing = manager
        .rollback(&RollbackRequest {
            target_id: "002".to_string(),
            author: None,
            backup_ref: dir.path().join("missing.sqlite").to_string_lossy().into_owned(),
        })
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}
