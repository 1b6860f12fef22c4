// crates/change-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Change Store
// Description: Audit trail and target database backed by SQLite.
// Purpose: Persist applied changesets, locks, and runs next to the schema
//          they describe.
// Dependencies: change-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteChangeStore`] is both the target database and its audit trail.
//! It implements [`AuditStore`], [`SchemaInspector`], and
//! [`StatementExecutor`] over one connection shared behind a mutex, so clones
//! are cheap and see the same state. Audit tables are created idempotently
//! and versioned through `change_gate_meta`. Database contents are
//! untrusted: unknown status labels fail closed as corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use change_gate_core::AppliedRecord;
use change_gate_core::AuditStore;
use change_gate_core::ExecType;
use change_gate_core::LockRecord;
use change_gate_core::NewAppliedRecord;
use change_gate_core::RollbackRunRecord;
use change_gate_core::RollbackStatus;
use change_gate_core::RunRecord;
use change_gate_core::RunStatus;
use change_gate_core::SchemaInspector;
use change_gate_core::StatementExecutor;
use change_gate_core::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::backup::Backup;
use rusqlite::params;
use rusqlite::types::Type;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Audit schema version.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Pages copied per backup step.
const BACKUP_PAGES_PER_STEP: i32 = 256;
/// Columns of `DATABASECHANGELOG` in row-mapping order.
const APPLIED_COLUMNS: &str =
    "ID, AUTHOR, FILENAME, DATEEXECUTED, ORDEREXECUTED, EXECTYPE, CHECKSUM, LABELS, CONTEXTS";
/// Columns of `ops_migration_runs` in row-mapping order.
const RUN_COLUMNS: &str = "run_id, env_name, actor, git_sha, started_at, finished_at, status, \
                           backup_ref, error_message";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` change store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Default busy timeout for serde.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` change store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or arguments.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a rusqlite error, keeping decode failures distinct.
fn db_err(err: rusqlite::Error) -> SqliteStoreError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(column, _, source) => {
            SqliteStoreError::Corrupt(format!("column {column}: {source}"))
        }
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            SqliteStoreError::Invalid(message.unwrap_or_else(|| failure.to_string()))
        }
        other => SqliteStoreError::Db(other.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed target database and audit trail.
#[derive(Debug, Clone)]
pub struct SqliteChangeStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteChangeStore {
    /// Opens or creates the database and bootstraps the audit schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or the schema version is unsupported.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the shared connection.
    fn guard(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Copies the live database into a new file at `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the destination exists or the
    /// online backup fails.
    pub fn snapshot_to(&self, destination: &Path) -> Result<(), SqliteStoreError> {
        if destination.exists() {
            return Err(SqliteStoreError::Invalid(format!(
                "snapshot target already exists: {}",
                destination.display()
            )));
        }
        ensure_parent_dir(destination)?;
        let guard = self.guard()?;
        let mut target = Connection::open(destination).map_err(db_err)?;
        let backup = Backup::new(&guard, &mut target).map_err(db_err)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None).map_err(db_err)
    }

    /// Replaces the live database with the contents of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Io`] when `source` is missing, or a
    /// database error when the online restore fails.
    pub fn restore_from(&self, source: &Path) -> Result<(), SqliteStoreError> {
        if !source.is_file() {
            return Err(SqliteStoreError::Io(format!("backup file not found: {}", source.display())));
        }
        let snapshot = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(db_err)?;
        let mut guard = self.guard()?;
        let backup = Backup::new(&snapshot, &mut guard).map_err(db_err)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None).map_err(db_err)
    }

    /// Counts rows matching a single-value query.
    fn count(&self, sql: &str, args: &[&str]) -> Result<i64, SqliteStoreError> {
        let guard = self.guard()?;
        guard
            .query_row(sql, rusqlite::params_from_iter(args.iter()), |row| row.get(0))
            .map_err(db_err)
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

impl AuditStore for SqliteChangeStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        initialize_schema(&mut guard)?;
        Ok(())
    }

    fn lock_record(&self) -> Result<LockRecord, StoreError> {
        let guard = self.guard()?;
        let record = guard
            .query_row(
                "SELECT LOCKED, LOCKGRANTED, LOCKEDBY FROM DATABASECHANGELOGLOCK WHERE ID = 1",
                params![],
                |row| {
                    Ok(LockRecord {
                        locked: row.get::<_, i64>(0)? != 0,
                        granted_at: row.get(1)?,
                        locked_by: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        Ok(record.unwrap_or_default())
    }

    fn mark_locked(&self, locked_by: &str, granted_at: i64) -> Result<(), StoreError> {
        let guard = self.guard()?;
        guard
            .execute(
                "INSERT INTO DATABASECHANGELOGLOCK (ID, LOCKED, LOCKGRANTED, LOCKEDBY) VALUES (1, \
                 1, ?1, ?2) ON CONFLICT(ID) DO UPDATE SET LOCKED = 1, LOCKGRANTED = \
                 excluded.LOCKGRANTED, LOCKEDBY = excluded.LOCKEDBY",
                params![granted_at, locked_by],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn clear_lock(&self) -> Result<(), StoreError> {
        let guard = self.guard()?;
        guard
            .execute(
                "UPDATE DATABASECHANGELOGLOCK SET LOCKED = 0, LOCKGRANTED = NULL, LOCKEDBY = NULL \
                 WHERE ID = 1",
                params![],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn applied_records(&self) -> Result<Vec<AppliedRecord>, StoreError> {
        let guard = self.guard()?;
        let records = select_applied(
            &guard,
            &format!("SELECT {APPLIED_COLUMNS} FROM DATABASECHANGELOG ORDER BY ORDEREXECUTED"),
            params![],
        )?;
        Ok(records)
    }

    fn append_applied(&self, record: NewAppliedRecord) -> Result<AppliedRecord, StoreError> {
        let mut guard = self.guard()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        let next: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(ORDEREXECUTED), 0) + 1 FROM DATABASECHANGELOG",
                params![],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        tx.execute(
            &format!(
                "INSERT INTO DATABASECHANGELOG ({APPLIED_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, \
                 ?6, ?7, ?8, ?9)"
            ),
            params![
                record.id,
                record.author,
                record.filename,
                record.executed_at,
                next,
                record.exec_type.as_str(),
                record.checksum,
                record.labels,
                record.contexts,
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(record.into_record(next))
    }

    fn delete_applied_after(&self, order: i64) -> Result<Vec<AppliedRecord>, StoreError> {
        let mut guard = self.guard()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
        let removed = select_applied(
            &tx,
            &format!(
                "SELECT {APPLIED_COLUMNS} FROM DATABASECHANGELOG WHERE ORDEREXECUTED > ?1 ORDER \
                 BY ORDEREXECUTED"
            ),
            params![order],
        )?;
        tx.execute("DELETE FROM DATABASECHANGELOG WHERE ORDEREXECUTED > ?1", params![order])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(removed)
    }

    fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let guard = self.guard()?;
        guard
            .execute(
                &format!(
                    "INSERT INTO ops_migration_runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, \
                     ?6, ?7, ?8, ?9)"
                ),
                params![
                    run.run_id,
                    run.env_name,
                    run.actor,
                    run.commit_ref,
                    run.started_at,
                    run.finished_at,
                    run.status.as_str(),
                    run.backup_ref,
                    run.error_message,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        finished_at: i64,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let guard = self.guard()?;
        let updated = guard
            .execute(
                "UPDATE ops_migration_runs SET status = ?2, finished_at = ?3, error_message = ?4 \
                 WHERE run_id = ?1",
                params![run_id, status.as_str(), finished_at, error_message],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(StoreError::Invalid(format!("run {run_id} not found")));
        }
        Ok(())
    }

    fn run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let guard = self.guard()?;
        let raw = guard
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM ops_migration_runs WHERE run_id = ?1"),
                params![run_id],
                RawRun::from_row,
            )
            .optional()
            .map_err(db_err)?;
        Ok(raw.map(RawRun::into_record).transpose()?)
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let guard = self.guard()?;
        let mut stmt = guard
            .prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM ops_migration_runs ORDER BY started_at DESC, rowid \
                 DESC LIMIT ?1"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map(params![limit], RawRun::from_row).map_err(db_err)?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.map_err(db_err)?.into_record()?);
        }
        Ok(runs)
    }

    fn save_rollback_run(&self, record: &RollbackRunRecord) -> Result<(), StoreError> {
        let removed = serde_json::to_string(&record.removed_ids)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.guard()?;
        guard
            .execute(
                "INSERT INTO ops_rollback_runs (run_id, target_version, backup_file, status, \
                 removed_migrations, started_at, completed_at, error_message) VALUES (?1, ?2, \
                 ?3, ?4, ?5, ?6, ?7, ?8) ON CONFLICT(run_id) DO UPDATE SET status = \
                 excluded.status, removed_migrations = excluded.removed_migrations, completed_at \
                 = excluded.completed_at, error_message = excluded.error_message",
                params![
                    record.run_id,
                    record.target_version,
                    record.backup_ref,
                    record.status.as_str(),
                    removed,
                    record.started_at,
                    record.completed_at,
                    record.error_message,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn rollback_run(&self, run_id: &str) -> Result<Option<RollbackRunRecord>, StoreError> {
        let guard = self.guard()?;
        let raw = guard
            .query_row(
                "SELECT run_id, target_version, backup_file, status, removed_migrations, \
                 started_at, completed_at, error_message FROM ops_rollback_runs WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RawRollbackRun {
                        run_id: row.get(0)?,
                        target_version: row.get(1)?,
                        backup_ref: row.get(2)?,
                        status: row.get(3)?,
                        removed: row.get(4)?,
                        started_at: row.get(5)?,
                        completed_at: row.get(6)?,
                        error_message: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)?;
        Ok(raw.map(RawRollbackRun::into_record).transpose()?)
    }
}

// ============================================================================
// SECTION: Schema Inspection and Execution
// ============================================================================

impl SchemaInspector for SqliteChangeStore {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let count = self.count(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            &[table],
        )?;
        Ok(count > 0)
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let count = self.count(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE",
            &[table, column],
        )?;
        Ok(count > 0)
    }

    fn index_exists(&self, table: &str, index: &str) -> Result<bool, StoreError> {
        let count = self.count(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 COLLATE \
             NOCASE AND name = ?2 COLLATE NOCASE",
            &[table, index],
        )?;
        Ok(count > 0)
    }

    fn query_scalar(&self, sql: &str) -> Result<Option<String>, StoreError> {
        let guard = self.guard()?;
        let mut stmt = guard.prepare(sql).map_err(db_err)?;
        if stmt.column_count() == 0 {
            return Err(StoreError::Invalid(format!("query returns no columns: {sql}")));
        }
        let mut rows = stmt.query(params![]).map_err(db_err)?;
        let Some(row) = rows.next().map_err(db_err)? else {
            return Ok(None);
        };
        Ok(Some(render_value(row.get_ref(0).map_err(db_err)?)))
    }
}

impl StatementExecutor for SqliteChangeStore {
    fn execute_statement(&self, sql: &str) -> Result<(), StoreError> {
        let guard = self.guard()?;
        let mut stmt = guard.prepare(sql).map_err(db_err)?;
        let mut rows = stmt.query(params![]).map_err(db_err)?;
        while rows.next().map_err(db_err)?.is_some() {}
        Ok(())
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Runs an applied-record query.
fn select_applied(
    connection: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<AppliedRecord>, SqliteStoreError> {
    let mut stmt = connection.prepare(sql).map_err(db_err)?;
    let rows = stmt.query_map(args, applied_from_row).map_err(db_err)?;
    rows.map(|row| row.map_err(db_err)).collect()
}

/// Decodes one `DATABASECHANGELOG` row.
fn applied_from_row(row: &Row<'_>) -> rusqlite::Result<AppliedRecord> {
    let exec_label: String = row.get(5)?;
    let exec_type = ExecType::parse(&exec_label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            Box::new(SqliteStoreError::Corrupt(format!("unknown EXECTYPE {exec_label}"))),
        )
    })?;
    Ok(AppliedRecord {
        id: row.get(0)?,
        author: row.get(1)?,
        filename: row.get(2)?,
        executed_at: row.get(3)?,
        order_executed: row.get(4)?,
        exec_type,
        checksum: row.get(6)?,
        labels: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        contexts: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
    })
}

/// Undecoded run row.
struct RawRun {
    /// Run identifier.
    run_id: String,
    /// Environment name.
    env_name: String,
    /// Actor.
    actor: Option<String>,
    /// Commit reference.
    commit_ref: Option<String>,
    /// Start time.
    started_at: i64,
    /// Finish time.
    finished_at: Option<i64>,
    /// Status label.
    status: String,
    /// Backup reference.
    backup_ref: Option<String>,
    /// Failure message.
    error_message: Option<String>,
}

impl RawRun {
    /// Reads a row selected with [`RUN_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            env_name: row.get(1)?,
            actor: row.get(2)?,
            commit_ref: row.get(3)?,
            started_at: row.get(4)?,
            finished_at: row.get(5)?,
            status: row.get(6)?,
            backup_ref: row.get(7)?,
            error_message: row.get(8)?,
        })
    }

    /// Decodes the status label.
    fn into_record(self) -> Result<RunRecord, SqliteStoreError> {
        let status = RunStatus::parse(&self.status).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unknown run status {}", self.status))
        })?;
        Ok(RunRecord {
            run_id: self.run_id,
            env_name: self.env_name,
            actor: self.actor,
            commit_ref: self.commit_ref,
            started_at: self.started_at,
            finished_at: self.finished_at,
            status,
            backup_ref: self.backup_ref,
            error_message: self.error_message,
        })
    }
}

/// Undecoded rollback row.
struct RawRollbackRun {
    /// Run identifier.
    run_id: String,
    /// Target changeset id.
    target_version: String,
    /// Backup reference.
    backup_ref: String,
    /// Status label.
    status: String,
    /// JSON array of removed ids.
    removed: Option<String>,
    /// Start time.
    started_at: i64,
    /// Completion time.
    completed_at: Option<i64>,
    /// Failure message.
    error_message: Option<String>,
}

impl RawRollbackRun {
    /// Decodes the status label and removed id list.
    fn into_record(self) -> Result<RollbackRunRecord, SqliteStoreError> {
        let status = RollbackStatus::parse(&self.status).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unknown rollback status {}", self.status))
        })?;
        let removed_ids = match self.removed.as_deref() {
            None | Some("") => Vec::new(),
            Some(json) => serde_json::from_str(json)
                .map_err(|err| SqliteStoreError::Corrupt(format!("removed_migrations: {err}")))?,
        };
        Ok(RollbackRunRecord {
            run_id: self.run_id,
            target_version: self.target_version,
            backup_ref: self.backup_ref,
            status,
            removed_ids,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
        })
    }
}

/// Renders a scalar result as text.
fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(number) => number.to_string(),
        ValueRef::Real(number) => number.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for a database file exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_err)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_err)?;
    Ok(connection)
}

/// Creates the audit tables or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_err)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS change_gate_meta (version INTEGER NOT NULL);")
        .map_err(db_err)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM change_gate_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_err)?;
    match version {
        None => {
            tx.execute(
                "INSERT INTO change_gate_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(db_err)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS DATABASECHANGELOGLOCK (
            ID INTEGER PRIMARY KEY,
            LOCKED INTEGER NOT NULL DEFAULT 0,
            LOCKGRANTED INTEGER,
            LOCKEDBY TEXT
        );
        INSERT OR IGNORE INTO DATABASECHANGELOGLOCK (ID, LOCKED) VALUES (1, 0);
        CREATE TABLE IF NOT EXISTS DATABASECHANGELOG (
            ID TEXT NOT NULL,
            AUTHOR TEXT NOT NULL,
            FILENAME TEXT NOT NULL,
            DATEEXECUTED INTEGER NOT NULL,
            ORDEREXECUTED INTEGER NOT NULL,
            EXECTYPE TEXT NOT NULL,
            CHECKSUM TEXT NOT NULL,
            LABELS TEXT,
            CONTEXTS TEXT,
            PRIMARY KEY (ID, AUTHOR)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_databasechangelog_order
            ON DATABASECHANGELOG (ORDEREXECUTED);
        CREATE TABLE IF NOT EXISTS ops_migration_runs (
            run_id TEXT PRIMARY KEY,
            env_name TEXT NOT NULL,
            git_sha TEXT,
            actor TEXT,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            status TEXT NOT NULL,
            backup_ref TEXT,
            error_message TEXT
        );
        CREATE TABLE IF NOT EXISTS ops_rollback_runs (
            run_id TEXT PRIMARY KEY,
            target_version TEXT NOT NULL,
            backup_file TEXT NOT NULL,
            status TEXT NOT NULL,
            removed_migrations TEXT,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            error_message TEXT
        );",
    )
    .map_err(db_err)?;
    tx.commit().map_err(db_err)
}
