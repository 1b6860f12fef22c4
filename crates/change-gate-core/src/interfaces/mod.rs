// crates/change-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Change Gate Interfaces
// Description: Backend-agnostic interfaces for storage, locking, and restore.
// Purpose: Define the contract surfaces used by the Change Gate runtime.
// Dependencies: thiserror, crate::core
// ============================================================================

//! ## Overview
//! The runtime never talks to a database directly. It uses:
//! - [`AuditStore`] for the lock row, changelog, and run tables,
//! - [`SchemaInspector`] for precondition checks,
//! - [`StatementExecutor`] to run changeset statements,
//! - [`DistributedMutex`] for the session-scoped advisory layer of the lock,
//! - [`BackupRestorer`] for the opaque full-database restore used by rollback.
//!
//! Implementations must fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use thiserror::Error;

use crate::core::AppliedRecord;
use crate::core::LockRecord;
use crate::core::NewAppliedRecord;
use crate::core::RollbackRunRecord;
use crate::core::RunRecord;
use crate::core::RunStatus;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("change store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("change store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("change store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("change store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("change store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Persistence for the lock row, changelog, and run history.
pub trait AuditStore {
    /// Creates the audit tables and the singleton lock row if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when bootstrap fails.
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Reads the singleton lock row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the row cannot be read.
    fn lock_record(&self) -> Result<LockRecord, StoreError>;

    /// Marks the lock row as held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn mark_locked(&self, locked_by: &str, granted_at: i64) -> Result<(), StoreError>;

    /// Clears the lock row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn clear_lock(&self) -> Result<(), StoreError>;

    /// Returns all applied records ordered by `order_executed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the changelog cannot be read.
    fn applied_records(&self) -> Result<Vec<AppliedRecord>, StoreError>;

    /// Inserts an applied record with `order_executed = max + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn append_applied(&self, record: NewAppliedRecord) -> Result<AppliedRecord, StoreError>;

    /// Deletes every applied record with `order_executed > order`, returning
    /// the removed records in apply order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_applied_after(&self, order: i64) -> Result<Vec<AppliedRecord>, StoreError>;

    /// Inserts a new run record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    /// Finalizes a run record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        finished_at: i64,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Loads a run record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError>;

    /// Returns the most recent run records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError>;

    /// Inserts or replaces a rollback run record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save_rollback_run(&self, record: &RollbackRunRecord) -> Result<(), StoreError>;

    /// Loads a rollback run record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn rollback_run(&self, run_id: &str) -> Result<Option<RollbackRunRecord>, StoreError>;
}

// ============================================================================
// SECTION: Target Database
// ============================================================================

/// Read-only schema introspection used by preconditions.
pub trait SchemaInspector {
    /// Returns whether a table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    /// Returns whether a column exists on a table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError>;

    /// Returns whether an index exists on a table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn index_exists(&self, table: &str, index: &str) -> Result<bool, StoreError>;

    /// Runs a query and returns the first column of the first row as text.
    /// Returns `None` when the query produces no row. A NULL value is
    /// rendered as the text `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn query_scalar(&self, sql: &str) -> Result<Option<String>, StoreError>;
}

/// Executes a single SQL statement, committing it on success.
pub trait StatementExecutor {
    /// Executes one statement in its own implicit transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the statement fails.
    fn execute_statement(&self, sql: &str) -> Result<(), StoreError>;
}

/// Everything the engine needs from one database handle.
pub trait ChangeDatabase: AuditStore + SchemaInspector + StatementExecutor {}

impl<T> ChangeDatabase for T where T: AuditStore + SchemaInspector + StatementExecutor + ?Sized {}

// ============================================================================
// SECTION: Distributed Mutex
// ============================================================================

/// Session-scoped cross-process mutex.
pub trait DistributedMutex {
    /// Attempts to acquire the mutex, waiting at most `timeout`.
    /// Returns `Ok(false)` when another session holds it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the primitive itself fails.
    fn try_acquire(&self, timeout: Duration) -> Result<bool, StoreError>;

    /// Releases the mutex if held by this session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when release fails.
    fn release(&self) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Backup Restore
// ============================================================================

/// Restore errors.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// Backup artifact does not exist.
    #[error("backup not found: {0}")]
    NotFound(String),
    /// Restore operation failed.
    #[error("backup restore failed: {0}")]
    Failed(String),
}

/// Opaque full-database restore from a named backup artifact.
pub trait BackupRestorer {
    /// Replaces the target database with the contents of `backup_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`RestoreError`] when the artifact is missing or the restore fails.
    fn restore(&self, backup_ref: &str) -> Result<(), RestoreError>;
}
