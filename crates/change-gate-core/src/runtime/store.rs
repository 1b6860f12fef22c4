// crates/change-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Change Gate In-Memory Store
// Description: In-memory database, mutex, and restorer for tests and demos.
// Purpose: Exercise the runtime without an external database.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryChangeDatabase`] implements every database trait over shared
//! state: a declared schema for precondition checks, canned scalar query
//! results, a log of executed statements, and named snapshots used as
//! backup artifacts. [`InMemoryMutex`] is a process-local advisory mutex
//! with one handle per session. Neither is intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::core::AppliedRecord;
use crate::core::LockRecord;
use crate::core::NewAppliedRecord;
use crate::core::RollbackRunRecord;
use crate::core::RunRecord;
use crate::core::RunStatus;
use crate::interfaces::AuditStore;
use crate::interfaces::BackupRestorer;
use crate::interfaces::DistributedMutex;
use crate::interfaces::RestoreError;
use crate::interfaces::SchemaInspector;
use crate::interfaces::StatementExecutor;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: State
// ============================================================================

/// Declared table shape.
#[derive(Debug, Clone, Default)]
struct MemoryTable {
    /// Column names (lowercase).
    columns: BTreeSet<String>,
    /// Index names (lowercase).
    indexes: BTreeSet<String>,
}

/// Database contents captured by snapshots.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Declared tables keyed by lowercase name.
    tables: BTreeMap<String, MemoryTable>,
    /// Canned results for `query_scalar`.
    scalars: BTreeMap<String, String>,
    /// Singleton lock row.
    lock: LockRecord,
    /// Applied records in apply order.
    applied: Vec<AppliedRecord>,
    /// Run records in insertion order.
    runs: Vec<RunRecord>,
    /// Rollback records keyed by run id.
    rollback_runs: BTreeMap<String, RollbackRunRecord>,
    /// Executed statements in order.
    executed: Vec<String>,
}

/// Shared database and harness controls.
#[derive(Debug, Default)]
struct MemoryDatabase {
    /// Live contents.
    state: MemoryState,
    /// Named snapshots.
    snapshots: BTreeMap<String, MemoryState>,
    /// Statements containing this text fail.
    fail_marker: Option<String>,
    /// Fail every `finish_run` write.
    fail_run_writes: bool,
    /// Fail every `clear_lock` write.
    fail_lock_release: bool,
}

// ============================================================================
// SECTION: In-Memory Database
// ============================================================================

/// In-memory target database for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChangeDatabase {
    /// Shared database protected by a mutex.
    inner: Arc<Mutex<MemoryDatabase>>,
}

impl InMemoryChangeDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the shared database.
    fn guard(&self) -> Result<MutexGuard<'_, MemoryDatabase>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Store("in-memory database mutex poisoned".to_string()))
    }

    /// Declares a table with columns for precondition checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn create_table(&self, table: &str, columns: &[&str]) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        let entry = guard.state.tables.entry(table.to_ascii_lowercase()).or_default();
        entry.columns.extend(columns.iter().map(|column| column.to_ascii_lowercase()));
        Ok(())
    }

    /// Declares an index on an existing or new table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn create_index(&self, table: &str, index: &str) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        let entry = guard.state.tables.entry(table.to_ascii_lowercase()).or_default();
        entry.indexes.insert(index.to_ascii_lowercase());
        Ok(())
    }

    /// Sets the value returned by `query_scalar` for an exact query text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn set_scalar(&self, sql: &str, value: &str) -> Result<(), StoreError> {
        self.guard()?.state.scalars.insert(sql.to_string(), value.to_string());
        Ok(())
    }

    /// Makes every statement containing `marker` fail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn fail_statements_containing(&self, marker: &str) -> Result<(), StoreError> {
        self.guard()?.fail_marker = Some(marker.to_string());
        Ok(())
    }

    /// Makes every run finalization write fail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn fail_run_writes(&self, fail: bool) -> Result<(), StoreError> {
        self.guard()?.fail_run_writes = fail;
        Ok(())
    }

    /// Makes every lock row release fail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn fail_lock_release(&self, fail: bool) -> Result<(), StoreError> {
        self.guard()?.fail_lock_release = fail;
        Ok(())
    }

    /// Returns every executed statement in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn executed_statements(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.guard()?.state.executed.clone())
    }

    /// Captures the current contents as a named backup artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the state mutex is poisoned.
    pub fn snapshot(&self, name: &str) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        let state = guard.state.clone();
        guard.snapshots.insert(name.to_string(), state);
        Ok(())
    }
}

impl AuditStore for InMemoryChangeDatabase {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn lock_record(&self) -> Result<LockRecord, StoreError> {
        Ok(self.guard()?.state.lock.clone())
    }

    fn mark_locked(&self, locked_by: &str, granted_at: i64) -> Result<(), StoreError> {
        self.guard()?.state.lock = LockRecord {
            locked: true,
            granted_at: Some(granted_at),
            locked_by: Some(locked_by.to_string()),
        };
        Ok(())
    }

    fn clear_lock(&self) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        if guard.fail_lock_release {
            return Err(StoreError::Io("lock table unavailable".to_string()));
        }
        guard.state.lock = LockRecord::default();
        Ok(())
    }

    fn applied_records(&self) -> Result<Vec<AppliedRecord>, StoreError> {
        let mut records = self.guard()?.state.applied.clone();
        records.sort_by_key(|record| record.order_executed);
        Ok(records)
    }

    fn append_applied(&self, record: NewAppliedRecord) -> Result<AppliedRecord, StoreError> {
        let mut guard = self.guard()?;
        if guard
            .state
            .applied
            .iter()
            .any(|existing| existing.id == record.id && existing.author == record.author)
        {
            return Err(StoreError::Invalid(format!(
                "applied record {} by {} already exists",
                record.id, record.author
            )));
        }
        let next =
            guard.state.applied.iter().map(|existing| existing.order_executed).max().unwrap_or(0)
                + 1;
        let stored = record.into_record(next);
        guard.state.applied.push(stored.clone());
        Ok(stored)
    }

    fn delete_applied_after(&self, order: i64) -> Result<Vec<AppliedRecord>, StoreError> {
        let mut guard = self.guard()?;
        let (kept, mut removed): (Vec<_>, Vec<_>) =
            guard.state.applied.drain(..).partition(|record| record.order_executed <= order);
        guard.state.applied = kept;
        removed.sort_by_key(|record| record.order_executed);
        Ok(removed)
    }

    fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        if guard.state.runs.iter().any(|existing| existing.run_id == run.run_id) {
            return Err(StoreError::Invalid(format!("run {} already exists", run.run_id)));
        }
        guard.state.runs.push(run.clone());
        Ok(())
    }

    fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        finished_at: i64,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        if guard.fail_run_writes {
            return Err(StoreError::Io("run table unavailable".to_string()));
        }
        let run = guard
            .state
            .runs
            .iter_mut()
            .find(|run| run.run_id == run_id)
            .ok_or_else(|| StoreError::Invalid(format!("run {run_id} not found")))?;
        run.status = status;
        run.finished_at = Some(finished_at);
        run.error_message = error_message.map(str::to_string);
        Ok(())
    }

    fn run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.guard()?.state.runs.iter().find(|run| run.run_id == run_id).cloned())
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.guard()?.state.runs.iter().rev().take(limit).cloned().collect())
    }

    fn save_rollback_run(&self, record: &RollbackRunRecord) -> Result<(), StoreError> {
        self.guard()?.state.rollback_runs.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    fn rollback_run(&self, run_id: &str) -> Result<Option<RollbackRunRecord>, StoreError> {
        Ok(self.guard()?.state.rollback_runs.get(run_id).cloned())
    }
}

impl SchemaInspector for InMemoryChangeDatabase {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.guard()?.state.tables.contains_key(&table.to_ascii_lowercase()))
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        Ok(self
            .guard()?
            .state
            .tables
            .get(&table.to_ascii_lowercase())
            .is_some_and(|entry| entry.columns.contains(&column.to_ascii_lowercase())))
    }

    fn index_exists(&self, table: &str, index: &str) -> Result<bool, StoreError> {
        Ok(self
            .guard()?
            .state
            .tables
            .get(&table.to_ascii_lowercase())
            .is_some_and(|entry| entry.indexes.contains(&index.to_ascii_lowercase())))
    }

    fn query_scalar(&self, sql: &str) -> Result<Option<String>, StoreError> {
        Ok(self.guard()?.state.scalars.get(sql).cloned())
    }
}

impl StatementExecutor for InMemoryChangeDatabase {
    fn execute_statement(&self, sql: &str) -> Result<(), StoreError> {
        let mut guard = self.guard()?;
        if guard.fail_marker.as_deref().is_some_and(|marker| sql.contains(marker)) {
            return Err(StoreError::Store(format!("statement rejected: {sql}")));
        }
        guard.state.executed.push(sql.to_string());
        Ok(())
    }
}

impl BackupRestorer for InMemoryChangeDatabase {
    fn restore(&self, backup_ref: &str) -> Result<(), RestoreError> {
        let mut guard =
            self.inner.lock().map_err(|_| RestoreError::Failed("mutex poisoned".to_string()))?;
        let snapshot = guard
            .snapshots
            .get(backup_ref)
            .cloned()
            .ok_or_else(|| RestoreError::NotFound(backup_ref.to_string()))?;
        guard.state = snapshot;
        Ok(())
    }
}

// ============================================================================
// SECTION: In-Memory Mutex
// ============================================================================

/// Shared mutex cell.
#[derive(Debug, Default)]
struct MutexCell {
    /// Session currently holding the mutex.
    holder: Mutex<Option<u64>>,
    /// Session id allocator.
    next_session: AtomicU64,
}

/// Process-local advisory mutex; each handle is one session.
#[derive(Debug)]
pub struct InMemoryMutex {
    /// Shared cell.
    cell: Arc<MutexCell>,
    /// This handle's session id.
    session: u64,
}

impl Default for InMemoryMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMutex {
    /// Creates a new mutex and its first session.
    #[must_use]
    pub fn new() -> Self {
        let cell = Arc::new(MutexCell::default());
        let session = cell.next_session.fetch_add(1, Ordering::Relaxed);
        Self {
            cell,
            session,
        }
    }

    /// Opens another session on the same mutex.
    #[must_use]
    pub fn session(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            session: self.cell.next_session.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Claims the mutex if free or already held by this session.
    fn try_claim(&self) -> Result<bool, StoreError> {
        let mut holder = self
            .cell
            .holder
            .lock()
            .map_err(|_| StoreError::Store("in-memory mutex poisoned".to_string()))?;
        match *holder {
            Some(session) if session != self.session => Ok(false),
            _ => {
                *holder = Some(self.session);
                Ok(true)
            }
        }
    }
}

impl DistributedMutex for InMemoryMutex {
    fn try_acquire(&self, timeout: Duration) -> Result<bool, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_claim()? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn release(&self) -> Result<(), StoreError> {
        let mut holder = self
            .cell
            .holder
            .lock()
            .map_err(|_| StoreError::Store("in-memory mutex poisoned".to_string()))?;
        if *holder == Some(self.session) {
            *holder = None;
        }
        Ok(())
    }
}
