// crates/change-gate-store-sqlite/src/advisory.rs
// ============================================================================
// Module: SQLite Advisory Mutex
// Description: Session-scoped mutex on a side-car SQLite file.
// Purpose: First layer of the distributed run lock.
// Dependencies: change-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! [`SqliteAdvisoryMutex`] holds an exclusive transaction on
//! `<db>.advisory-lock` for as long as the mutex is held. Other sessions
//! block in `BEGIN EXCLUSIVE` for at most the requested timeout and then
//! observe `SQLITE_BUSY`. The lock lives in the file handle, so a crashed
//! process releases it when the operating system closes the file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use change_gate_core::DistributedMutex;
use change_gate_core::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Suffix appended to the database path for the side-car file.
pub const ADVISORY_LOCK_SUFFIX: &str = ".advisory-lock";

// ============================================================================
// SECTION: Mutex
// ============================================================================

/// Session state for one mutex handle.
#[derive(Debug, Default)]
struct Session {
    /// Side-car connection; open while the mutex is held.
    connection: Option<Connection>,
}

/// Advisory mutex backed by an exclusive transaction on a side-car file.
#[derive(Debug)]
pub struct SqliteAdvisoryMutex {
    /// Side-car file path.
    path: PathBuf,
    /// Held session, if any.
    session: Mutex<Session>,
}

impl SqliteAdvisoryMutex {
    /// Creates a mutex handle for the database at `database_path`.
    #[must_use]
    pub fn for_database(database_path: &Path) -> Self {
        let mut raw: OsString = database_path.as_os_str().to_owned();
        raw.push(ADVISORY_LOCK_SUFFIX);
        Self::at(PathBuf::from(raw))
    }

    /// Creates a mutex handle on an explicit side-car path.
    #[must_use]
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            session: Mutex::new(Session::default()),
        }
    }

    /// Returns the side-car path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether this handle currently holds the mutex.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the session mutex is poisoned.
    pub fn is_held(&self) -> Result<bool, StoreError> {
        Ok(self.guard()?.connection.is_some())
    }

    /// Locks the session state.
    fn guard(&self) -> Result<MutexGuard<'_, Session>, SqliteStoreError> {
        self.session
            .lock()
            .map_err(|_| SqliteStoreError::Db("advisory mutex poisoned".to_string()))
    }

    /// Opens the side-car connection.
    fn open(&self, timeout: Duration) -> Result<Connection, SqliteStoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection.busy_timeout(timeout).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(connection)
    }
}

impl DistributedMutex for SqliteAdvisoryMutex {
    fn try_acquire(&self, timeout: Duration) -> Result<bool, StoreError> {
        let mut session = self.guard()?;
        if session.connection.is_some() {
            return Ok(true);
        }
        let connection = self.open(timeout)?;
        match connection.execute_batch("BEGIN EXCLUSIVE;") {
            Ok(()) => {
                session.connection = Some(connection);
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Ok(false)
            }
            Err(err) => Err(SqliteStoreError::Db(err.to_string()).into()),
        }
    }

    fn release(&self) -> Result<(), StoreError> {
        let mut session = self.guard()?;
        let Some(connection) = session.connection.take() else {
            return Ok(());
        };
        let ended = connection.execute_batch("ROLLBACK;");
        drop(connection);
        ended.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }
}
