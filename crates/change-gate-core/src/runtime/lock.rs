// crates/change-gate-core/src/runtime/lock.rs
// ============================================================================
// Module: Distributed Lock
// Description: Two-layer run lock (advisory mutex + durable lock row).
// Purpose: Ensure only one runner applies changes at a time.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Acquisition takes the session-scoped [`DistributedMutex`] with a bounded
//! wait, then inspects the durable lock row. A held row releases the mutex
//! and fails with [`ChangeGateError::LockContention`]; there is no retry.
//! Release clears the row first and always releases the mutex afterwards.
//! [`LockGuard`] releases both layers on drop if not released explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use crate::core::ChangeGateError;
use crate::core::unix_millis;
use crate::interfaces::AuditStore;
use crate::interfaces::DistributedMutex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bounded wait for the advisory mutex.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Lock
// ============================================================================

/// Run lock over an audit store and an advisory mutex.
pub struct DistributedLock<'a> {
    /// Store holding the durable lock row.
    store: &'a dyn AuditStore,
    /// Session-scoped mutex.
    mutex: &'a dyn DistributedMutex,
    /// Bounded wait for the mutex.
    timeout: Duration,
}

impl<'a> DistributedLock<'a> {
    /// Creates a lock with the given bounded wait.
    #[must_use]
    pub fn new(
        store: &'a dyn AuditStore,
        mutex: &'a dyn DistributedMutex,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            mutex,
            timeout,
        }
    }

    /// Acquires both layers for `holder`.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::LockContention`] when either layer is held
    /// elsewhere, or a store error when the primitives fail.
    pub fn acquire(&self, holder: &str) -> Result<LockGuard<'a>, ChangeGateError> {
        if !self.mutex.try_acquire(self.timeout)? {
            return Err(ChangeGateError::LockContention(format!(
                "could not acquire advisory mutex within {} ms",
                self.timeout.as_millis()
            )));
        }
        match self.claim_row(holder) {
            Ok(()) => Ok(LockGuard {
                store: self.store,
                mutex: self.mutex,
                released: false,
            }),
            Err(err) => {
                let _ = self.mutex.release();
                Err(err)
            }
        }
    }

    /// Marks the lock row held, failing if it already is.
    fn claim_row(&self, holder: &str) -> Result<(), ChangeGateError> {
        let record = self.store.lock_record()?;
        if record.locked {
            return Err(ChangeGateError::LockContention(format!(
                "change lock is already held by {}",
                record.locked_by.as_deref().unwrap_or("another process")
            )));
        }
        self.store.mark_locked(holder, unix_millis())?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Held run lock; releases both layers when dropped.
pub struct LockGuard<'a> {
    /// Store holding the durable lock row.
    store: &'a dyn AuditStore,
    /// Session-scoped mutex.
    mutex: &'a dyn DistributedMutex,
    /// Whether release already ran.
    released: bool,
}

impl LockGuard<'_> {
    /// Releases the lock row and then the mutex.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; the mutex is released even when
    /// clearing the row fails.
    pub fn release(mut self) -> Result<(), ChangeGateError> {
        self.release_layers()
    }

    /// Releases both layers once.
    fn release_layers(&mut self) -> Result<(), ChangeGateError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let row = self.store.clear_lock();
        let mutex = self.mutex.release();
        row?;
        mutex?;
        Ok(())
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.release_layers();
    }
}
