// crates/change-gate-core/src/runtime/rollback.rs
// ============================================================================
// Module: Rollback Manager
// Description: Snapshot restore followed by audit-trail truncation.
// Purpose: Return the database and changelog to a prior applied changeset.
// Dependencies: uuid, crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Rollback does not replay or invert SQL. It records a rollback run,
//! restores a full backup through [`BackupRestorer`], then deletes every
//! applied record ordered after the target. Status writes after the first
//! are upserts because the restore replaces the audit tables too.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::audit::ChangeEvent;
use crate::audit::EventSink;
use crate::core::ChangeGateError;
use crate::core::RollbackRunRecord;
use crate::core::RollbackStatus;
use crate::core::unix_millis;
use crate::interfaces::AuditStore;
use crate::interfaces::BackupRestorer;
use crate::interfaces::RestoreError;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for one rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackRequest {
    /// Changeset id to truncate back to.
    pub target_id: String,
    /// Author of the target, required when the id is shared by several authors.
    pub author: Option<String>,
    /// Backup artifact to restore.
    pub backup_ref: String,
}

/// Result of a completed rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Rollback run identifier.
    pub run_id: String,
    /// Apply order of the target record.
    pub target_order: i64,
    /// Ids of removed applied records, in apply order.
    pub removed_ids: Vec<String>,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Restores snapshots and prunes the changelog.
pub struct RollbackManager<S, R> {
    /// Audit store.
    store: S,
    /// Full-database restore.
    restorer: R,
    /// Event sink.
    sink: Arc<dyn EventSink>,
}

impl<S, R> RollbackManager<S, R>
where
    S: AuditStore,
    R: BackupRestorer,
{
    /// Creates a new rollback manager.
    #[must_use]
    pub fn new(store: S, restorer: R, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            restorer,
            sink,
        }
    }

    /// Restores `backup_ref` and removes applied records after the target.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::NotFound`] when the backup or target is
    /// missing, or a store error. The rollback record is marked failed on a
    /// best-effort basis.
    pub fn rollback(&self, request: &RollbackRequest) -> Result<RollbackReport, ChangeGateError> {
        self.store.ensure_schema()?;
        let mut record = RollbackRunRecord {
            run_id: Uuid::new_v4().to_string(),
            target_version: request.target_id.clone(),
            backup_ref: request.backup_ref.clone(),
            status: RollbackStatus::Started,
            removed_ids: Vec::new(),
            started_at: unix_millis(),
            completed_at: None,
            error_message: None,
        };
        self.store.save_rollback_run(&record)?;
        self.sink.record(
            &ChangeEvent::warn("rollback_start")
                .with_run(&record.run_id)
                .with_detail(format!("target={} backup={}", request.target_id, request.backup_ref)),
        );

        match self.restore_and_prune(request) {
            Ok((target_order, removed_ids)) => {
                record.status = RollbackStatus::Completed;
                record.removed_ids.clone_from(&removed_ids);
                record.completed_at = Some(unix_millis());
                self.store.save_rollback_run(&record)?;
                self.sink.record(
                    &ChangeEvent::info("rollback_complete")
                        .with_run(&record.run_id)
                        .with_detail(format!("removed={}", removed_ids.join(","))),
                );
                Ok(RollbackReport {
                    run_id: record.run_id,
                    target_order,
                    removed_ids,
                })
            }
            Err(err) => {
                record.status = RollbackStatus::Failed;
                record.completed_at = Some(unix_millis());
                record.error_message = Some(err.to_string());
                self.mark_failed_best_effort(&record);
                Err(err)
            }
        }
    }

    /// Restores the snapshot, locates the target, and prunes later records.
    fn restore_and_prune(
        &self,
        request: &RollbackRequest,
    ) -> Result<(i64, Vec<String>), ChangeGateError> {
        self.restorer.restore(&request.backup_ref).map_err(|err| match err {
            RestoreError::NotFound(message) => ChangeGateError::NotFound(message),
            RestoreError::Failed(message) => {
                ChangeGateError::Store(StoreError::Io(format!("backup restore failed: {message}")))
            }
        })?;
        self.store.ensure_schema()?;

        let candidates: Vec<_> = self
            .store
            .applied_records()?
            .into_iter()
            .filter(|record| record.id == request.target_id)
            .filter(|record| request.author.as_deref().is_none_or(|author| record.author == author))
            .collect();
        let target = match candidates.as_slice() {
            [] => {
                return Err(ChangeGateError::NotFound(format!(
                    "rollback target '{}' has no applied record",
                    request.target_id
                )));
            }
            [single] => single.order_executed,
            _ => {
                return Err(ChangeGateError::Configuration(format!(
                    "rollback target '{}' is applied by several authors; specify the author",
                    request.target_id
                )));
            }
        };

        let removed = self.store.delete_applied_after(target)?;
        Ok((target, removed.into_iter().map(|record| record.id).collect()))
    }

    /// Persists a failed status, swallowing write errors.
    fn mark_failed_best_effort(&self, record: &RollbackRunRecord) {
        if let Err(err) = self.store.save_rollback_run(record) {
            self.sink.record(
                &ChangeEvent::error("audit_write_failed")
                    .with_run(&record.run_id)
                    .with_detail(err.to_string()),
            );
        }
    }
}
