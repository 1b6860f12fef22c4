// crates/change-gate-core/src/core/records.rs
// ============================================================================
// Module: Audit Records
// Description: Persisted records for applied changesets, locks, and runs.
// Purpose: Shared row model for every audit-trail backend.
// Dependencies: serde, crate::core::changeset
// ============================================================================

//! ## Overview
//! These types mirror the audit tables one-to-one. Timestamps are unix
//! epoch milliseconds. [`AppliedRecord::order_executed`] is assigned by the
//! store as `max + 1` at insertion and establishes the total order used by
//! rollback pruning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

use crate::core::changeset::Changeset;
use crate::core::changeset::ChangesetKey;

// ============================================================================
// SECTION: Time
// ============================================================================

/// Returns the current unix epoch in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Applied Records
// ============================================================================

/// How an applied changeset was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecType {
    /// SQL was executed.
    Executed,
    /// Recorded as settled without executing SQL.
    MarkRan,
}

impl ExecType {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "EXECUTED",
            Self::MarkRan => "MARK_RAN",
        }
    }

    /// Parses a stored label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "EXECUTED" => Some(Self::Executed),
            "MARK_RAN" => Some(Self::MarkRan),
            _ => None,
        }
    }
}

/// Persisted proof that a changeset was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    /// Changeset identifier.
    pub id: String,
    /// Changeset author.
    pub author: String,
    /// SQL file reference at apply time.
    pub filename: String,
    /// Apply time (unix millis).
    pub executed_at: i64,
    /// Global apply order.
    pub order_executed: i64,
    /// Settlement type.
    pub exec_type: ExecType,
    /// Checksum of the SQL text at apply time.
    pub checksum: String,
    /// Comma-joined labels.
    pub labels: String,
    /// Comma-joined contexts.
    pub contexts: String,
}

impl AppliedRecord {
    /// Returns the changeset identity of the record.
    #[must_use]
    pub fn key(&self) -> ChangesetKey {
        ChangesetKey::new(self.id.clone(), self.author.clone())
    }
}

/// Fields for a new applied record; the store assigns `order_executed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppliedRecord {
    /// Changeset identifier.
    pub id: String,
    /// Changeset author.
    pub author: String,
    /// SQL file reference.
    pub filename: String,
    /// Apply time (unix millis).
    pub executed_at: i64,
    /// Settlement type.
    pub exec_type: ExecType,
    /// Checksum of the SQL text.
    pub checksum: String,
    /// Comma-joined labels.
    pub labels: String,
    /// Comma-joined contexts.
    pub contexts: String,
}

impl NewAppliedRecord {
    /// Builds a new record for a changeset at the current time.
    #[must_use]
    pub fn for_changeset(changeset: &Changeset, exec_type: ExecType, checksum: String) -> Self {
        Self {
            id: changeset.id().to_string(),
            author: changeset.author().to_string(),
            filename: changeset.sql_file().to_string(),
            executed_at: unix_millis(),
            exec_type,
            checksum,
            labels: changeset.labels().join(","),
            contexts: changeset.contexts().join(","),
        }
    }

    /// Materializes the record with its assigned order.
    #[must_use]
    pub fn into_record(self, order_executed: i64) -> AppliedRecord {
        AppliedRecord {
            id: self.id,
            author: self.author,
            filename: self.filename,
            executed_at: self.executed_at,
            order_executed,
            exec_type: self.exec_type,
            checksum: self.checksum,
            labels: self.labels,
            contexts: self.contexts,
        }
    }
}

// ============================================================================
// SECTION: Lock Record
// ============================================================================

/// Singleton lock row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockRecord {
    /// Whether the lock is held.
    pub locked: bool,
    /// Grant time (unix millis).
    pub granted_at: Option<i64>,
    /// Holder identity.
    pub locked_by: Option<String>,
}

// ============================================================================
// SECTION: Run Records
// ============================================================================

/// Lifecycle status of an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run in progress.
    Running,
    /// Run finished successfully.
    Succeeded,
    /// Run aborted.
    Failed,
}

impl RunStatus {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One record per update invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Opaque run identifier.
    pub run_id: String,
    /// Environment name.
    pub env_name: String,
    /// Invoking actor.
    pub actor: Option<String>,
    /// Source commit reference.
    pub commit_ref: Option<String>,
    /// Start time (unix millis).
    pub started_at: i64,
    /// Finish time (unix millis).
    pub finished_at: Option<i64>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// External backup artifact taken for this run.
    pub backup_ref: Option<String>,
    /// Failure message.
    pub error_message: Option<String>,
}

/// Lifecycle status of a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Rollback started.
    Started,
    /// Rollback completed.
    Completed,
    /// Rollback failed.
    Failed,
}

impl RollbackStatus {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One record per rollback invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRunRecord {
    /// Opaque run identifier.
    pub run_id: String,
    /// Changeset id the audit trail is truncated back to.
    pub target_version: String,
    /// Backup artifact restored.
    pub backup_ref: String,
    /// Lifecycle status.
    pub status: RollbackStatus,
    /// Ids of removed applied records, in apply order.
    pub removed_ids: Vec<String>,
    /// Start time (unix millis).
    pub started_at: i64,
    /// Completion time (unix millis).
    pub completed_at: Option<i64>,
    /// Failure message.
    pub error_message: Option<String>,
}
