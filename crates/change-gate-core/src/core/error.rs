// crates/change-gate-core/src/core/error.rs
// ============================================================================
// Module: Change Gate Errors
// Description: Error taxonomy shared by every Change Gate operation.
// Purpose: Let callers branch on failure kind without string matching.
// Dependencies: thiserror, crate::interfaces
// ============================================================================

//! ## Overview
//! All fallible operations in the core return [`ChangeGateError`]. Each
//! variant maps to exactly one [`ErrorKind`], and every kind aborts the
//! current run: there is no partial-success continuation past a failing
//! changeset. Messages are surfaced verbatim to the invoking layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Stable classification of [`ChangeGateError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or duplicate catalog entries.
    Catalog,
    /// Missing SQL artifact, backup, or rollback target.
    NotFound,
    /// Destructive statement blocked by the policy gate.
    PolicyViolation,
    /// HALT-policy precondition failure.
    PreconditionFailed,
    /// Invalid configuration such as an unrecognized `onFail` value.
    Configuration,
    /// Another runner holds the distributed lock.
    LockContention,
    /// An applied changeset no longer matches its recorded checksum.
    ChecksumMismatch,
    /// A statement failed while applying a changeset.
    Execution,
    /// Verification found drift between the catalog and the audit trail.
    VerificationFailed,
    /// Backend storage failure.
    Store,
}

impl ErrorKind {
    /// Returns the stable label for this error kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::NotFound => "not_found",
            Self::PolicyViolation => "policy_violation",
            Self::PreconditionFailed => "precondition_failed",
            Self::Configuration => "configuration",
            Self::LockContention => "lock_contention",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::Execution => "execution",
            Self::VerificationFailed => "verification_failed",
            Self::Store => "store",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by Change Gate operations.
#[derive(Debug, Error)]
pub enum ChangeGateError {
    /// Catalog is malformed, incomplete, or contains duplicates.
    #[error("catalog error: {0}")]
    Catalog(String),
    /// A referenced artifact does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A destructive statement was found without both opt-ins.
    #[error(
        "policy violation: '{pattern}' detected in changeset '{changeset_id}'; set \
         allowDestructive: true on the changeset and enable the global destructive override"
    )]
    PolicyViolation {
        /// Changeset that contained the statement.
        changeset_id: String,
        /// Name of the matched destructive pattern.
        pattern: String,
    },
    /// A HALT precondition failed.
    #[error("precondition failed (HALT): {check}")]
    PreconditionFailed {
        /// Description of the failing check.
        check: String,
    },
    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Another runner holds the lock.
    #[error("lock contention: {0}")]
    LockContention(String),
    /// Applied changeset drifted from its recorded checksum.
    #[error(
        "checksum mismatch for changeset '{id}' by '{author}': expected {expected}, got \
         {actual}; do not edit applied changesets, create a new changeset instead"
    )]
    ChecksumMismatch {
        /// Changeset identifier.
        id: String,
        /// Changeset author.
        author: String,
        /// Recorded checksum.
        expected: String,
        /// Checksum of the current SQL text.
        actual: String,
    },
    /// A statement failed while applying a changeset.
    #[error("changeset '{changeset_id}' failed: {message}")]
    Execution {
        /// Changeset being applied.
        changeset_id: String,
        /// Underlying failure message.
        message: String,
    },
    /// Verification found mismatches.
    #[error("verification failed: {0} mismatch(es)")]
    VerificationFailed(usize),
    /// Backend storage error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChangeGateError {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Catalog(_) => ErrorKind::Catalog,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PolicyViolation {
                ..
            } => ErrorKind::PolicyViolation,
            Self::PreconditionFailed {
                ..
            } => ErrorKind::PreconditionFailed,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::LockContention(_) => ErrorKind::LockContention,
            Self::ChecksumMismatch {
                ..
            } => ErrorKind::ChecksumMismatch,
            Self::Execution {
                ..
            } => ErrorKind::Execution,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailed,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}
