// crates/change-gate-core/src/core/mod.rs
// ============================================================================
// Module: Change Gate Core Types
// Description: Changeset model, audit records, checksums, and errors.
// Purpose: Provide the stable types every other module builds on.
// Dependencies: serde, sha2, thiserror
// ============================================================================

//! ## Overview
//! Core types define the changeset model, the rows persisted in the audit
//! trail, and the error taxonomy. They carry no I/O.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod changeset;
pub mod error;
pub mod hashing;
pub mod records;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use changeset::Changeset;
pub use changeset::ChangesetKey;
pub use changeset::ChangesetParts;
pub use changeset::DEFAULT_SQL_CHECK_EXPECTED;
pub use changeset::OnFailPolicy;
pub use changeset::PreconditionCheck;
pub use changeset::PreconditionSpec;
pub use changeset::RiskLevel;
pub use error::ChangeGateError;
pub use error::ErrorKind;
pub use hashing::checksum;
pub use records::AppliedRecord;
pub use records::ExecType;
pub use records::LockRecord;
pub use records::NewAppliedRecord;
pub use records::RollbackRunRecord;
pub use records::RollbackStatus;
pub use records::RunRecord;
pub use records::RunStatus;
pub use records::unix_millis;
