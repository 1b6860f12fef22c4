// crates/change-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Change Gate Runtime
// Description: Policy gate, preconditions, locking, execution, and rollback.
// Purpose: Apply catalog changesets safely against a target database.
// Dependencies: crate::{audit, catalog, core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the update protocol. The engine is the only
//! component that creates applied records and run records; the rollback
//! manager is the only component that deletes applied records.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod engine;
pub mod lock;
pub mod policy;
pub mod preconditions;
pub mod rollback;
pub mod script;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::ChangeEngine;
pub use engine::ChangeEngineConfig;
pub use engine::ChangesetOutcome;
pub use engine::ChangesetStatus;
pub use engine::DryRunScript;
pub use engine::HistoryEntry;
pub use engine::HistoryReport;
pub use engine::UpdateReport;
pub use engine::UpdateRequest;
pub use engine::VerifyIssue;
pub use engine::VerifyMismatch;
pub use engine::VerifyReport;
pub use engine::record_failure_best_effort;
pub use engine::validate;
pub use lock::DEFAULT_LOCK_TIMEOUT;
pub use lock::DistributedLock;
pub use lock::LockGuard;
pub use policy::PolicyFindings;
pub use policy::PolicyGate;
pub use preconditions::PreconditionOutcome;
pub use rollback::RollbackManager;
pub use rollback::RollbackReport;
pub use rollback::RollbackRequest;
pub use script::split_statements;
pub use store::InMemoryChangeDatabase;
pub use store::InMemoryMutex;
