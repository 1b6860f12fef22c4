// crates/change-gate-core/src/lib.rs
// ============================================================================
// Module: Change Gate Core Library
// Description: Public API surface for the Change Gate core.
// Purpose: Expose the changeset model, catalog, interfaces, and runtime.
// Dependencies: crate::{audit, catalog, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Change Gate applies ordered, versioned schema changes to a database at
//! most once, refuses to continue when an applied change has drifted from
//! its recorded checksum, and serializes concurrent runners through a
//! two-layer distributed lock. The core is backend-agnostic and reaches the
//! database only through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod catalog;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::ChangeEvent;
pub use audit::EventLevel;
pub use audit::EventSink;
pub use audit::FileEventSink;
pub use audit::NoopEventSink;
pub use audit::RecordingEventSink;
pub use audit::StderrEventSink;
pub use catalog::Catalog;
pub use catalog::CatalogMode;
pub use catalog::CatalogSource;
pub use interfaces::AuditStore;
pub use interfaces::BackupRestorer;
pub use interfaces::ChangeDatabase;
pub use interfaces::DistributedMutex;
pub use interfaces::RestoreError;
pub use interfaces::SchemaInspector;
pub use interfaces::StatementExecutor;
pub use interfaces::StoreError;
pub use runtime::ChangeEngine;
pub use runtime::ChangeEngineConfig;
pub use runtime::ChangesetOutcome;
pub use runtime::ChangesetStatus;
pub use runtime::DistributedLock;
pub use runtime::HistoryReport;
pub use runtime::InMemoryChangeDatabase;
pub use runtime::InMemoryMutex;
pub use runtime::PolicyGate;
pub use runtime::PreconditionOutcome;
pub use runtime::RollbackManager;
pub use runtime::RollbackReport;
pub use runtime::RollbackRequest;
pub use runtime::UpdateReport;
pub use runtime::UpdateRequest;
pub use runtime::VerifyIssue;
pub use runtime::VerifyMismatch;
pub use runtime::VerifyReport;
