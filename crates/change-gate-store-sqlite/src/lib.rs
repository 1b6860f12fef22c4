// crates/change-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Change Gate SQLite Store
// Description: SQLite backends for the Change Gate runtime.
// Purpose: Provide the audit trail, target database, advisory mutex, and
//          snapshot restore on SQLite.
// Dependencies: change-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! [`SqliteChangeStore`] implements the core database traits,
//! [`SqliteAdvisoryMutex`] implements the session-scoped mutex on a
//! side-car file, and the [`backup`] module creates, lists, and restores
//! snapshots.

pub mod advisory;
pub mod backup;
pub mod store;

pub use advisory::ADVISORY_LOCK_SUFFIX;
pub use advisory::SqliteAdvisoryMutex;
pub use backup::CommandRestorer;
pub use backup::DEFAULT_SNAPSHOT_LABEL;
pub use backup::SnapshotEntry;
pub use backup::SqliteBackupRestorer;
pub use backup::create_snapshot;
pub use backup::list_snapshots;
pub use store::SqliteChangeStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
