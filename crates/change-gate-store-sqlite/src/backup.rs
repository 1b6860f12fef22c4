// crates/change-gate-store-sqlite/src/backup.rs
// ============================================================================
// Module: SQLite Snapshots
// Description: Snapshot creation, listing, and restore backends.
// Purpose: Produce and consume the backup artifacts used by rollback.
// Dependencies: change-gate-core, rusqlite, time
// ============================================================================

//! ## Overview
//! Snapshots are full copies of the database written with the `SQLite`
//! online backup API as `backup_<label>_<UTC timestamp>.sqlite`.
//! [`SqliteBackupRestorer`] restores one into the live connection.
//! [`CommandRestorer`] instead pipes the backup file into an external
//! program, for databases restored by their own client tooling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;

use change_gate_core::BackupRestorer;
use change_gate_core::RestoreError;
use time::OffsetDateTime;

use crate::store::SqliteChangeStore;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File name prefix for snapshots.
const SNAPSHOT_PREFIX: &str = "backup_";
/// File name extension for snapshots.
const SNAPSHOT_EXTENSION: &str = ".sqlite";
/// Label used when none is given.
pub const DEFAULT_SNAPSHOT_LABEL: &str = "manual";

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// One snapshot found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Snapshot file path.
    pub path: PathBuf,
    /// Label embedded in the file name.
    pub label: String,
    /// UTC timestamp embedded in the file name.
    pub timestamp: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Writes a snapshot of `store` into `dir` and returns its path.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the directory cannot be created or
/// the online backup fails.
pub fn create_snapshot(
    store: &SqliteChangeStore,
    dir: &Path,
    label: &str,
) -> Result<PathBuf, SqliteStoreError> {
    fs::create_dir_all(dir).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    let name = format!(
        "{SNAPSHOT_PREFIX}{}_{}{SNAPSHOT_EXTENSION}",
        sanitize_label(label),
        utc_stamp(OffsetDateTime::now_utc())
    );
    let path = dir.join(name);
    store.snapshot_to(&path)?;
    Ok(path)
}

/// Lists snapshots in `dir`, newest first. A missing directory is empty.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Io`] when the directory cannot be read.
pub fn list_snapshots(dir: &Path) -> Result<Vec<SnapshotEntry>, SqliteStoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    let listing = fs::read_dir(dir).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    for item in listing {
        let item = item.map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        let file_name = item.file_name().to_string_lossy().into_owned();
        let Some((label, timestamp)) = parse_snapshot_name(&file_name) else {
            continue;
        };
        let size_bytes = item.metadata().map(|meta| meta.len()).unwrap_or(0);
        entries.push(SnapshotEntry {
            path: item.path(),
            label,
            timestamp,
            size_bytes,
        });
    }
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.label.cmp(&b.label)));
    Ok(entries)
}

/// Splits `backup_<label>_<stamp>.sqlite` into label and stamp.
fn parse_snapshot_name(name: &str) -> Option<(String, String)> {
    let stem = name.strip_prefix(SNAPSHOT_PREFIX)?.strip_suffix(SNAPSHOT_EXTENSION)?;
    let (label, timestamp) = stem.rsplit_once('_')?;
    if label.is_empty() || timestamp.is_empty() {
        return None;
    }
    Some((label.to_string(), timestamp.to_string()))
}

/// Restricts labels to file-name-safe characters.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '-' })
        .collect();
    if cleaned.is_empty() { DEFAULT_SNAPSHOT_LABEL.to_string() } else { cleaned }
}

/// Formats a sortable UTC timestamp with millisecond precision.
fn utc_stamp(now: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}{:03}Z",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}

// ============================================================================
// SECTION: Restorers
// ============================================================================

/// Restores snapshot files into a live [`SqliteChangeStore`].
#[derive(Debug, Clone)]
pub struct SqliteBackupRestorer {
    /// Store whose connection is overwritten.
    store: SqliteChangeStore,
}

impl SqliteBackupRestorer {
    /// Creates a restorer for `store`.
    #[must_use]
    pub const fn new(store: SqliteChangeStore) -> Self {
        Self {
            store,
        }
    }
}

impl BackupRestorer for SqliteBackupRestorer {
    fn restore(&self, backup_ref: &str) -> Result<(), RestoreError> {
        let path = Path::new(backup_ref);
        if !path.is_file() {
            return Err(RestoreError::NotFound(format!("backup file not found: {backup_ref}")));
        }
        self.store.restore_from(path).map_err(|err| RestoreError::Failed(err.to_string()))
    }
}

/// Restores by piping the backup file to an external program's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRestorer {
    /// Program to run.
    program: String,
    /// Program arguments.
    args: Vec<String>,
}

impl CommandRestorer {
    /// Creates a restorer that runs `program args...`.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
        }
    }
}

impl BackupRestorer for CommandRestorer {
    fn restore(&self, backup_ref: &str) -> Result<(), RestoreError> {
        let input = File::open(backup_ref)
            .map_err(|_| RestoreError::NotFound(format!("backup file not found: {backup_ref}")))?;
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::from(input))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| RestoreError::Failed(format!("{}: {err}", self.program)))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RestoreError::Failed(format!(
            "{} exited with {}: {}",
            self.program,
            output.status,
            stderr.trim()
        )))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_names_round_trip() {
        assert_eq!(
            parse_snapshot_name("backup_pre-deploy_20260101T120000123Z.sqlite"),
            Some(("pre-deploy".to_string(), "20260101T120000123Z".to_string()))
        );
        assert_eq!(parse_snapshot_name("backup_.sqlite"), None);
        assert_eq!(parse_snapshot_name("notes.txt"), None);
    }

    #[test]
    fn labels_are_file_name_safe() {
        assert_eq!(sanitize_label("pre deploy/1"), "pre-deploy-1");
        assert_eq!(sanitize_label("  "), DEFAULT_SNAPSHOT_LABEL);
    }

    #[test]
    fn stamp_is_fixed_width() {
        let stamp = utc_stamp(OffsetDateTime::UNIX_EPOCH);
        assert_eq!(stamp, "19700101T000000000Z");
    }
}
