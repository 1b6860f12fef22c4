// crates/change-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Catalog fixtures and engine builders shared by core suites.
// Purpose: Reduce duplication across integration tests for change-gate-core.
// ============================================================================

//! Shared fixtures for core integration tests.

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use change_gate_core::CatalogSource;
use change_gate_core::ChangeEngine;
use change_gate_core::ChangeEngineConfig;
use change_gate_core::InMemoryChangeDatabase;
use change_gate_core::InMemoryMutex;
use change_gate_core::RecordingEventSink;
use tempfile::TempDir;

/// Scratch catalog on disk.
pub struct CatalogFixture {
    /// Owned scratch directory.
    pub dir: TempDir,
}

impl CatalogFixture {
    /// Creates an empty fixture.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Returns the fixture root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a file relative to the root, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(path, contents).expect("write file");
    }

    /// Writes the manifest.
    pub fn manifest(&self, yaml: &str) {
        self.write("changelog/changelog.yml", yaml);
    }

    /// Returns a catalog source rooted at the fixture.
    pub fn source(&self) -> CatalogSource {
        CatalogSource::new(self.root())
    }
}

/// Builds a manifest entry.
pub fn entry(id: &str, author: &str, sql_file: &str, extra: &str) -> String {
    let mut out = format!(
        "  - changeSet:\n      id: \"{id}\"\n      author: {author}\n      sqlFile: {sql_file}\n"
    );
    for line in extra.lines().filter(|line| !line.trim().is_empty()) {
        out.push_str("      ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Wraps entries into a manifest document.
pub fn manifest(entries: &[String]) -> String {
    let mut out = String::from("databaseChangeLog:\n");
    for entry in entries {
        out.push_str(entry);
    }
    out
}

/// Engine wired to in-memory backends.
pub struct Harness {
    /// Target database.
    pub db: InMemoryChangeDatabase,
    /// Advisory mutex session used by the engine.
    pub mutex: InMemoryMutex,
    /// Captured events.
    pub sink: Arc<RecordingEventSink>,
    /// Engine under test.
    pub engine: ChangeEngine<InMemoryChangeDatabase, InMemoryMutex>,
}

impl Harness {
    /// Creates a harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(ChangeEngineConfig::default())
    }

    /// Creates a harness with an explicit configuration.
    pub fn with_config(config: ChangeEngineConfig) -> Self {
        let db = InMemoryChangeDatabase::new();
        let mutex = InMemoryMutex::new();
        let sink = Arc::new(RecordingEventSink::new());
        let engine = ChangeEngine::new(db.clone(), mutex.session(), sink.clone(), config)
            .expect("engine");
        Self {
            db,
            mutex,
            sink,
            engine,
        }
    }
}
