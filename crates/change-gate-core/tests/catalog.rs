// crates/change-gate-core/tests/catalog.rs
// ============================================================================
// Module: Catalog Tests
// Description: Manifest and auto-discovery loading.
// Purpose: Validate ordering, defaults, and fail-closed catalog errors.
// ============================================================================
//! ## Overview
//! Loads catalogs from scratch directories and checks mode selection,
//! required fields, duplicate detection, header parsing, and SQL resolution.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use change_gate_core::CatalogMode;
use change_gate_core::ErrorKind;
use change_gate_core::OnFailPolicy;
use change_gate_core::PreconditionCheck;
use change_gate_core::RiskLevel;
use change_gate_core::catalog;
use change_gate_core::checksum;
use common::CatalogFixture;
use common::entry;
use common::manifest;

// ============================================================================
// SECTION: Manifest Mode
// ============================================================================

#[test]
fn manifest_preserves_order_and_defaults() {
    let fixture = CatalogFixture::new();
    fixture.manifest(&manifest(&[
        entry("002", "ops", "sql/002.sql", "risk: high\nlabels: [core]"),
        entry("001", "ops", "sql/001.sql", ""),
    ]));
    let catalog = catalog::load(&fixture.source()).unwrap();
    assert_eq!(catalog.mode(), CatalogMode::Manifest);
    let ids: Vec<&str> = catalog.changesets().iter().map(|cs| cs.id()).collect();
    assert_eq!(ids, vec!["002", "001"]);
    let second = &catalog.changesets()[1];
    assert_eq!(second.risk(), RiskLevel::Low);
    assert!(!second.allow_destructive());
    assert!(second.labels().is_empty());
    assert!(second.contexts().is_empty());
    assert_eq!(catalog.changesets()[0].risk(), RiskLevel::High);
}

#[test]
fn manifest_parses_preconditions_in_order() {
    let fixture = CatalogFixture::new();
    fixture.manifest(&manifest(&[entry(
        "001",
        "ops",
        "sql/001.sql",
        "preconditions:\n  - tableExists:\n      tableName: users\n    onFail: mark_ran\n  - \
         sqlCheck:\n      sql: SELECT 1\n  - rowCount:\n      expected: 3\n    onFail: SKIP",
    )]));
    let catalog = catalog::load(&fixture.source()).unwrap();
    let specs = catalog.changesets()[0].preconditions();
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[0].on_fail, OnFailPolicy::MarkRan);
    assert_eq!(
        specs[1].check,
        PreconditionCheck::SqlCheck {
            sql: "SELECT 1".into(),
            expected_result: "1".into(),
        }
    );
    assert_eq!(specs[1].on_fail, OnFailPolicy::Halt);
    assert!(matches!(specs[2].check, PreconditionCheck::Unknown { .. }));
    assert_eq!(specs[2].on_fail, OnFailPolicy::Unrecognized("SKIP".into()));
}

#[test]
fn duplicate_id_author_pair_is_rejected() {
    let fixture = CatalogFixture::new();
    fixture.manifest(&manifest(&[
        entry("001", "ops", "sql/a.sql", ""),
        entry("001", "ops", "sql/b.sql", ""),
    ]));
    let err = catalog::load(&fixture.source()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn same_id_with_different_authors_is_allowed() {
    let fixture = CatalogFixture::new();
    fixture.manifest(&manifest(&[
        entry("001", "alice", "sql/a.sql", ""),
        entry("001", "bob", "sql/b.sql", ""),
    ]));
    assert_eq!(catalog::load(&fixture.source()).unwrap().len(), 2);
}

#[test]
fn missing_required_field_is_rejected() {
    let fixture = CatalogFixture::new();
    fixture.manifest("databaseChangeLog:\n  - changeSet:\n      id: \"1\"\n      author: ops\n");
    let err = catalog::load(&fixture.source()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);
    assert!(err.to_string().contains("sqlFile"));
}

#[test]
fn unknown_changeset_field_is_rejected() {
    let fixture = CatalogFixture::new();
    fixture.manifest(&manifest(&[entry("001", "ops", "sql/a.sql", "runAlways: true")]));
    let err = catalog::load(&fixture.source()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);
}

#[test]
fn missing_root_key_is_rejected() {
    let fixture = CatalogFixture::new();
    fixture.manifest("changes: []\n");
    let err = catalog::load(&fixture.source()).unwrap_err();
    assert!(err.to_string().contains("databaseChangeLog"));
}

#[test]
fn entry_without_changeset_key_is_rejected() {
    let fixture = CatalogFixture::new();
    fixture.manifest("databaseChangeLog:\n  - {}\n");
    let err = catalog::load(&fixture.source()).unwrap_err();
    assert!(err.to_string().contains("changeSet"));
}

#[test]
fn malformed_known_precondition_is_rejected() {
    let fixture = CatalogFixture::new();
    fixture.manifest(&manifest(&[entry(
        "001",
        "ops",
        "sql/a.sql",
        "preconditions:\n  - columnExists:\n      tableName: users",
    )]));
    let err = catalog::load(&fixture.source()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);
    assert!(err.to_string().contains("columnExists"));
}

// ============================================================================
// SECTION: Auto-Discovery Mode
// ============================================================================

#[test]
fn discovery_orders_by_file_name_and_reads_headers() {
    let fixture = CatalogFixture::new();
    fixture.write(
        "migrations/002_add_index.up.sql",
        "-- author: data-team\n-- risk: low\n-- allowDestructive: TRUE\n-- labels: perf, \
         idx\n-- contexts: prod\nCREATE INDEX i ON t (v);\n",
    );
    fixture.write("migrations/001_init.up.sql", "CREATE TABLE t (v TEXT);\n");
    fixture.write("migrations/001_init.down.sql", "DROP TABLE t;\n");
    fixture.write("migrations/notes.txt", "ignored");

    let catalog = catalog::load(&fixture.source()).unwrap();
    assert_eq!(catalog.mode(), CatalogMode::AutoDiscovery);
    assert_eq!(catalog.len(), 2);

    let first = &catalog.changesets()[0];
    assert_eq!(first.id(), "001");
    assert_eq!(first.author(), "unknown");
    assert_eq!(first.risk(), RiskLevel::Medium);
    assert_eq!(first.contexts(), ["dev".to_string(), "prod".to_string()]);

    let second = &catalog.changesets()[1];
    assert_eq!(second.id(), "002");
    assert_eq!(second.author(), "data-team");
    assert_eq!(second.risk(), RiskLevel::Low);
    assert!(second.allow_destructive());
    assert_eq!(second.labels(), ["perf".to_string(), "idx".to_string()]);
    assert_eq!(second.contexts(), ["prod".to_string()]);
    assert_eq!(catalog.resolve_sql(second).unwrap(), fixture_text(&fixture, second.sql_file()));
}

#[test]
fn discovery_rejects_duplicate_header_ids() {
    let fixture = CatalogFixture::new();
    fixture.write("migrations/001_a.up.sql", "-- id: 7\nSELECT 1;\n");
    fixture.write("migrations/002_b.up.sql", "-- id: 7\nSELECT 2;\n");
    let err = catalog::load(&fixture.source()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Catalog);
}

#[test]
fn missing_migrations_directory_yields_empty_catalog() {
    let fixture = CatalogFixture::new();
    let catalog = catalog::load(&fixture.source()).unwrap();
    assert!(catalog.is_empty());
}

#[test]
fn manifest_takes_precedence_over_directory() {
    let fixture = CatalogFixture::new();
    fixture.write("migrations/001_init.up.sql", "SELECT 1;\n");
    fixture.manifest("databaseChangeLog: []\n");
    let catalog = catalog::load(&fixture.source()).unwrap();
    assert_eq!(catalog.mode(), CatalogMode::Manifest);
    assert!(catalog.is_empty());
}

// ============================================================================
// SECTION: SQL Resolution and Checksums
// ============================================================================

#[test]
fn missing_sql_file_is_not_found() {
    let fixture = CatalogFixture::new();
    fixture.manifest(&manifest(&[entry("001", "ops", "sql/missing.sql", "")]));
    let catalog = catalog::load(&fixture.source()).unwrap();
    let err = catalog.resolve_sql(&catalog.changesets()[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn checksum_is_lowercase_sha256_hex() {
    let digest = checksum("CREATE TABLE t (id INT);");
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    assert_eq!(digest, checksum("CREATE TABLE t (id INT);"));
    assert_ne!(digest, checksum("CREATE TABLE t (id BIGINT);"));
    assert_eq!(
        checksum(""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

/// Reads a fixture file relative to its root.
fn fixture_text(fixture: &CatalogFixture, relative: &str) -> String {
    std::fs::read_to_string(fixture.root().join(relative)).unwrap()
}
