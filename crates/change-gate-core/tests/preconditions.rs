// crates/change-gate-core/tests/preconditions.rs
// ============================================================================
// Module: Precondition Evaluator Tests
// Description: Check kinds and onFail policies.
// ============================================================================
//! ## Overview
//! Evaluates preconditions against the in-memory schema and asserts the
//! HALT, MARK_RAN, WARN, and unrecognized policies, plus unknown kinds.

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

use change_gate_core::ErrorKind;
use change_gate_core::InMemoryChangeDatabase;
use change_gate_core::OnFailPolicy;
use change_gate_core::PreconditionCheck;
use change_gate_core::PreconditionOutcome;
use change_gate_core::PreconditionSpec;
use change_gate_core::RecordingEventSink;
use change_gate_core::runtime::preconditions::evaluate;

/// Builds a `tableExists` spec.
fn table(name: &str, on_fail: OnFailPolicy) -> PreconditionSpec {
    PreconditionSpec {
        check: PreconditionCheck::TableExists {
            table_name: name.into(),
        },
        on_fail,
    }
}

/// Builds a database with one table, column, and index.
fn database() -> InMemoryChangeDatabase {
    let db = InMemoryChangeDatabase::new();
    db.create_table("users", &["id", "email"]).unwrap();
    db.create_index("users", "idx_users_email").unwrap();
    db.set_scalar("SELECT COUNT(*) FROM users", "0").unwrap();
    db.set_scalar("SELECT 1", "1").unwrap();
    db
}

#[test]
fn passing_checks_proceed() {
    let db = database();
    let sink = RecordingEventSink::new();
    let specs = vec![
        table("USERS", OnFailPolicy::Halt),
        PreconditionSpec {
            check: PreconditionCheck::ColumnExists {
                table_name: "users".into(),
                column_name: "email".into(),
            },
            on_fail: OnFailPolicy::Halt,
        },
        PreconditionSpec {
            check: PreconditionCheck::IndexExists {
                table_name: "users".into(),
                index_name: "idx_users_email".into(),
            },
            on_fail: OnFailPolicy::Halt,
        },
        PreconditionSpec {
            check: PreconditionCheck::SqlCheck {
                sql: "SELECT 1".into(),
                expected_result: "1".into(),
            },
            on_fail: OnFailPolicy::Halt,
        },
    ];
    assert_eq!(evaluate(&db, &specs, &sink).unwrap(), PreconditionOutcome::Proceed);
    assert_eq!(sink.named("precondition_passed").len(), 4);
}

#[test]
fn halt_failure_names_the_check() {
    let db = database();
    let sink = RecordingEventSink::new();
    let err = evaluate(&db, &[table("orders", OnFailPolicy::Halt)], &sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert!(err.to_string().contains("tableExists(orders)"));
}

#[test]
fn mark_ran_short_circuits_remaining_checks() {
    let db = database();
    let sink = RecordingEventSink::new();
    let specs = vec![table("orders", OnFailPolicy::MarkRan), table("missing", OnFailPolicy::Halt)];
    assert_eq!(evaluate(&db, &specs, &sink).unwrap(), PreconditionOutcome::Skip);
}

#[test]
fn warn_failure_continues() {
    let db = database();
    let sink = RecordingEventSink::new();
    let specs = vec![table("orders", OnFailPolicy::Warn), table("users", OnFailPolicy::Halt)];
    assert_eq!(evaluate(&db, &specs, &sink).unwrap(), PreconditionOutcome::Proceed);
    assert_eq!(sink.named("precondition_warn").len(), 1);
    assert_eq!(sink.named("precondition_passed").len(), 1);
}

#[test]
fn unrecognized_on_fail_is_a_configuration_error() {
    let db = database();
    let sink = RecordingEventSink::new();
    let specs = vec![table("orders", OnFailPolicy::parse("IGNORE"))];
    let err = evaluate(&db, &specs, &sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn unrecognized_on_fail_is_harmless_when_the_check_passes() {
    let db = database();
    let sink = RecordingEventSink::new();
    let specs = vec![table("users", OnFailPolicy::parse("IGNORE"))];
    assert_eq!(evaluate(&db, &specs, &sink).unwrap(), PreconditionOutcome::Proceed);
}

#[test]
fn unknown_kind_warns_and_is_skipped() {
    let db = database();
    let sink = RecordingEventSink::new();
    let specs = vec![PreconditionSpec {
        check: PreconditionCheck::Unknown {
            keys: vec!["rowCount".into()],
        },
        on_fail: OnFailPolicy::Halt,
    }];
    assert_eq!(evaluate(&db, &specs, &sink).unwrap(), PreconditionOutcome::Proceed);
    assert_eq!(sink.named("unknown_precondition").len(), 1);
}

#[test]
fn sql_check_compares_text_and_fails_without_rows() {
    let db = database();
    let sink = RecordingEventSink::new();
    let mismatch = PreconditionSpec {
        check: PreconditionCheck::SqlCheck {
            sql: "SELECT COUNT(*) FROM users".into(),
            expected_result: "1".into(),
        },
        on_fail: OnFailPolicy::MarkRan,
    };
    assert_eq!(evaluate(&db, &[mismatch], &sink).unwrap(), PreconditionOutcome::Skip);

    let no_rows = PreconditionSpec {
        check: PreconditionCheck::SqlCheck {
            sql: "SELECT id FROM users WHERE 0".into(),
            expected_result: "1".into(),
        },
        on_fail: OnFailPolicy::Halt,
    };
    let err = evaluate(&db, &[no_rows], &sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}
