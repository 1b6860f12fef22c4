// crates/change-gate-core/tests/proptest_script.rs
// ============================================================================
// Module: Script Property-Based Tests
// Description: Randomized checks for statement splitting, hashing, and policy.
// Purpose: Ensure arbitrary SQL text never panics and splits predictably.
// ============================================================================

//! ## Overview
//! Property checks that statement splitting, checksums, and the policy scan
//! accept arbitrary text without panicking.

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
    reason = "Test-only assertions and helpers are permitted."
)]

use change_gate_core::PolicyGate;
use change_gate_core::checksum;
use change_gate_core::runtime::split_statements;
use proptest::prelude::*;

proptest! {
    #[test]
    fn split_never_yields_blank_statements(raw in ".{0,256}") {
        for statement in split_statements(&raw) {
            prop_assert!(!statement.trim().is_empty());
            prop_assert_eq!(statement.trim(), statement.as_str());
        }
    }

    #[test]
    fn plain_statements_round_trip_through_the_splitter(
        parts in proptest::collection::vec("[A-Za-z0-9 (),=]{1,24}", 1..8)
    ) {
        let expected: Vec<String> = parts
            .iter()
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        let script = parts.join(";\n");
        prop_assert_eq!(split_statements(&script), expected);
    }

    #[test]
    fn checksum_is_stable_hex(raw in ".{0,128}") {
        let digest = checksum(&raw);
        prop_assert_eq!(digest.len(), 64);
        prop_assert!(digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        prop_assert_eq!(digest, checksum(&raw));
    }

    #[test]
    fn drop_table_is_always_detected(
        prefix in "[a-z ]{0,12}",
        gap in "[ \t\n]{1,4}",
        suffix in "[a-z_ ]{0,12}"
    ) {
        let gate = PolicyGate::new().unwrap();
        let sql = format!("{prefix} DrOp{gap}TaBlE {suffix}");
        prop_assert!(gate.scan(&sql).destructive.contains(&"DROP TABLE"));
    }
}
