// crates/change-gate-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI Message Catalog Tests
// Description: Unit tests for catalog integrity and substitution.
// Purpose: Ensure every message key is unique and placeholders resolve.
// Dependencies: change-gate-cli i18n module
// ============================================================================

//! ## Overview
//! Verifies catalog keys are unique, substitution replaces every named
//! placeholder, and unknown keys fall back to the key itself.

use std::collections::BTreeSet;

use crate::i18n::CATALOG_ITEMS;
use crate::i18n::MessageArg;
use crate::i18n::catalog;
use crate::i18n::translate;

#[test]
fn catalog_keys_are_unique() {
    let keys: BTreeSet<&str> = CATALOG_ITEMS.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys.len(), CATALOG_ITEMS.len(), "duplicate catalog keys");
    assert_eq!(catalog().len(), CATALOG_ITEMS.len());
}

#[test]
fn translate_substitutes_placeholders() {
    let output = translate(
        "rollback.ok",
        vec![
            MessageArg::new("target", "002"),
            MessageArg::new("order", "2"),
            MessageArg::new("count", "2"),
            MessageArg::new("removed", "003, 004"),
        ],
    );
    assert_eq!(output, "Rolled back to 002 (order 2); removed 2 changeset(s): 003, 004");
}

#[test]
fn macro_formats_display_values() {
    let output = crate::t!("validate.ok", count = 3);
    assert_eq!(output, "Catalog valid (3 changesets).");
}

#[test]
fn unknown_key_falls_back_to_key() {
    assert_eq!(translate("no.such.key", Vec::new()), "no.such.key");
}
