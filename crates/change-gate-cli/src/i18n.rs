// crates/change-gate-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Message catalog and substitution helpers for the CLI.
// Purpose: Centralize user-facing strings.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! The Change Gate CLI keeps its user-facing strings in a static catalog so
//! messages stay consistent across commands. All runtime output should be
//! routed through the [`t!`](crate::t) macro.
//!
//! ## Invariants
//! - The catalog is initialized once and read-only thereafter.
//! - Missing keys fall back to the key itself.
//! - Placeholders are substituted in argument order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
#[derive(Clone)]
pub struct MessageArg {
    /// The placeholder name used in message templates (e.g., `"path"`).
    pub key: &'static str,
    /// The formatted string value to substitute for this placeholder.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`] from a key and displayable value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Static catalog entries.
pub(crate) const CATALOG_ITEMS: &[(&str, &str)] = &[
    ("config.load_failed", "Failed to load configuration: {error}"),
    ("config.sink_failed", "Failed to open the event sink: {error}"),
    ("store.open_failed", "Failed to open the database: {error}"),
    ("error.runtime", "error [{kind}]: {error}"),
    ("validate.ok", "Catalog valid ({count} changesets)."),
    ("status.up_to_date", "Database is up to date."),
    ("status.pending_header", "{count} pending changeset(s):"),
    ("status.pending_row", "  {key}  {file}"),
    ("update.row", "  {status}  {key}"),
    (
        "update.summary",
        "Run {run_id} finished: {applied} applied, {mark_ran} marked ran, {skipped} already \
         applied.",
    ),
    ("verify.mismatch", "  checksum mismatch: {key} (recorded {expected}, current {actual})"),
    ("verify.file_missing", "  sql file missing: {key}"),
    ("verify.ok", "Verified {count} applied changeset(s); no drift."),
    ("verify.failed", "Verification failed: {count} changeset(s) drifted."),
    ("history.changesets_header", "Changesets:"),
    (
        "history.applied_row",
        "  #{order} {key}  {exec_type}  {executed_at}  {checksum}",
    ),
    ("history.pending_row", "  pending {key}  {file}"),
    ("history.not_in_catalog", "      (no longer in the catalog)"),
    ("history.runs_header", "Recent runs ({count}):"),
    (
        "history.run_row",
        "  {run_id}  {status}  env={env}  started={started_at}  finished={finished_at}",
    ),
    ("history.run_error", "      error: {error}"),
    (
        "rollback.ok",
        "Rolled back to {target} (order {order}); removed {count} changeset(s): {removed}",
    ),
    ("backup.created", "Snapshot written to {path}"),
    ("backup.create_failed", "Failed to create snapshot: {error}"),
    ("backup.list_failed", "Failed to list snapshots: {error}"),
    ("backup.none", "No snapshots in {dir}."),
    ("backup.row", "  {timestamp}  {label}  {size} bytes  {path}"),
    ("output.json_failed", "Failed to serialize JSON output: {error}"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
];

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Renders `key` from the catalog while substituting `args`.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    if args.is_empty() {
        return template.to_string();
    }

    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

/// Returns the static catalog used by the CLI.
pub(crate) fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

    CATALOG.get_or_init(|| CATALOG_ITEMS.iter().copied().collect())
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args: ::std::vec::Vec<$crate::i18n::MessageArg> = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}
