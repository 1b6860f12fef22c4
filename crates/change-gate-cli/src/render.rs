// crates/change-gate-cli/src/render.rs
// ============================================================================
// Module: CLI Output Formatting
// Description: Human-readable renderings of runtime values.
// Purpose: Keep text output stable across commands.
// Dependencies: change-gate-core, time
// ============================================================================

//! ## Overview
//! Audit timestamps are stored as unix milliseconds; text output shows them
//! as RFC 3339 UTC. Checksums are shortened for table rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use change_gate_core::ChangesetStatus;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of checksum characters shown in table rows.
pub const SHORT_CHECKSUM_LEN: usize = 12;

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Formats unix milliseconds as RFC 3339 UTC.
///
/// Values outside the representable range fall back to the raw number.
#[must_use]
pub fn format_timestamp(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|value| value.format(&Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

/// Formats an optional timestamp, using `-` for absent values.
#[must_use]
pub fn format_optional_timestamp(millis: Option<i64>) -> String {
    millis.map_or_else(|| "-".to_string(), format_timestamp)
}

/// Returns the leading characters of a checksum.
#[must_use]
pub fn short_checksum(checksum: &str) -> &str {
    checksum.get(..SHORT_CHECKSUM_LEN).unwrap_or(checksum)
}

/// Returns the text label for a changeset outcome.
#[must_use]
pub const fn outcome_label(status: ChangesetStatus) -> &'static str {
    match status {
        ChangesetStatus::AlreadyApplied => "already-applied",
        ChangesetStatus::MarkRan => "mark-ran",
        ChangesetStatus::Applied => "applied",
        ChangesetStatus::DryRun => "dry-run",
    }
}

