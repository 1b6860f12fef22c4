// crates/change-gate-cli/src/lib.rs
// ============================================================================
// Module: Change Gate CLI Library
// Description: Shared helpers for the Change Gate command-line interface.
// Purpose: Provide the message catalog and output formatting for the binary.
// Dependencies: change-gate-core, time
// ============================================================================

//! ## Overview
//! This library houses the message catalog and the formatting helpers the
//! binary entry point (`src/main.rs`) uses, so all user-facing output stays
//! consistent and can be unit tested.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Message catalog and translation helpers.
pub mod i18n;
/// Timestamp and status formatting.
pub mod render;

#[cfg(test)]
mod tests;
