// crates/change-gate-config/src/lib.rs
// ============================================================================
// Module: Change Gate Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for change-gate.toml semantics.
// Dependencies: change-gate-core, change-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `change-gate-config` defines the configuration model for Change Gate.
//! Files are parsed strictly (unknown keys are rejected), size and path
//! limits are enforced, and CI environment variables are layered on top
//! before validation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
