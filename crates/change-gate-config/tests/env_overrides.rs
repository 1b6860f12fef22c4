// crates/change-gate-config/tests/env_overrides.rs
// ============================================================================
// Module: Environment Override Tests
// Description: CI variables layered over file values.
// Purpose: Ensure deployment pipelines can steer runs without editing files.
// ============================================================================

//! ## Overview
//! Layers CI environment variables over file values and checks which ones
//! win.

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

use std::fs;

use change_gate_config::ChangeGateConfig;
use tempfile::TempDir;

mod common;

use common::TestResult;
use common::env_of;

#[test]
fn ci_variables_override_file_values() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.apply_env_overrides(env_of(&[
        ("ENV_NAME", "prod"),
        ("GITHUB_ACTOR", "release-bot"),
        ("GITHUB_SHA", "deadbeef"),
        ("BACKUP_FILE", "backups/pre.sqlite"),
    ]));
    let engine = config.engine_config();
    assert_eq!(engine.env_name, "prod");
    assert_eq!(engine.actor, "release-bot");
    assert_eq!(engine.commit_ref.as_deref(), Some("deadbeef"));
    assert_eq!(engine.backup_ref.as_deref(), Some("backups/pre.sqlite"));
    Ok(())
}

#[test]
fn allow_destructive_accepts_true_in_any_case() -> TestResult {
    for value in ["true", "TRUE", " True "] {
        let mut config = common::minimal_config().map_err(|err| err.to_string())?;
        config.apply_env_overrides(env_of(&[("ALLOW_DESTRUCTIVE", value)]));
        if !config.run.allow_destructive {
            return Err(format!("ALLOW_DESTRUCTIVE={value} should enable the override"));
        }
    }
    Ok(())
}

#[test]
fn allow_destructive_other_values_disable_override() -> TestResult {
    for value in ["false", "1", "yes", ""] {
        let mut config = common::config_from_toml("[run]\nallow_destructive = true\n")
            .map_err(|err| err.to_string())?;
        config.apply_env_overrides(env_of(&[("ALLOW_DESTRUCTIVE", value)]));
        if config.run.allow_destructive {
            return Err(format!("ALLOW_DESTRUCTIVE={value:?} should disable the override"));
        }
    }
    Ok(())
}

#[test]
fn blank_variables_keep_file_values() -> TestResult {
    let mut config =
        common::config_from_toml("[run]\nenv_name = \"qa\"\n").map_err(|err| err.to_string())?;
    config.apply_env_overrides(env_of(&[("ENV_NAME", "   "), ("GITHUB_SHA", "")]));
    assert_eq!(config.run.env_name, "qa");
    assert_eq!(config.run.commit_ref, None);
    Ok(())
}

#[test]
fn load_applies_overrides_before_validation() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("change-gate.toml");
    fs::write(&path, "[run]\nenv_name = \"dev\"\nallow_destructive = false\n")
        .map_err(|err| err.to_string())?;
    let config = ChangeGateConfig::load_with_env(
        Some(&path),
        env_of(&[("ENV_NAME", "prod"), ("ALLOW_DESTRUCTIVE", "true")]),
    )
    .map_err(|err| err.to_string())?;
    assert_eq!(config.run.env_name, "prod");
    assert!(config.run.allow_destructive);
    Ok(())
}
