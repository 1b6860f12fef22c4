// crates/change-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and flag overrides.
// Purpose: Ensure the command surface parses as documented.
// Dependencies: change-gate-cli main helpers
// ============================================================================

//! ## Overview
//! Parses representative command lines and checks that flags override
//! configuration values.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use change_gate_config::ChangeGateConfig;
use clap::Parser;

use super::BackupCommand;
use super::Cli;
use super::Commands;
use super::OutputFormat;
use super::apply_flag_overrides;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn rollback_requires_backup_file() {
    let result = Cli::try_parse_from(["change-gate", "rollback", "002"]);
    assert!(result.is_err(), "rollback without --backup-file must not parse");
}

#[test]
fn rollback_parses_target_and_restore_command() {
    let cli = Cli::try_parse_from([
        "change-gate",
        "rollback",
        "002",
        "--backup-file",
        "backups/pre.sqlite",
        "--author",
        "ops",
        "--restore-command",
        "sqlite3",
        "--restore-arg",
        "app.sqlite",
    ])
    .unwrap();
    let Commands::Rollback(command) = cli.command else {
        panic!("expected rollback command");
    };
    assert_eq!(command.target, "002");
    assert_eq!(command.author.as_deref(), Some("ops"));
    assert_eq!(command.backup_file, PathBuf::from("backups/pre.sqlite"));
    assert_eq!(command.restore_command.as_deref(), Some("sqlite3"));
    assert_eq!(command.restore_args, vec!["app.sqlite".to_string()]);
}

#[test]
fn restore_args_require_restore_command() {
    let result = Cli::try_parse_from([
        "change-gate",
        "rollback",
        "002",
        "--backup-file",
        "b.sqlite",
        "--restore-arg",
        "x",
    ]);
    assert!(result.is_err());
}

#[test]
fn global_flags_are_accepted_after_subcommand() {
    let cli = Cli::try_parse_from([
        "change-gate",
        "update",
        "--context",
        "prod",
        "--dry-run",
        "--format",
        "json",
        "--allow-destructive",
    ])
    .unwrap();
    assert_eq!(cli.global.format, OutputFormat::Json);
    assert!(cli.global.allow_destructive);
    let Commands::Update(command) = cli.command else {
        panic!("expected update command");
    };
    assert_eq!(command.context.as_deref(), Some("prod"));
    assert!(command.dry_run);
    assert!(!command.backup);
}

#[test]
fn backup_subcommands_parse() {
    let cli = Cli::try_parse_from(["change-gate", "backup", "create", "--label", "nightly"])
        .unwrap();
    let Commands::Backup {
        command: BackupCommand::Create(create),
    } = cli.command
    else {
        panic!("expected backup create");
    };
    assert_eq!(create.label.as_deref(), Some("nightly"));
    let cli = Cli::try_parse_from(["change-gate", "backup", "list"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Backup {
            command: BackupCommand::List
        }
    ));
}

#[test]
fn history_limit_defaults() {
    let cli = Cli::try_parse_from(["change-gate", "history"]).unwrap();
    let Commands::History(command) = cli.command else {
        panic!("expected history command");
    };
    assert_eq!(command.limit, super::DEFAULT_HISTORY_LIMIT);
}

#[test]
fn flags_override_config_values() {
    let cli = Cli::try_parse_from([
        "change-gate",
        "--database",
        "other.sqlite",
        "--env-name",
        "prod",
        "--allow-destructive",
        "status",
    ])
    .unwrap();
    let mut config = ChangeGateConfig::default();
    apply_flag_overrides(&mut config, &cli.global);
    assert_eq!(config.database.path, PathBuf::from("other.sqlite"));
    assert_eq!(config.run.env_name, "prod");
    assert!(config.run.allow_destructive);
}

#[test]
fn absent_flags_keep_config_values() {
    let cli = Cli::try_parse_from(["change-gate", "verify"]).unwrap();
    let mut config = ChangeGateConfig::default();
    config.run.allow_destructive = true;
    apply_flag_overrides(&mut config, &cli.global);
    assert_eq!(config.run.env_name, "dev");
    assert!(config.run.allow_destructive);
}
