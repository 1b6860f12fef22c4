// crates/change-gate-cli/src/main.rs
// ============================================================================
// Module: Change Gate CLI Entry Point
// Description: Command dispatcher for schema-change workflows.
// Purpose: Parse arguments, wire the SQLite backends, and call the runtime.
// Dependencies: clap, change-gate-config, change-gate-core,
//               change-gate-store-sqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The Change Gate CLI is a thin layer over the runtime: it loads
//! `change-gate.toml`, applies flag overrides, opens the `SQLite` store and
//! its advisory mutex, and renders reports as text or JSON. All
//! user-facing strings are routed through the message catalog.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use change_gate_cli::render::format_optional_timestamp;
use change_gate_cli::render::format_timestamp;
use change_gate_cli::render::outcome_label;
use change_gate_cli::render::short_checksum;
use change_gate_cli::t;
use change_gate_config::ChangeGateConfig;
use change_gate_core::AuditStore;
use change_gate_core::BackupRestorer;
use change_gate_core::ChangeEngine;
use change_gate_core::ChangeGateError;
use change_gate_core::ChangesetStatus;
use change_gate_core::EventSink;
use change_gate_core::RollbackManager;
use change_gate_core::RollbackReport;
use change_gate_core::RollbackRequest;
use change_gate_core::UpdateReport;
use change_gate_core::UpdateRequest;
use change_gate_core::VerifyIssue;
use change_gate_core::runtime::validate;
use change_gate_store_sqlite::CommandRestorer;
use change_gate_store_sqlite::DEFAULT_SNAPSHOT_LABEL;
use change_gate_store_sqlite::SqliteAdvisoryMutex;
use change_gate_store_sqlite::SqliteBackupRestorer;
use change_gate_store_sqlite::SqliteChangeStore;
use change_gate_store_sqlite::create_snapshot;
use change_gate_store_sqlite::list_snapshots;
use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of runs shown by `history`.
const DEFAULT_HISTORY_LIMIT: usize = 10;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "change-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Options shared by every subcommand.
    #[command(flatten)]
    global: GlobalArgs,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Default)]
struct GlobalArgs {
    /// Config file path (defaults to `CHANGE_GATE_CONFIG` or change-gate.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Database path (overrides database.path).
    #[arg(long, value_name = "PATH", global = true)]
    database: Option<PathBuf>,
    /// Environment name recorded on runs (overrides run.env_name).
    #[arg(long = "env-name", value_name = "NAME", global = true)]
    env_name: Option<String>,
    /// Enable the global destructive override for this invocation.
    #[arg(long = "allow-destructive", action = ArgAction::SetTrue, global = true)]
    allow_destructive: bool,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
}

/// Output formats.
#[derive(ValueEnum, Copy, Clone, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the catalog offline: SQL files resolve and preconditions parse.
    Validate,
    /// List changesets that have not been applied.
    Status(StatusCommand),
    /// Apply pending changesets.
    Update(UpdateCommand),
    /// Print the SQL an update would execute without applying it.
    UpdateSql(UpdateSqlCommand),
    /// Compare applied changesets against their current SQL.
    Verify,
    /// Show applied and pending changesets and recent runs.
    History(HistoryCommand),
    /// Restore a snapshot and prune changelog entries after a target.
    Rollback(RollbackCommand),
    /// Snapshot utilities.
    Backup {
        /// Selected backup subcommand.
        #[command(subcommand)]
        command: BackupCommand,
    },
}

/// Arguments for `status`.
#[derive(Args, Debug)]
struct StatusCommand {
    /// Only consider changesets eligible in this context.
    #[arg(long, value_name = "CONTEXT")]
    context: Option<String>,
}

/// Arguments for `update`.
#[derive(Args, Debug)]
struct UpdateCommand {
    /// Only apply changesets eligible in this context.
    #[arg(long, value_name = "CONTEXT")]
    context: Option<String>,
    /// Print the SQL instead of executing it.
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Snapshot the database first and record it as the run's backup.
    #[arg(long, action = ArgAction::SetTrue)]
    backup: bool,
    /// Label for the pre-update snapshot.
    #[arg(long = "backup-label", value_name = "LABEL", default_value = "pre-update")]
    backup_label: String,
}

/// Arguments for `update-sql`.
#[derive(Args, Debug)]
struct UpdateSqlCommand {
    /// Only render changesets eligible in this context.
    #[arg(long, value_name = "CONTEXT")]
    context: Option<String>,
}

/// Arguments for `history`.
#[derive(Args, Debug)]
struct HistoryCommand {
    /// Number of recent runs to show.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_HISTORY_LIMIT)]
    limit: usize,
}

/// Arguments for `rollback`.
#[derive(Args, Debug)]
struct RollbackCommand {
    /// Changeset id to roll back to; it stays applied.
    #[arg(value_name = "TARGET")]
    target: String,
    /// Author of the target when several changesets share its id.
    #[arg(long, value_name = "AUTHOR")]
    author: Option<String>,
    /// Snapshot to restore.
    #[arg(long = "backup-file", value_name = "PATH")]
    backup_file: PathBuf,
    /// Restore by piping the snapshot into this program instead.
    #[arg(long = "restore-command", value_name = "PROGRAM")]
    restore_command: Option<String>,
    /// Argument passed to the restore program (repeatable).
    #[arg(long = "restore-arg", value_name = "ARG", requires = "restore_command")]
    restore_args: Vec<String>,
}

/// Backup subcommands.
#[derive(Subcommand, Debug)]
enum BackupCommand {
    /// Write a snapshot into the backup directory.
    Create(BackupCreateCommand),
    /// List snapshots in the backup directory, newest first.
    List,
}

/// Arguments for `backup create`.
#[derive(Args, Debug)]
struct BackupCreateCommand {
    /// Label embedded in the snapshot file name.
    #[arg(long, value_name = "LABEL")]
    label: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

impl From<ChangeGateError> for CliError {
    fn from(err: ChangeGateError) -> Self {
        Self::new(t!("error.runtime", kind = err.kind().as_str(), error = err))
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli.global)?;
    let session = Session {
        sink: config
            .audit
            .open_sink()
            .map_err(|err| CliError::new(t!("config.sink_failed", error = err)))?,
        config,
        format: cli.global.format,
    };

    match cli.command {
        Commands::Validate => command_validate(&session),
        Commands::Status(command) => command_status(&session, &command),
        Commands::Update(command) => command_update(&session, &command),
        Commands::UpdateSql(command) => command_update(
            &session,
            &UpdateCommand {
                context: command.context,
                dry_run: true,
                backup: false,
                backup_label: String::new(),
            },
        ),
        Commands::Verify => command_verify(&session),
        Commands::History(command) => command_history(&session, &command),
        Commands::Rollback(command) => command_rollback(&session, &command),
        Commands::Backup {
            command,
        } => command_backup(&session, &command),
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Resolved configuration and event sink for one invocation.
struct Session {
    /// Effective configuration.
    config: ChangeGateConfig,
    /// Structured event sink.
    sink: Arc<dyn EventSink>,
    /// Output format.
    format: OutputFormat,
}

impl Session {
    /// Opens the configured `SQLite` store.
    fn open_store(&self) -> CliResult<SqliteChangeStore> {
        SqliteChangeStore::open(self.config.store_config())
            .map_err(|err| CliError::new(t!("store.open_failed", error = err)))
    }

    /// Builds an engine over the store and its advisory mutex.
    fn engine(&self) -> CliResult<ChangeEngine<SqliteChangeStore, SqliteAdvisoryMutex>> {
        let store = self.open_store()?;
        let mutex = SqliteAdvisoryMutex::for_database(store.path());
        Ok(ChangeEngine::new(store, mutex, Arc::clone(&self.sink), self.config.engine_config())?)
    }
}

/// Loads the config file and applies flag overrides.
fn load_config(global: &GlobalArgs) -> CliResult<ChangeGateConfig> {
    let mut config = ChangeGateConfig::load(global.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    apply_flag_overrides(&mut config, global);
    config.validate().map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    Ok(config)
}

/// Layers command-line flags over file and environment values.
fn apply_flag_overrides(config: &mut ChangeGateConfig, global: &GlobalArgs) {
    if let Some(path) = &global.database {
        config.database.path.clone_from(path);
    }
    if let Some(env_name) = &global.env_name {
        config.run.env_name.clone_from(env_name);
    }
    if global.allow_destructive {
        config.run.allow_destructive = true;
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `validate`.
fn command_validate(session: &Session) -> CliResult<ExitCode> {
    let count = validate(&session.config.catalog_source(), session.sink.as_ref())?;
    match session.format {
        OutputFormat::Text => write_line(&t!("validate.ok", count = count))?,
        OutputFormat::Json => write_json(&json!({ "valid": true, "changesets": count }))?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `status`.
fn command_status(session: &Session, command: &StatusCommand) -> CliResult<ExitCode> {
    let engine = session.engine()?;
    let pending =
        engine.status(&session.config.catalog_source(), command.context.as_deref())?;
    if session.format == OutputFormat::Json {
        write_json(&json!({ "pending": pending }))?;
        return Ok(ExitCode::SUCCESS);
    }
    if pending.is_empty() {
        write_line(&t!("status.up_to_date"))?;
        return Ok(ExitCode::SUCCESS);
    }
    write_line(&t!("status.pending_header", count = pending.len()))?;
    for changeset in &pending {
        write_line(&t!(
            "status.pending_row",
            key = changeset.key(),
            file = changeset.sql_file()
        ))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `update` and `update-sql`.
fn command_update(session: &Session, command: &UpdateCommand) -> CliResult<ExitCode> {
    let engine = session.engine()?;
    let mut request = UpdateRequest::new(session.config.catalog_source());
    request.context.clone_from(&command.context);
    request.dry_run = command.dry_run;
    if command.backup && !command.dry_run {
        let path =
            create_snapshot(engine.database(), &session.config.backup.dir, &command.backup_label)
                .map_err(|err| CliError::new(t!("backup.create_failed", error = err)))?;
        if session.format == OutputFormat::Text {
            write_line(&t!("backup.created", path = path.display()))?;
        }
        request.backup_ref = Some(path.to_string_lossy().into_owned());
    }
    let report = engine.update(&request)?;
    match session.format {
        OutputFormat::Json => write_json(&report)?,
        OutputFormat::Text if report.dry_run => write_raw(&report.render_sql())?,
        OutputFormat::Text => write_update_summary(&report)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Writes the per-changeset outcomes and totals of an update.
fn write_update_summary(report: &UpdateReport) -> CliResult<()> {
    for outcome in &report.outcomes {
        write_line(&t!(
            "update.row",
            status = outcome_label(outcome.status),
            key = outcome.key
        ))?;
    }
    write_line(&t!(
        "update.summary",
        run_id = report.run_id,
        applied = report.applied_count(),
        mark_ran = report.count(ChangesetStatus::MarkRan),
        skipped = report.count(ChangesetStatus::AlreadyApplied)
    ))
}

/// Executes `verify`.
fn command_verify(session: &Session) -> CliResult<ExitCode> {
    let engine = session.engine()?;
    let report = engine.verify_report(&session.config.catalog_source())?;
    if session.format == OutputFormat::Json {
        write_json(&report)?;
    } else {
        for mismatch in &report.mismatches {
            let line = match &mismatch.issue {
                VerifyIssue::ChecksumMismatch {
                    expected,
                    actual,
                } => t!(
                    "verify.mismatch",
                    key = mismatch.key,
                    expected = short_checksum(expected),
                    actual = short_checksum(actual)
                ),
                VerifyIssue::FileMissing => t!("verify.file_missing", key = mismatch.key),
            };
            write_line(&line)?;
        }
    }
    if !report.mismatches.is_empty() {
        return Err(CliError::new(t!("verify.failed", count = report.mismatches.len())));
    }
    if session.format == OutputFormat::Text {
        write_line(&t!("verify.ok", count = report.checked))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `history`.
fn command_history(session: &Session, command: &HistoryCommand) -> CliResult<ExitCode> {
    let engine = session.engine()?;
    let report = engine.history(&session.config.catalog_source(), command.limit)?;
    if session.format == OutputFormat::Json {
        write_json(&report)?;
        return Ok(ExitCode::SUCCESS);
    }
    write_line(&t!("history.changesets_header"))?;
    for entry in &report.entries {
        let line = match &entry.applied {
            Some(record) => t!(
                "history.applied_row",
                order = record.order_executed,
                key = entry.key,
                exec_type = record.exec_type.as_str(),
                executed_at = format_timestamp(record.executed_at),
                checksum = short_checksum(&record.checksum)
            ),
            None => t!("history.pending_row", key = entry.key, file = entry.sql_file),
        };
        write_line(&line)?;
        if !entry.in_catalog {
            write_line(&t!("history.not_in_catalog"))?;
        }
    }
    write_line(&t!("history.runs_header", count = report.runs.len()))?;
    for run in &report.runs {
        write_line(&t!(
            "history.run_row",
            run_id = run.run_id,
            status = run.status.as_str(),
            env = run.env_name,
            started_at = format_timestamp(run.started_at),
            finished_at = format_optional_timestamp(run.finished_at)
        ))?;
        if let Some(error) = &run.error_message {
            write_line(&t!("history.run_error", error = error))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `rollback`.
fn command_rollback(session: &Session, command: &RollbackCommand) -> CliResult<ExitCode> {
    let store = session.open_store()?;
    let request = RollbackRequest {
        target_id: command.target.clone(),
        author: command.author.clone(),
        backup_ref: command.backup_file.to_string_lossy().into_owned(),
    };
    let report = match &command.restore_command {
        Some(program) => run_rollback(
            store,
            CommandRestorer::new(program.clone(), command.restore_args.clone()),
            session,
            &request,
        )?,
        None => {
            let restorer = SqliteBackupRestorer::new(store.clone());
            run_rollback(store, restorer, session, &request)?
        }
    };
    match session.format {
        OutputFormat::Json => write_json(&report)?,
        OutputFormat::Text => write_line(&t!(
            "rollback.ok",
            target = command.target,
            order = report.target_order,
            count = report.removed_ids.len(),
            removed = report.removed_ids.join(", ")
        ))?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs a rollback with the selected restorer.
fn run_rollback<S, R>(
    store: S,
    restorer: R,
    session: &Session,
    request: &RollbackRequest,
) -> CliResult<RollbackReport>
where
    S: AuditStore,
    R: BackupRestorer,
{
    let manager = RollbackManager::new(store, restorer, Arc::clone(&session.sink));
    Ok(manager.rollback(request)?)
}

/// Executes `backup create` and `backup list`.
fn command_backup(session: &Session, command: &BackupCommand) -> CliResult<ExitCode> {
    let dir = &session.config.backup.dir;
    match command {
        BackupCommand::Create(create) => {
            let store = session.open_store()?;
            let label = create.label.as_deref().unwrap_or(DEFAULT_SNAPSHOT_LABEL);
            let path = create_snapshot(&store, dir, label)
                .map_err(|err| CliError::new(t!("backup.create_failed", error = err)))?;
            match session.format {
                OutputFormat::Json => write_json(&json!({ "path": path.to_string_lossy() }))?,
                OutputFormat::Text => write_line(&t!("backup.created", path = path.display()))?,
            }
        }
        BackupCommand::List => {
            let entries = list_snapshots(dir)
                .map_err(|err| CliError::new(t!("backup.list_failed", error = err)))?;
            if session.format == OutputFormat::Json {
                let rows: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|entry| {
                        json!({
                            "path": entry.path.to_string_lossy(),
                            "label": entry.label,
                            "timestamp": entry.timestamp,
                            "size_bytes": entry.size_bytes,
                        })
                    })
                    .collect();
                write_json(&json!({ "snapshots": rows }))?;
            } else if entries.is_empty() {
                write_line(&t!("backup.none", dir = dir.display()))?;
            } else {
                for entry in &entries {
                    write_line(&t!(
                        "backup.row",
                        timestamp = entry.timestamp,
                        label = entry.label,
                        size = entry.size_bytes,
                        path = entry.path.display()
                    ))?;
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes text to stdout without adding a newline.
fn write_raw(text: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes()).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a value as pretty JSON to stdout.
fn write_json<T: serde::Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(t!("output.json_failed", error = err)))?;
    write_line(&text)
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    t!("output.write_failed", stream = stream, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
