// crates/change-gate-config/src/config.rs
// ============================================================================
// Module: Change Gate Configuration
// Description: Configuration loading and validation for Change Gate.
// Purpose: Provide strict config parsing with hard limits and CI overrides.
// Dependencies: change-gate-core, change-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `CHANGE_GATE_CONFIG`, then
//! `./change-gate.toml`. Only the implicit default file may be absent; an
//! explicitly named file that cannot be read is an error. Environment
//! overrides are applied after parsing and before validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use change_gate_core::CatalogSource;
use change_gate_core::ChangeEngineConfig;
use change_gate_core::EventSink;
use change_gate_core::FileEventSink;
use change_gate_core::NoopEventSink;
use change_gate_core::StderrEventSink;
use change_gate_core::catalog::DEFAULT_CHANGELOG_PATH;
use change_gate_core::catalog::DEFAULT_MIGRATIONS_DIR;
use change_gate_store_sqlite::SqliteStoreConfig;
use change_gate_store_sqlite::SqliteStoreMode;
use change_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "change-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CHANGE_GATE_CONFIG";
/// Environment variable enabling destructive changesets globally.
pub const ALLOW_DESTRUCTIVE_ENV_VAR: &str = "ALLOW_DESTRUCTIVE";
/// Environment variable naming the target environment.
pub const ENV_NAME_ENV_VAR: &str = "ENV_NAME";
/// Environment variable naming the invoking actor.
pub const ACTOR_ENV_VAR: &str = "GITHUB_ACTOR";
/// Environment variable carrying the source commit.
pub const COMMIT_REF_ENV_VAR: &str = "GITHUB_SHA";
/// Environment variable carrying the pre-run backup reference.
pub const BACKUP_REF_ENV_VAR: &str = "BACKUP_FILE";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of identity strings (environment, actor, refs).
pub(crate) const MAX_IDENTITY_LENGTH: usize = 256;
/// Default database path.
pub const DEFAULT_DATABASE_PATH: &str = "change-gate.sqlite";
/// Default busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default advisory mutex wait in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 60_000;
/// Maximum advisory mutex wait in milliseconds.
pub(crate) const MAX_LOCK_TIMEOUT_MS: u64 = 3_600_000;
/// Default environment name.
pub const DEFAULT_ENV_NAME: &str = "dev";
/// Default actor.
pub const DEFAULT_ACTOR: &str = "local";
/// Default snapshot directory.
pub const DEFAULT_BACKUP_DIR: &str = "backups";
/// Default event log path for the file sink.
pub const DEFAULT_AUDIT_PATH: &str = "change-gate-events.jsonl";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Change Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeGateConfig {
    /// Target database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Catalog locations.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Run identity and policy.
    #[serde(default)]
    pub run: RunConfig,
    /// Snapshot settings.
    #[serde(default)]
    pub backup: BackupConfig,
    /// Structured event output.
    #[serde(default)]
    pub audit: AuditConfig,
    /// File the configuration was loaded from, if any (not serialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl ChangeGateConfig {
    /// Loads configuration from disk using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Loads configuration with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (resolved, explicit) = resolve_path(path, &lookup)?;
        validate_path(&resolved)?;
        let mut config = if !explicit && !resolved.exists() {
            Self::default()
        } else {
            let mut config = read_file(&resolved)?;
            config.source = Some(resolved);
            config
        };
        config.apply_env_overrides(&lookup);
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Layers CI environment variables over the file values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ALLOW_DESTRUCTIVE_ENV_VAR) {
            self.run.allow_destructive = value.trim().eq_ignore_ascii_case("true");
        }
        if let Some(value) = non_empty(lookup(ENV_NAME_ENV_VAR)) {
            self.run.env_name = value;
        }
        if let Some(value) = non_empty(lookup(ACTOR_ENV_VAR)) {
            self.run.actor = value;
        }
        if let Some(value) = non_empty(lookup(COMMIT_REF_ENV_VAR)) {
            self.run.commit_ref = Some(value);
        }
        if let Some(value) = non_empty(lookup(BACKUP_REF_ENV_VAR)) {
            self.run.backup_ref = Some(value);
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.catalog.validate()?;
        self.run.validate()?;
        self.backup.validate()?;
        self.audit.validate()
    }

    /// Returns the `SQLite` store configuration.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.database.path.clone(),
            busy_timeout_ms: self.database.busy_timeout_ms,
            journal_mode: self.database.journal_mode,
            sync_mode: self.database.sync_mode,
        }
    }

    /// Returns the catalog location.
    #[must_use]
    pub fn catalog_source(&self) -> CatalogSource {
        CatalogSource::new(&self.catalog.base_dir)
            .with_changelog(&self.catalog.changelog)
            .with_migrations_dir(&self.catalog.migrations_dir)
    }

    /// Returns the engine run identity and policy settings.
    #[must_use]
    pub fn engine_config(&self) -> ChangeEngineConfig {
        ChangeEngineConfig {
            env_name: self.run.env_name.clone(),
            actor: self.run.actor.clone(),
            commit_ref: self.run.commit_ref.clone(),
            backup_ref: self.run.backup_ref.clone(),
            allow_destructive: self.run.allow_destructive,
            lock_timeout: self.database.lock_timeout(),
        }
    }
}

/// Target database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// `SQLite` database path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Bounded wait for the advisory mutex in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl DatabaseConfig {
    /// Returns the advisory mutex wait.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Validates database settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_value("database.path", &self.path)?;
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.lock_timeout_ms > MAX_LOCK_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "database.lock_timeout_ms must be at most {MAX_LOCK_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// Catalog location configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Manifest path relative to `base_dir`.
    #[serde(default = "default_changelog")]
    pub changelog: PathBuf,
    /// Migrations directory relative to `base_dir`.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    /// Directory catalog paths are resolved against.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            changelog: default_changelog(),
            migrations_dir: default_migrations_dir(),
            base_dir: default_base_dir(),
        }
    }
}

impl CatalogConfig {
    /// Validates catalog paths.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_value("catalog.changelog", &self.changelog)?;
        validate_path_value("catalog.migrations_dir", &self.migrations_dir)?;
        validate_path_value("catalog.base_dir", &self.base_dir)
    }
}

/// Run identity and policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Environment name recorded on runs.
    #[serde(default = "default_env_name")]
    pub env_name: String,
    /// Invoking actor.
    #[serde(default = "default_actor")]
    pub actor: String,
    /// Global destructive override.
    #[serde(default)]
    pub allow_destructive: bool,
    /// Source commit reference.
    #[serde(default)]
    pub commit_ref: Option<String>,
    /// Backup taken before the run.
    #[serde(default)]
    pub backup_ref: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            env_name: default_env_name(),
            actor: default_actor(),
            allow_destructive: false,
            commit_ref: None,
            backup_ref: None,
        }
    }
}

impl RunConfig {
    /// Validates identity fields.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_identity("run.env_name", &self.env_name)?;
        validate_identity("run.actor", &self.actor)?;
        if let Some(commit_ref) = &self.commit_ref {
            validate_identity("run.commit_ref", commit_ref)?;
        }
        if let Some(backup_ref) = &self.backup_ref {
            validate_path_string("run.backup_ref", backup_ref)?;
        }
        Ok(())
    }
}

/// Snapshot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Directory snapshots are written to.
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
        }
    }
}

impl BackupConfig {
    /// Validates the snapshot directory.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_value("backup.dir", &self.dir)
    }
}

/// Structured event destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `audit.path`.
    File,
    /// Events are discarded.
    None,
}

/// Structured event output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Event destination.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Event log path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Stderr,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Returns the file sink path, falling back to the default name.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIT_PATH))
    }

    /// Opens the configured event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file sink cannot be opened.
    pub fn open_sink(&self) -> Result<Arc<dyn EventSink>, ConfigError> {
        match self.sink {
            AuditSinkKind::Stderr => Ok(Arc::new(StderrEventSink)),
            AuditSinkKind::None => Ok(Arc::new(NoopEventSink)),
            AuditSinkKind::File => {
                let path = self.file_path();
                let sink = FileEventSink::new(&path)
                    .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
                Ok(Arc::new(sink))
            }
        }
    }

    /// Validates the event destination.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_value("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; the flag is true unless it is the default.
fn resolve_path<F>(path: Option<&Path>, lookup: &F) -> Result<(PathBuf, bool), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Some(env_path) = non_empty(lookup(CONFIG_ENV_VAR)) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Reads and parses a config file under the size limit.
fn read_file(path: &Path) -> Result<ChangeGateConfig, ConfigError> {
    let bytes =
        fs::read(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
}

/// Validates a path field against length constraints.
fn validate_path_value(field: &str, value: &Path) -> Result<(), ConfigError> {
    validate_path_string(field, &value.to_string_lossy())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a short identity string.
fn validate_identity(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_IDENTITY_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Drops blank environment values.
fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|raw| raw.trim().to_string()).filter(|trimmed| !trimmed.is_empty())
}

/// Default database path for serde.
fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

/// Default busy timeout for serde.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default lock timeout for serde.
const fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

/// Default manifest path for serde.
fn default_changelog() -> PathBuf {
    PathBuf::from(DEFAULT_CHANGELOG_PATH)
}

/// Default migrations directory for serde.
fn default_migrations_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MIGRATIONS_DIR)
}

/// Default base directory for serde.
fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Default environment name for serde.
fn default_env_name() -> String {
    DEFAULT_ENV_NAME.to_string()
}

/// Default actor for serde.
fn default_actor() -> String {
    DEFAULT_ACTOR.to_string()
}

/// Default snapshot directory for serde.
fn default_backup_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUP_DIR)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
