// crates/change-gate-core/src/catalog/discovery.rs
// ============================================================================
// Module: Auto-Discovery Catalog
// Description: Builds changesets from versioned SQL files and their headers.
// Purpose: Support catalogs with no manifest.
// Dependencies: regex, crate::core
// ============================================================================

//! ## Overview
//! Files named `<version>_<name>.up.<ext>` are scanned in file-name order.
//! Leading `-- key: value` comment lines form the header; parsing stops at
//! the first line that is neither blank nor a comment. Missing header keys
//! fall back to discovery defaults (`id` = version, `author` = `unknown`,
//! `risk` = medium, `contexts` = `dev,prod`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;

use crate::core::ChangeGateError;
use crate::core::Changeset;
use crate::core::ChangesetParts;
use crate::core::RiskLevel;
use crate::core::changeset::split_csv;

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Versioned up-migration file name.
const MIGRATION_FILE_PATTERN: &str = r"^(\d+)_(.+)\.up\.([A-Za-z0-9]+)$";
/// Header comment line.
const HEADER_LINE_PATTERN: &str = r"^--\s*(\w+)\s*:\s*(\S.*?)\s*$";

/// Author used when the header omits one.
pub const DEFAULT_AUTHOR: &str = "unknown";
/// Contexts used when the header omits them.
pub const DEFAULT_CONTEXTS: &str = "dev,prod";

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Scans `migrations_dir` and synthesizes one changeset per matching file.
///
/// SQL references are recorded relative to `base_dir` when the directory
/// lives under it. A missing directory yields an empty list.
///
/// # Errors
///
/// Returns [`ChangeGateError::Catalog`] when the directory or a file cannot
/// be read, or a header value is invalid.
pub fn discover(migrations_dir: &Path, base_dir: &Path) -> Result<Vec<Changeset>, ChangeGateError> {
    let file_pattern = compile(MIGRATION_FILE_PATTERN)?;
    let header_pattern = compile(HEADER_LINE_PATTERN)?;
    let entries = match fs::read_dir(migrations_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(ChangeGateError::Catalog(format!(
                "failed to read migrations directory {}: {err}",
                migrations_dir.display()
            )));
        }
    };

    let mut files: BTreeMap<String, String> = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            ChangeGateError::Catalog(format!(
                "failed to read migrations directory {}: {err}",
                migrations_dir.display()
            ))
        })?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !entry.path().is_file() {
            continue;
        }
        if let Some(captures) = file_pattern.captures(&name) {
            let version = captures.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            files.insert(name, version);
        }
    }

    let mut changesets = Vec::with_capacity(files.len());
    for (name, version) in files {
        let path = migrations_dir.join(&name);
        let text = fs::read_to_string(&path).map_err(|err| {
            ChangeGateError::Catalog(format!("failed to read {}: {err}", path.display()))
        })?;
        let header = parse_header(&header_pattern, &text);
        let sql_file = path.strip_prefix(base_dir).unwrap_or(&path).to_string_lossy().into_owned();
        changesets.push(build_changeset(&version, sql_file, &header)?);
    }
    Ok(changesets)
}

/// Parses the leading comment header into lowercase keys.
#[must_use]
pub fn parse_header_text(text: &str) -> BTreeMap<String, String> {
    compile(HEADER_LINE_PATTERN).map(|pattern| parse_header(&pattern, text)).unwrap_or_default()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Compiles a built-in pattern.
fn compile(pattern: &str) -> Result<Regex, ChangeGateError> {
    Regex::new(pattern)
        .map_err(|err| ChangeGateError::Configuration(format!("invalid built-in pattern: {err}")))
}

/// Collects header pairs until the first non-comment line.
fn parse_header(pattern: &Regex, text: &str) -> BTreeMap<String, String> {
    let mut header = BTreeMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with("--") {
            break;
        }
        if let Some(captures) = pattern.captures(trimmed)
            && let (Some(key), Some(value)) = (captures.get(1), captures.get(2))
        {
            header.insert(key.as_str().to_ascii_lowercase(), value.as_str().to_string());
        }
    }
    header
}

/// Builds a changeset from a file version and its header.
fn build_changeset(
    version: &str,
    sql_file: String,
    header: &BTreeMap<String, String>,
) -> Result<Changeset, ChangeGateError> {
    let id = header.get("id").cloned().unwrap_or_else(|| version.to_string());
    let risk = match header.get("risk") {
        Some(label) => RiskLevel::parse(label).ok_or_else(|| {
            ChangeGateError::Catalog(format!("changeset '{id}' has invalid risk '{label}'"))
        })?,
        None => RiskLevel::Medium,
    };
    let allow_destructive =
        header.get("allowdestructive").is_some_and(|value| value.eq_ignore_ascii_case("true"));
    Changeset::new(ChangesetParts {
        id,
        author: header.get("author").cloned().unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
        sql_file,
        risk,
        allow_destructive,
        labels: header.get("labels").map(|value| split_csv(value)).unwrap_or_default(),
        contexts: split_csv(header.get("contexts").map_or(DEFAULT_CONTEXTS, String::as_str)),
        preconditions: Vec::new(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
