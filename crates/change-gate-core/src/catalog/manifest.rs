// crates/change-gate-core/src/catalog/manifest.rs
// ============================================================================
// Module: Manifest Catalog
// Description: YAML `databaseChangeLog` parsing.
// Purpose: Turn an explicit manifest into validated changesets.
// Dependencies: serde, serde_yaml, crate::core
// ============================================================================

//! ## Overview
//! The manifest root is `databaseChangeLog`, a list of `{ changeSet: {...} }`
//! entries. `id`, `author`, and `sqlFile` are required; unknown changeset
//! fields are rejected. `labels` and `contexts` accept a comma-separated
//! string or a list. Preconditions are maps with one check key and an
//! optional `onFail`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Mapping;
use serde_yaml::Value;

use crate::core::ChangeGateError;
use crate::core::Changeset;
use crate::core::ChangesetParts;
use crate::core::DEFAULT_SQL_CHECK_EXPECTED;
use crate::core::OnFailPolicy;
use crate::core::PreconditionCheck;
use crate::core::PreconditionSpec;
use crate::core::RiskLevel;
use crate::core::changeset::split_csv;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum manifest size in bytes.
pub const MAX_MANIFEST_BYTES: u64 = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Raw Document
// ============================================================================

/// Manifest document root.
#[derive(Debug, Deserialize)]
struct ManifestDocument {
    /// Ordered changeset entries.
    #[serde(rename = "databaseChangeLog")]
    database_change_log: Option<Vec<ManifestEntry>>,
}

/// One entry in `databaseChangeLog`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
    /// Changeset body.
    #[serde(rename = "changeSet")]
    change_set: Option<RawChangeSet>,
}

/// Changeset identifier as written in YAML.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    /// Text identifier.
    Text(String),
    /// Integer identifier.
    Int(i64),
}

impl RawId {
    /// Renders the identifier as text.
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Int(value) => value.to_string(),
        }
    }
}

/// String list as written in YAML.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawList {
    /// Comma-separated string.
    Csv(String),
    /// YAML sequence.
    Items(Vec<String>),
}

impl RawList {
    /// Flattens the list into entries.
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Csv(text) => split_csv(&text),
            Self::Items(items) => items,
        }
    }
}

/// Changeset fields as written in YAML.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawChangeSet {
    /// Identifier.
    id: Option<RawId>,
    /// Author.
    author: Option<String>,
    /// SQL file reference.
    sql_file: Option<String>,
    /// Risk label.
    risk: Option<String>,
    /// Destructive opt-in.
    #[serde(default)]
    allow_destructive: bool,
    /// Labels.
    labels: Option<RawList>,
    /// Contexts.
    contexts: Option<RawList>,
    /// Preconditions.
    #[serde(default)]
    preconditions: Vec<Mapping>,
}

/// `tableExists` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct TableExistsArgs {
    /// Table name.
    table_name: String,
}

/// `columnExists` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ColumnExistsArgs {
    /// Table name.
    table_name: String,
    /// Column name.
    column_name: String,
}

/// `indexExists` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct IndexExistsArgs {
    /// Table name.
    table_name: String,
    /// Index name.
    index_name: String,
}

/// `sqlCheck` arguments.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct SqlCheckArgs {
    /// Query.
    sql: String,
    /// Expected first value.
    expected_result: Option<Value>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads changesets from a manifest file.
///
/// # Errors
///
/// Returns [`ChangeGateError::Catalog`] when the file cannot be read or is
/// malformed.
pub fn load_manifest(path: &Path) -> Result<Vec<Changeset>, ChangeGateError> {
    let metadata = fs::metadata(path).map_err(|err| {
        ChangeGateError::Catalog(format!("failed to stat {}: {err}", path.display()))
    })?;
    if metadata.len() > MAX_MANIFEST_BYTES {
        return Err(ChangeGateError::Catalog(format!(
            "manifest {} exceeds {MAX_MANIFEST_BYTES} bytes",
            path.display()
        )));
    }
    let text = fs::read_to_string(path).map_err(|err| {
        ChangeGateError::Catalog(format!("failed to read {}: {err}", path.display()))
    })?;
    parse_manifest(&text).map_err(|err| match err {
        ChangeGateError::Catalog(message) => {
            ChangeGateError::Catalog(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

/// Parses changesets from manifest text.
///
/// # Errors
///
/// Returns [`ChangeGateError::Catalog`] when the document is malformed.
pub fn parse_manifest(text: &str) -> Result<Vec<Changeset>, ChangeGateError> {
    let document: Option<ManifestDocument> = serde_yaml::from_str(text)
        .map_err(|err| ChangeGateError::Catalog(format!("invalid changelog: {err}")))?;
    let entries = document.and_then(|doc| doc.database_change_log).ok_or_else(|| {
        ChangeGateError::Catalog("invalid changelog: missing 'databaseChangeLog' key".into())
    })?;
    let mut changesets = Vec::with_capacity(entries.len());
    for entry in entries {
        let raw = entry.change_set.ok_or_else(|| {
            ChangeGateError::Catalog(
                "each entry in databaseChangeLog must contain a 'changeSet' key".into(),
            )
        })?;
        changesets.push(build_changeset(raw)?);
    }
    Ok(changesets)
}

/// Validates raw fields into a changeset.
fn build_changeset(raw: RawChangeSet) -> Result<Changeset, ChangeGateError> {
    let id = raw.id.map(RawId::into_string).unwrap_or_default();
    let risk = match raw.risk {
        Some(label) => RiskLevel::parse(&label).ok_or_else(|| {
            ChangeGateError::Catalog(format!("changeset '{id}' has invalid risk '{label}'"))
        })?,
        None => RiskLevel::Low,
    };
    let preconditions = raw
        .preconditions
        .iter()
        .map(|entry| parse_precondition(&id, entry))
        .collect::<Result<Vec<_>, _>>()?;
    Changeset::new(ChangesetParts {
        id,
        author: raw.author.unwrap_or_default(),
        sql_file: raw.sql_file.unwrap_or_default(),
        risk,
        allow_destructive: raw.allow_destructive,
        labels: raw.labels.map(RawList::into_vec).unwrap_or_default(),
        contexts: raw.contexts.map(RawList::into_vec).unwrap_or_default(),
        preconditions,
    })
}

// ============================================================================
// SECTION: Preconditions
// ============================================================================

/// Parses one precondition map.
fn parse_precondition(
    changeset_id: &str,
    entry: &Mapping,
) -> Result<PreconditionSpec, ChangeGateError> {
    let on_fail = match entry.get("onFail") {
        None => OnFailPolicy::Halt,
        Some(Value::String(label)) => OnFailPolicy::parse(label),
        Some(_) => {
            return Err(ChangeGateError::Catalog(format!(
                "changeset '{changeset_id}': onFail must be a string"
            )));
        }
    };
    let check = if let Some(args) = entry.get("tableExists") {
        let args: TableExistsArgs = decode_args(changeset_id, "tableExists", args)?;
        PreconditionCheck::TableExists {
            table_name: args.table_name,
        }
    } else if let Some(args) = entry.get("columnExists") {
        let args: ColumnExistsArgs = decode_args(changeset_id, "columnExists", args)?;
        PreconditionCheck::ColumnExists {
            table_name: args.table_name,
            column_name: args.column_name,
        }
    } else if let Some(args) = entry.get("indexExists") {
        let args: IndexExistsArgs = decode_args(changeset_id, "indexExists", args)?;
        PreconditionCheck::IndexExists {
            table_name: args.table_name,
            index_name: args.index_name,
        }
    } else if let Some(args) = entry.get("sqlCheck") {
        let args: SqlCheckArgs = decode_args(changeset_id, "sqlCheck", args)?;
        let expected_result = match args.expected_result {
            None => DEFAULT_SQL_CHECK_EXPECTED.to_string(),
            Some(value) => scalar_text(&value).ok_or_else(|| {
                ChangeGateError::Catalog(format!(
                    "changeset '{changeset_id}': sqlCheck expectedResult must be a scalar"
                ))
            })?,
        };
        PreconditionCheck::SqlCheck {
            sql: args.sql,
            expected_result,
        }
    } else {
        PreconditionCheck::Unknown {
            keys: entry.keys().filter_map(scalar_text).collect(),
        }
    };
    Ok(PreconditionSpec {
        check,
        on_fail,
    })
}

/// Decodes the arguments of a known check kind.
fn decode_args<T: serde::de::DeserializeOwned>(
    changeset_id: &str,
    kind: &str,
    args: &Value,
) -> Result<T, ChangeGateError> {
    serde_yaml::from_value(args.clone()).map_err(|err| {
        ChangeGateError::Catalog(format!(
            "changeset '{changeset_id}': malformed {kind} precondition: {err}"
        ))
    })
}

/// Renders a YAML scalar as text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn integer_ids_and_csv_lists_are_normalized() {
        let text = "databaseChangeLog:\n  - changeSet:\n      id: 7\n      author: ops\n      \
                    sqlFile: sql/007.sql\n      labels: a, b ,a\n      contexts: [prod]\n";
        let changesets = parse_manifest(text).unwrap();
        assert_eq!(changesets[0].id(), "7");
        assert_eq!(changesets[0].labels(), ["a".to_string(), "b".to_string()]);
        assert_eq!(changesets[0].contexts(), ["prod".to_string()]);
        assert_eq!(changesets[0].risk(), RiskLevel::Low);
    }

    #[test]
    fn numeric_expected_result_is_rendered_as_text() {
        let text = "databaseChangeLog:\n  - changeSet:\n      id: '1'\n      author: ops\n      \
                    sqlFile: a.sql\n      preconditions:\n        - sqlCheck:\n            sql: \
                    SELECT 0\n            expectedResult: 0\n          onFail: warn\n";
        let changesets = parse_manifest(text).unwrap();
        let spec = &changesets[0].preconditions()[0];
        assert_eq!(spec.on_fail, OnFailPolicy::Warn);
        assert_eq!(
            spec.check,
            PreconditionCheck::SqlCheck {
                sql: "SELECT 0".into(),
                expected_result: "0".into(),
            }
        );
    }
}
