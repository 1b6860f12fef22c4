// crates/change-gate-core/src/core/changeset.rs
// ============================================================================
// Module: Changeset Model
// Description: Immutable changeset and precondition definitions.
// Purpose: Represent one attributed unit of schema change after validation.
// Dependencies: serde, crate::core::error
// ============================================================================

//! ## Overview
//! A [`Changeset`] is built once from a catalog source through a validated
//! constructor and never mutated afterwards. Identity is the
//! [`ChangesetKey`] pair of id and author. Preconditions are kept in
//! declaration order; unrecognized kinds and `onFail` values are preserved
//! so evaluation can warn or fail exactly where the run reaches them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::core::error::ChangeGateError;

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Identity of a changeset: `(id, author)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChangesetKey {
    /// Changeset identifier.
    pub id: String,
    /// Changeset author.
    pub author: String,
}

impl ChangesetKey {
    /// Creates a new changeset key.
    #[must_use]
    pub fn new(id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
        }
    }
}

impl fmt::Display for ChangesetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.id, self.author)
    }
}

// ============================================================================
// SECTION: Risk
// ============================================================================

/// Declared risk of a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Low risk (manifest default).
    #[default]
    Low,
    /// Medium risk (auto-discovery default).
    Medium,
    /// High risk.
    High,
}

impl RiskLevel {
    /// Parses a risk label case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

// ============================================================================
// SECTION: Preconditions
// ============================================================================

/// Policy applied when a precondition check fails.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnFailPolicy {
    /// Abort the run.
    #[default]
    Halt,
    /// Record the changeset as settled without executing it.
    MarkRan,
    /// Emit a warning and keep going.
    Warn,
    /// Value not recognized; fails with a configuration error when reached.
    Unrecognized(String),
}

impl OnFailPolicy {
    /// Parses an `onFail` label case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "HALT" => Self::Halt,
            "MARK_RAN" => Self::MarkRan,
            "WARN" => Self::Warn,
            _ => Self::Unrecognized(label.to_string()),
        }
    }
}

/// Default expected result for `sqlCheck` preconditions.
pub const DEFAULT_SQL_CHECK_EXPECTED: &str = "1";

/// A single pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PreconditionCheck {
    /// Table must exist.
    TableExists {
        /// Table name.
        table_name: String,
    },
    /// Column must exist on a table.
    ColumnExists {
        /// Table name.
        table_name: String,
        /// Column name.
        column_name: String,
    },
    /// Index must exist on a table.
    IndexExists {
        /// Table name.
        table_name: String,
        /// Index name.
        index_name: String,
    },
    /// First value returned by a read-only query must equal the expectation.
    SqlCheck {
        /// Query to run.
        sql: String,
        /// Expected first value, compared as a string.
        expected_result: String,
    },
    /// Unrecognized check; warned and skipped during evaluation.
    Unknown {
        /// Keys present on the unrecognized entry.
        keys: Vec<String>,
    },
}

impl PreconditionCheck {
    /// Returns a short human-readable description of the check.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::TableExists {
                table_name,
            } => format!("tableExists({table_name})"),
            Self::ColumnExists {
                table_name,
                column_name,
            } => format!("columnExists({table_name}.{column_name})"),
            Self::IndexExists {
                table_name,
                index_name,
            } => format!("indexExists({table_name}.{index_name})"),
            Self::SqlCheck {
                sql, ..
            } => {
                let preview: String = sql.chars().take(60).collect();
                format!("sqlCheck({preview})")
            }
            Self::Unknown {
                keys,
            } => format!("unknown({})", keys.join(",")),
        }
    }
}

/// A precondition declared on a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreconditionSpec {
    /// Check to evaluate.
    pub check: PreconditionCheck,
    /// Policy applied on failure.
    pub on_fail: OnFailPolicy,
}

// ============================================================================
// SECTION: Changeset
// ============================================================================

/// Unvalidated changeset fields handed to [`Changeset::new`].
#[derive(Debug, Clone, Default)]
pub struct ChangesetParts {
    /// Changeset identifier.
    pub id: String,
    /// Changeset author.
    pub author: String,
    /// SQL file reference relative to the catalog base directory.
    pub sql_file: String,
    /// Declared risk.
    pub risk: RiskLevel,
    /// Per-changeset destructive opt-in.
    pub allow_destructive: bool,
    /// Labels in declaration order.
    pub labels: Vec<String>,
    /// Contexts; empty means unrestricted.
    pub contexts: Vec<String>,
    /// Preconditions in declaration order.
    pub preconditions: Vec<PreconditionSpec>,
}

/// Validated, immutable changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Changeset {
    /// Identity.
    key: ChangesetKey,
    /// SQL file reference.
    sql_file: String,
    /// Declared risk.
    risk: RiskLevel,
    /// Per-changeset destructive opt-in.
    allow_destructive: bool,
    /// Labels (ordered, de-duplicated).
    labels: Vec<String>,
    /// Contexts (de-duplicated); empty means unrestricted.
    contexts: Vec<String>,
    /// Preconditions in declaration order.
    preconditions: Vec<PreconditionSpec>,
}

impl Changeset {
    /// Validates parts and builds a changeset.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::Catalog`] when a required field is blank.
    pub fn new(parts: ChangesetParts) -> Result<Self, ChangeGateError> {
        let id = parts.id.trim().to_string();
        if id.is_empty() {
            return Err(ChangeGateError::Catalog("changeset missing required field 'id'".into()));
        }
        let author = parts.author.trim().to_string();
        if author.is_empty() {
            return Err(ChangeGateError::Catalog(format!(
                "changeset '{id}' missing required field 'author'"
            )));
        }
        let sql_file = parts.sql_file.trim().to_string();
        if sql_file.is_empty() {
            return Err(ChangeGateError::Catalog(format!(
                "changeset '{id}' missing required field 'sqlFile'"
            )));
        }
        Ok(Self {
            key: ChangesetKey::new(id, author),
            sql_file,
            risk: parts.risk,
            allow_destructive: parts.allow_destructive,
            labels: normalize_list(parts.labels),
            contexts: normalize_list(parts.contexts),
            preconditions: parts.preconditions,
        })
    }

    /// Returns the changeset identity.
    #[must_use]
    pub const fn key(&self) -> &ChangesetKey {
        &self.key
    }

    /// Returns the changeset identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// Returns the changeset author.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.key.author
    }

    /// Returns the SQL file reference.
    #[must_use]
    pub fn sql_file(&self) -> &str {
        &self.sql_file
    }

    /// Returns the declared risk.
    #[must_use]
    pub const fn risk(&self) -> RiskLevel {
        self.risk
    }

    /// Returns whether the changeset opts in to destructive statements.
    #[must_use]
    pub const fn allow_destructive(&self) -> bool {
        self.allow_destructive
    }

    /// Returns the labels.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the contexts.
    #[must_use]
    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }

    /// Returns the preconditions.
    #[must_use]
    pub fn preconditions(&self) -> &[PreconditionSpec] {
        &self.preconditions
    }

    /// Returns whether the changeset applies under the run context.
    ///
    /// No run context matches everything; a changeset without contexts
    /// matches every run context.
    #[must_use]
    pub fn matches_context(&self, context: Option<&str>) -> bool {
        let Some(context) = context else {
            return true;
        };
        self.contexts.is_empty() || self.contexts.iter().any(|entry| entry == context)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Trims entries, drops blanks, and removes duplicates keeping first occurrence.
fn normalize_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() || out.iter().any(|existing| existing == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

/// Splits a comma-separated list into trimmed, non-empty entries.
#[must_use]
pub fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|entry| !entry.is_empty()).map(String::from).collect()
}
