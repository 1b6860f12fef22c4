// crates/change-gate-core/src/runtime/policy.rs
// ============================================================================
// Module: Policy Gate
// Description: Destructive and risky statement detection.
// Purpose: Enforce the destructive double opt-in before SQL is executed.
// Dependencies: regex, crate::{audit, core}
// ============================================================================

//! ## Overview
//! Two case-insensitive pattern registries are matched against changeset
//! SQL. A destructive match blocks unless the changeset sets
//! `allowDestructive` AND the global override is enabled. Risky matches
//! never block; they only emit a warning event. The gate holds no state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use regex::RegexBuilder;
use serde::Serialize;

use crate::audit::ChangeEvent;
use crate::audit::EventSink;
use crate::core::ChangeGateError;
use crate::core::Changeset;

// ============================================================================
// SECTION: Registries
// ============================================================================

/// Destructive statement signatures: `(pattern, name)`.
pub const DESTRUCTIVE_PATTERNS: &[(&str, &str)] = &[
    (r"\bDROP\s+DATABASE\b", "DROP DATABASE"),
    (r"\bTRUNCATE\s+TABLE\b", "TRUNCATE TABLE"),
    (r"\bDROP\s+TABLE\b", "DROP TABLE"),
];

/// Risky statement signatures: `(pattern, advisory)`.
pub const RISKY_PATTERNS: &[(&str, &str)] = &[(
    r"\bALTER\s+TABLE\b",
    "ALTER TABLE detected; it may hold a metadata lock on large tables, consider an online \
     schema change tool in production",
)];

// ============================================================================
// SECTION: Findings
// ============================================================================

/// Matches found in one SQL text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyFindings {
    /// Names of matched destructive patterns.
    pub destructive: Vec<&'static str>,
    /// Advisories of matched risky patterns.
    pub risky: Vec<&'static str>,
}

impl PolicyFindings {
    /// Returns whether nothing matched.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.destructive.is_empty() && self.risky.is_empty()
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Compiled pattern entry.
#[derive(Debug, Clone)]
struct CompiledPattern {
    /// Compiled expression.
    regex: Regex,
    /// Name or advisory text.
    label: &'static str,
}

/// Compiled policy registries.
#[derive(Debug, Clone)]
pub struct PolicyGate {
    /// Destructive registry.
    destructive: Vec<CompiledPattern>,
    /// Risky registry.
    risky: Vec<CompiledPattern>,
}

impl PolicyGate {
    /// Compiles the built-in registries.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::Configuration`] if a pattern fails to compile.
    pub fn new() -> Result<Self, ChangeGateError> {
        Ok(Self {
            destructive: compile_all(DESTRUCTIVE_PATTERNS)?,
            risky: compile_all(RISKY_PATTERNS)?,
        })
    }

    /// Lists every destructive and risky match in `sql`.
    #[must_use]
    pub fn scan(&self, sql: &str) -> PolicyFindings {
        PolicyFindings {
            destructive: matching(&self.destructive, sql),
            risky: matching(&self.risky, sql),
        }
    }

    /// Enforces the double opt-in for destructive statements.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::PolicyViolation`] for the first destructive
    /// match when either opt-in is missing.
    pub fn check(
        &self,
        sql: &str,
        changeset: &Changeset,
        global_override: bool,
        sink: &dyn EventSink,
    ) -> Result<(), ChangeGateError> {
        let findings = self.scan(sql);
        let allowed = changeset.allow_destructive() && global_override;
        for name in findings.destructive {
            if !allowed {
                return Err(ChangeGateError::PolicyViolation {
                    changeset_id: changeset.id().to_string(),
                    pattern: name.to_string(),
                });
            }
            sink.record(
                &ChangeEvent::warn("destructive_allowed")
                    .with_changeset(changeset.id())
                    .with_detail(name),
            );
        }
        for advisory in findings.risky {
            sink.record(
                &ChangeEvent::warn("risky_operation")
                    .with_changeset(changeset.id())
                    .with_detail(advisory),
            );
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Compiles a registry case-insensitively.
fn compile_all(patterns: &[(&str, &'static str)]) -> Result<Vec<CompiledPattern>, ChangeGateError> {
    patterns
        .iter()
        .map(|&(pattern, label)| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(|regex| CompiledPattern {
                    regex,
                    label,
                })
                .map_err(|err| {
                    ChangeGateError::Configuration(format!("invalid policy pattern {pattern}: {err}"))
                })
        })
        .collect()
}

/// Returns labels of patterns matching `sql`.
fn matching(patterns: &[CompiledPattern], sql: &str) -> Vec<&'static str> {
    patterns.iter().filter(|entry| entry.regex.is_match(sql)).map(|entry| entry.label).collect()
}
