// crates/change-gate-core/src/runtime/preconditions.rs
// ============================================================================
// Module: Precondition Evaluator
// Description: Pre-flight checks against the live database schema and data.
// Purpose: Decide whether a changeset proceeds, is marked ran, or halts.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Preconditions run in declaration order. A failed check is resolved by its
//! `onFail` policy: `HALT` aborts with [`ChangeGateError::PreconditionFailed`],
//! `MARK_RAN` short-circuits to [`PreconditionOutcome::Skip`], `WARN` emits a
//! warning and continues, and any other value is a configuration error.
//! Unknown check kinds are warned about and skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::audit::ChangeEvent;
use crate::audit::EventSink;
use crate::core::ChangeGateError;
use crate::core::OnFailPolicy;
use crate::core::PreconditionCheck;
use crate::core::PreconditionSpec;
use crate::interfaces::SchemaInspector;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of evaluating a changeset's preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionOutcome {
    /// Every check passed or warned; apply the changeset.
    Proceed,
    /// A `MARK_RAN` check failed; record without executing.
    Skip,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates preconditions in order.
///
/// # Errors
///
/// Returns [`ChangeGateError::PreconditionFailed`] for a failed `HALT`
/// check, [`ChangeGateError::Configuration`] for a failed check with an
/// unrecognized `onFail`, or a store error if introspection fails.
pub fn evaluate(
    inspector: &dyn SchemaInspector,
    preconditions: &[PreconditionSpec],
    sink: &dyn EventSink,
) -> Result<PreconditionOutcome, ChangeGateError> {
    for spec in preconditions {
        let description = spec.check.describe();
        let passed = match &spec.check {
            PreconditionCheck::TableExists {
                table_name,
            } => inspector.table_exists(table_name)?,
            PreconditionCheck::ColumnExists {
                table_name,
                column_name,
            } => inspector.column_exists(table_name, column_name)?,
            PreconditionCheck::IndexExists {
                table_name,
                index_name,
            } => inspector.index_exists(table_name, index_name)?,
            PreconditionCheck::SqlCheck {
                sql,
                expected_result,
            } => inspector.query_scalar(sql)?.is_some_and(|value| value == *expected_result),
            PreconditionCheck::Unknown {
                ..
            } => {
                sink.record(&ChangeEvent::warn("unknown_precondition").with_detail(description));
                continue;
            }
        };

        if passed {
            sink.record(&ChangeEvent::info("precondition_passed").with_detail(description));
            continue;
        }

        match &spec.on_fail {
            OnFailPolicy::Halt => {
                return Err(ChangeGateError::PreconditionFailed {
                    check: description,
                });
            }
            OnFailPolicy::MarkRan => {
                sink.record(&ChangeEvent::warn("precondition_mark_ran").with_detail(description));
                return Ok(PreconditionOutcome::Skip);
            }
            OnFailPolicy::Warn => {
                sink.record(&ChangeEvent::warn("precondition_warn").with_detail(description));
            }
            OnFailPolicy::Unrecognized(label) => {
                return Err(ChangeGateError::Configuration(format!(
                    "unknown onFail value '{label}' on {description}"
                )));
            }
        }
    }
    Ok(PreconditionOutcome::Proceed)
}
