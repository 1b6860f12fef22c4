// crates/change-gate-core/src/runtime/engine.rs
// ============================================================================
// Module: Change Gate Execution Engine
// Description: Applies, inspects, and verifies catalog changesets.
// Purpose: Drive one update run from catalog load through lock release.
// Dependencies: uuid, crate::{audit, catalog, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`ChangeEngine::update`] loads the catalog, opens a run record, takes the
//! distributed lock, and walks the context-filtered changesets in catalog
//! order. Each changeset is either already applied (checksum verified),
//! marked ran by a precondition, emitted for a dry run, or executed one
//! statement at a time. Any failure aborts the whole run; the run record is
//! finalized through [`record_failure_best_effort`] and the lock is always
//! released.
//!
//! Statements commit individually. A failure mid-script leaves earlier
//! statements of the same changeset committed and records nothing for it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::audit::ChangeEvent;
use crate::audit::EventSink;
use crate::catalog;
use crate::catalog::Catalog;
use crate::catalog::CatalogSource;
use crate::core::AppliedRecord;
use crate::core::ChangeGateError;
use crate::core::Changeset;
use crate::core::ChangesetKey;
use crate::core::ExecType;
use crate::core::NewAppliedRecord;
use crate::core::OnFailPolicy;
use crate::core::PreconditionCheck;
use crate::core::RunRecord;
use crate::core::RunStatus;
use crate::core::checksum;
use crate::core::unix_millis;
use crate::interfaces::AuditStore;
use crate::interfaces::ChangeDatabase;
use crate::interfaces::DistributedMutex;
use crate::runtime::lock::DEFAULT_LOCK_TIMEOUT;
use crate::runtime::lock::DistributedLock;
use crate::runtime::policy::PolicyGate;
use crate::runtime::preconditions;
use crate::runtime::preconditions::PreconditionOutcome;
use crate::runtime::script::split_statements;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Run identity and policy settings for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEngineConfig {
    /// Environment name recorded on runs.
    pub env_name: String,
    /// Invoking actor recorded on runs and as lock holder.
    pub actor: String,
    /// Source commit reference.
    pub commit_ref: Option<String>,
    /// Backup artifact taken before runs.
    pub backup_ref: Option<String>,
    /// Global destructive override.
    pub allow_destructive: bool,
    /// Bounded wait for the advisory mutex.
    pub lock_timeout: Duration,
}

impl Default for ChangeEngineConfig {
    fn default() -> Self {
        Self {
            env_name: "dev".to_string(),
            actor: "local".to_string(),
            commit_ref: None,
            backup_ref: None,
            allow_destructive: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl ChangeEngineConfig {
    /// Returns the lock holder identity `<actor>@<env>`.
    #[must_use]
    pub fn lock_holder(&self) -> String {
        format!("{}@{}", self.actor, self.env_name)
    }
}

// ============================================================================
// SECTION: Requests and Reports
// ============================================================================

/// Inputs for one update run.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// Catalog location.
    pub source: CatalogSource,
    /// Run context; `None` applies every changeset.
    pub context: Option<String>,
    /// Emit SQL instead of executing it.
    pub dry_run: bool,
    /// Backup artifact for this run; falls back to the engine config.
    pub backup_ref: Option<String>,
}

impl UpdateRequest {
    /// Creates a request with no context filter.
    #[must_use]
    pub const fn new(source: CatalogSource) -> Self {
        Self {
            source,
            context: None,
            dry_run: false,
            backup_ref: None,
        }
    }
}

/// Per-changeset outcome within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangesetStatus {
    /// A record already existed and its checksum matched (or it was marked ran).
    AlreadyApplied,
    /// A precondition requested `MARK_RAN`; recorded without execution.
    MarkRan,
    /// SQL executed and recorded.
    Applied,
    /// Dry run: SQL emitted, nothing recorded.
    DryRun,
}

/// Outcome for one changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetOutcome {
    /// Changeset identity.
    pub key: ChangesetKey,
    /// Outcome.
    pub status: ChangesetStatus,
    /// Apply order assigned, if a record was written.
    pub order_executed: Option<i64>,
}

/// SQL that a dry run would execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunScript {
    /// Changeset identity.
    pub key: ChangesetKey,
    /// Full SQL text.
    pub sql: String,
}

/// Result of a completed update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Run identifier.
    pub run_id: String,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Outcomes in catalog order.
    pub outcomes: Vec<ChangesetOutcome>,
    /// Scripts emitted by a dry run.
    pub scripts: Vec<DryRunScript>,
}

impl UpdateReport {
    /// Returns the number of changesets executed in this run.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.status == ChangesetStatus::Applied).count()
    }

    /// Returns the number of changesets with the given status.
    #[must_use]
    pub fn count(&self, status: ChangesetStatus) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.status == status).count()
    }

    /// Renders dry-run scripts as one annotated SQL document.
    #[must_use]
    pub fn render_sql(&self) -> String {
        let mut out = String::new();
        for script in &self.scripts {
            let _ = writeln!(out, "-- Changeset {}", script.key);
            let _ = writeln!(out, "{}", script.sql.trim_end());
            out.push('\n');
        }
        out
    }
}

/// Kind of drift found by verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VerifyIssue {
    /// Current SQL no longer matches the recorded checksum.
    ChecksumMismatch {
        /// Recorded checksum.
        expected: String,
        /// Checksum of the current SQL.
        actual: String,
    },
    /// SQL file referenced by an applied changeset is gone.
    FileMissing,
}

/// One verification finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyMismatch {
    /// Changeset identity.
    pub key: ChangesetKey,
    /// Finding.
    pub issue: VerifyIssue,
}

/// Result of verifying applied changesets against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Number of applied changesets compared.
    pub checked: usize,
    /// Findings.
    pub mismatches: Vec<VerifyMismatch>,
}

/// One row of the merged catalog and audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Changeset identity.
    pub key: ChangesetKey,
    /// Whether the changeset is in the current catalog.
    pub in_catalog: bool,
    /// SQL file reference (catalog first, then record).
    pub sql_file: String,
    /// Applied record, when present.
    pub applied: Option<AppliedRecord>,
}

/// Merged catalog and audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryReport {
    /// Catalog changesets in catalog order, followed by applied records no
    /// longer in the catalog in apply order.
    pub entries: Vec<HistoryEntry>,
    /// Most recent runs, newest first.
    pub runs: Vec<RunRecord>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Execution engine over a target database and an advisory mutex.
pub struct ChangeEngine<D, M> {
    /// Target database and audit store.
    db: D,
    /// Advisory mutex for the run lock.
    mutex: M,
    /// Event sink.
    sink: Arc<dyn EventSink>,
    /// Compiled policy registries.
    policy: PolicyGate,
    /// Engine configuration.
    config: ChangeEngineConfig,
}

impl<D, M> ChangeEngine<D, M>
where
    D: ChangeDatabase,
    M: DistributedMutex,
{
    /// Creates a new engine.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::Configuration`] if the policy registries
    /// fail to compile.
    pub fn new(
        db: D,
        mutex: M,
        sink: Arc<dyn EventSink>,
        config: ChangeEngineConfig,
    ) -> Result<Self, ChangeGateError> {
        Ok(Self {
            db,
            mutex,
            sink,
            policy: PolicyGate::new()?,
            config,
        })
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &ChangeEngineConfig {
        &self.config
    }

    /// Returns the target database.
    #[must_use]
    pub const fn database(&self) -> &D {
        &self.db
    }

    /// Applies pending changesets.
    ///
    /// # Errors
    ///
    /// Returns the first error that aborted the run. The run record is
    /// finalized as failed on a best-effort basis before returning. A lock
    /// release failure after a successful run does not fail the call; it is
    /// reported as a `lock_release_failed` event and the stale lock row is
    /// left for the operator to clear.
    pub fn update(&self, request: &UpdateRequest) -> Result<UpdateReport, ChangeGateError> {
        let catalog = catalog::load(&request.source)?;
        self.db.ensure_schema()?;

        let run = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            env_name: self.config.env_name.clone(),
            actor: Some(self.config.actor.clone()),
            commit_ref: self.config.commit_ref.clone(),
            started_at: unix_millis(),
            finished_at: None,
            status: RunStatus::Running,
            backup_ref: request.backup_ref.clone().or_else(|| self.config.backup_ref.clone()),
            error_message: None,
        };
        self.db.insert_run(&run)?;
        self.sink.record(
            &ChangeEvent::info("run_started")
                .with_run(&run.run_id)
                .with_detail(self.config.lock_holder()),
        );

        let lock = DistributedLock::new(&self.db, &self.mutex, self.config.lock_timeout);
        let guard = match lock.acquire(&self.config.lock_holder()) {
            Ok(guard) => guard,
            Err(err) => {
                record_failure_best_effort(&self.db, self.sink.as_ref(), &run.run_id, &err);
                return Err(err);
            }
        };

        let outcome = self.apply_catalog(&catalog, request, &run.run_id).and_then(|report| {
            self.db.finish_run(&run.run_id, RunStatus::Succeeded, unix_millis(), None)?;
            Ok(report)
        });
        if let Err(err) = &outcome {
            record_failure_best_effort(&self.db, self.sink.as_ref(), &run.run_id, err);
        }
        let released = guard.release();

        let report = outcome?;
        if let Err(err) = released {
            self.sink.record(
                &ChangeEvent::error("lock_release_failed")
                    .with_run(&run.run_id)
                    .with_detail(err.to_string()),
            );
        }
        self.sink.record(
            &ChangeEvent::info("update_complete")
                .with_run(&run.run_id)
                .with_detail(format!("applied={}", report.applied_count())),
        );
        Ok(report)
    }

    /// Walks filtered changesets under the lock.
    fn apply_catalog(
        &self,
        catalog: &Catalog,
        request: &UpdateRequest,
        run_id: &str,
    ) -> Result<UpdateReport, ChangeGateError> {
        let applied = applied_by_key(self.db.applied_records()?);
        let mut report = UpdateReport {
            run_id: run_id.to_string(),
            dry_run: request.dry_run,
            outcomes: Vec::new(),
            scripts: Vec::new(),
        };

        for changeset in catalog.filter_context(request.context.as_deref()) {
            let sql = catalog.resolve_sql(changeset)?;
            let digest = checksum(&sql);

            if let Some(existing) = applied.get(changeset.key()) {
                if existing.exec_type == ExecType::Executed && existing.checksum != digest {
                    return Err(ChangeGateError::ChecksumMismatch {
                        id: changeset.id().to_string(),
                        author: changeset.author().to_string(),
                        expected: existing.checksum.clone(),
                        actual: digest,
                    });
                }
                report.outcomes.push(outcome(changeset, ChangesetStatus::AlreadyApplied, None));
                continue;
            }

            self.policy.check(&sql, changeset, self.config.allow_destructive, self.sink.as_ref())?;

            let decision =
                preconditions::evaluate(&self.db, changeset.preconditions(), self.sink.as_ref())?;
            if decision == PreconditionOutcome::Skip {
                let record = self.db.append_applied(NewAppliedRecord::for_changeset(
                    changeset,
                    ExecType::MarkRan,
                    digest,
                ))?;
                self.sink.record(
                    &ChangeEvent::info("changeset_mark_ran")
                        .with_run(run_id)
                        .with_changeset(changeset.id()),
                );
                report.outcomes.push(outcome(
                    changeset,
                    ChangesetStatus::MarkRan,
                    Some(record.order_executed),
                ));
                continue;
            }

            if request.dry_run {
                self.sink.record(
                    &ChangeEvent::info("dry_run")
                        .with_run(run_id)
                        .with_changeset(changeset.id())
                        .with_detail(format!("sql_length={}", sql.len())),
                );
                report.scripts.push(DryRunScript {
                    key: changeset.key().clone(),
                    sql,
                });
                report.outcomes.push(outcome(changeset, ChangesetStatus::DryRun, None));
                continue;
            }

            self.sink.record(
                &ChangeEvent::info("applying_changeset")
                    .with_run(run_id)
                    .with_changeset(changeset.id())
                    .with_detail(format!("risk={}", changeset.risk().as_str())),
            );
            for statement in split_statements(&sql) {
                if let Err(err) = self.db.execute_statement(&statement) {
                    self.sink.record(
                        &ChangeEvent::error("changeset_failed")
                            .with_run(run_id)
                            .with_changeset(changeset.id())
                            .with_detail(err.to_string()),
                    );
                    return Err(ChangeGateError::Execution {
                        changeset_id: changeset.id().to_string(),
                        message: err.to_string(),
                    });
                }
            }
            let record = self.db.append_applied(NewAppliedRecord::for_changeset(
                changeset,
                ExecType::Executed,
                digest,
            ))?;
            self.sink.record(
                &ChangeEvent::info("changeset_applied")
                    .with_run(run_id)
                    .with_changeset(changeset.id()),
            );
            report.outcomes.push(outcome(
                changeset,
                ChangesetStatus::Applied,
                Some(record.order_executed),
            ));
        }
        Ok(report)
    }

    /// Returns changesets matching `context` that have no applied record.
    ///
    /// # Errors
    ///
    /// Returns catalog or store errors.
    pub fn status(
        &self,
        source: &CatalogSource,
        context: Option<&str>,
    ) -> Result<Vec<Changeset>, ChangeGateError> {
        let catalog = catalog::load(source)?;
        self.db.ensure_schema()?;
        let applied = applied_by_key(self.db.applied_records()?);
        let pending: Vec<Changeset> = catalog
            .filter_context(context)
            .filter(|changeset| !applied.contains_key(changeset.key()))
            .cloned()
            .collect();
        for changeset in &pending {
            self.sink.record(
                &ChangeEvent::info("pending_changeset")
                    .with_changeset(changeset.id())
                    .with_detail(changeset.sql_file()),
            );
        }
        Ok(pending)
    }

    /// Compares executed changesets against their current SQL without failing.
    ///
    /// # Errors
    ///
    /// Returns catalog or store errors.
    pub fn verify_report(&self, source: &CatalogSource) -> Result<VerifyReport, ChangeGateError> {
        let catalog = catalog::load(source)?;
        self.db.ensure_schema()?;
        let applied = applied_by_key(self.db.applied_records()?);
        let mut report = VerifyReport {
            checked: 0,
            mismatches: Vec::new(),
        };
        for changeset in catalog.changesets() {
            let Some(existing) = applied.get(changeset.key()) else {
                continue;
            };
            if existing.exec_type != ExecType::Executed {
                continue;
            }
            report.checked += 1;
            let issue = match catalog.resolve_sql(changeset) {
                Ok(sql) => {
                    let actual = checksum(&sql);
                    if actual == existing.checksum {
                        continue;
                    }
                    VerifyIssue::ChecksumMismatch {
                        expected: existing.checksum.clone(),
                        actual,
                    }
                }
                Err(ChangeGateError::NotFound(_)) => VerifyIssue::FileMissing,
                Err(err) => return Err(err),
            };
            self.sink.record(
                &ChangeEvent::error("checksum_mismatch")
                    .with_changeset(changeset.id())
                    .with_detail(changeset.key().to_string()),
            );
            report.mismatches.push(VerifyMismatch {
                key: changeset.key().clone(),
                issue,
            });
        }
        Ok(report)
    }

    /// Verifies executed changesets against their current SQL.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::VerificationFailed`] when any mismatch is
    /// found, or catalog and store errors.
    pub fn verify(&self, source: &CatalogSource) -> Result<VerifyReport, ChangeGateError> {
        let report = self.verify_report(source)?;
        if !report.mismatches.is_empty() {
            return Err(ChangeGateError::VerificationFailed(report.mismatches.len()));
        }
        self.sink.record(
            &ChangeEvent::info("verify_ok").with_detail(format!("checked={}", report.checked)),
        );
        Ok(report)
    }

    /// Merges the catalog with applied records and recent runs.
    ///
    /// # Errors
    ///
    /// Returns catalog or store errors.
    pub fn history(
        &self,
        source: &CatalogSource,
        run_limit: usize,
    ) -> Result<HistoryReport, ChangeGateError> {
        let catalog = catalog::load(source)?;
        self.db.ensure_schema()?;
        let records = self.db.applied_records()?;
        let mut applied = applied_by_key(records.clone());
        let mut entries: Vec<HistoryEntry> = catalog
            .changesets()
            .iter()
            .map(|changeset| HistoryEntry {
                key: changeset.key().clone(),
                in_catalog: true,
                sql_file: changeset.sql_file().to_string(),
                applied: applied.remove(changeset.key()),
            })
            .collect();
        entries.extend(records.into_iter().filter(|record| applied.contains_key(&record.key())).map(
            |record| HistoryEntry {
                key: record.key(),
                in_catalog: false,
                sql_file: record.filename.clone(),
                applied: Some(record),
            },
        ));
        Ok(HistoryReport {
            entries,
            runs: self.db.recent_runs(run_limit)?,
        })
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a catalog offline and returns its changeset count.
///
/// Every SQL file must resolve and no precondition may use an unknown kind
/// or `onFail` value. Destructive statements without a changeset opt-in
/// are reported as warnings.
///
/// # Errors
///
/// Returns [`ChangeGateError::Catalog`] listing every problem found, or
/// the load error when the catalog itself is invalid.
pub fn validate(source: &CatalogSource, sink: &dyn EventSink) -> Result<usize, ChangeGateError> {
    let catalog = catalog::load(source)?;
    let policy = PolicyGate::new()?;
    let mut errors: Vec<String> = Vec::new();
    for changeset in catalog.changesets() {
        match catalog.resolve_sql(changeset) {
            Ok(sql) => {
                let findings = policy.scan(&sql);
                if !findings.destructive.is_empty() && !changeset.allow_destructive() {
                    sink.record(
                        &ChangeEvent::warn("destructive_without_opt_in")
                            .with_changeset(changeset.id())
                            .with_detail(findings.destructive.join(",")),
                    );
                }
            }
            Err(err) => errors.push(err.to_string()),
        }
        for spec in changeset.preconditions() {
            if let PreconditionCheck::Unknown {
                keys,
            } = &spec.check
            {
                errors.push(format!(
                    "changeset {}: unknown precondition keys [{}]",
                    changeset.id(),
                    keys.join(",")
                ));
            }
            if let OnFailPolicy::Unrecognized(label) = &spec.on_fail {
                errors.push(format!("changeset {}: unknown onFail value '{label}'", changeset.id()));
            }
        }
    }
    if !errors.is_empty() {
        for error in &errors {
            sink.record(&ChangeEvent::error("validate_error").with_detail(error.clone()));
        }
        return Err(ChangeGateError::Catalog(format!(
            "validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        )));
    }
    sink.record(
        &ChangeEvent::info("validate_ok").with_detail(format!("changesets={}", catalog.len())),
    );
    Ok(catalog.len())
}

// ============================================================================
// SECTION: Failure Audit
// ============================================================================

/// Marks a run failed without ever propagating its own error.
///
/// A failed write degrades observability only; it emits an
/// `audit_write_failed` event and returns.
pub fn record_failure_best_effort(
    store: &dyn AuditStore,
    sink: &dyn EventSink,
    run_id: &str,
    error: &ChangeGateError,
) {
    let message = error.to_string();
    sink.record(
        &ChangeEvent::error("run_failed")
            .with_run(run_id)
            .with_detail(format!("{}: {message}", error.kind().as_str())),
    );
    if let Err(write_err) =
        store.finish_run(run_id, RunStatus::Failed, unix_millis(), Some(&message))
    {
        sink.record(
            &ChangeEvent::error("audit_write_failed")
                .with_run(run_id)
                .with_detail(write_err.to_string()),
        );
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Indexes applied records by changeset identity.
fn applied_by_key(records: Vec<AppliedRecord>) -> BTreeMap<ChangesetKey, AppliedRecord> {
    records.into_iter().map(|record| (record.key(), record)).collect()
}

/// Builds an outcome entry.
fn outcome(
    changeset: &Changeset,
    status: ChangesetStatus,
    order_executed: Option<i64>,
) -> ChangesetOutcome {
    ChangesetOutcome {
        key: changeset.key().clone(),
        status,
        order_executed,
    }
}
