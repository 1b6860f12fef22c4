// crates/change-gate-core/src/audit.rs
// ============================================================================
// Module: Change Gate Event Logging
// Description: Structured events emitted while loading and applying changes.
// Purpose: Emit JSON-line events without tying the core to a log backend.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every observable signal the runtime produces (risky SQL warnings,
//! precondition results, run lifecycle, degraded audit writes) is a
//! [`ChangeEvent`] handed to an [`EventSink`]. Sinks never fail the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::unix_millis;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Severity of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Informational progress.
    Info,
    /// Non-blocking warning.
    Warn,
    /// Failure.
    Error,
}

/// Change event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Severity.
    pub level: EventLevel,
    /// Changeset the event refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changeset_id: Option<String>,
    /// Run the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ChangeEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: &'static str, level: EventLevel) -> Self {
        Self {
            event,
            timestamp_ms: unix_millis(),
            level,
            changeset_id: None,
            run_id: None,
            detail: None,
        }
    }

    /// Creates an info event.
    #[must_use]
    pub fn info(event: &'static str) -> Self {
        Self::new(event, EventLevel::Info)
    }

    /// Creates a warning event.
    #[must_use]
    pub fn warn(event: &'static str) -> Self {
        Self::new(event, EventLevel::Warn)
    }

    /// Creates an error event.
    #[must_use]
    pub fn error(event: &'static str) -> Self {
        Self::new(event, EventLevel::Error)
    }

    /// Attaches a changeset id.
    #[must_use]
    pub fn with_changeset(mut self, changeset_id: impl Into<String>) -> Self {
        self.changeset_id = Some(changeset_id.into());
        self
    }

    /// Attaches a run id.
    #[must_use]
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for change events.
pub trait EventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &ChangeEvent);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl EventSink for StderrEventSink {
    fn record(&self, event: &ChangeEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that logs JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for FileEventSink {
    fn record(&self, event: &ChangeEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op sink.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: &ChangeEvent) {}
}

/// Sink that keeps events in memory for inspection.
#[derive(Default)]
pub struct RecordingEventSink {
    /// Captured events.
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingEventSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every captured event.
    #[must_use]
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns the captured events with the given identifier.
    #[must_use]
    pub fn named(&self, event: &str) -> Vec<ChangeEvent> {
        self.events().into_iter().filter(|entry| entry.event == event).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: &ChangeEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
    }
}
