//! Events emitted while the engine runs an operation

use super::plan::{ChangeSummary, OpType, PropertyDiff};
use super::policy::EnforcementLevel;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum EngineEvent {
    /// A resource operation is about to start (or is planned, during preview)
    ResourcePre {
        urn: String,
        kind: String,
        op: OpType,
        diffs: Vec<PropertyDiff>,
        planning: bool,
    },
    /// A resource operation completed
    ResourceOutputs {
        urn: String,
        kind: String,
        op: OpType,
        keys: Vec<String>,
    },
    ResourceOperationFailed {
        urn: String,
        kind: String,
        op: OpType,
        error: String,
    },
    PolicyViolation {
        policy: String,
        urn: String,
        message: String,
        level: EnforcementLevel,
    },
    Diagnostic {
        urn: Option<String>,
        severity: Severity,
        message: String,
    },
    Summary {
        summary: ChangeSummary,
        duration_ms: u64,
    },
    /// The operation as a whole failed
    Error {
        message: String,
    },
    Cancel,
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Sends an event if anyone listens; a closed channel is not an error
pub(crate) fn emit(events: Option<&EventSender>, event: EngineEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event);
    }
}

pub(crate) fn diagnostic(events: Option<&EventSender>, severity: Severity, urn: Option<&str>, message: String) {
    emit(
        events,
        EngineEvent::Diagnostic {
            urn: urn.map(str::to_string),
            severity,
            message,
        },
    );
}
