//! Engine event processing
//!
//! Every facade phase gets its own [`EventWatcher`]: a spawned task draining
//! the engine's event channel and logging each event under the phase's
//! [`Action`].

use crate::engine::{EngineEvent, EventSender, OperationOptions, PropertyDiff, Severity, channel};
use std::fmt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Logical action an event stream belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deploy,
    Provision,
    Cancel,
    Refresh,
    Preview,
    Destroy,
    Init,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Deploy => "deploy",
            Action::Provision => "provision",
            Action::Cancel => "cancel",
            Action::Refresh => "refresh",
            Action::Preview => "preview",
            Action::Destroy => "destroy",
            Action::Init => "init",
        };
        f.write_str(name)
    }
}

/// `path:kind` pairs, comma separated
pub fn diff_summary(diffs: &[PropertyDiff]) -> String {
    diffs
        .iter()
        .map(|d| format!("{}:{}", d.path, d.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Logs one event. Returns false for events the processor does not know.
pub fn process_event(action: Action, event: &EngineEvent) -> bool {
    match event {
        EngineEvent::ResourcePre {
            urn,
            op,
            diffs,
            planning,
            ..
        } => {
            info!(
                action = %action,
                urn = %urn,
                op = %op,
                planning,
                diff = %diff_summary(diffs),
                "Resource pre"
            );
        }
        EngineEvent::ResourceOutputs { urn, op, keys, .. } => {
            info!(
                action = %action,
                urn = %urn,
                op = %op,
                outputs = %keys.join(", "),
                "Resource outputs"
            );
        }
        EngineEvent::ResourceOperationFailed { urn, op, error, .. } => {
            error!(
                action = %action,
                urn = %urn,
                op = %op,
                error = %error,
                "Resource operation failed"
            );
        }
        EngineEvent::PolicyViolation {
            policy,
            urn,
            message,
            level,
        } => {
            warn!(
                action = %action,
                policy = %policy,
                urn = %urn,
                level = %level,
                "Policy violation: {}",
                message
            );
        }
        EngineEvent::Diagnostic {
            urn,
            severity,
            message,
        } => {
            let urn = urn.as_deref().unwrap_or("");
            match severity {
                Severity::Debug => debug!(action = %action, urn, "{}", message),
                Severity::Info => info!(action = %action, urn, "{}", message),
                Severity::Warning => warn!(action = %action, urn, "{}", message),
                Severity::Error => error!(action = %action, urn, "{}", message),
            }
        }
        EngineEvent::Summary {
            summary,
            duration_ms,
        } => {
            info!(action = %action, duration_ms, "Summary: {}", summary);
        }
        EngineEvent::Error { message } => {
            error!(action = %action, error = %message, "Operation failed");
        }
        EngineEvent::Cancel => {
            warn!(action = %action, "Operation cancelled");
        }
        #[allow(unreachable_patterns)]
        _ => return false,
    }
    true
}

/// Spawned consumer of one engine event stream
pub struct EventWatcher {
    sender: EventSender,
    stop: watch::Sender<bool>,
    handle: JoinHandle<usize>,
}

impl EventWatcher {
    pub fn spawn(action: Action) -> Self {
        let (sender, mut receiver) = channel();
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut processed = 0;
            loop {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Some(event) => {
                            if process_event(action, &event) {
                                processed += 1;
                            }
                        }
                        None => break,
                    },
                    _ = stopped.changed() => {
                        receiver.close();
                        while let Ok(event) = receiver.try_recv() {
                            if process_event(action, &event) {
                                processed += 1;
                            }
                        }
                        break;
                    }
                }
            }
            debug!(action = %action, processed, "Event watcher stopped");
            processed
        });

        Self {
            sender,
            stop,
            handle,
        }
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Engine options streaming into this watcher
    pub fn options(&self) -> OperationOptions {
        OperationOptions::default().with_events(self.sender())
    }

    /// Stops the watcher after draining queued events; returns how many were processed
    pub async fn stop(self) -> usize {
        let _ = self.stop.send(true);
        drop(self.sender);
        self.handle.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ChangeSummary, OpType};
    use crate::engine::plan::DiffKind;

    #[test]
    fn test_action_names() {
        assert_eq!(Action::Init.to_string(), "init");
        assert_eq!(Action::Deploy.to_string(), "deploy");
    }

    #[test]
    fn test_diff_summary() {
        let diffs = vec![
            PropertyDiff {
                path: "location".to_string(),
                kind: DiffKind::Update,
            },
            PropertyDiff {
                path: "labels.env".to_string(),
                kind: DiffKind::Add,
            },
        ];
        assert_eq!(diff_summary(&diffs), "location:update, labels.env:add");
        assert_eq!(diff_summary(&[]), "");
    }

    #[tokio::test]
    async fn test_watcher_drains_queued_events() {
        let watcher = EventWatcher::spawn(Action::Provision);
        let sender = watcher.sender();
        sender
            .send(EngineEvent::ResourcePre {
                urn: "urn:sc:infra::gcp:storage:Bucket::assets".to_string(),
                kind: "gcp:storage:Bucket".to_string(),
                op: OpType::Create,
                diffs: vec![],
                planning: false,
            })
            .unwrap();
        sender
            .send(EngineEvent::Summary {
                summary: ChangeSummary::default(),
                duration_ms: 3,
            })
            .unwrap();
        sender.send(EngineEvent::Cancel).unwrap();
        drop(sender);

        assert_eq!(watcher.stop().await, 3);
    }

    #[test]
    fn test_error_event_is_processed() {
        let event = EngineEvent::Error {
            message: "dependency cycle between web and assets".to_string(),
        };
        assert!(process_event(Action::Deploy, &event));
    }

    #[tokio::test]
    async fn test_options_carry_sender() {
        let watcher = EventWatcher::spawn(Action::Preview);
        let options = watcher.options();
        assert!(options.events.is_some());
        assert!(options.targets.is_none());
        drop(options);
        assert_eq!(watcher.stop().await, 0);
    }
}
