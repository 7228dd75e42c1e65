//! Run progress broadcaster for real-time run status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What happened in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    Queued,
    NodeStarted,
    NodeFinished,
    Completed,
    Failed,
}

impl std::fmt::Display for RunEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunEventKind::Queued => write!(f, "Queued"),
            RunEventKind::NodeStarted => write!(f, "Node started"),
            RunEventKind::NodeFinished => write!(f, "Node finished"),
            RunEventKind::Completed => write!(f, "Completed"),
            RunEventKind::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for a graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgressEvent {
    pub run_id: String,
    pub job_id: String,
    /// Name of the graph driving the run.
    pub graph: String,
    pub kind: RunEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Human-readable description of the current activity.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Broadcasts run progress events for streaming.
#[derive(Clone)]
pub struct RunProgressBroadcaster {
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: RunProgressEvent) {
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one run and announces it as queued.
    pub fn start_run(&self, run_id: &str, job_id: &str, graph: &str) -> RunProgressTracker {
        let tracker = RunProgressTracker {
            run_id: run_id.to_string(),
            job_id: job_id.to_string(),
            graph: graph.to_string(),
            sender: Arc::clone(&self.sender),
        };
        tracker.emit(RunEventKind::Queued, None, "Run queued", None);
        tracker
    }
}

impl Default for RunProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single run.
pub struct RunProgressTracker {
    run_id: String,
    job_id: String,
    graph: String,
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressTracker {
    fn emit(&self, kind: RunEventKind, node: Option<&str>, message: &str, error: Option<&str>) {
        let _ = self.sender.send(RunProgressEvent {
            run_id: self.run_id.clone(),
            job_id: self.job_id.clone(),
            graph: self.graph.clone(),
            kind,
            node: node.map(str::to_string),
            message: message.to_string(),
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    pub fn node_started(&self, node: &str) {
        self.emit(
            RunEventKind::NodeStarted,
            Some(node),
            &format!("Running {}", node),
            None,
        );
    }

    pub fn node_finished(&self, node: &str, error: Option<&str>) {
        self.emit(
            RunEventKind::NodeFinished,
            Some(node),
            &format!("Finished {}", node),
            error,
        );
    }

    pub fn completed(&self, message: &str) {
        self.emit(RunEventKind::Completed, None, message, None);
    }

    pub fn failed(&self, error: &str) {
        self.emit(RunEventKind::Failed, None, "Run failed", Some(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_subscribers() {
        let broadcaster = RunProgressBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();

        let tracker = broadcaster.start_run("run-1", "job-1", "preparation");
        tracker.node_started("extract");
        tracker.failed("boom");

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.kind, RunEventKind::Queued);
        assert_eq!(queued.job_id, "job-1");

        let started = rx.try_recv().unwrap();
        assert_eq!(started.node.as_deref(), Some("extract"));

        let failed = rx.try_recv().unwrap();
        assert_eq!(failed.kind, RunEventKind::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_send_without_subscribers_is_fine() {
        let broadcaster = RunProgressBroadcaster::default();
        let tracker = broadcaster.start_run("run-1", "job-1", "retry");
        tracker.completed("done");
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = RunProgressEvent {
            run_id: "r".into(),
            job_id: "j".into(),
            graph: "retry".into(),
            kind: RunEventKind::NodeFinished,
            node: Some("compose".into()),
            message: "Finished compose".into(),
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["runId"], "r");
        assert_eq!(json["kind"], "node_finished");
        assert!(json.get("error").is_none());
    }
}
