use crate::broadcast::run_progress::RunProgressTracker;

/// Events emitted by the graph runner while a run executes.
pub enum ProgressEvent {
    NodeStarted { node: String },
    NodeFinished { node: String, error: Option<String> },
    Finished { message: String },
    Aborted { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Reporter that drops every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges runner events onto the run progress broadcast channel.
pub struct BroadcastProgress {
    tracker: RunProgressTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: RunProgressTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::NodeStarted { node } => self.tracker.node_started(&node),
            ProgressEvent::NodeFinished { node, error } => {
                self.tracker.node_finished(&node, error.as_deref())
            }
            ProgressEvent::Finished { message } => self.tracker.completed(&message),
            ProgressEvent::Aborted { error } => self.tracker.failed(&error),
        }
    }
}
