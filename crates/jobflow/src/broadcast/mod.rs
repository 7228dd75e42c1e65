//! Broadcasting for real-time event streaming.
//!
//! Any integration (an HTTP layer, a CLI, tests) can subscribe to run
//! progress without the graphs knowing who listens.

pub mod run_progress;

pub use run_progress::{RunEventKind, RunProgressBroadcaster, RunProgressEvent, RunProgressTracker};
