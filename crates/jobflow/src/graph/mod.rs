//! Step graph engine.
//!
//! A graph is a set of named nodes joined by edges. Each node maps the
//! run-state to a new run-state or fails with a [`NodeError`]; the engine
//! folds failures into the state through [`GraphState::record_failure`] and
//! keeps going along the outgoing edge, so a run always reaches an end.
//! Conditional edges ask a router for a route key and look it up in a fixed
//! route map. Every run is tracked in a [`SnapshotStore`] under its run id.

pub mod builder;
pub mod error;
pub mod progress;
pub mod runner;
pub mod snapshot;

pub use builder::GraphBuilder;
pub use error::{CollaboratorError, GraphError, NodeError};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::CompiledGraph;
pub use snapshot::{RunSnapshot, SnapshotStore};

/// Pseudo-node that terminates a run.
pub const END: &str = "__end__";

/// Default guard against routing cycles.
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Run-state threaded through a graph.
pub trait GraphState: Clone + Send + Sync + 'static {
    /// The failure recorded so far in this run, if any.
    fn failure(&self) -> Option<&NodeError>;

    /// Folds a node failure into the state.
    fn record_failure(&mut self, node: &str, error: NodeError);
}

/// A named step. Takes the current state and returns the next one.
pub trait Node<S>: Send + Sync {
    fn run(&self, state: &S) -> Result<S, NodeError>;
}

impl<S, F> Node<S> for F
where
    F: Fn(&S) -> Result<S, NodeError> + Send + Sync,
{
    fn run(&self, state: &S) -> Result<S, NodeError> {
        self(state)
    }
}

/// Chooses a route key from the state after a node has run.
pub trait Router<S>: Send + Sync {
    fn route(&self, state: &S) -> &'static str;
}

impl<S, F> Router<S> for F
where
    F: Fn(&S) -> &'static str + Send + Sync,
{
    fn route(&self, state: &S) -> &'static str {
        self(state)
    }
}
