use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info_span, warn};

use super::progress::{ProgressEvent, ProgressReporter};
use super::snapshot::{RunSnapshot, SnapshotStore};
use super::{GraphError, GraphState, Node, Router};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Node(String),
    End,
}

pub(crate) enum Edge<S> {
    Direct(Target),
    Conditional {
        router: Arc<dyn Router<S>>,
        routes: HashMap<&'static str, Target>,
    },
}

/// A validated graph, ready to run.
///
/// Runs of the same compiled graph may execute concurrently on different
/// threads; each run is sequential and owns its state.
pub struct CompiledGraph<S> {
    name: String,
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry: String,
    max_steps: usize,
    snapshots: SnapshotStore<S>,
}

impl<S> fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &nodes)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

impl<S: GraphState> CompiledGraph<S> {
    pub(crate) fn new(
        name: String,
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        edges: HashMap<String, Edge<S>>,
        entry: String,
        max_steps: usize,
    ) -> Self {
        Self {
            name,
            nodes,
            edges,
            entry,
            max_steps,
            snapshots: SnapshotStore::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn snapshots(&self) -> &SnapshotStore<S> {
        &self.snapshots
    }

    /// Latest snapshot of a run, during or after execution.
    pub fn get_state(&self, run_id: &str) -> Option<RunSnapshot<S>> {
        self.snapshots.get(run_id)
    }

    /// Resolves where to go after `node`. `None` ends the run.
    fn next_node(&self, node: &str, state: &S) -> Result<Option<String>, GraphError> {
        let target = match self.edges.get(node) {
            None => return Ok(None),
            Some(Edge::Direct(target)) => target,
            Some(Edge::Conditional { router, routes }) => {
                let route = router.route(state);
                routes.get(route).ok_or_else(|| GraphError::UnknownRoute {
                    graph: self.name.clone(),
                    node: node.to_string(),
                    route: route.to_string(),
                })?
            }
        };
        Ok(match target {
            Target::Node(name) => Some(name.clone()),
            Target::End => None,
        })
    }

    /// Executes a run from the entry node to the end.
    ///
    /// Node failures are recorded into the state and do not stop the run.
    /// Only graph errors (unknown route, step limit) abort it.
    pub fn invoke(
        &self,
        run_id: &str,
        initial: S,
        progress: &dyn ProgressReporter,
    ) -> Result<S, GraphError> {
        let _run_span = info_span!("graph_run", graph = %self.name, run_id = %run_id).entered();
        let started = Instant::now();

        self.snapshots
            .begin(run_id, &self.name, initial.clone(), &self.entry);

        let mut state = initial;
        let mut current = Some(self.entry.clone());
        let mut steps = 0usize;

        while let Some(node_name) = current {
            steps += 1;
            if steps > self.max_steps {
                let err = GraphError::StepLimitExceeded {
                    graph: self.name.clone(),
                    run_id: run_id.to_string(),
                    max_steps: self.max_steps,
                };
                return Err(self.abort(run_id, err, progress));
            }

            let Some(node) = self.nodes.get(&node_name) else {
                let err = GraphError::UnknownNode {
                    graph: self.name.clone(),
                    node: node_name,
                };
                return Err(self.abort(run_id, err, progress));
            };

            progress.report(ProgressEvent::NodeStarted {
                node: node_name.clone(),
            });

            let node_error = {
                let _node_span = info_span!("node", node = %node_name).entered();
                let node_started = Instant::now();
                let (next_state, node_error) = match node.run(&state) {
                    Ok(next) => (next, None),
                    Err(error) => {
                        if error.is_not_implemented() {
                            warn!(node = %node_name, "Step not implemented: {}", error);
                        } else {
                            warn!(node = %node_name, "Step failed: {}", error);
                        }
                        let message = error.to_string();
                        let mut failed = state.clone();
                        failed.record_failure(&node_name, error);
                        (failed, Some(message))
                    }
                };
                state = next_state;
                debug!(
                    node = %node_name,
                    elapsed_ms = node_started.elapsed().as_millis() as u64,
                    "Node finished"
                );
                node_error
            };

            let next = match self.next_node(&node_name, &state) {
                Ok(next) => next,
                Err(err) => return Err(self.abort(run_id, err, progress)),
            };

            self.snapshots
                .advance(run_id, &node_name, state.clone(), next.as_deref());
            progress.report(ProgressEvent::NodeFinished {
                node: node_name,
                error: node_error,
            });

            current = next;
        }

        let message = match state.failure() {
            Some(failure) => format!("Run finished with failure: {}", failure),
            None => "Run finished".to_string(),
        };
        debug!(
            steps,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "{}",
            message
        );
        progress.report(ProgressEvent::Finished { message });

        Ok(state)
    }

    fn abort(
        &self,
        run_id: &str,
        err: GraphError,
        progress: &dyn ProgressReporter,
    ) -> GraphError {
        tracing::error!("Run aborted: {}", err);
        self.snapshots.abort(run_id, &err.to_string());
        progress.report(ProgressEvent::Aborted {
            error: err.to_string(),
        });
        err
    }
}
