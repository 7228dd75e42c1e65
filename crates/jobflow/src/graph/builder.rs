use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::runner::{CompiledGraph, Edge, Target};
use super::{GraphError, GraphState, Node, Router, DEFAULT_MAX_STEPS, END};

enum EdgeSpec<S> {
    Direct(String),
    Conditional {
        router: Arc<dyn Router<S>>,
        routes: Vec<(&'static str, String)>,
    },
}

/// Collects nodes and edges, then validates them in [`compile`](Self::compile).
///
/// Builder calls never fail; the first recorded problem is reported by
/// `compile` instead.
pub struct GraphBuilder<S> {
    name: String,
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    order: Vec<String>,
    edges: Vec<(String, EdgeSpec<S>)>,
    entry: Option<String>,
    max_steps: usize,
    errors: Vec<GraphError>,
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            entry: None,
            max_steps: DEFAULT_MAX_STEPS,
            errors: Vec::new(),
        }
    }

    pub fn add_node<N>(mut self, name: &str, node: N) -> Self
    where
        N: Node<S> + 'static,
    {
        if self.nodes.contains_key(name) || name == END {
            self.errors.push(GraphError::DuplicateNode {
                graph: self.name.clone(),
                node: name.to_string(),
            });
        } else {
            self.nodes.insert(name.to_string(), Arc::new(node));
            self.order.push(name.to_string());
        }
        self
    }

    /// Unconditional edge. Use [`END`] as `to` to terminate.
    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        self.edges
            .push((from.to_string(), EdgeSpec::Direct(to.to_string())));
        self
    }

    /// Conditional edge: the router's key is looked up in `routes`.
    pub fn add_conditional_edges<R, I>(mut self, from: &str, router: R, routes: I) -> Self
    where
        R: Router<S> + 'static,
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let routes = routes
            .into_iter()
            .map(|(key, target)| (key, target.to_string()))
            .collect();
        self.edges.push((
            from.to_string(),
            EdgeSpec::Conditional {
                router: Arc::new(router),
                routes,
            },
        ));
        self
    }

    pub fn set_entry(mut self, node: &str) -> Self {
        self.entry = Some(node.to_string());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn target(&self, name: &str) -> Result<Target, GraphError> {
        if name == END {
            Ok(Target::End)
        } else if self.nodes.contains_key(name) {
            Ok(Target::Node(name.to_string()))
        } else {
            Err(GraphError::UnknownNode {
                graph: self.name.clone(),
                node: name.to_string(),
            })
        }
    }

    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }
        if self.nodes.is_empty() {
            return Err(GraphError::Empty { graph: self.name });
        }
        let entry = match &self.entry {
            Some(entry) => entry.clone(),
            None => {
                return Err(GraphError::MissingEntry { graph: self.name });
            }
        };
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode {
                graph: self.name,
                node: entry,
            });
        }

        let mut seen = HashSet::new();
        let mut edges = HashMap::new();
        for (from, spec) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode {
                    graph: self.name.clone(),
                    node: from.clone(),
                });
            }
            if !seen.insert(from.clone()) {
                return Err(GraphError::DuplicateEdge {
                    graph: self.name.clone(),
                    node: from.clone(),
                });
            }
            let edge = match spec {
                EdgeSpec::Direct(to) => Edge::Direct(self.target(to)?),
                EdgeSpec::Conditional { router, routes } => {
                    let mut resolved = HashMap::new();
                    for (key, to) in routes {
                        resolved.insert(*key, self.target(to)?);
                    }
                    Edge::Conditional {
                        router: Arc::clone(router),
                        routes: resolved,
                    }
                }
            };
            edges.insert(from.clone(), edge);
        }

        log::debug!(
            "Compiled graph '{}' with nodes [{}]",
            self.name,
            self.order.join(", ")
        );

        Ok(CompiledGraph::new(
            self.name,
            self.nodes,
            edges,
            entry,
            self.max_steps,
        ))
    }
}
