//! Per-run state snapshots for polling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

/// Point-in-time view of one graph run.
#[derive(Debug, Clone)]
pub struct RunSnapshot<S> {
    pub run_id: String,
    pub graph: String,
    pub state: S,
    /// Node about to run, or running. `None` once the run is over.
    pub current_node: Option<String>,
    pub visited: Vec<String>,
    pub finished: bool,
    /// Set when the run was aborted by a graph configuration error.
    pub aborted: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shared, thread-safe map of run id to latest snapshot.
///
/// Cloning is cheap (inner `Arc`).
pub struct SnapshotStore<S> {
    runs: Arc<RwLock<HashMap<String, RunSnapshot<S>>>>,
}

impl<S> Clone for SnapshotStore<S> {
    fn clone(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
        }
    }
}

impl<S: Clone> Default for SnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone> SnapshotStore<S> {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RunSnapshot<S>>> {
        match self.runs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Snapshot store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RunSnapshot<S>>> {
        match self.runs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Snapshot store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub(crate) fn begin(&self, run_id: &str, graph: &str, state: S, entry: &str) {
        let now = Utc::now();
        self.write().insert(
            run_id.to_string(),
            RunSnapshot {
                run_id: run_id.to_string(),
                graph: graph.to_string(),
                state,
                current_node: Some(entry.to_string()),
                visited: Vec::new(),
                finished: false,
                aborted: None,
                started_at: now,
                updated_at: now,
            },
        );
    }

    /// Stores the state produced by `node` and the node that runs next.
    pub(crate) fn advance(&self, run_id: &str, node: &str, state: S, next: Option<&str>) {
        if let Some(snapshot) = self.write().get_mut(run_id) {
            snapshot.state = state;
            snapshot.visited.push(node.to_string());
            snapshot.current_node = next.map(str::to_string);
            snapshot.finished = next.is_none();
            snapshot.updated_at = Utc::now();
        }
    }

    pub(crate) fn abort(&self, run_id: &str, reason: &str) {
        if let Some(snapshot) = self.write().get_mut(run_id) {
            snapshot.current_node = None;
            snapshot.finished = true;
            snapshot.aborted = Some(reason.to_string());
            snapshot.updated_at = Utc::now();
        }
    }

    pub fn get(&self, run_id: &str) -> Option<RunSnapshot<S>> {
        self.read().get(run_id).cloned()
    }

    /// Drops one run's snapshot. Returns whether it existed.
    pub fn remove(&self, run_id: &str) -> bool {
        self.write().remove(run_id).is_some()
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.read().contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops finished runs last touched more than `max_age` ago.
    /// Returns the number removed.
    pub fn prune_finished(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut runs = self.write();
        let before = runs.len();
        runs.retain(|_, s| !(s.finished && s.updated_at < cutoff));
        before - runs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lifecycle() {
        let store: SnapshotStore<u32> = SnapshotStore::new();
        store.begin("run-1", "demo", 0, "a");

        let snap = store.get("run-1").unwrap();
        assert_eq!(snap.current_node.as_deref(), Some("a"));
        assert!(!snap.finished);

        store.advance("run-1", "a", 1, Some("b"));
        store.advance("run-1", "b", 2, None);

        let snap = store.get("run-1").unwrap();
        assert_eq!(snap.state, 2);
        assert_eq!(snap.visited, vec!["a", "b"]);
        assert!(snap.finished);
        assert!(snap.current_node.is_none());
    }

    #[test]
    fn test_unknown_run() {
        let store: SnapshotStore<u32> = SnapshotStore::new();
        assert!(store.get("missing").is_none());
        store.advance("missing", "a", 1, None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_prune_keeps_running_runs() {
        let store: SnapshotStore<u32> = SnapshotStore::new();
        store.begin("done", "demo", 0, "a");
        store.advance("done", "a", 1, None);
        store.begin("running", "demo", 0, "a");

        let removed = store.prune_finished(Duration::seconds(-1));
        assert_eq!(removed, 1);
        assert!(store.contains("running"));
        assert!(!store.contains("done"));
    }

    #[test]
    fn test_remove() {
        let store: SnapshotStore<u32> = SnapshotStore::new();
        store.begin("run-1", "demo", 0, "a");
        assert!(store.remove("run-1"));
        assert!(!store.remove("run-1"));
        assert!(store.is_empty());
    }
}
