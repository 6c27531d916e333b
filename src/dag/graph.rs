// src/dag/graph.rs

use std::collections::HashSet;
use std::fmt;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;

use crate::dag::task::{AsyncTask, CancelToken};
use crate::errors::{HabitatError, Result};

/// Opaque handle to a task inside a [`TaskGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NodeIndex);

impl TaskId {
    pub(crate) fn index(self) -> usize {
        self.0.index()
    }

    pub(crate) fn from_index(index: usize) -> Self {
        TaskId(NodeIndex::new(index))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0.index())
    }
}

/// A directed acyclic graph of [`AsyncTask`]s.
///
/// Edge direction: dependency -> dependent. For "build after checkout" we
/// add the edge `checkout -> build`.
///
/// The graph is built up front and then handed to the executor by value, so
/// edges cannot change once a batch is running.
pub struct TaskGraph<V> {
    graph: DiGraph<AsyncTask<V>, ()>,
}

impl<V> fmt::Debug for TaskGraph<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

impl<V> Default for TaskGraph<V> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
        }
    }
}

impl<V> TaskGraph<V>
where
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: AsyncTask<V>) -> TaskId {
        TaskId(self.graph.add_node(task))
    }

    /// Record that `task` may only start after `on` has finished.
    ///
    /// Self-dependencies are rejected here; longer cycles are rejected by
    /// [`TaskGraph::validate`] when the graph is submitted.
    pub fn add_dependency(&mut self, task: TaskId, on: TaskId) -> Result<()> {
        self.ensure_known(task)?;
        self.ensure_known(on)?;
        if task == on {
            return Err(HabitatError::DagCycle(format!(
                "task '{}' cannot depend on itself",
                self.graph[task.0].label()
            )));
        }
        self.graph.update_edge(on.0, task.0, ());
        Ok(())
    }

    fn ensure_known(&self, id: TaskId) -> Result<()> {
        if self.graph.node_weight(id.0).is_some() {
            Ok(())
        } else {
            Err(HabitatError::TaskNotFound(id.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn task(&self, id: TaskId) -> Option<&AsyncTask<V>> {
        self.graph.node_weight(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.graph.node_indices().map(TaskId)
    }

    /// Immediate dependencies of `id`, in ascending id order.
    pub fn dependencies_of(&self, id: TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Immediate dependents of `id`, in ascending id order.
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        self.neighbours(id, Direction::Outgoing)
    }

    fn neighbours(&self, id: TaskId, dir: Direction) -> Vec<TaskId> {
        let mut out: Vec<TaskId> = self
            .graph
            .neighbors_directed(id.0, dir)
            .map(TaskId)
            .collect();
        out.sort();
        out
    }

    pub fn cancel_tokens(&self) -> Vec<CancelToken> {
        self.graph
            .node_weights()
            .map(AsyncTask::cancel_token)
            .collect()
    }

    /// Fail if the graph contains a cycle (which would never finish).
    pub fn validate(&self) -> Result<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(HabitatError::DagCycle(format!(
                "cycle detected in task graph involving task '{}'",
                self.graph[cycle.node_id()].label()
            ))),
        }
    }

    /// `roots` plus every task they transitively depend on.
    pub fn reachable_from(&self, roots: &[TaskId]) -> Result<HashSet<TaskId>> {
        let reversed = Reversed(&self.graph);
        let mut seen = HashSet::new();

        for &root in roots {
            self.ensure_known(root)?;
            let mut dfs = Dfs::new(reversed, root.0);
            while let Some(node) = dfs.next(reversed) {
                seen.insert(TaskId(node));
            }
        }

        Ok(seen)
    }

    /// Split the graph into its tasks (indexed by [`TaskId::index`]) and the
    /// dependency list of each task.
    pub(crate) fn into_parts(self) -> (Vec<AsyncTask<V>>, Vec<Vec<TaskId>>) {
        let deps: Vec<Vec<TaskId>> = self.ids().map(|id| self.dependencies_of(id)).collect();
        let (nodes, _edges) = self.graph.into_nodes_edges();
        let tasks = nodes.into_iter().map(|n| n.weight).collect();
        (tasks, deps)
    }
}
