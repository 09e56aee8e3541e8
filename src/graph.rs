//! The graph of operations: an arena of typed nodes plus directed edges.
//!
//! Nodes are addressed by [`OperationId`], which is the node's insertion
//! index. The graph owns every thought produced during a run, so after
//! [`Controller::run`](crate::controller::Controller::run) returns the
//! intermediate sets of every node remain queryable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use uuid::Uuid;

use crate::backend::UsageSnapshot;
use crate::error::{GraphError, GraphResult};
use crate::operations::{Operation, OperationKind};
use crate::thought::Thought;

/// Identifier of an operation node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct OperationId(usize);

impl OperationId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Insertion index of the node.
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Execution state of a node within the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Waiting on predecessors.
    Pending,
    /// All predecessors done; inputs are available.
    Ready,
    /// Backend calls in flight.
    Running,
    /// Produced thoughts are final.
    Done,
}

#[derive(Debug)]
struct Node {
    operation: Operation,
    predecessors: Vec<OperationId>,
    successors: Vec<OperationId>,
    status: NodeStatus,
    thoughts: Vec<Thought>,
}

/// Metadata of the most recent run over a graph.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

/// Serializable record of a graph and everything it produced.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunInfo>,
    pub operations: Vec<OperationSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    pub id: OperationId,
    pub kind: OperationKind,
    pub parameters: String,
    pub status: NodeStatus,
    pub predecessors: Vec<OperationId>,
    pub successors: Vec<OperationId>,
    pub thoughts: Vec<Thought>,
}

/// A directed acyclic graph of operations.
#[derive(Debug, Default)]
pub struct GraphOfOperations {
    nodes: Vec<Node>,
    run: Option<RunInfo>,
}

impl GraphOfOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id.
    pub fn add_operation(&mut self, operation: impl Into<Operation>) -> OperationId {
        let id = OperationId(self.nodes.len());
        self.nodes.push(Node {
            operation: operation.into(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            status: NodeStatus::Pending,
            thoughts: Vec::new(),
        });
        id
    }

    /// Wire `to` as a successor of `from`.
    pub fn add_edge(&mut self, from: OperationId, to: OperationId) -> GraphResult<()> {
        self.check_known(from)?;
        self.check_known(to)?;
        if from == to {
            return Err(GraphError::SelfLoop { id: from });
        }
        if self.nodes[from.0].successors.contains(&to) {
            return Err(GraphError::DuplicateEdge { from, to });
        }

        self.nodes[from.0].successors.push(to);
        self.nodes[to.0].predecessors.push(from);
        Ok(())
    }

    /// Add `operation` and wire it after `from`.
    pub fn add_successor(
        &mut self,
        from: OperationId,
        operation: impl Into<Operation>,
    ) -> GraphResult<OperationId> {
        self.check_known(from)?;
        let id = self.add_operation(operation);
        self.add_edge(from, id)?;
        Ok(id)
    }

    fn check_known(&self, id: OperationId) -> GraphResult<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownOperation { id })
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = OperationId> + '_ {
        (0..self.nodes.len()).map(OperationId)
    }

    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.nodes.get(id.0).map(|n| &n.operation)
    }

    pub fn predecessors(&self, id: OperationId) -> &[OperationId] {
        self.nodes
            .get(id.0)
            .map(|n| n.predecessors.as_slice())
            .unwrap_or_default()
    }

    pub fn successors(&self, id: OperationId) -> &[OperationId] {
        self.nodes
            .get(id.0)
            .map(|n| n.successors.as_slice())
            .unwrap_or_default()
    }

    /// Nodes without predecessors, in insertion order.
    pub fn roots(&self) -> Vec<OperationId> {
        self.ids()
            .filter(|id| self.nodes[id.0].predecessors.is_empty())
            .collect()
    }

    /// Nodes without successors, in insertion order.
    pub fn leaves(&self) -> Vec<OperationId> {
        self.ids()
            .filter(|id| self.nodes[id.0].successors.is_empty())
            .collect()
    }

    pub fn status(&self, id: OperationId) -> Option<NodeStatus> {
        self.nodes.get(id.0).map(|n| n.status)
    }

    /// Thoughts produced by `id` in the current or last run.
    pub fn thoughts(&self, id: OperationId) -> &[Thought] {
        self.nodes
            .get(id.0)
            .map(|n| n.thoughts.as_slice())
            .unwrap_or_default()
    }

    /// Leaf thoughts concatenated in leaf insertion order.
    pub fn final_thoughts(&self) -> Vec<Thought> {
        self.leaves()
            .into_iter()
            .flat_map(|id| self.nodes[id.0].thoughts.iter().cloned())
            .collect()
    }

    /// Check structure and return the execution order.
    ///
    /// The graph must be non-empty, acyclic and weakly connected.
    pub fn validate(&self) -> GraphResult<Vec<OperationId>> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }
        let order = self.topological_order()?;

        let unreachable = self.weakly_unreachable_from(OperationId(0));
        if !unreachable.is_empty() {
            return Err(GraphError::Disconnected {
                root: OperationId(0),
                unreachable,
            });
        }

        Ok(order)
    }

    /// Kahn's algorithm; among ready nodes the lowest insertion index goes first.
    pub fn topological_order(&self) -> GraphResult<Vec<OperationId>> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.predecessors.len()).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(index) = ready.pop_first() {
            order.push(OperationId(index));
            for succ in &self.nodes[index].successors {
                in_degree[succ.0] -= 1;
                if in_degree[succ.0] == 0 {
                    ready.insert(succ.0);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let involved = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| OperationId(i))
                .collect();
            return Err(GraphError::Cycle { involved });
        }

        Ok(order)
    }

    fn weakly_unreachable_from(&self, start: OperationId) -> Vec<OperationId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([start]);
        seen[start.0] = true;

        while let Some(id) = queue.pop_front() {
            let node = &self.nodes[id.0];
            for next in node.predecessors.iter().chain(&node.successors) {
                if !seen[next.0] {
                    seen[next.0] = true;
                    queue.push_back(*next);
                }
            }
        }

        seen.iter()
            .enumerate()
            .filter(|(_, s)| !**s)
            .map(|(i, _)| OperationId(i))
            .collect()
    }

    /// Clear all node state left by a previous run.
    pub(crate) fn reset(&mut self) {
        for node in &mut self.nodes {
            node.status = NodeStatus::Pending;
            node.thoughts.clear();
        }
        self.run = None;
    }

    pub(crate) fn set_status(&mut self, id: OperationId, status: NodeStatus) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.status = status;
        }
    }

    /// Finalize a node's output.
    pub(crate) fn complete(&mut self, id: OperationId, thoughts: Vec<Thought>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.thoughts = thoughts;
            node.status = NodeStatus::Done;
        }
    }

    pub(crate) fn begin_run(&mut self, run_id: Uuid) {
        self.run = Some(RunInfo {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            usage: None,
        });
    }

    pub(crate) fn finish_run(&mut self, usage: UsageSnapshot) {
        if let Some(run) = self.run.as_mut() {
            run.finished_at = Some(Utc::now());
            run.usage = Some(usage);
        }
    }

    /// Metadata of the last run, if one has started.
    pub fn run_info(&self) -> Option<&RunInfo> {
        self.run.as_ref()
    }

    /// Serializable copy of every node and its thoughts.
    pub fn snapshot(&self) -> GraphSnapshot {
        let operations = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| OperationSnapshot {
                id: OperationId(i),
                kind: node.operation.kind(),
                parameters: node.operation.parameters(),
                status: node.status,
                predecessors: node.predecessors.clone(),
                successors: node.successors.clone(),
                thoughts: node.thoughts.clone(),
            })
            .collect();

        GraphSnapshot {
            run: self.run.clone(),
            operations,
        }
    }
}
