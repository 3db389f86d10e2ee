use std::collections::HashMap;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde_json::Value;

use super::types::{Edge, WorkflowNode};
use crate::error::{WorkflowError, WorkflowResult};

/// Mutable node/edge graph with a string-id index.
///
/// Node iteration order is insertion order, which makes every traversal in
/// [`topological_order`](Graph::topological_order) deterministic.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) inner: StableDiGraph<WorkflowNode, Edge>,
    pub(crate) index: HashMap<String, NodeIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Build a graph from parts, validating edge endpoints.
    pub fn from_parts(nodes: Vec<WorkflowNode>, edges: Vec<Edge>) -> WorkflowResult<Self> {
        let mut graph = Graph::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.index
            .get(node_id)
            .and_then(|idx| self.inner.node_weight(*idx))
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> Vec<String> {
        self.inner
            .node_indices()
            .filter_map(|idx| self.inner.node_weight(idx).map(|n| n.id.clone()))
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.inner.node_indices().filter_map(|idx| self.inner.node_weight(idx))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.inner.edge_indices().filter_map(|idx| self.inner.edge_weight(idx))
    }

    /// Add a node. Duplicate ids are a validation error.
    pub fn add_node(&mut self, node: WorkflowNode) -> WorkflowResult<()> {
        if self.index.contains_key(&node.id) {
            return Err(WorkflowError::Validation(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.index.insert(id, idx);
        Ok(())
    }

    /// Merge a configuration patch over an existing node's data.
    ///
    /// Object keys in `patch` overwrite keys in the node's current data;
    /// a non-object patch replaces the data wholesale.
    pub fn update_node_data(&mut self, node_id: &str, patch: Value) -> WorkflowResult<()> {
        let idx = self.require(node_id)?;
        let node = self
            .inner
            .node_weight_mut(idx)
            .ok_or_else(|| WorkflowError::Internal(format!("missing weight for '{}'", node_id)))?;
        match (&mut node.data, patch) {
            (Value::Object(current), Value::Object(patch)) => {
                for (k, v) in patch {
                    current.insert(k, v);
                }
            }
            (data, patch) => *data = patch,
        }
        Ok(())
    }

    /// Remove a node; incident edges are removed with it.
    pub fn remove_node(&mut self, node_id: &str) -> WorkflowResult<()> {
        let idx = self.require(node_id)?;
        self.inner.remove_node(idx);
        self.index.remove(node_id);
        Ok(())
    }

    /// Add an edge. Both endpoints must reference existing nodes.
    pub fn add_edge(&mut self, mut edge: Edge) -> WorkflowResult<()> {
        let source = *self.index.get(&edge.source).ok_or_else(|| {
            WorkflowError::Validation(format!("edge source '{}' does not exist", edge.source))
        })?;
        let target = *self.index.get(&edge.target).ok_or_else(|| {
            WorkflowError::Validation(format!("edge target '{}' does not exist", edge.target))
        })?;
        if edge.id.is_empty() {
            edge.id = format!("{}->{}", edge.source, edge.target);
        }
        if self.edges().any(|e| e.id == edge.id) {
            return Err(WorkflowError::Validation(format!(
                "duplicate edge id '{}'",
                edge.id
            )));
        }
        self.inner.add_edge(source, target, edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> WorkflowResult<()> {
        let found = self
            .inner
            .edge_indices()
            .find(|idx| self.inner.edge_weight(*idx).map(|e| e.id == edge_id) == Some(true));
        match found {
            Some(idx) => {
                self.inner.remove_edge(idx);
                Ok(())
            }
            None => Err(WorkflowError::Validation(format!(
                "edge '{}' does not exist",
                edge_id
            ))),
        }
    }

    /// Incoming edges of a node, in edge insertion order.
    pub fn incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges_directed(node_id, Direction::Incoming)
    }

    /// Outgoing edges of a node, in edge insertion order.
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges_directed(node_id, Direction::Outgoing)
    }

    fn edges_directed(&self, node_id: &str, dir: Direction) -> Vec<&Edge> {
        let Some(idx) = self.index.get(node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<(EdgeIndex, &Edge)> = self
            .inner
            .edges_directed(*idx, dir)
            .map(|e| (e.id(), e.weight()))
            .collect();
        // petgraph yields adjacency in reverse insertion order; normalize.
        edges.sort_by_key(|(idx, _)| idx.index());
        edges.into_iter().map(|(_, e)| e).collect()
    }

    /// Node ids with no outgoing edges, in insertion order.
    pub fn terminal_node_ids(&self) -> Vec<String> {
        self.inner
            .node_indices()
            .filter(|idx| {
                self.inner
                    .edges_directed(*idx, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.inner.node_weight(idx).map(|n| n.id.clone()))
            .collect()
    }

    pub(crate) fn require(&self, node_id: &str) -> WorkflowResult<NodeIndex> {
        self.index
            .get(node_id)
            .copied()
            .ok_or_else(|| WorkflowError::Validation(format!("node '{}' does not exist", node_id)))
    }
}
