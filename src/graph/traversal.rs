use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::visit::EdgeRef;
use petgraph::Direction;

use super::model::Graph;
use crate::error::{WorkflowError, WorkflowResult};

impl Graph {
    /// Dependency order via Kahn's algorithm over in-degree counts.
    ///
    /// Zero in-degree nodes are seeded in insertion order and ties between
    /// simultaneously-ready nodes break the same way, so the order is stable
    /// and deterministic across runs. A cycle is fatal and names the first
    /// (by insertion order) node left unordered.
    pub fn topological_order(&self) -> WorkflowResult<Vec<String>> {
        let mut in_degree: HashMap<usize, usize> = HashMap::new();
        let mut position: Vec<usize> = Vec::new();
        for idx in self.inner.node_indices() {
            in_degree.insert(
                idx.index(),
                self.inner
                    .edges_directed(idx, Direction::Incoming)
                    .count(),
            );
            position.push(idx.index());
        }

        // Ready set kept sorted by insertion position.
        let mut ready: Vec<usize> = position
            .iter()
            .copied()
            .filter(|idx| in_degree.get(idx) == Some(&0))
            .collect();
        ready.sort_unstable();
        let mut ready: VecDeque<usize> = ready.into();

        let mut order = Vec::with_capacity(self.node_count());
        while let Some(idx) = ready.pop_front() {
            let node_idx = petgraph::stable_graph::NodeIndex::new(idx);
            if let Some(node) = self.inner.node_weight(node_idx) {
                order.push(node.id.clone());
            }
            let mut unlocked: Vec<usize> = Vec::new();
            // One decrement per edge, so parallel edges are counted correctly.
            for edge in self.inner.edges_directed(node_idx, Direction::Outgoing) {
                let neighbor = edge.target();
                let entry = in_degree.entry(neighbor.index()).or_insert(0);
                *entry = entry.saturating_sub(1);
                if *entry == 0 && !unlocked.contains(&neighbor.index()) {
                    unlocked.push(neighbor.index());
                }
            }
            unlocked.sort_unstable();
            // Merge the newly-ready nodes keeping the queue position-sorted.
            for u in unlocked {
                let at = ready.iter().position(|r| *r > u).unwrap_or(ready.len());
                if !ready.contains(&u) {
                    ready.insert(at, u);
                }
            }
        }

        if order.len() < self.node_count() {
            let on_cycle = self
                .inner
                .node_indices()
                .filter(|idx| in_degree.get(&idx.index()).copied().unwrap_or(0) > 0)
                .filter_map(|idx| self.inner.node_weight(idx).map(|n| n.id.clone()))
                .next()
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(WorkflowError::Cycle { node_id: on_cycle });
        }
        Ok(order)
    }

    /// All node ids reachable from `node_id` along edge direction,
    /// excluding the node itself.
    pub fn reachable_from(&self, node_id: &str) -> HashSet<String> {
        let mut reached = HashSet::new();
        let Some(start) = self.index.get(node_id) else {
            return reached;
        };
        let mut queue = VecDeque::from([*start]);
        while let Some(idx) = queue.pop_front() {
            for neighbor in self.inner.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(node) = self.inner.node_weight(neighbor) {
                    if reached.insert(node.id.clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        reached
    }

    /// Direct predecessors of a node, in insertion order.
    pub fn predecessors_of(&self, node_id: &str) -> Vec<String> {
        let Some(idx) = self.index.get(node_id) else {
            return Vec::new();
        };
        let mut preds: Vec<(usize, String)> = self
            .inner
            .neighbors_directed(*idx, Direction::Incoming)
            .filter_map(|n| {
                self.inner
                    .node_weight(n)
                    .map(|node| (n.index(), node.id.clone()))
            })
            .collect();
        preds.sort_by_key(|(pos, _)| *pos);
        preds.dedup_by(|a, b| a.1 == b.1);
        preds.into_iter().map(|(_, id)| id).collect()
    }
}
