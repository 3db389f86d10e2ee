use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canvas position of a node. Layout only; irrelevant to execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A unit of work in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique within a graph.
    pub id: String,
    /// Key into the node registry.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    /// Configuration key→value mapping, merged over the type's defaults.
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, data: Value) -> Self {
        WorkflowNode {
            id: id.into(),
            node_type: node_type.into(),
            position: Position::default(),
            data,
        }
    }

    /// Read a boolean flag from the node's configuration.
    pub fn data_flag(&self, key: &str) -> bool {
        self.data
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A directed data-flow connection between two nodes' slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    /// Which output slot of the source this edge reads; branch nodes use
    /// `"true"` / `"false"` handles to mark their arms.
    #[serde(default, rename = "sourceHandle")]
    pub source_handle: Option<String>,
    /// Which input slot of the target this edge feeds.
    #[serde(default, rename = "targetHandle")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Edge {
            id: format!("{}->{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_deserializes_with_defaults() {
        let node: WorkflowNode =
            serde_json::from_value(json!({ "id": "n1", "type": "timer" })).unwrap();
        assert_eq!(node.id, "n1");
        assert_eq!(node.node_type, "timer");
        assert!(node.data.is_object());
        assert_eq!(node.position, Position::default());
    }

    #[test]
    fn edge_builder_and_handles() {
        let edge = Edge::new("a", "b").with_source_handle("true");
        assert_eq!(edge.id, "a->b");
        assert_eq!(edge.source_handle.as_deref(), Some("true"));
        assert!(edge.target_handle.is_none());
    }

    #[test]
    fn edge_deserializes_camel_case_handles() {
        let edge: Edge = serde_json::from_value(json!({
            "source": "if1",
            "target": "end",
            "sourceHandle": "false",
            "targetHandle": "input"
        }))
        .unwrap();
        assert_eq!(edge.source_handle.as_deref(), Some("false"));
        assert_eq!(edge.target_handle.as_deref(), Some("input"));
    }

    #[test]
    fn data_flag() {
        let node = WorkflowNode::new("n", "http-request", json!({ "continue_on_error": true }));
        assert!(node.data_flag("continue_on_error"));
        assert!(!node.data_flag("missing"));
    }
}
