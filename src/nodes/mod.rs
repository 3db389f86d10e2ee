//! Node registry and built-in node executors.
//!
//! Each node type provides a [`NodeDefinition`] (declared slots, defaults,
//! palette metadata) and an async [`NodeExecutor::execute`]. The engine
//! looks executors up by type name in the [`NodeRegistry`] — a closed
//! dispatch table, no reflection.

pub mod basic;
pub mod code;
pub mod control_flow;
pub mod http;
pub mod llm;
pub mod registry;
pub mod timer;
pub mod transform;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::WorkflowNode;

pub use registry::{NodeRegistry, DEFAULT_OUTPUT_SLOT};

/// One declared input slot of a node type.
#[derive(Debug, Clone)]
pub struct InputSlot {
    pub name: String,
    pub required: bool,
}

impl InputSlot {
    pub fn required(name: impl Into<String>) -> Self {
        InputSlot {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        InputSlot {
            name: name.into(),
            required: false,
        }
    }
}

/// Immutable registry entry describing a node type.
#[derive(Debug, Clone)]
pub struct NodeDefinition {
    pub name: String,
    pub icon: String,
    pub category: String,
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<String>,
    pub default_data: Value,
}

/// What a node's execute operation produced.
#[derive(Debug, Clone, Default)]
pub struct NodeRunResult {
    /// Output slot → value.
    pub outputs: HashMap<String, Value>,
    /// For branch nodes: the source handle whose outgoing edges are live.
    pub branch: Option<String>,
}

impl NodeRunResult {
    /// A result carrying one value on the default output slot.
    pub fn value(value: Value) -> Self {
        let mut outputs = HashMap::new();
        outputs.insert(DEFAULT_OUTPUT_SLOT.to_string(), value);
        NodeRunResult {
            outputs,
            branch: None,
        }
    }

    pub fn branch(handle: impl Into<String>, value: Value) -> Self {
        let mut result = NodeRunResult::value(value);
        result.branch = Some(handle.into());
        result
    }
}

/// Trait for node execution. Each node type implements this once and is
/// registered under its type name.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn definition(&self) -> NodeDefinition;

    /// Execute the node against its resolved inputs. `ctx` is the run's
    /// shared context: variables, logs, and the abort signal.
    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError>;
}

/// Merge a node's data over its type defaults and deserialize the result.
pub(crate) fn node_config<T: serde::de::DeserializeOwned>(
    node: &WorkflowNode,
    defaults: &Value,
) -> Result<T, NodeError> {
    let mut merged = defaults.clone();
    if let (Value::Object(base), Value::Object(overlay)) = (&mut merged, &node.data) {
        for (k, v) in overlay {
            base.insert(k.clone(), v.clone());
        }
    } else if !node.data.is_null() {
        merged = node.data.clone();
    }
    serde_json::from_value(merged)
        .map_err(|e| NodeError::Config(format!("invalid {} config: {}", node.node_type, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Debug)]
    struct DemoConfig {
        url: String,
        method: String,
    }

    #[test]
    fn node_config_merges_defaults() {
        let node = WorkflowNode::new("n", "http-request", json!({ "url": "http://x" }));
        let defaults = json!({ "url": "", "method": "GET" });
        let config: DemoConfig = node_config(&node, &defaults).unwrap();
        assert_eq!(config.url, "http://x");
        assert_eq!(config.method, "GET");
    }

    #[test]
    fn node_config_reports_type() {
        let node = WorkflowNode::new("n", "http-request", json!({ "url": 5 }));
        let defaults = json!({ "method": "GET" });
        let err = node_config::<DemoConfig>(&node, &defaults).unwrap_err();
        assert!(err.to_string().contains("http-request"));
    }

    #[test]
    fn run_result_helpers() {
        let r = NodeRunResult::value(json!(1));
        assert_eq!(r.outputs[DEFAULT_OUTPUT_SLOT], json!(1));
        assert!(r.branch.is_none());
        let b = NodeRunResult::branch("true", json!(true));
        assert_eq!(b.branch.as_deref(), Some("true"));
    }
}
