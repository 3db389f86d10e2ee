//! Variable and output nodes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{node_config, InputSlot, NodeDefinition, NodeExecutor, NodeRunResult};
use crate::core::context::ExecutionContext;
use crate::core::events::LogLevel;
use crate::error::NodeError;
use crate::graph::WorkflowNode;

#[derive(Debug, Deserialize)]
struct VariableNodeConfig {
    key: String,
    #[serde(default)]
    value: Option<Value>,
}

/// Writes a named key into the run's variable store.
///
/// The incoming `input` value wins over the configured literal.
pub struct VariableNodeExecutor;

#[async_trait]
impl NodeExecutor for VariableNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "variable".into(),
            icon: "database".into(),
            category: "data".into(),
            inputs: vec![InputSlot::optional("input")],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({ "key": "", "value": null }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let config: VariableNodeConfig = node_config(node, &self.definition().default_data)?;
        if config.key.is_empty() {
            return Err(NodeError::Config("variable node requires a key".into()));
        }
        let value = inputs
            .get("input")
            .cloned()
            .or(config.value)
            .unwrap_or(Value::Null);
        ctx.set_variable(config.key.clone(), value.clone());
        ctx.add_log(
            LogLevel::Debug,
            format!("set variable '{}'", config.key),
            Some(&node.id),
            None,
        );
        Ok(NodeRunResult::value(value))
    }
}

#[derive(Debug, Deserialize)]
struct OutputNodeConfig {
    #[serde(default)]
    name: Option<String>,
}

/// Terminal node collecting a value into the run's outputs.
///
/// The engine reads [`OutputNodeExecutor::output_name`] to decide the key
/// under which the value lands in `ExecutionResult::outputs`.
pub struct OutputNodeExecutor;

impl OutputNodeExecutor {
    /// The run-output key for an output node: its configured name, falling
    /// back to the node id.
    pub fn output_name(node: &WorkflowNode) -> String {
        node.data
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| node.id.clone())
    }
}

#[async_trait]
impl NodeExecutor for OutputNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "output".into(),
            icon: "flag".into(),
            category: "data".into(),
            inputs: vec![InputSlot::required("input")],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({ "name": null }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let _config: OutputNodeConfig = node_config(node, &self.definition().default_data)?;
        let value = inputs
            .get("input")
            .cloned()
            .ok_or_else(|| NodeError::MissingInput {
                slot: "input".into(),
            })?;
        Ok(NodeRunResult::value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn variable_node_prefers_input_over_literal() {
        let node = WorkflowNode::new("v1", "variable", json!({ "key": "count", "value": 1 }));
        let mut ctx = ExecutionContext::new();
        let mut inputs = HashMap::new();
        inputs.insert("input".to_string(), json!(7));
        VariableNodeExecutor
            .execute(&node, &inputs, &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.get_variable("count"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn variable_node_uses_literal_without_input() {
        let node = WorkflowNode::new("v1", "variable", json!({ "key": "mode", "value": "fast" }));
        let mut ctx = ExecutionContext::new();
        VariableNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.get_variable("mode"), Some(&json!("fast")));
    }

    #[tokio::test]
    async fn variable_node_requires_key() {
        let node = WorkflowNode::new("v1", "variable", json!({}));
        let mut ctx = ExecutionContext::new();
        let err = VariableNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[tokio::test]
    async fn output_node_passes_value_through() {
        let node = WorkflowNode::new("out1", "output", json!({ "name": "result" }));
        let mut ctx = ExecutionContext::new();
        let mut inputs = HashMap::new();
        inputs.insert("input".to_string(), json!({ "ok": true }));
        let result = OutputNodeExecutor
            .execute(&node, &inputs, &mut ctx)
            .await
            .unwrap();
        assert_eq!(
            result.outputs[super::super::DEFAULT_OUTPUT_SLOT],
            json!({ "ok": true })
        );
        assert_eq!(OutputNodeExecutor::output_name(&node), "result");
    }

    #[test]
    fn output_name_falls_back_to_node_id() {
        let node = WorkflowNode::new("out1", "output", json!({}));
        assert_eq!(OutputNodeExecutor::output_name(&node), "out1");
    }
}
