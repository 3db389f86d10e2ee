//! Branch and loop nodes.
//!
//! A branch node evaluates its conditions and names the live source handle;
//! the engine kills the other arm. A loop node owns a body subgraph in its
//! configuration which the engine re-enters while the condition holds —
//! loops are bounded sub-regions, never cycles in the outer graph.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{node_config, InputSlot, NodeDefinition, NodeExecutor, NodeRunResult};
use crate::core::context::ExecutionContext;
use crate::core::events::LogLevel;
use crate::error::NodeError;
use crate::evaluator::{evaluate_conditions, Condition, LogicalOperator};
use crate::graph::{Edge, WorkflowNode};

/// Handle taken when a branch evaluates to true.
pub const BRANCH_TRUE: &str = "true";
/// Handle taken when a branch evaluates to false.
pub const BRANCH_FALSE: &str = "false";

#[derive(Debug, Deserialize)]
struct BranchNodeConfig {
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default)]
    logical_operator: LogicalOperator,
}

/// Conditional node: decides which outgoing edges are live for this run.
pub struct BranchNodeExecutor;

#[async_trait]
impl NodeExecutor for BranchNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "branch".into(),
            icon: "git-branch".into(),
            category: "logic".into(),
            inputs: vec![InputSlot::optional("input")],
            outputs: vec![BRANCH_TRUE.into(), BRANCH_FALSE.into()],
            default_data: json!({ "conditions": [], "logical_operator": "and" }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let config: BranchNodeConfig = node_config(node, &self.definition().default_data)?;
        // Condition variables resolve from this node's inputs first, then
        // from the run's variable store.
        let matched = evaluate_conditions(&config.conditions, config.logical_operator, |key| {
            inputs.get(key).or_else(|| ctx.get_variable(key))
        });

        let handle = if matched { BRANCH_TRUE } else { BRANCH_FALSE };
        ctx.add_log(
            LogLevel::Debug,
            format!("branch selected '{}'", handle),
            Some(&node.id),
            None,
        );
        Ok(NodeRunResult::branch(handle, Value::Bool(matched)))
    }
}

/// The loop node's owned body subgraph.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoopBody {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Configuration of a while-style loop node, parsed by the engine.
#[derive(Debug, Deserialize)]
pub struct LoopNodeData {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    /// Overrides the engine-wide iteration cap when set.
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub body: LoopBody,
}

impl LoopNodeData {
    pub fn parse(node: &WorkflowNode) -> Result<Self, NodeError> {
        node_config(node, &json!({}))
    }
}

/// Loop nodes are re-entered by the engine itself; the executor only
/// contributes the registry definition.
pub struct LoopNodeExecutor;

#[async_trait]
impl NodeExecutor for LoopNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "loop".into(),
            icon: "repeat".into(),
            category: "logic".into(),
            inputs: vec![InputSlot::optional("input")],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({
                "conditions": [],
                "logical_operator": "and",
                "max_iterations": null,
                "body": { "nodes": [], "edges": [] },
            }),
        }
    }

    async fn execute(
        &self,
        _node: &WorkflowNode,
        _inputs: &HashMap<String, Value>,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        Err(NodeError::Config(
            "loop nodes are scheduled by the engine, not dispatched directly".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::ComparisonOperator;

    #[tokio::test]
    async fn branch_true_path() {
        let node = WorkflowNode::new(
            "if1",
            "branch",
            json!({
                "conditions": [
                    { "variable": "input", "operator": "greater_than", "value": 5 }
                ]
            }),
        );
        let mut inputs = HashMap::new();
        inputs.insert("input".to_string(), json!(10));
        let mut ctx = ExecutionContext::new();
        let result = BranchNodeExecutor
            .execute(&node, &inputs, &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.branch.as_deref(), Some(BRANCH_TRUE));
    }

    #[tokio::test]
    async fn branch_false_path_reads_variable_store() {
        let node = WorkflowNode::new(
            "if1",
            "branch",
            json!({
                "conditions": [
                    { "variable": "score", "operator": "greater_or_equal", "value": 60 }
                ]
            }),
        );
        let mut ctx = ExecutionContext::new();
        ctx.set_variable("score", json!(40));
        let result = BranchNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.branch.as_deref(), Some(BRANCH_FALSE));
        assert_eq!(result.outputs[super::super::DEFAULT_OUTPUT_SLOT], json!(false));
    }

    #[tokio::test]
    async fn branch_without_conditions_is_true() {
        let node = WorkflowNode::new("if1", "branch", json!({}));
        let mut ctx = ExecutionContext::new();
        let result = BranchNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.branch.as_deref(), Some(BRANCH_TRUE));
    }

    #[test]
    fn loop_data_parses_body() {
        let node = WorkflowNode::new(
            "loop1",
            "loop",
            json!({
                "conditions": [
                    { "variable": "counter", "operator": "less_than", "value": 3 }
                ],
                "max_iterations": 10,
                "body": {
                    "nodes": [ { "id": "b1", "type": "transform", "data": { "operation": "trim" } } ],
                    "edges": []
                }
            }),
        );
        let data = LoopNodeData::parse(&node).unwrap();
        assert_eq!(data.max_iterations, Some(10));
        assert_eq!(data.body.nodes.len(), 1);
        assert_eq!(data.conditions[0].operator, ComparisonOperator::LessThan);
    }

    #[tokio::test]
    async fn loop_executor_rejects_direct_dispatch() {
        let node = WorkflowNode::new("loop1", "loop", json!({}));
        let mut ctx = ExecutionContext::new();
        let err = LoopNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
