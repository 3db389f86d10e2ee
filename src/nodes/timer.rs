use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{node_config, NodeDefinition, NodeExecutor, NodeRunResult};
use crate::core::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::WorkflowNode;

#[derive(Debug, Deserialize)]
struct TimerNodeConfig {
    interval_seconds: u64,
}

/// Timer node: the graph-side face of a recurring trigger.
///
/// Recurring scheduling lives in the scheduler; when a run reaches a timer
/// node it simply emits the tick payload downstream.
pub struct TimerNodeExecutor;

#[async_trait]
impl NodeExecutor for TimerNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "timer".into(),
            icon: "clock".into(),
            category: "trigger".into(),
            inputs: vec![],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({ "interval_seconds": 60 }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        _inputs: &HashMap<String, Value>,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let config: TimerNodeConfig = node_config(node, &self.definition().default_data)?;
        let now = Utc::now();
        Ok(NodeRunResult::value(json!({
            "timestamp": now.timestamp_millis(),
            "iso": now.to_rfc3339(),
            "interval_seconds": config.interval_seconds,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_tick_payload() {
        let node = WorkflowNode::new("t1", "timer", json!({ "interval_seconds": 5 }));
        let mut ctx = ExecutionContext::new();
        let result = TimerNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        let tick = &result.outputs[super::super::DEFAULT_OUTPUT_SLOT];
        assert_eq!(tick["interval_seconds"], 5);
        assert!(tick["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn default_interval_applies() {
        let node = WorkflowNode::new("t1", "timer", json!({}));
        let mut ctx = ExecutionContext::new();
        let result = TimerNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(
            result.outputs[super::super::DEFAULT_OUTPUT_SLOT]["interval_seconds"],
            60
        );
    }
}
