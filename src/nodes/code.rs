use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{node_config, InputSlot, NodeDefinition, NodeExecutor, NodeRunResult};
use crate::core::context::ExecutionContext;
use crate::core::events::LogLevel;
use crate::error::NodeError;
use crate::graph::WorkflowNode;
use crate::sandbox::SandboxRunner;

#[derive(Debug, Deserialize)]
struct CodeNodeConfig {
    code: String,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Runs user JavaScript through the sandbox runner.
///
/// The resolved `input` value and a frozen snapshot of the run's variables
/// are the only data visible to the code. Console output is forwarded into
/// the run's log sink.
pub struct CodeNodeExecutor {
    sandbox: Arc<SandboxRunner>,
}

impl CodeNodeExecutor {
    pub fn new(sandbox: Arc<SandboxRunner>) -> Self {
        CodeNodeExecutor { sandbox }
    }
}

#[async_trait]
impl NodeExecutor for CodeNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "code".into(),
            icon: "code".into(),
            category: "logic".into(),
            inputs: vec![InputSlot::optional("input")],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({ "code": "return input;", "timeout_ms": null }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let config: CodeNodeConfig = node_config(node, &self.definition().default_data)?;
        let input = inputs.get("input").cloned().unwrap_or(Value::Null);
        let variables = serde_json::to_value(ctx.variables())
            .map_err(|e| NodeError::Serialization(e.to_string()))?;

        let abort = ctx.abort_signal();
        // Dropping the sandbox future on abort tears the worker down the
        // same way a watchdog fire does.
        let outcome = tokio::select! {
            outcome = self.sandbox.execute(&config.code, &input, &variables, config.timeout_ms) => {
                outcome?
            }
            _ = abort.cancelled() => return Err(NodeError::Cancelled),
        };

        for line in outcome.console {
            ctx.add_log(LogLevel::Info, line, Some(&node.id), None);
        }
        Ok(NodeRunResult::value(outcome.result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxError;

    fn executor() -> CodeNodeExecutor {
        CodeNodeExecutor::new(Arc::new(SandboxRunner::default()))
    }

    #[tokio::test]
    async fn runs_code_against_input() {
        let node = WorkflowNode::new("c1", "code", json!({ "code": "return input * 2" }));
        let mut inputs = HashMap::new();
        inputs.insert("input".to_string(), json!(21));
        let mut ctx = ExecutionContext::new();
        let result = executor().execute(&node, &inputs, &mut ctx).await.unwrap();
        assert_eq!(result.outputs[super::super::DEFAULT_OUTPUT_SLOT], json!(42));
    }

    #[tokio::test]
    async fn sees_variables_snapshot() {
        let node = WorkflowNode::new(
            "c1",
            "code",
            json!({ "code": "return variables['threshold'] + 1" }),
        );
        let mut ctx = ExecutionContext::new();
        ctx.set_variable("threshold", json!(9));
        let result = executor()
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.outputs[super::super::DEFAULT_OUTPUT_SLOT], json!(10));
    }

    #[tokio::test]
    async fn console_lines_land_in_run_logs() {
        let node = WorkflowNode::new(
            "c1",
            "code",
            json!({ "code": "console.log('from sandbox'); return null;" }),
        );
        let mut ctx = ExecutionContext::new();
        executor()
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        assert!(ctx
            .logs()
            .iter()
            .any(|l| l.message == "from sandbox" && l.node_id.as_deref() == Some("c1")));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_sandbox_error() {
        let node = WorkflowNode::new(
            "c1",
            "code",
            json!({ "code": "while(true){}", "timeout_ms": 100 }),
        );
        let mut ctx = ExecutionContext::new();
        let err = executor()
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::Sandbox(SandboxError::Timeout { timeout_ms: 100 })
        ));
    }
}
