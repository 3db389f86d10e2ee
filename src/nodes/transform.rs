use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{node_config, InputSlot, NodeDefinition, NodeExecutor, NodeRunResult};
use crate::core::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::WorkflowNode;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum TransformOperation {
    Uppercase,
    Lowercase,
    Trim,
    Length,
    ParseJson,
    StringifyJson,
    GetField,
}

#[derive(Debug, Deserialize)]
struct TransformNodeConfig {
    operation: TransformOperation,
    #[serde(default)]
    field: Option<String>,
}

/// Applies one of a fixed set of data operations to its input.
pub struct TransformNodeExecutor;

#[async_trait]
impl NodeExecutor for TransformNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "transform".into(),
            icon: "shuffle".into(),
            category: "data".into(),
            inputs: vec![InputSlot::required("input")],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({ "operation": "uppercase", "field": null }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        _ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let config: TransformNodeConfig = node_config(node, &self.definition().default_data)?;
        let input = inputs
            .get("input")
            .ok_or_else(|| NodeError::MissingInput {
                slot: "input".into(),
            })?;

        let output = match config.operation {
            TransformOperation::Uppercase => {
                Value::String(as_text(input)?.to_uppercase())
            }
            TransformOperation::Lowercase => {
                Value::String(as_text(input)?.to_lowercase())
            }
            TransformOperation::Trim => Value::String(as_text(input)?.trim().to_string()),
            TransformOperation::Length => {
                let len = match input {
                    Value::String(s) => s.chars().count(),
                    Value::Array(a) => a.len(),
                    Value::Object(m) => m.len(),
                    other => {
                        return Err(NodeError::Type(format!(
                            "length is undefined for {}",
                            type_name(other)
                        )))
                    }
                };
                json!(len)
            }
            TransformOperation::ParseJson => {
                let text = as_text(input)?;
                serde_json::from_str(&text)
                    .map_err(|e| NodeError::Type(format!("parse-json failed: {}", e)))?
            }
            TransformOperation::StringifyJson => {
                let text = serde_json::to_string(input)?;
                Value::String(text)
            }
            TransformOperation::GetField => {
                let field = config.field.as_deref().filter(|f| !f.is_empty()).ok_or_else(
                    || NodeError::Config("get-field requires a 'field' setting".into()),
                )?;
                lookup_path(input, field).cloned().unwrap_or(Value::Null)
            }
        };

        Ok(NodeRunResult::value(output))
    }
}

fn as_text(v: &Value) -> Result<String, NodeError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(NodeError::Type(format!(
            "expected text-like input, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve a dotted path (`"user.address.city"`) inside a value.
fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(data: Value, input: Value) -> Result<Value, NodeError> {
        let node = WorkflowNode::new("t", "transform", data);
        let mut ctx = ExecutionContext::new();
        let mut inputs = HashMap::new();
        inputs.insert("input".to_string(), input);
        TransformNodeExecutor
            .execute(&node, &inputs, &mut ctx)
            .await
            .map(|r| r.outputs[super::super::DEFAULT_OUTPUT_SLOT].clone())
    }

    #[tokio::test]
    async fn text_operations() {
        assert_eq!(
            run(json!({ "operation": "uppercase" }), json!("abc")).await.unwrap(),
            json!("ABC")
        );
        assert_eq!(
            run(json!({ "operation": "lowercase" }), json!("AbC")).await.unwrap(),
            json!("abc")
        );
        assert_eq!(
            run(json!({ "operation": "trim" }), json!("  x  ")).await.unwrap(),
            json!("x")
        );
    }

    #[tokio::test]
    async fn length_over_shapes() {
        assert_eq!(
            run(json!({ "operation": "length" }), json!("abcd")).await.unwrap(),
            json!(4)
        );
        assert_eq!(
            run(json!({ "operation": "length" }), json!([1, 2, 3])).await.unwrap(),
            json!(3)
        );
        let err = run(json!({ "operation": "length" }), json!(12)).await.unwrap_err();
        assert!(matches!(err, NodeError::Type(_)));
    }

    #[tokio::test]
    async fn json_roundtrip() {
        assert_eq!(
            run(json!({ "operation": "parse-json" }), json!("{\"a\":1}"))
                .await
                .unwrap(),
            json!({ "a": 1 })
        );
        assert_eq!(
            run(json!({ "operation": "stringify-json" }), json!({ "a": 1 }))
                .await
                .unwrap(),
            json!("{\"a\":1}")
        );
    }

    #[tokio::test]
    async fn get_field_with_dotted_path() {
        let input = json!({ "user": { "name": "ada", "tags": ["x", "y"] } });
        assert_eq!(
            run(
                json!({ "operation": "get-field", "field": "user.name" }),
                input.clone()
            )
            .await
            .unwrap(),
            json!("ada")
        );
        assert_eq!(
            run(
                json!({ "operation": "get-field", "field": "user.tags.1" }),
                input.clone()
            )
            .await
            .unwrap(),
            json!("y")
        );
        // Missing paths resolve to null rather than failing.
        assert_eq!(
            run(json!({ "operation": "get-field", "field": "ghost" }), input)
                .await
                .unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn missing_input_is_reported() {
        let node = WorkflowNode::new("t", "transform", json!({ "operation": "trim" }));
        let mut ctx = ExecutionContext::new();
        let err = TransformNodeExecutor
            .execute(&node, &HashMap::new(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingInput { .. }));
    }

    #[tokio::test]
    async fn unknown_operation_is_config_error() {
        let err = run(json!({ "operation": "reverse" }), json!("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
