use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{node_config, InputSlot, NodeDefinition, NodeExecutor, NodeRunResult};
use crate::core::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::WorkflowNode;

#[derive(Debug, Deserialize)]
struct HttpRequestNodeConfig {
    url: String,
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    timeout_ms: u64,
}

/// Performs one HTTP call. The `url` and `body` inputs override the
/// configured values, so upstream nodes can compute them.
pub struct HttpRequestExecutor {
    client: reqwest::Client,
}

impl HttpRequestExecutor {
    pub fn new() -> Self {
        HttpRequestExecutor {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "http-request".into(),
            icon: "globe".into(),
            category: "network".into(),
            inputs: vec![InputSlot::optional("url"), InputSlot::optional("body")],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({
                "url": "",
                "method": "GET",
                "headers": {},
                "body": null,
                "timeout_ms": 30_000,
            }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let config: HttpRequestNodeConfig = node_config(node, &self.definition().default_data)?;

        let url = inputs
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(config.url);
        if url.is_empty() {
            return Err(NodeError::Config("http-request requires a url".into()));
        }
        let method: reqwest::Method = config
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| NodeError::Config(format!("invalid HTTP method '{}'", config.method)))?;
        let body = inputs.get("body").cloned().or(config.body);

        let mut request = self
            .client
            .request(method, &url)
            .timeout(Duration::from_millis(config.timeout_ms));
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let abort = ctx.abort_signal();
        let response = tokio::select! {
            response = request.send() => {
                response.map_err(|e| NodeError::Http(e.to_string()))?
            }
            _ = abort.cancelled() => return Err(NodeError::Cancelled),
        };

        let status = response.status().as_u16();
        let text = tokio::select! {
            text = response.text() => text.map_err(|e| NodeError::Http(e.to_string()))?,
            _ = abort.cancelled() => return Err(NodeError::Cancelled),
        };
        // Parse JSON bodies when possible, fall back to raw text.
        let body_value = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        tracing::debug!(node_id = %node.id, status, %url, "http request finished");
        Ok(NodeRunResult::value(json!({
            "status": status,
            "body": body_value,
        })))
    }
}
