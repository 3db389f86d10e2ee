//! LLM node and provider abstraction.
//!
//! Providers are registered by name in an [`LlmProviderRegistry`]; the node
//! picks one (or the registry default), interpolates its prompt template
//! from resolved inputs, and awaits the completion. An OpenAI-compatible
//! HTTP provider covers real deployments; the echo provider keeps offline
//! runs and tests deterministic.

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

/// One completion request handed to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, NodeError>;
}

/// Providers keyed by name with an optional default.
pub struct LlmProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_provider: Option<String>,
}

impl LlmProviderRegistry {
    pub fn new() -> Self {
        LlmProviderRegistry {
            providers: HashMap::new(),
            default_provider: None,
        }
    }

    /// A registry with only the offline echo provider registered.
    pub fn with_echo() -> Self {
        let mut registry = LlmProviderRegistry::new();
        registry.register(Arc::new(EchoProvider));
        registry
    }

    /// Register a provider. The first registration becomes the default.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: Option<&str>) -> Option<&Arc<dyn LlmProvider>> {
        match name {
            Some(name) => self.providers.get(name),
            None => self
                .default_provider
                .as_deref()
                .and_then(|d| self.providers.get(d)),
        }
    }
}

impl Default for LlmProviderRegistry {
    fn default() -> Self {
        LlmProviderRegistry::with_echo()
    }
}

/// Offline provider that returns its prompt verbatim.
pub struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, NodeError> {
        Ok(CompletionResponse {
            text: request.prompt,
            model: request.model,
        })
    }
}

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiCompatibleProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        OpenAiCompatibleProvider {
            name: name.into(),
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, NodeError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut payload = json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(t) = request.temperature {
            payload["temperature"] = json!(t);
        }
        if let Some(m) = request.max_tokens {
            payload["max_tokens"] = json!(m);
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NodeError::Llm(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| NodeError::Llm(e.to_string()))?;
        if !status.is_success() {
            return Err(NodeError::Llm(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| NodeError::Llm("malformed completion response".into()))?
            .to_string();
        let model = body["model"]
            .as_str()
            .unwrap_or(&request.model)
            .to_string();
        Ok(CompletionResponse { text, model })
    }
}

#[derive(Debug, Deserialize)]
struct LlmNodeConfig {
    #[serde(default)]
    provider: Option<String>,
    model: String,
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

/// LLM call node. `{{slot}}` placeholders in the prompt are replaced with
/// the corresponding resolved input values.
pub struct LlmNodeExecutor {
    registry: Arc<LlmProviderRegistry>,
}

impl LlmNodeExecutor {
    pub fn new(registry: Arc<LlmProviderRegistry>) -> Self {
        LlmNodeExecutor { registry }
    }
}

#[async_trait]
impl NodeExecutor for LlmNodeExecutor {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            name: "llm".into(),
            icon: "sparkles".into(),
            category: "ai".into(),
            inputs: vec![
                InputSlot::optional("prompt"),
                InputSlot::optional("context"),
            ],
            outputs: vec![super::DEFAULT_OUTPUT_SLOT.into()],
            default_data: json!({
                "provider": null,
                "model": "gpt-4o-mini",
                "prompt": "{{prompt}}",
                "system_prompt": null,
                "temperature": null,
                "max_tokens": null,
            }),
        }
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: &HashMap<String, Value>,
        ctx: &mut ExecutionContext,
    ) -> Result<NodeRunResult, NodeError> {
        let config: LlmNodeConfig = node_config(node, &self.definition().default_data)?;
        let provider = self
            .registry
            .get(config.provider.as_deref())
            .ok_or_else(|| {
                NodeError::Llm(format!(
                    "no LLM provider registered for '{}'",
                    config.provider.as_deref().unwrap_or("<default>")
                ))
            })?;

        let prompt = interpolate(&config.prompt, inputs);
        let request = CompletionRequest {
            model: config.model,
            system_prompt: config.system_prompt,
            prompt,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let abort = ctx.abort_signal();
        let response = tokio::select! {
            response = provider.complete(request) => response?,
            _ = abort.cancelled() => return Err(NodeError::Cancelled),
        };

        ctx.add_log(
            LogLevel::Debug,
            format!("completion from model '{}'", response.model),
            Some(&node.id),
            None,
        );
        Ok(NodeRunResult::value(json!({
            "text": response.text,
            "model": response.model,
        })))
    }
}

/// Replace `{{key}}` placeholders with input values rendered as plain text.
fn interpolate(template: &str, inputs: &HashMap<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in inputs {
        let placeholder = format!("{{{{{}}}}}", key);
        if rendered.contains(&placeholder) {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &text);
        }
    }
    rendered
}
