use thiserror::Error;

use crate::sandbox::SandboxError;

/// Node-level errors: failures local to one node's execute operation.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Missing required input '{slot}'")]
    MissingInput { slot: String },
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Type error: {0}")]
    Type(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("Node execution cancelled")]
    Cancelled,
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}
