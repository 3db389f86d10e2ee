use thiserror::Error;

/// Sandbox-originated failures. Always surfaced to the run result with the
/// failing node id attached; never retried automatically.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Code execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Result too large (max {max_bytes} bytes, got {actual_bytes} bytes)")]
    SizeLimit {
        max_bytes: usize,
        actual_bytes: usize,
    },
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Code too large (max {max} bytes, got {actual} bytes)")]
    CodeTooLarge { max: usize, actual: usize },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Sandbox worker unavailable: {0}")]
    WorkerUnavailable(String),
}
