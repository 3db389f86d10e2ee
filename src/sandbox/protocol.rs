//! Host↔worker message protocol.
//!
//! The worker announces `Ready`, the host sends one [`SandboxRequest`], the
//! worker streams `Console` messages and finishes with exactly one
//! `Success` or `Error`. Nothing else crosses the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One execution request shipped to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxRequest {
    pub id: String,
    pub code: String,
    pub inputs: Value,
    pub variables: Value,
    pub timeout_ms: u64,
}

/// Messages flowing from the worker back to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Handshake before the first request is accepted.
    Ready,
    /// A forwarded `console.log` line.
    Console { data: String },
    Success { id: String, result: Value },
    Error { id: String, error: String },
}
