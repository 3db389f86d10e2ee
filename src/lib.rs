//! # nodeflow — workflow execution engine
//!
//! `nodeflow` is the execution core of a visual node-graph workflow
//! automation tool: users assemble typed nodes (timers, HTTP calls, LLM
//! calls, transforms, custom code) into a directed graph and run it.
//!
//! - **Graph model**: mutable node/edge graph with deterministic
//!   dependency ordering (Kahn's algorithm, insertion-order ties).
//! - **Execution engine**: single-flow dependency-ordered dispatch with
//!   branch short-circuiting, bounded loop re-entry, last-writer-wins input
//!   merging, and a replayable data-flow history.
//! - **Debugger**: breakpoints, single-step, pause/resume/abort over a
//!   gate/hook pair that costs nothing when disabled.
//! - **Sandbox**: untrusted JavaScript on an isolated worker with a
//!   message-passing protocol, hard watchdog timeout, and output size cap.
//! - **Scheduler**: per-workflow cron timers with structural validation,
//!   human-readable presets, and pluggable persistence.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use serde_json::json;
//! use nodeflow::{Edge, ExecutionEngine, Graph, NodeRegistry, WorkflowNode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut graph = Graph::new();
//!     graph
//!         .add_node(WorkflowNode::new(
//!             "code1",
//!             "code",
//!             json!({ "code": "return input * 2" }),
//!         ))
//!         .unwrap();
//!     graph
//!         .add_node(WorkflowNode::new("out", "output", json!({ "name": "result" })))
//!         .unwrap();
//!     graph.add_edge(Edge::new("code1", "out")).unwrap();
//!
//!     let engine = ExecutionEngine::new(Arc::new(NodeRegistry::default()));
//!     let result = engine.run(&graph, HashMap::new()).await;
//!     println!("{:?}", result.outputs);
//! }
//! ```

pub mod core;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod nodes;
pub mod sandbox;
pub mod scheduler;

pub use crate::core::{
    AbortSignal, DataFlowEvent, DebugConfig, DebugController, DebugEvent, DebugHandle,
    DebugInspection, DebugMode, DebugState, EngineConfig, EngineEvent, EventEmitter,
    ExecutionContext, ExecutionEngine, ExecutionResult, LogEntry, LogLevel,
};
pub use crate::error::{NodeError, WorkflowError, WorkflowResult};
pub use crate::graph::{Edge, Graph, Position, WorkflowNode};
pub use crate::nodes::llm::{
    CompletionRequest, CompletionResponse, LlmProvider, LlmProviderRegistry,
    OpenAiCompatibleProvider,
};
pub use crate::nodes::{
    InputSlot, NodeDefinition, NodeExecutor, NodeRegistry, NodeRunResult, DEFAULT_OUTPUT_SLOT,
};
pub use crate::sandbox::{SandboxConfig, SandboxError, SandboxOutcome, SandboxRunner};
pub use crate::scheduler::{
    humanize, next_fire_time, preset_expression, validate_cron_expression, MemoryScheduleStore,
    ScheduleConfig, ScheduleExecutor, ScheduleStore, WorkflowScheduler, PRESETS,
};
