//! Execution core: per-run context, engine, events, and the debugger.

pub mod context;
pub mod debug;
pub mod engine;
pub mod events;

pub use context::{AbortSignal, ExecutionContext};
pub use debug::{
    DebugAction, DebugCommand, DebugConfig, DebugController, DebugEvent, DebugGate, DebugHandle,
    DebugHook, DebugInspection, DebugMode, DebugState, NoopGate, NoopHook,
};
pub use engine::{EngineConfig, ExecutionEngine, ExecutionResult};
pub use events::{DataFlowEvent, EngineEvent, EventEmitter, LogEntry, LogLevel};
