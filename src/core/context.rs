//! Per-run mutable state: variables, log sink, data-flow history, abort.
//!
//! One [`ExecutionContext`] exists per run, is passed into every node
//! dispatch of that run, and is discarded when the run ends. Concurrent
//! independent runs each own their context, so no cross-run locking exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use super::events::{DataFlowEvent, LogEntry, LogLevel};

/// Cooperative cancellation signal shared between a run and its controller.
///
/// Cloning shares the underlying flag. Long-running node operations race
/// [`cancelled`](AbortSignal::cancelled) against their own work so an abort
/// is observable mid-suspension.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        AbortSignal::default()
    }

    pub fn trigger(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolve once the signal fires. Returns immediately if already fired.
    pub async fn cancelled(&self) {
        while !self.is_aborted() {
            self.inner.notify.notified().await;
        }
    }
}

/// Per-run mutable state shared across all node dispatches of one run.
pub struct ExecutionContext {
    run_id: String,
    variables: HashMap<String, Value>,
    logs: Vec<LogEntry>,
    history: Vec<DataFlowEvent>,
    record_history: bool,
    step_index: usize,
    abort: AbortSignal,
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext {
            run_id: Uuid::new_v4().to_string(),
            variables: HashMap::new(),
            logs: Vec::new(),
            history: Vec::new(),
            record_history: true,
            step_index: 0,
            abort: AbortSignal::new(),
        }
    }

    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Disable data-flow history recording (debug mode `off` fast path).
    pub fn with_history_recording(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Key under which a node's output slot value is stored.
    pub fn output_key(node_id: &str, slot: &str) -> String {
        format!("{}.{}", node_id, slot)
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn variables_snapshot(&self) -> HashMap<String, Value> {
        self.variables.clone()
    }

    /// Append to the run's log sink. Never fails, never drops.
    pub fn add_log(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        node_id: Option<&str>,
        data: Option<Value>,
    ) {
        let mut entry = LogEntry::new(level, message);
        entry.node_id = node_id.map(str::to_string);
        entry.data = data;
        self.logs.push(entry);
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub(crate) fn push_flow(&mut self, event: DataFlowEvent) {
        if self.record_history {
            self.history.push(event);
        }
    }

    pub fn history(&self) -> &[DataFlowEvent] {
        &self.history
    }

    /// The history truncated to the first `steps` events: replayable
    /// "state as of step N".
    pub fn history_up_to(&self, steps: usize) -> &[DataFlowEvent] {
        &self.history[..steps.min(self.history.len())]
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub(crate) fn advance_step(&mut self) {
        self.step_index += 1;
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
