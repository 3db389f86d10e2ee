//! Interactive debugger for workflow execution.
//!
//! Two-layer design: a [`DebugGate`] is a cheap synchronous check deciding
//! whether to pause before a node (the no-op gate compiles away in `off`
//! mode), and a [`DebugHook`] is the async callback invoked only when the
//! gate requests a pause. [`DebugController::launch`] wires both to an
//! engine run and hands back a [`DebugHandle`] for stepping, resuming,
//! aborting, breakpoint management, and state inspection.
//!
//! State machine: `Idle → Running → {Paused, Completed, Failed, Aborted}`,
//! `Paused → Running` on resume/step, `Paused → Aborted` on abort.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};

use super::context::{AbortSignal, ExecutionContext};
use super::engine::{EngineConfig, ExecutionEngine, ExecutionResult};
use super::events::{DataFlowEvent, EventEmitter};
use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::Graph;
use crate::nodes::{NodeRegistry, NodeRunResult};

/// Debugger operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugMode {
    /// Never pause; run as a plain engine run.
    Off,
    /// Pause before every node until resumed.
    Step,
    /// Pause only at breakpoints.
    Breakpoint,
}

/// Externally visible state of a debugged run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DebugState {
    Idle,
    Running,
    Paused { node_id: String, step_index: usize },
    Completed,
    Failed { error: String },
    Aborted,
}

impl DebugState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DebugState::Completed | DebugState::Failed { .. } | DebugState::Aborted
        )
    }
}

/// Launch configuration for a debugged run.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub mode: DebugMode,
    /// Node ids at which execution pauses before dispatch.
    pub breakpoints: HashSet<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        DebugConfig {
            mode: DebugMode::Off,
            breakpoints: HashSet::new(),
        }
    }
}

/// What a hook tells the engine to do after a pause.
#[derive(Debug, Clone)]
pub enum DebugAction {
    Continue,
    Abort { reason: String },
}

/// Cheap synchronous pause check, consulted before and after each node.
pub trait DebugGate: Send + Sync {
    fn should_pause_before(&self, node_id: &str) -> bool;
    fn should_pause_after(&self, node_id: &str) -> bool;
}

/// Async pause handler, invoked only when the gate requested a pause.
#[async_trait]
pub trait DebugHook: Send + Sync {
    async fn before_node_execute(
        &self,
        node_id: &str,
        node_type: &str,
        step_index: usize,
        ctx: &ExecutionContext,
    ) -> WorkflowResult<DebugAction>;

    async fn after_node_execute(
        &self,
        node_id: &str,
        node_type: &str,
        result: &NodeRunResult,
        ctx: &ExecutionContext,
    ) -> WorkflowResult<DebugAction>;
}

/// Gate for undebugged runs; fully inlined away.
pub struct NoopGate;

impl DebugGate for NoopGate {
    #[inline(always)]
    fn should_pause_before(&self, _node_id: &str) -> bool {
        false
    }

    #[inline(always)]
    fn should_pause_after(&self, _node_id: &str) -> bool {
        false
    }
}

/// Hook paired with [`NoopGate`].
pub struct NoopHook;

#[async_trait]
impl DebugHook for NoopHook {
    async fn before_node_execute(
        &self,
        _node_id: &str,
        _node_type: &str,
        _step_index: usize,
        _ctx: &ExecutionContext,
    ) -> WorkflowResult<DebugAction> {
        Ok(DebugAction::Continue)
    }

    async fn after_node_execute(
        &self,
        _node_id: &str,
        _node_type: &str,
        _result: &NodeRunResult,
        _ctx: &ExecutionContext,
    ) -> WorkflowResult<DebugAction> {
        Ok(DebugAction::Continue)
    }
}

/// Command sent to a paused run through the [`DebugHandle`].
#[derive(Debug, Clone)]
pub enum DebugCommand {
    /// Execute exactly one more node, then pause again.
    StepOver,
    /// Run to completion or the next breakpoint.
    Resume,
    Abort { reason: Option<String> },
}

/// Event emitted by the debugger to the external controller.
#[derive(Debug, Clone)]
pub enum DebugEvent {
    Paused {
        node_id: String,
        step_index: usize,
        /// History truncated to completed steps at the pause point.
        history: Vec<DataFlowEvent>,
    },
    Resumed,
    Finished {
        state: DebugState,
    },
}

/// Snapshot of the debugger surface exposed to the visualization layer.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInspection {
    pub mode: DebugMode,
    pub state: DebugState,
    pub current_node_id: Option<String>,
    pub current_step_index: usize,
    pub breakpoints: HashSet<String>,
    pub data_flow_history: Vec<DataFlowEvent>,
}

/// Internal stepping flag: `Step` pauses before the next node regardless of
/// breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode {
    Run,
    Step,
}

struct InteractiveDebugGate {
    config: Arc<RwLock<DebugConfig>>,
    stepping: Arc<RwLock<StepMode>>,
}

impl DebugGate for InteractiveDebugGate {
    fn should_pause_before(&self, node_id: &str) -> bool {
        let config = self.config.read();
        if config.mode == DebugMode::Off {
            return false;
        }
        *self.stepping.read() == StepMode::Step || config.breakpoints.contains(node_id)
    }

    fn should_pause_after(&self, _node_id: &str) -> bool {
        false
    }
}

struct InteractiveDebugHook {
    cmd_rx: Mutex<mpsc::Receiver<DebugCommand>>,
    event_tx: mpsc::Sender<DebugEvent>,
    stepping: Arc<RwLock<StepMode>>,
    inspection: Arc<RwLock<DebugInspection>>,
}

#[async_trait]
impl DebugHook for InteractiveDebugHook {
    async fn before_node_execute(
        &self,
        node_id: &str,
        _node_type: &str,
        step_index: usize,
        ctx: &ExecutionContext,
    ) -> WorkflowResult<DebugAction> {
        let history = ctx.history().to_vec();
        {
            let mut inspection = self.inspection.write();
            inspection.state = DebugState::Paused {
                node_id: node_id.to_string(),
                step_index,
            };
            inspection.current_node_id = Some(node_id.to_string());
            inspection.current_step_index = step_index;
            inspection.data_flow_history = history.clone();
        }
        let _ = self
            .event_tx
            .send(DebugEvent::Paused {
                node_id: node_id.to_string(),
                step_index,
                history,
            })
            .await;

        self.wait_for_command().await
    }

    async fn after_node_execute(
        &self,
        _node_id: &str,
        _node_type: &str,
        _result: &NodeRunResult,
        _ctx: &ExecutionContext,
    ) -> WorkflowResult<DebugAction> {
        Ok(DebugAction::Continue)
    }
}

impl InteractiveDebugHook {
    async fn wait_for_command(&self) -> WorkflowResult<DebugAction> {
        loop {
            let cmd = {
                let mut rx = self.cmd_rx.lock().await;
                rx.recv().await
            };
            match cmd {
                Some(DebugCommand::StepOver) => {
                    *self.stepping.write() = StepMode::Step;
                    self.resume_state().await;
                    return Ok(DebugAction::Continue);
                }
                Some(DebugCommand::Resume) => {
                    *self.stepping.write() = StepMode::Run;
                    self.resume_state().await;
                    return Ok(DebugAction::Continue);
                }
                Some(DebugCommand::Abort { reason }) => {
                    return Ok(DebugAction::Abort {
                        reason: reason.unwrap_or_else(|| "user aborted".into()),
                    });
                }
                None => {
                    return Err(WorkflowError::Aborted("debug channel closed".into()));
                }
            }
        }
    }

    async fn resume_state(&self) {
        self.inspection.write().state = DebugState::Running;
        let _ = self.event_tx.send(DebugEvent::Resumed).await;
    }
}

/// Wraps the execution engine with breakpoints, stepping, and abort.
pub struct DebugController;

impl DebugController {
    /// Validate the configuration and launch a debugged run in the
    /// background. Breakpoints must name nodes that exist in the graph.
    pub fn launch(
        registry: Arc<NodeRegistry>,
        engine_config: EngineConfig,
        graph: Graph,
        initial_variables: HashMap<String, Value>,
        config: DebugConfig,
    ) -> WorkflowResult<DebugHandle> {
        for bp in &config.breakpoints {
            if !graph.contains(bp) {
                return Err(WorkflowError::Validation(format!(
                    "breakpoint references unknown node '{}'",
                    bp
                )));
            }
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let stepping = Arc::new(RwLock::new(match config.mode {
            DebugMode::Step => StepMode::Step,
            _ => StepMode::Run,
        }));
        let inspection = Arc::new(RwLock::new(DebugInspection {
            mode: config.mode,
            state: DebugState::Idle,
            current_node_id: None,
            current_step_index: 0,
            breakpoints: config.breakpoints.clone(),
            data_flow_history: Vec::new(),
        }));
        let shared_config = Arc::new(RwLock::new(config));

        let gate = InteractiveDebugGate {
            config: shared_config.clone(),
            stepping: stepping.clone(),
        };
        let hook = InteractiveDebugHook {
            cmd_rx: Mutex::new(cmd_rx),
            event_tx: event_tx.clone(),
            stepping,
            inspection: inspection.clone(),
        };

        let abort = AbortSignal::new();
        let (state_tx, state_rx) = watch::channel(DebugState::Running);
        let result_slot: Arc<Mutex<Option<ExecutionResult>>> = Arc::new(Mutex::new(None));

        let record_history = engine_config.record_history;
        let engine = ExecutionEngine::with_debug(
            registry,
            engine_config,
            EventEmitter::disabled(),
            gate,
            hook,
        );
        let task_inspection = inspection.clone();
        let task_abort = abort.clone();
        let task_result = result_slot.clone();
        tokio::spawn(async move {
            task_inspection.write().state = DebugState::Running;
            let ctx = ExecutionContext::new()
                .with_variables(initial_variables)
                .with_abort_signal(task_abort)
                .with_history_recording(record_history);
            let result = engine.run_with_context(&graph, ctx).await;

            let final_state = match &result.error {
                None => DebugState::Completed,
                Some(WorkflowError::Aborted(_)) => DebugState::Aborted,
                Some(error) => DebugState::Failed {
                    error: error.to_string(),
                },
            };
            {
                let mut inspection = task_inspection.write();
                inspection.state = final_state.clone();
                inspection.current_step_index = result.steps;
                inspection.data_flow_history = result.history.clone();
            }
            *task_result.lock().await = Some(result);
            let _ = state_tx.send(final_state.clone());
            let _ = event_tx
                .send(DebugEvent::Finished { state: final_state })
                .await;
        });

        Ok(DebugHandle {
            cmd_tx,
            event_rx: Mutex::new(event_rx),
            state_rx,
            config: shared_config,
            inspection,
            abort,
            result: result_slot,
        })
    }
}

/// Control and inspection handle for a debugged run.
pub struct DebugHandle {
    cmd_tx: mpsc::Sender<DebugCommand>,
    event_rx: Mutex<mpsc::Receiver<DebugEvent>>,
    state_rx: watch::Receiver<DebugState>,
    config: Arc<RwLock<DebugConfig>>,
    inspection: Arc<RwLock<DebugInspection>>,
    abort: AbortSignal,
    result: Arc<Mutex<Option<ExecutionResult>>>,
}

impl std::fmt::Debug for DebugHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugHandle").finish_non_exhaustive()
    }
}

impl DebugHandle {
    /// Execute exactly one more node, then pause again.
    pub async fn step_over(&self) -> WorkflowResult<()> {
        self.send(DebugCommand::StepOver).await
    }

    /// Run to completion or the next breakpoint.
    pub async fn resume(&self) -> WorkflowResult<()> {
        self.send(DebugCommand::Resume).await
    }

    /// Abort the run from any non-terminal state. Works both while paused
    /// (the pause loop observes the command) and mid-node (the abort signal
    /// is raced by suspended operations and checked before each dispatch).
    pub async fn abort(&self, reason: Option<String>) -> WorkflowResult<()> {
        self.abort.trigger();
        // Best effort: the run may have terminated already.
        let _ = self.cmd_tx.send(DebugCommand::Abort { reason }).await;
        Ok(())
    }

    /// Breakpoints take effect immediately, also mid-run.
    pub fn add_breakpoint(&self, node_id: &str) {
        self.config.write().breakpoints.insert(node_id.to_string());
        self.inspection
            .write()
            .breakpoints
            .insert(node_id.to_string());
    }

    pub fn remove_breakpoint(&self, node_id: &str) {
        self.config.write().breakpoints.remove(node_id);
        self.inspection.write().breakpoints.remove(node_id);
    }

    pub fn clear_breakpoints(&self) {
        self.config.write().breakpoints.clear();
        self.inspection.write().breakpoints.clear();
    }

    /// Current state snapshot.
    pub fn state(&self) -> DebugState {
        self.inspection.read().state.clone()
    }

    /// Full inspection surface: mode, state, current node and step,
    /// breakpoints, data-flow history.
    pub fn inspection(&self) -> DebugInspection {
        self.inspection.read().clone()
    }

    /// Next debugger event, if the run is still producing them.
    pub async fn next_event(&self) -> Option<DebugEvent> {
        self.event_rx.lock().await.recv().await
    }

    /// Block until the next pause (or terminal) event.
    pub async fn wait_for_pause(&self) -> WorkflowResult<DebugEvent> {
        loop {
            match self.next_event().await {
                Some(event @ DebugEvent::Paused { .. }) => return Ok(event),
                Some(event @ DebugEvent::Finished { .. }) => return Ok(event),
                Some(_) => continue,
                None => return Err(WorkflowError::Aborted("debug event channel closed".into())),
            }
        }
    }

    /// Block until the run reaches a terminal state.
    pub async fn wait(&self) -> DebugState {
        let mut rx = self.state_rx.clone();
        loop {
            let state = rx.borrow().clone();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Take the run's result after completion.
    pub async fn take_result(&self) -> Option<ExecutionResult> {
        self.result.lock().await.take()
    }

    async fn send(&self, cmd: DebugCommand) -> WorkflowResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| WorkflowError::Aborted("debug command channel closed".into()))
    }
}
