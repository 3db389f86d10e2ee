//! The execution engine: drives one run of a graph.
//!
//! Execution is single-flow per run: nodes dispatch one at a time in
//! dependency order, each awaited before the next, which keeps the variable
//! store and data-flow history deterministic and the debugger's step index
//! meaningful. Independent runs are isolated by construction — each owns
//! its [`ExecutionContext`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};

use super::context::ExecutionContext;
use super::debug::{DebugAction, DebugGate, DebugHook, NoopGate, NoopHook};
use super::events::{DataFlowEvent, EngineEvent, EventEmitter, LogEntry, LogLevel};
use crate::error::{NodeError, WorkflowError, WorkflowResult};
use crate::evaluator::evaluate_conditions;
use crate::graph::{Edge, Graph, WorkflowNode};
use crate::nodes::basic::OutputNodeExecutor;
use crate::nodes::control_flow::LoopNodeData;
use crate::nodes::{NodeRegistry, NodeRunResult, DEFAULT_OUTPUT_SLOT};

/// Engine-wide execution limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Iteration cap for loop nodes that do not set their own.
    pub max_loop_iterations: u32,
    /// Record data-flow history. Disabled by the debugger's `off` mode for
    /// zero-overhead runs.
    pub record_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_loop_iterations: 100,
            record_history: true,
        }
    }
}

/// Outcome of one run.
///
/// Partial outputs and variables produced before a failure remain visible
/// for diagnostics; the original error is preserved, never swallowed.
#[derive(Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub outputs: HashMap<String, Value>,
    pub variables: HashMap<String, Value>,
    pub error: Option<WorkflowError>,
    pub logs: Vec<LogEntry>,
    pub history: Vec<DataFlowEvent>,
    /// Number of nodes dispatched (including best-effort failures).
    pub steps: usize,
}

/// Drives a full run: resolves order, gathers inputs, dispatches executors,
/// routes branch liveness, re-enters loop bodies, records debugger events.
pub struct ExecutionEngine<G: DebugGate = NoopGate, H: DebugHook = NoopHook> {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    emitter: EventEmitter,
    debug_gate: G,
    debug_hook: H,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        ExecutionEngine {
            registry,
            config: EngineConfig::default(),
            emitter: EventEmitter::disabled(),
            debug_gate: NoopGate,
            debug_hook: NoopHook,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }
}

impl<G: DebugGate, H: DebugHook> ExecutionEngine<G, H> {
    /// Construct an engine with interactive debug hooks installed.
    pub fn with_debug(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        emitter: EventEmitter,
        debug_gate: G,
        debug_hook: H,
    ) -> Self {
        ExecutionEngine {
            registry,
            config,
            emitter,
            debug_gate,
            debug_hook,
        }
    }

    /// Run a graph with the given initial variables in a fresh context.
    pub async fn run(
        &self,
        graph: &Graph,
        initial_variables: HashMap<String, Value>,
    ) -> ExecutionResult {
        let ctx = ExecutionContext::new()
            .with_variables(initial_variables)
            .with_history_recording(self.config.record_history);
        self.run_with_context(graph, ctx).await
    }

    /// Run a graph in a caller-provided context (custom abort signal, etc).
    pub async fn run_with_context(
        &self,
        graph: &Graph,
        mut ctx: ExecutionContext,
    ) -> ExecutionResult {
        self.emitter
            .emit(EngineEvent::RunStarted {
                run_id: ctx.run_id().to_string(),
            })
            .await;

        // Bad graphs are rejected before anything runs.
        if let Err(error) = self.validate(graph) {
            ctx.add_log(LogLevel::Error, error.to_string(), None, None);
            self.emitter
                .emit(EngineEvent::RunFailed {
                    error: error.to_string(),
                })
                .await;
            return finish(ctx, HashMap::new(), Some(error));
        }

        let mut outputs = HashMap::new();
        match self.run_graph(graph, &mut ctx, &mut outputs, 0).await {
            Ok(()) => {
                ctx.add_log(LogLevel::Success, "run completed", None, None);
                self.emitter
                    .emit(EngineEvent::RunCompleted {
                        outputs: json!(outputs.clone()),
                    })
                    .await;
                finish(ctx, outputs, None)
            }
            Err(WorkflowError::Aborted(reason)) => {
                ctx.add_log(
                    LogLevel::Warn,
                    format!("run aborted: {}", reason),
                    None,
                    None,
                );
                self.emitter
                    .emit(EngineEvent::RunAborted {
                        reason: reason.clone(),
                    })
                    .await;
                finish(ctx, outputs, Some(WorkflowError::Aborted(reason)))
            }
            Err(error) => {
                ctx.add_log(LogLevel::Error, error.to_string(), error.node_id(), None);
                self.emitter
                    .emit(EngineEvent::RunFailed {
                        error: error.to_string(),
                    })
                    .await;
                finish(ctx, outputs, Some(error))
            }
        }
    }

    fn validate(&self, graph: &Graph) -> WorkflowResult<()> {
        for node in graph.nodes() {
            if !self.registry.contains(&node.node_type) {
                return Err(WorkflowError::Validation(format!(
                    "unknown node type '{}' on node '{}'",
                    node.node_type, node.id
                )));
            }
        }
        Ok(())
    }

    /// Execute one graph level: the outer workflow at depth 0, loop bodies
    /// at depth > 0 (sharing the caller's context and output collection).
    fn run_graph<'a>(
        &'a self,
        graph: &'a Graph,
        ctx: &'a mut ExecutionContext,
        outputs: &'a mut HashMap<String, Value>,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = WorkflowResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let order = graph.topological_order()?;
            let topo_pos: HashMap<String, usize> = order
                .iter()
                .enumerate()
                .map(|(i, id)| (id.clone(), i))
                .collect();

            let mut dead_edges: HashSet<String> = HashSet::new();
            let mut skipped: HashSet<String> = HashSet::new();

            for node_id in &order {
                if ctx.is_aborted() {
                    return Err(WorkflowError::Aborted("abort signal triggered".into()));
                }
                let node = graph
                    .node(node_id)
                    .ok_or_else(|| WorkflowError::Internal(format!("node '{}' vanished", node_id)))?;

                // A node whose every incoming edge is dead (or fed by a
                // skipped node) is short-circuited, and its own edges die
                // with it — the cascade that keeps dead branch arms cold.
                let incoming = graph.incoming_edges(node_id);
                let mut live: Vec<&Edge> = incoming
                    .iter()
                    .filter(|e| !dead_edges.contains(&e.id) && !skipped.contains(&e.source))
                    .copied()
                    .collect();
                if !incoming.is_empty() && live.is_empty() {
                    skipped.insert(node_id.clone());
                    for edge in graph.outgoing_edges(node_id) {
                        dead_edges.insert(edge.id.clone());
                    }
                    ctx.add_log(
                        LogLevel::Debug,
                        "skipped: no live incoming edge",
                        Some(node_id),
                        None,
                    );
                    self.emitter
                        .emit(EngineEvent::NodeSkipped {
                            node_id: node_id.clone(),
                        })
                        .await;
                    continue;
                }

                let executor = self
                    .registry
                    .get(&node.node_type)
                    .ok_or_else(|| WorkflowError::ExecutorNotFound(node.node_type.clone()))?
                    .clone();
                let definition = executor.definition();

                // Resolve inputs in ascending topological order of the edge
                // source: a later writer into the same slot overwrites an
                // earlier one (last-writer-wins, the documented policy).
                live.sort_by_key(|e| topo_pos.get(&e.source).copied().unwrap_or(usize::MAX));
                let default_slot = definition
                    .inputs
                    .first()
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| "input".to_string());
                let mut inputs: HashMap<String, Value> = HashMap::new();
                for edge in &live {
                    let value = resolve_edge_value(ctx, edge);
                    let flow = DataFlowEvent::new(edge.source.clone(), node_id.clone(), value.clone());
                    if self.emitter.is_active() {
                        self.emitter.emit(EngineEvent::DataFlow(flow.clone())).await;
                    }
                    ctx.push_flow(flow);
                    let slot = edge
                        .target_handle
                        .clone()
                        .unwrap_or_else(|| default_slot.clone());
                    inputs.insert(slot, value);
                }

                let missing = definition
                    .inputs
                    .iter()
                    .find(|slot| slot.required && !inputs.contains_key(&slot.name))
                    .map(|slot| slot.name.clone());

                if self.debug_gate.should_pause_before(node_id) {
                    let action = self
                        .debug_hook
                        .before_node_execute(node_id, &node.node_type, ctx.step_index(), ctx)
                        .await?;
                    if let DebugAction::Abort { reason } = action {
                        return Err(WorkflowError::Aborted(reason));
                    }
                    if ctx.is_aborted() {
                        return Err(WorkflowError::Aborted("abort signal triggered".into()));
                    }
                }

                ctx.add_log(
                    LogLevel::Info,
                    format!("executing '{}' node", node.node_type),
                    Some(node_id),
                    None,
                );
                self.emitter
                    .emit(EngineEvent::NodeStarted {
                        node_id: node_id.clone(),
                    })
                    .await;

                let run_result: WorkflowResult<NodeRunResult> = if node.node_type == "loop" {
                    self.execute_loop(node, ctx, outputs, depth).await
                } else if let Some(slot) = missing {
                    Err(WorkflowError::NodeExecution {
                        node_id: node_id.clone(),
                        source: NodeError::MissingInput { slot },
                    })
                } else {
                    executor
                        .execute(node, &inputs, ctx)
                        .await
                        .map_err(|e| WorkflowError::NodeExecution {
                            node_id: node_id.clone(),
                            source: e,
                        })
                };

                match run_result {
                    Ok(result) => {
                        for (slot, value) in &result.outputs {
                            ctx.set_variable(
                                ExecutionContext::output_key(node_id, slot),
                                value.clone(),
                            );
                        }

                        if let Some(handle) = &result.branch {
                            self.emitter
                                .emit(EngineEvent::BranchSelected {
                                    node_id: node_id.clone(),
                                    handle: handle.clone(),
                                })
                                .await;
                            // Edges on other handles are dead for this run;
                            // handle-less edges stay live.
                            for edge in graph.outgoing_edges(node_id) {
                                if let Some(edge_handle) = &edge.source_handle {
                                    if edge_handle != handle {
                                        dead_edges.insert(edge.id.clone());
                                    }
                                }
                            }
                        }

                        let default_output = result
                            .outputs
                            .get(DEFAULT_OUTPUT_SLOT)
                            .cloned()
                            .unwrap_or_else(|| json!(result.outputs.clone()));
                        if node.node_type == "output" {
                            outputs.insert(OutputNodeExecutor::output_name(node), default_output);
                        } else if depth == 0 && graph.outgoing_edges(node_id).is_empty() {
                            outputs.insert(node_id.clone(), default_output);
                        }

                        ctx.add_log(LogLevel::Success, "node completed", Some(node_id), None);
                        self.emitter
                            .emit(EngineEvent::NodeFinished {
                                node_id: node_id.clone(),
                                outputs: json!(result.outputs.clone()),
                            })
                            .await;
                        ctx.advance_step();

                        if self.debug_gate.should_pause_after(node_id) {
                            let action = self
                                .debug_hook
                                .after_node_execute(node_id, &node.node_type, &result, ctx)
                                .await?;
                            if let DebugAction::Abort { reason } = action {
                                return Err(WorkflowError::Aborted(reason));
                            }
                        }
                    }
                    Err(error) => {
                        ctx.add_log(
                            LogLevel::Error,
                            error.to_string(),
                            Some(node_id),
                            None,
                        );
                        self.emitter
                            .emit(EngineEvent::NodeFailed {
                                node_id: node_id.clone(),
                                error: error.to_string(),
                            })
                            .await;

                        let best_effort = node.data_flag("continue_on_error")
                            && matches!(error, WorkflowError::NodeExecution { .. });
                        if best_effort {
                            // Outputs never propagate from a failed node.
                            for edge in graph.outgoing_edges(node_id) {
                                dead_edges.insert(edge.id.clone());
                            }
                            ctx.advance_step();
                            continue;
                        }
                        return Err(error);
                    }
                }
            }
            Ok(())
        })
    }

    /// Re-enter a loop node's owned body subgraph while its condition holds,
    /// bounded by the iteration cap.
    async fn execute_loop(
        &self,
        node: &WorkflowNode,
        ctx: &mut ExecutionContext,
        outputs: &mut HashMap<String, Value>,
        depth: u32,
    ) -> WorkflowResult<NodeRunResult> {
        let data = LoopNodeData::parse(node).map_err(|e| WorkflowError::NodeExecution {
            node_id: node.id.clone(),
            source: e,
        })?;
        let body = Graph::from_parts(data.body.nodes.clone(), data.body.edges.clone())?;
        let limit = data.max_iterations.unwrap_or(self.config.max_loop_iterations);

        let mut iterations: u32 = 0;
        loop {
            let proceed = evaluate_conditions(&data.conditions, data.logical_operator, |key| {
                ctx.get_variable(key)
            });
            if !proceed {
                break;
            }
            if iterations >= limit {
                return Err(WorkflowError::LoopLimitExceeded {
                    node_id: node.id.clone(),
                    limit,
                });
            }
            iterations += 1;
            self.run_graph(&body, ctx, outputs, depth + 1).await?;
        }

        tracing::debug!(node_id = %node.id, iterations, "loop finished");
        Ok(NodeRunResult::value(json!({ "iterations": iterations })))
    }
}

/// Read the value an edge transmits: the source's handle slot when set,
/// falling back to the default output slot.
fn resolve_edge_value(ctx: &ExecutionContext, edge: &Edge) -> Value {
    if let Some(handle) = &edge.source_handle {
        if let Some(value) = ctx.get_variable(&ExecutionContext::output_key(&edge.source, handle)) {
            return value.clone();
        }
    }
    ctx.get_variable(&ExecutionContext::output_key(
        &edge.source,
        DEFAULT_OUTPUT_SLOT,
    ))
    .cloned()
    .unwrap_or(Value::Null)
}

fn finish(
    ctx: ExecutionContext,
    outputs: HashMap<String, Value>,
    error: Option<WorkflowError>,
) -> ExecutionResult {
    ExecutionResult {
        success: error.is_none(),
        variables: ctx.variables_snapshot(),
        logs: ctx.logs().to_vec(),
        history: ctx.history().to_vec(),
        steps: ctx.step_index(),
        outputs,
        error,
    }
}
