//! End-to-end tests over the public API: graphs built the way the canvas
//! layer builds them, executed, debugged, and scheduled.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};

use nodeflow::{
    DebugConfig, DebugController, DebugEvent, DebugMode, DebugState, Edge, EngineConfig,
    ExecutionEngine, Graph, NodeRegistry, ScheduleConfig, ScheduleExecutor, WorkflowError,
    WorkflowNode, WorkflowScheduler,
};

fn registry() -> Arc<NodeRegistry> {
    Arc::new(NodeRegistry::default())
}

#[tokio::test]
async fn code_branch_llm_pipeline() {
    // code doubles the input, branch gates on the doubled value, the llm
    // (echo provider) formats the winning arm.
    let mut graph = Graph::new();
    graph
        .add_node(WorkflowNode::new(
            "seed",
            "variable",
            json!({ "key": "n", "value": 21 }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new(
            "double",
            "code",
            json!({ "code": "return input * 2" }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new(
            "gate",
            "branch",
            json!({
                "conditions": [
                    { "variable": "input", "operator": "greater_or_equal", "value": 42 }
                ]
            }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new(
            "describe",
            "llm",
            json!({ "model": "echo-model", "prompt": "value is {{prompt}}" }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new(
            "grab_text",
            "transform",
            json!({ "operation": "get-field", "field": "text" }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new("out", "output", json!({ "name": "answer" })))
        .unwrap();

    graph.add_edge(Edge::new("seed", "double")).unwrap();
    graph.add_edge(Edge::new("double", "gate")).unwrap();
    graph
        .add_edge(
            Edge::new("gate", "describe")
                .with_source_handle("true")
                .with_target_handle("trigger"),
        )
        .unwrap();
    graph
        .add_edge(Edge::new("double", "describe").with_target_handle("prompt"))
        .unwrap();
    graph.add_edge(Edge::new("describe", "grab_text")).unwrap();
    graph.add_edge(Edge::new("grab_text", "out")).unwrap();

    let engine = ExecutionEngine::new(registry());
    let result = engine.run(&graph, HashMap::new()).await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.outputs["answer"], json!("value is 42"));
    // History is replayable and ordered: the seed fed the code node first.
    assert_eq!(result.history[0].source_node_id, "seed");
}

#[tokio::test]
async fn sandbox_failure_carries_node_id_to_run_result() {
    let mut graph = Graph::new();
    graph
        .add_node(WorkflowNode::new(
            "boom",
            "code",
            json!({ "code": "throw new Error('exploded')" }),
        ))
        .unwrap();

    let result = ExecutionEngine::new(registry())
        .run(&graph, HashMap::new())
        .await;
    assert!(!result.success);
    match &result.error {
        Some(WorkflowError::NodeExecution { node_id, source }) => {
            assert_eq!(node_id, "boom");
            assert!(source.to_string().contains("exploded"));
        }
        other => panic!("expected NodeExecution, got {:?}", other),
    }
    // The failure is also in the log sink with the node id attached.
    assert!(result
        .logs
        .iter()
        .any(|l| l.node_id.as_deref() == Some("boom") && l.message.contains("exploded")));
}

#[tokio::test]
async fn graph_edits_between_runs_take_effect() {
    let mut graph = Graph::new();
    graph
        .add_node(WorkflowNode::new(
            "t",
            "transform",
            json!({ "operation": "uppercase" }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new(
            "src",
            "variable",
            json!({ "key": "word", "value": "hi" }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new("out", "output", json!({ "name": "word_out" })))
        .unwrap();
    graph.add_edge(Edge::new("src", "t")).unwrap();
    graph.add_edge(Edge::new("t", "out")).unwrap();

    let engine = ExecutionEngine::new(registry());
    let first = engine.run(&graph, HashMap::new()).await;
    assert_eq!(first.outputs["word_out"], json!("HI"));

    // The property panel flips the operation; the next run sees it.
    graph
        .update_node_data("t", json!({ "operation": "lowercase" }))
        .unwrap();
    let second = engine.run(&graph, HashMap::new()).await;
    assert_eq!(second.outputs["word_out"], json!("hi"));

    // Removing the source cascades its edge; the transform then fails on
    // its missing required input.
    graph.remove_node("src").unwrap();
    let third = engine.run(&graph, HashMap::new()).await;
    assert!(!third.success);
}

#[tokio::test]
async fn debugger_steps_through_a_loop_body() {
    let mut graph = Graph::new();
    graph
        .add_node(WorkflowNode::new(
            "loop1",
            "loop",
            json!({
                "conditions": [
                    { "variable": "counter", "operator": "less_than", "value": 2 }
                ],
                "body": {
                    "nodes": [
                        { "id": "inc", "type": "code",
                          "data": { "code": "return (variables['counter'] || 0) + 1;" } },
                        { "id": "store", "type": "variable", "data": { "key": "counter" } }
                    ],
                    "edges": [ { "source": "inc", "target": "store" } ]
                }
            }),
        ))
        .unwrap();

    let mut initial = HashMap::new();
    initial.insert("counter".to_string(), json!(0));
    let handle = DebugController::launch(
        registry(),
        EngineConfig::default(),
        graph,
        initial,
        DebugConfig {
            mode: DebugMode::Step,
            breakpoints: HashSet::new(),
        },
    )
    .unwrap();

    // First pause is the loop node itself, then its body nodes as the
    // engine re-enters the owned subgraph.
    let mut paused_at = Vec::new();
    loop {
        match handle.wait_for_pause().await.unwrap() {
            DebugEvent::Paused { node_id, .. } => {
                paused_at.push(node_id);
                handle.step_over().await.unwrap();
            }
            DebugEvent::Finished { state } => {
                assert_eq!(state, DebugState::Completed);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(paused_at, vec!["loop1", "inc", "store", "inc", "store"]);

    let result = handle.take_result().await.unwrap();
    assert_eq!(result.variables["counter"], json!(2));
}

struct EngineExecutor {
    registry: Arc<NodeRegistry>,
    graphs: HashMap<String, Graph>,
    outputs: tokio::sync::Mutex<Vec<HashMap<String, Value>>>,
}

#[async_trait::async_trait]
impl ScheduleExecutor for EngineExecutor {
    async fn execute_workflow(&self, workflow_id: &str) {
        if let Some(graph) = self.graphs.get(workflow_id) {
            let result = ExecutionEngine::new(self.registry.clone())
                .run(graph, HashMap::new())
                .await;
            self.outputs.lock().await.push(result.outputs);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn scheduler_drives_engine_runs() {
    let mut graph = Graph::new();
    graph
        .add_node(WorkflowNode::new("tick", "timer", json!({})))
        .unwrap();
    graph
        .add_node(WorkflowNode::new(
            "grab",
            "transform",
            json!({ "operation": "get-field", "field": "interval_seconds" }),
        ))
        .unwrap();
    graph
        .add_node(WorkflowNode::new("out", "output", json!({ "name": "interval" })))
        .unwrap();
    graph.add_edge(Edge::new("tick", "grab")).unwrap();
    graph.add_edge(Edge::new("grab", "out")).unwrap();

    let mut graphs = HashMap::new();
    graphs.insert("wf1".to_string(), graph);
    let executor = Arc::new(EngineExecutor {
        registry: registry(),
        graphs,
        outputs: tokio::sync::Mutex::new(Vec::new()),
    });

    let scheduler = WorkflowScheduler::in_memory(executor.clone());
    assert!(
        scheduler
            .set_schedule(ScheduleConfig {
                workflow_id: "wf1".into(),
                cron_expression: "* * * * *".into(),
                name: "every minute".into(),
                enabled: true,
            })
            .await
    );

    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    tokio::task::yield_now().await;
    scheduler.stop_all();

    let outputs = executor.outputs.lock().await;
    assert!(!outputs.is_empty(), "scheduled run never fired");
    assert_eq!(outputs[0]["interval"], json!(60));
}

#[tokio::test]
async fn two_runs_do_not_share_state() {
    // Independent engine runs own their contexts; a variable written by one
    // run is invisible to a concurrent run.
    let mut graph_a = Graph::new();
    graph_a
        .add_node(WorkflowNode::new(
            "set",
            "variable",
            json!({ "key": "who", "value": "a" }),
        ))
        .unwrap();
    graph_a
        .add_node(WorkflowNode::new(
            "read",
            "code",
            json!({ "code": "return variables['who'];" }),
        ))
        .unwrap();
    graph_a.add_edge(Edge::new("set", "read")).unwrap();

    let mut graph_b = graph_a.clone();
    graph_b
        .update_node_data("set", json!({ "value": "b" }))
        .unwrap();

    let shared = registry();
    let engine_a = ExecutionEngine::new(shared.clone());
    let engine_b = ExecutionEngine::new(shared.clone());
    let (ra, rb) = tokio::join!(
        engine_a.run(&graph_a, HashMap::new()),
        engine_b.run(&graph_b, HashMap::new()),
    );
    assert_eq!(ra.outputs["read"], json!("a"));
    assert_eq!(rb.outputs["read"], json!("b"));
}
