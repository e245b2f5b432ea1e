//! Integration tests for complete graph runs
//!
//! These exercise the engine end to end: lazy data resolution, ordered
//! trigger dispatch, variables and events, streaming in both modes, the
//! gate, cancellation, and the background queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowgraph_core::{
    nodes, ConnectionData, EngineEvent, ErrorKind, ExecutionService, GraphData, GraphEvent,
    GraphVariable, HeadlessRunner, NodeBuilder, NodeData, NodeRegistry, RunOutcome, RunParams,
    SocketTypeRegistry, SocketValue, StreamMode,
};
use serde_json::json;

/// Shared recorder for observing node side effects in order
type Recorder = Arc<Mutex<Vec<String>>>;

fn record(recorder: &Recorder, entry: impl Into<String>) {
    recorder.lock().unwrap().push(entry.into());
}

fn recorded(recorder: &Recorder) -> Vec<String> {
    recorder.lock().unwrap().clone()
}

/// A callable node that records a label, then continues along Exit
fn marker_definition(id: &str, recorder: Recorder) -> flowgraph_core::NodeDefinition {
    NodeBuilder::new(id)
        .name(id)
        .category("Test")
        .callable()
        .on_execute(move |ctx, _cancel| {
            let recorder = recorder.clone();
            Box::pin(async move {
                record(&recorder, ctx.node_name().to_string());
                ctx.trigger("Exit").await
            })
        })
        .build()
}

/// A callable node that records its numeric input, then continues
fn consume_definition(id: &str, recorder: Recorder) -> flowgraph_core::NodeDefinition {
    NodeBuilder::new(id)
        .name(id)
        .category("Test")
        .callable()
        .input::<f64>("In")
        .on_execute(move |ctx, _cancel| {
            let recorder = recorder.clone();
            Box::pin(async move {
                let value: f64 = ctx.get_input("In").await?;
                record(&recorder, format!("{value}"));
                ctx.trigger("Exit").await
            })
        })
        .build()
}

fn service_with(defs: Vec<flowgraph_core::NodeDefinition>) -> Arc<ExecutionService> {
    let mut registry = NodeRegistry::new();
    registry.register_module(&nodes::standard_module()).unwrap();
    if !defs.is_empty() {
        registry
            .register_module(&flowgraph_core::StaticModule::new("test", defs))
            .unwrap();
    }
    Arc::new(ExecutionService::new(
        Arc::new(registry),
        Arc::new(SocketTypeRegistry::with_standard_conversions()),
    ))
}

fn make_node(service: &ExecutionService, definition_id: &str) -> NodeData {
    service
        .registry()
        .resolve_by_id(definition_id)
        .unwrap_or_else(|| panic!("unknown definition {definition_id}"))
        .create_node()
}

fn set_input_default(node: &mut NodeData, socket: &str, value: serde_json::Value) {
    let input = node
        .inputs
        .iter_mut()
        .find(|s| s.name == socket)
        .unwrap_or_else(|| panic!("no input {socket}"));
    let type_name = input.type_name.clone();
    input.value = Some(SocketValue::new(type_name, value));
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Names of started/completed nodes as ("started"|"completed", name) pairs
fn lifecycle(events: &[EngineEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::NodeStarted { node_name, .. } => {
                Some(("started".to_string(), node_name.clone()))
            }
            EngineEvent::NodeCompleted { node_name, .. } => {
                Some(("completed".to_string(), node_name.clone()))
            }
            _ => None,
        })
        .collect()
}

// ---- concrete scenarios --------------------------------------------------

#[tokio::test]
async fn test_adder_chain_resolves_lazily_in_input_order() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![consume_definition("test.consume", recorder.clone())]);

    let mut a = make_node(&service, "value.number");
    a.name = "A".into();
    set_input_default(&mut a, "Value", json!(2.0));
    let mut b = make_node(&service, "value.number");
    b.name = "B".into();
    set_input_default(&mut b, "Value", json!(3.0));
    let add = make_node(&service, "math.add");
    let start = make_node(&service, "flow.start");
    let consume = make_node(&service, "test.consume");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &consume.id, "Enter"),
            ConnectionData::data(&a.id, "Out", &add.id, "A"),
            ConnectionData::data(&b.id, "Out", &add.id, "B"),
            ConnectionData::data(&add.id, "Sum", &consume.id, "In"),
        ],
        nodes: vec![a, b, add.clone(), start, consume],
        ..Default::default()
    };

    let params = RunParams::default();
    let mut rx = params.bus.subscribe();
    let result = service.execute(&graph, params).await;

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(recorded(&recorder), vec!["5"]);

    // Lazy pull order: the consumer starts before its upstream chain, and
    // inputs resolve in declaration order (A before B).
    let events = lifecycle(&drain_events(&mut rx));
    let expected = [
        ("started", "Start"),
        ("started", "test.consume"),
        ("started", "Add"),
        ("started", "A"),
        ("completed", "A"),
        ("started", "B"),
        ("completed", "B"),
        ("completed", "Add"),
        ("completed", "test.consume"),
        ("completed", "Start"),
    ];
    let expected: Vec<(String, String)> = expected
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
    assert_eq!(events, expected);
}

#[tokio::test]
async fn test_branch_takes_only_the_true_path() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![
        marker_definition("test.marker_true", recorder.clone()),
        marker_definition("test.marker_false", recorder.clone()),
    ]);

    let start = make_node(&service, "flow.start");
    let mut branch = make_node(&service, "flow.branch");
    set_input_default(&mut branch, "Condition", json!(true));
    let marker_true = make_node(&service, "test.marker_true");
    let marker_false = make_node(&service, "test.marker_false");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &branch.id, "Enter"),
            ConnectionData::execution(&branch.id, "True", &marker_true.id, "Enter"),
            ConnectionData::execution(&branch.id, "False", &marker_false.id, "Enter"),
        ],
        nodes: vec![start, branch, marker_true, marker_false],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success());
    assert_eq!(recorded(&recorder), vec!["test.marker_true"]);
}

#[tokio::test]
async fn test_for_loop_runs_body_per_index_then_exit() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![
        consume_definition("test.print", recorder.clone()),
        marker_definition("test.done", recorder.clone()),
    ]);

    let start = make_node(&service, "flow.start");
    let mut for_loop = make_node(&service, "flow.for_loop");
    set_input_default(&mut for_loop, "Times", json!(3));
    let print = make_node(&service, "test.print");
    let done = make_node(&service, "test.done");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &for_loop.id, "Enter"),
            ConnectionData::execution(&for_loop.id, "LoopBody", &print.id, "Enter"),
            ConnectionData::execution(&for_loop.id, "Exit", &done.id, "Enter"),
            ConnectionData::data(&for_loop.id, "Index", &print.id, "In"),
        ],
        nodes: vec![start, for_loop, print, done],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(recorded(&recorder), vec!["0", "1", "2", "test.done"]);
}

#[tokio::test]
async fn test_for_loop_zero_times_triggers_only_exit() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![
        consume_definition("test.print", recorder.clone()),
        marker_definition("test.done", recorder.clone()),
    ]);

    let start = make_node(&service, "flow.start");
    let for_loop = make_node(&service, "flow.for_loop"); // Times default 0
    let print = make_node(&service, "test.print");
    let done = make_node(&service, "test.done");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &for_loop.id, "Enter"),
            ConnectionData::execution(&for_loop.id, "LoopBody", &print.id, "Enter"),
            ConnectionData::execution(&for_loop.id, "Exit", &done.id, "Enter"),
        ],
        nodes: vec![start, for_loop, print, done],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success());
    assert_eq!(recorded(&recorder), vec!["test.done"]);
}

#[tokio::test]
async fn test_exec_cycle_fails_with_depth_exceeded() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![
        marker_definition("test.a", recorder.clone()),
        marker_definition("test.b", recorder.clone()),
    ]);

    let start = make_node(&service, "flow.start");
    let a = make_node(&service, "test.a");
    let b = make_node(&service, "test.b");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &a.id, "Enter"),
            ConnectionData::execution(&a.id, "Exit", &b.id, "Enter"),
            ConnectionData::execution(&b.id, "Exit", &a.id, "Enter"),
        ],
        nodes: vec![start, a, b],
        ..Default::default()
    };

    // The validator tolerates the cycle with a warning.
    let report = flowgraph_core::GraphValidator::validate(&graph.nodes, &graph.connections);
    assert!(!report.has_errors());
    assert!(report
        .messages
        .iter()
        .any(|m| m.message.contains("execution-flow cycle")));

    let mut params = RunParams::default();
    params.options.max_call_depth = 64;
    let result = service.execute(&graph, params).await;

    let failure = result.error.expect("run should fail");
    assert_eq!(failure.kind, ErrorKind::ExecDepthExceeded);
    assert!(
        failure.message.contains("test.a") || failure.message.contains("test.b"),
        "message should name the offending node: {}",
        failure.message
    );
}

#[tokio::test]
async fn test_data_cycle_is_rejected_before_execution() {
    let service = service_with(vec![]);
    let runner = HeadlessRunner::new(service.clone());

    let mut a = make_node(&service, "math.add");
    a.name = "CycleA".into();
    let mut b = make_node(&service, "math.add");
    b.name = "CycleB".into();

    let graph = GraphData {
        connections: vec![
            ConnectionData::data(&a.id, "Sum", &b.id, "A"),
            ConnectionData::data(&b.id, "Sum", &a.id, "A"),
        ],
        nodes: vec![a, b],
        ..Default::default()
    };

    match runner.run_graph(&graph, RunParams::default()).await {
        RunOutcome::Rejected(report) => {
            assert!(report.has_errors());
            assert!(report
                .first_error()
                .unwrap()
                .message
                .contains("data-flow cycle"));
        }
        RunOutcome::Finished(_) => panic!("validator must reject the graph"),
    }
}

#[tokio::test]
async fn test_fire_and_forget_stream_joins_before_completed() {
    let recorder: Recorder = Default::default();

    let producer = NodeBuilder::new("test.producer")
        .name("Producer")
        .category("Test")
        .execution_initiator()
        .stream_output_with::<i64>("Item", "OnItem", Some("Completed"), StreamMode::FireAndForget)
        .on_execute(|ctx, _cancel| {
            Box::pin(async move {
                for item in 0..5i64 {
                    ctx.emit("Item", item).await?;
                }
                ctx.trigger("Completed").await
            })
        })
        .build();

    let item_recorder = recorder.clone();
    let item_sink = NodeBuilder::new("test.item_sink")
        .name("ItemSink")
        .category("Test")
        .callable()
        .on_execute(move |ctx, _cancel| {
            let recorder = item_recorder.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                record(&recorder, "item");
                ctx.trigger("Exit").await
            })
        })
        .build();

    let service = service_with(vec![
        producer,
        item_sink,
        marker_definition("test.done", recorder.clone()),
    ]);

    let producer = make_node(&service, "test.producer");
    let sink = make_node(&service, "test.item_sink");
    let done = make_node(&service, "test.done");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&producer.id, "OnItem", &sink.id, "Enter"),
            ConnectionData::execution(&producer.id, "Completed", &done.id, "Enter"),
        ],
        nodes: vec![producer, sink, done],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success(), "{:?}", result.error);

    // All five detached item subtrees finish before the Completed path runs.
    let entries = recorded(&recorder);
    assert_eq!(entries.len(), 6);
    assert_eq!(entries[5], "test.done");
    assert!(entries[..5].iter().all(|e| e == "item"));
}

#[tokio::test]
async fn test_sequential_stream_delivers_items_in_order() {
    let recorder: Recorder = Default::default();

    let producer = NodeBuilder::new("test.seq_producer")
        .name("SeqProducer")
        .category("Test")
        .execution_initiator()
        .stream_output::<i64>("Item", "OnItem")
        .on_execute(|ctx, _cancel| {
            Box::pin(async move {
                for item in 0..4i64 {
                    ctx.emit("Item", item).await?;
                }
                ctx.trigger("Exit").await
            })
        })
        .build();

    let sink_recorder = recorder.clone();
    let sink = NodeBuilder::new("test.seq_sink")
        .name("SeqSink")
        .category("Test")
        .callable()
        .input::<i64>("In")
        .on_execute(move |ctx, _cancel| {
            let recorder = sink_recorder.clone();
            Box::pin(async move {
                let item: i64 = ctx.get_input("In").await?;
                record(&recorder, format!("{item}"));
                ctx.trigger("Exit").await
            })
        })
        .build();

    let service = service_with(vec![producer, sink]);
    let producer = make_node(&service, "test.seq_producer");
    let sink = make_node(&service, "test.seq_sink");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&producer.id, "OnItem", &sink.id, "Enter"),
            ConnectionData::data(&producer.id, "Item", &sink.id, "In"),
        ],
        nodes: vec![producer, sink],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(recorded(&recorder), vec!["0", "1", "2", "3"]);
}

// ---- variables and events ------------------------------------------------

#[tokio::test]
async fn test_variable_seed_set_and_get() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![consume_definition("test.consume", recorder.clone())]);

    let start = make_node(&service, "flow.start");
    let mut value = make_node(&service, "value.number");
    set_input_default(&mut value, "Value", json!(42.0));

    let set_node = NodeData {
        id: "set1".into(),
        name: "Set counter".into(),
        definition_id: "variable.set.v1".into(),
        callable: true,
        exec_init: false,
        inputs: vec![
            flowgraph_core::SocketData::execution("Enter", true),
            flowgraph_core::SocketData::data("Value", "f64", true),
        ],
        outputs: vec![
            flowgraph_core::SocketData::execution("Exit", false),
            flowgraph_core::SocketData::data("Value", "f64", false),
        ],
    };
    let get_node = NodeData {
        id: "get1".into(),
        name: "Get counter".into(),
        definition_id: "variable.get.v1".into(),
        callable: false,
        exec_init: false,
        inputs: vec![],
        outputs: vec![flowgraph_core::SocketData::data("Value", "f64", false)],
    };
    let consume = make_node(&service, "test.consume");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", "set1", "Enter"),
            ConnectionData::execution("set1", "Exit", &consume.id, "Enter"),
            ConnectionData::data(&value.id, "Out", "set1", "Value"),
            ConnectionData::data("get1", "Value", &consume.id, "In"),
        ],
        nodes: vec![start, value, set_node, get_node, consume],
        variables: vec![GraphVariable {
            id: "v1".into(),
            name: "counter".into(),
            type_name: "f64".into(),
            default_value: Some(SocketValue::new("f64", json!(10.0))),
        }],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success(), "{:?}", result.error);
    // Seeded 10, overwritten to 42 before the read.
    assert_eq!(recorded(&recorder), vec!["42"]);
}

#[tokio::test]
async fn test_event_trigger_drives_listener_exit_path() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![marker_definition("test.handled", recorder.clone())]);

    let start = make_node(&service, "flow.start");
    let trigger = NodeData {
        id: "trig1".into(),
        name: "Fire tick".into(),
        definition_id: "event.trigger.e1".into(),
        callable: true,
        exec_init: false,
        inputs: vec![flowgraph_core::SocketData::execution("Enter", true)],
        outputs: vec![flowgraph_core::SocketData::execution("Exit", false)],
    };
    let listener = NodeData {
        id: "listen1".into(),
        name: "On tick".into(),
        definition_id: "event.listener.e1".into(),
        callable: true,
        exec_init: true,
        inputs: vec![],
        outputs: vec![flowgraph_core::SocketData::execution("Exit", false)],
    };
    let handled = make_node(&service, "test.handled");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", "trig1", "Enter"),
            ConnectionData::execution("listen1", "Exit", &handled.id, "Enter"),
        ],
        nodes: vec![start, trigger, listener, handled],
        events: vec![GraphEvent {
            id: "e1".into(),
            name: "tick".into(),
        }],
        ..Default::default()
    };

    let params = RunParams::default();
    let mut rx = params.bus.subscribe();
    let result = service.execute(&graph, params).await;

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(recorded(&recorder), vec!["test.handled"]);
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, EngineEvent::EventFired { event_id } if event_id == "e1")));
}

// ---- gate, cancellation, errors -----------------------------------------

#[tokio::test]
async fn test_gate_step_through_runs_one_dispatch_at_a_time() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![
        marker_definition("test.m1", recorder.clone()),
        marker_definition("test.m2", recorder.clone()),
    ]);

    let start = make_node(&service, "flow.start");
    let m1 = make_node(&service, "test.m1");
    let m2 = make_node(&service, "test.m2");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &m1.id, "Enter"),
            ConnectionData::execution(&m1.id, "Exit", &m2.id, "Enter"),
        ],
        nodes: vec![start, m1, m2],
        ..Default::default()
    };

    let params = RunParams::default();
    let gate = params.gate.clone();
    gate.pause();

    let run = {
        let service = service.clone();
        tokio::spawn(async move { service.execute(&graph, params).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recorded(&recorder).is_empty());

    // Step 1 releases the initiator, which then parks before m1.
    gate.step_once();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recorded(&recorder).is_empty());

    // Step 2 releases m1.
    gate.step_once();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorded(&recorder), vec!["test.m1"]);

    gate.resume();
    let result = run.await.unwrap();
    assert!(result.is_success());
    assert_eq!(recorded(&recorder), vec!["test.m1", "test.m2"]);
}

#[tokio::test]
async fn test_cancellation_unwinds_before_downstream_dispatch() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![marker_definition("test.after", recorder.clone())]);

    let start = make_node(&service, "flow.start");
    let mut delay = make_node(&service, "flow.delay");
    set_input_default(&mut delay, "Seconds", json!(5.0));
    let after = make_node(&service, "test.after");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &delay.id, "Enter"),
            ConnectionData::execution(&delay.id, "Exit", &after.id, "Enter"),
        ],
        nodes: vec![start, delay, after],
        ..Default::default()
    };

    let params = RunParams::default();
    let cancel = params.cancel.clone();
    let run = {
        let service = service.clone();
        tokio::spawn(async move { service.execute(&graph, params).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = run.await.unwrap();
    assert_eq!(result.error.unwrap().kind, ErrorKind::Cancelled);
    assert!(recorded(&recorder).is_empty());
}

#[tokio::test]
async fn test_user_fault_carries_node_context_and_cancels_peers() {
    let recorder: Recorder = Default::default();

    let failing = NodeBuilder::new("test.failing")
        .name("Failing")
        .category("Test")
        .execution_initiator()
        .on_execute(|ctx, _cancel| {
            Box::pin(async move {
                Err(flowgraph_core::EngineError::node(
                    ctx.node_name(),
                    "boom",
                ))
            })
        })
        .build();

    let service = service_with(vec![failing, marker_definition("test.slow", recorder.clone())]);

    let fail_node = make_node(&service, "test.failing");
    let start = make_node(&service, "flow.start");
    let mut delay = make_node(&service, "flow.delay");
    set_input_default(&mut delay, "Seconds", json!(5.0));
    let slow = make_node(&service, "test.slow");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start.id, "Exit", &delay.id, "Enter"),
            ConnectionData::execution(&delay.id, "Exit", &slow.id, "Enter"),
        ],
        nodes: vec![fail_node, start, delay, slow],
        ..Default::default()
    };

    let mut params = RunParams::default();
    params.options.max_parallelism = 2;
    let mut rx = params.bus.subscribe();
    let result = service.execute(&graph, params).await;

    let failure = result.error.expect("run must fail");
    assert_eq!(failure.kind, ErrorKind::UserFault);
    assert!(failure.message.contains("Failing"));
    assert!(recorded(&recorder).is_empty(), "peer initiator must unwind");

    assert!(drain_events(&mut rx).iter().any(|e| matches!(
        e,
        EngineEvent::NodeFailed { node_name, kind: ErrorKind::UserFault, .. }
            if node_name == "Failing"
    )));
}

#[tokio::test]
async fn test_parallel_initiators_both_run() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![
        marker_definition("test.m1", recorder.clone()),
        marker_definition("test.m2", recorder.clone()),
    ]);

    let start1 = make_node(&service, "flow.start");
    let start2 = make_node(&service, "flow.start");
    let m1 = make_node(&service, "test.m1");
    let m2 = make_node(&service, "test.m2");

    let graph = GraphData {
        connections: vec![
            ConnectionData::execution(&start1.id, "Exit", &m1.id, "Enter"),
            ConnectionData::execution(&start2.id, "Exit", &m2.id, "Enter"),
        ],
        nodes: vec![start1, start2, m1, m2],
        ..Default::default()
    };

    let mut params = RunParams::default();
    params.options.max_parallelism = 2;
    let result = service.execute(&graph, params).await;

    assert!(result.is_success());
    let mut entries = recorded(&recorder);
    entries.sort();
    assert_eq!(entries, vec!["test.m1", "test.m2"]);
}

#[tokio::test]
async fn test_missing_definition_fails_fast() {
    let service = service_with(vec![]);

    let ghost = NodeData {
        id: "ghost".into(),
        name: "NoSuchNode".into(),
        definition_id: "missing.def".into(),
        callable: true,
        exec_init: true,
        inputs: vec![],
        outputs: vec![],
    };
    let graph = GraphData {
        nodes: vec![ghost],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    let failure = result.error.expect("must fail fast");
    assert_eq!(failure.kind, ErrorKind::DefinitionMissing);
    assert!(failure.message.contains("missing.def"));
}

#[tokio::test]
async fn test_display_name_fallback_resolves_definition() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![marker_definition("test.marked", recorder.clone())]);

    // Persisted with a stale definition id but a matching display name.
    let mut stale = make_node(&service, "test.marked");
    stale.definition_id = "test.renamed_long_ago".into();
    let start = make_node(&service, "flow.start");

    let graph = GraphData {
        connections: vec![ConnectionData::execution(
            &start.id, "Exit", &stale.id, "Enter",
        )],
        nodes: vec![start, stale],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(recorded(&recorder), vec!["test.marked"]);
}

// ---- boundary behaviors --------------------------------------------------

#[tokio::test]
async fn test_empty_graph_completes_with_no_events() {
    let service = service_with(vec![]);
    let params = RunParams::default();
    let mut rx = params.bus.subscribe();

    let result = service.execute(&GraphData::default(), params).await;
    assert!(result.is_success());
    assert!(drain_events(&mut rx).is_empty());
}

#[tokio::test]
async fn test_disconnected_graph_dispatches_nothing() {
    let service = service_with(vec![]);

    // Pure nodes only: no initiators, so nothing executes.
    let a = make_node(&service, "value.number");
    let add = make_node(&service, "math.add");
    let graph = GraphData {
        nodes: vec![a, add],
        ..Default::default()
    };

    let params = RunParams::default();
    let mut rx = params.bus.subscribe();
    let result = service.execute(&graph, params).await;

    assert!(result.is_success());
    assert!(lifecycle(&drain_events(&mut rx)).is_empty());
}

#[tokio::test]
async fn test_pure_data_graph_is_deterministic_across_runs() {
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let recorder: Recorder = Default::default();
        let service = service_with(vec![consume_definition("test.consume", recorder.clone())]);

        let mut a = make_node(&service, "value.number");
        set_input_default(&mut a, "Value", json!(4.0));
        let mut mul = make_node(&service, "math.multiply");
        set_input_default(&mut mul, "B", json!(2.5));
        let start = make_node(&service, "flow.start");
        let consume = make_node(&service, "test.consume");

        let graph = GraphData {
            connections: vec![
                ConnectionData::execution(&start.id, "Exit", &consume.id, "Enter"),
                ConnectionData::data(&a.id, "Out", &mul.id, "A"),
                ConnectionData::data(&mul.id, "Product", &consume.id, "In"),
            ],
            nodes: vec![a, mul, start, consume],
            ..Default::default()
        };

        let result = service.execute(&graph, RunParams::default()).await;
        assert!(result.is_success());
        outputs.push(recorded(&recorder));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], vec!["10"]);
}

#[tokio::test]
async fn test_document_round_trip_through_runner() {
    let recorder: Recorder = Default::default();
    let service = service_with(vec![marker_definition("test.marked", recorder.clone())]);
    let runner = HeadlessRunner::new(service.clone());

    let start = make_node(&service, "flow.start");
    let marked = make_node(&service, "test.marked");
    let graph = GraphData {
        connections: vec![ConnectionData::execution(
            &start.id, "Exit", &marked.id, "Enter",
        )],
        nodes: vec![start, marked],
        ..Default::default()
    };

    let text = flowgraph_core::GraphDocument::from_graph(graph).to_json().unwrap();
    match runner.run_json(&text, RunParams::default()).await.unwrap() {
        RunOutcome::Finished(result) => assert!(result.is_success()),
        RunOutcome::Rejected(report) => panic!("unexpected rejection: {report:?}"),
    }
    assert_eq!(recorded(&recorder), vec!["test.marked"]);
}

#[tokio::test]
async fn test_feedback_messages_land_in_run_result() {
    let service = service_with(vec![]);

    let start = make_node(&service, "flow.start");
    let mut log = make_node(&service, "flow.log");
    set_input_default(&mut log, "Message", json!("hello from the graph"));

    let graph = GraphData {
        connections: vec![ConnectionData::execution(&start.id, "Exit", &log.id, "Enter")],
        nodes: vec![start, log],
        ..Default::default()
    };

    let result = service.execute(&graph, RunParams::default()).await;
    assert!(result.is_success());
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].text, "hello from the graph");
    assert_eq!(result.messages[0].tag.as_deref(), Some("log"));
}
