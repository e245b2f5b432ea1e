//! # flowgraph-core - Dataflow + Control-Flow Graph Execution
//!
//! Execution engine for visual node graphs: a directed multigraph whose
//! **data edges** propagate values lazily and whose **execution edges**
//! sequence control flow through a coroutine-style trigger model.
//!
//! ## Core Concepts
//!
//! - **Nodes** are stamped from registered [`NodeDefinition`]s: either class
//!   nodes (a type with `configure` + `execute`) or inline closures.
//! - **Triggering** an execution output suspends the caller until the whole
//!   downstream subtree completes; targets run in connection insertion
//!   order. Control branches are explicit: a node continues by choosing
//!   which output to trigger.
//! - **Data is pulled, not pushed**: reading an input executes
//!   not-yet-executed pure upstream nodes first, at most once per
//!   generation.
//! - **Streams** let a producer emit items into its downstream subgraph,
//!   awaited per item or detached and joined at the stream's `Completed`
//!   socket.
//! - **The gate** pauses, resumes, and single-steps a run; a shared
//!   cancellation token unwinds it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flowgraph_core::{
//!     nodes, ConnectionData, ExecutionService, GraphData, HeadlessRunner,
//!     NodeRegistry, RunParams, SocketTypeRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = NodeRegistry::new();
//!     registry.register_module(&nodes::standard_module()).unwrap();
//!
//!     let service = Arc::new(ExecutionService::new(
//!         Arc::new(registry),
//!         Arc::new(SocketTypeRegistry::with_standard_conversions()),
//!     ));
//!     let runner = HeadlessRunner::new(service.clone());
//!
//!     let start = service.registry().resolve_by_id("flow.start").unwrap().create_node();
//!     let log = service.registry().resolve_by_id("flow.log").unwrap().create_node();
//!     let graph = GraphData {
//!         connections: vec![ConnectionData::execution(&start.id, "Exit", &log.id, "Enter")],
//!         nodes: vec![start, log],
//!         ..Default::default()
//!     };
//!
//!     runner.run_graph(&graph, RunParams::default()).await;
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`model`] - Immutable graph data: nodes, sockets, connections,
//!   variables, events
//! - [`document`] - Persisted JSON shape with editor geometry
//! - [`builder`] - Fluent [`NodeDefinition`] construction
//! - [`node`] - The `GraphNode` capability, modules, service container
//! - [`registry`] - Definition discovery and lookup
//! - [`validate`] - Pre-execution plan validation
//! - [`storage`] - Per-run socket/variable/executed storage
//! - [`runtime`] - The per-run orchestrator
//! - [`context`] - The per-node execution façade
//! - [`variables`] - Synthetic variable/event node definitions
//! - [`gate`] - Pause / resume / step
//! - [`events`] - Engine events and the run's bus
//! - [`service`] - The run entry point
//! - [`queue`] - Background fire-and-forget runs
//! - [`runner`] - Headless document-in, result-out driver
//! - [`nodes`] - Built-in flow-control and value primitives
//! - [`convert`] - Socket type names and value coercion
//! - [`error`] - The error taxonomy

pub mod builder;
pub mod context;
pub mod convert;
pub mod document;
pub mod error;
pub mod events;
pub mod gate;
pub mod model;
pub mod node;
pub mod nodes;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod service;
pub mod storage;
pub mod validate;
pub mod variables;

// Re-export main types
pub use builder::{NodeBuilder, NodeDefinition, StreamMode, StreamSocketInfo};
pub use context::NodeContext;
pub use convert::SocketTypeRegistry;
pub use document::{GraphDocument, LoadOutcome, SCHEMA_VERSION};
pub use error::{EngineError, ErrorKind, Result};
pub use events::{EngineEvent, EventBus, FeedbackMessage, FeedbackSeverity};
pub use gate::{ExecutionGate, GateState};
pub use model::{
    ConnectionData, GraphData, GraphEvent, GraphVariable, NodeData, SocketData, SocketValue,
    ENTER_SOCKET, EXEC_TYPE, EXIT_SOCKET,
};
pub use node::{GraphNode, NodeModule, ServiceContainer, StaticModule};
pub use queue::{BackgroundQueue, ExecutionJob};
pub use registry::NodeRegistry;
pub use runner::{apply_variable_overrides, HeadlessRunner, RunOutcome};
pub use runtime::{ExecutionOptions, ExecutionRuntime};
pub use service::{ExecutionService, RunFailure, RunParams, RunResult};
pub use storage::RuntimeStorage;
pub use validate::{Diagnostic, GraphValidator, Severity, ValidationReport};
