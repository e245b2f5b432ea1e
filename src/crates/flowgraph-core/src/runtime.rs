//! Per-run execution orchestrator
//!
//! An [`ExecutionRuntime`] is constructed per run from the immutable graph
//! and drives all dispatch. Construction builds the connection maps in one
//! O(N+E) pass; dispatch then works entirely against those maps, the shared
//! [`RuntimeStorage`], and the run's gate, bus, and cancellation token.
//!
//! Control flow is a tree of awaited calls: a trigger suspends until the
//! downstream subtree completes. Data flow is pulled lazily: resolving a
//! node's inputs executes not-yet-executed pure upstream nodes first. Two
//! defenses bound runaway graphs: the call-depth guard (execution cycles)
//! and the per-resolution path set (data cycles, normally already rejected
//! by validation).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::builder::{NodeDefinition, NodeExecutorKind, StreamMode, StreamSocketInfo};
use crate::context::NodeContext;
use crate::convert::SocketTypeRegistry;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus, FeedbackMessage, FeedbackSeverity};
use crate::gate::ExecutionGate;
use crate::model::{ConnectionData, NodeData, SocketData, SocketValue, EXIT_SOCKET};
use crate::node::{GraphNode, ServiceContainer};
use crate::registry::NodeRegistry;
use crate::storage::RuntimeStorage;
use crate::variables::{self, SpecialNode, VALUE_SOCKET};

/// Per-run tuning knobs
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Dispatch nesting limit; execution cycles trip this
    pub max_call_depth: usize,
    /// Upper bound on concurrently running initiators
    pub max_parallelism: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_parallelism: 1,
        }
    }
}

impl ExecutionOptions {
    /// Defaults with `ENGINE_MAX_CALL_DEPTH` / `ENGINE_MAX_PARALLELISM`
    /// overrides applied
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(depth) = read_env_usize("ENGINE_MAX_CALL_DEPTH") {
            options.max_call_depth = depth;
        }
        if let Some(parallelism) = read_env_usize("ENGINE_MAX_PARALLELISM") {
            options.max_parallelism = parallelism;
        }
        options
    }
}

fn read_env_usize(key: &str) -> Option<usize> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(value) if value > 0 => Some(value),
            _ => {
                warn!(var = key, value = %raw, "ignoring non-positive or unparsable override");
                None
            }
        },
        Err(_) => None,
    }
}

/// Decrements the shared depth counter when a dispatch frame unwinds
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The per-run orchestrator
pub struct ExecutionRuntime {
    /// Self-handle for boxed recursion and detached stream tasks
    weak_self: Weak<ExecutionRuntime>,
    /// node id -> node
    nodes: HashMap<String, NodeData>,
    /// `(node, exec output)` -> targets in connection insertion order
    exec_out: HashMap<(String, String), Vec<(String, String)>>,
    /// `(node, data input)` -> single source
    data_in: HashMap<(String, String), (String, String)>,
    /// node id -> resolved definition (class and inline nodes only)
    definitions: HashMap<String, Arc<NodeDefinition>>,
    /// node id -> live instance; populated lazily
    instances: DashMap<String, Arc<dyn GraphNode>>,
    /// node ids whose `on_created` already ran this run
    created: DashSet<String>,
    /// `(node, completed socket)` -> detached stream tasks awaiting join
    pending_streams: Mutex<HashMap<(String, String), Vec<JoinHandle<()>>>>,
    storage: Arc<RuntimeStorage>,
    services: Arc<ServiceContainer>,
    types: Arc<SocketTypeRegistry>,
    gate: Arc<ExecutionGate>,
    bus: Arc<EventBus>,
    options: ExecutionOptions,
    cancel: CancellationToken,
    call_depth: AtomicUsize,
}

impl ExecutionRuntime {
    /// Build the runtime for one run
    ///
    /// Fails fast with [`EngineError::DefinitionMissing`] when any
    /// non-special node resolves no definition (id first, display name as a
    /// logged fallback) and with [`EngineError::NoImplementation`] when a
    /// resolved definition carries no executor.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nodes: &[NodeData],
        connections: &[ConnectionData],
        storage: Arc<RuntimeStorage>,
        services: Arc<ServiceContainer>,
        registry: &NodeRegistry,
        gate: Arc<ExecutionGate>,
        bus: Arc<EventBus>,
        types: Arc<SocketTypeRegistry>,
        options: ExecutionOptions,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        let mut node_map = HashMap::with_capacity(nodes.len());
        let mut definitions = HashMap::new();

        for node in nodes {
            if variables::recognize(&node.definition_id).is_none() {
                let definition = registry
                    .resolve_by_id(&node.definition_id)
                    .or_else(|| registry.resolve_by_name(&node.name))
                    .ok_or_else(|| {
                        EngineError::definition_missing(&node.name, &node.definition_id)
                    })?;
                if definition.executor.is_none() {
                    return Err(EngineError::NoImplementation(definition.id.clone()));
                }
                definitions.insert(node.id.clone(), definition);
            }
            node_map.insert(node.id.clone(), node.clone());
        }

        let mut exec_out: HashMap<(String, String), Vec<(String, String)>> = HashMap::new();
        let mut data_in: HashMap<(String, String), (String, String)> = HashMap::new();
        for conn in connections {
            if conn.is_execution {
                exec_out
                    .entry((conn.output_node_id.clone(), conn.output_socket_name.clone()))
                    .or_default()
                    .push((conn.input_node_id.clone(), conn.input_socket_name.clone()));
            } else {
                let key = (conn.input_node_id.clone(), conn.input_socket_name.clone());
                if data_in.contains_key(&key) {
                    warn!(
                        node = %conn.input_node_id,
                        socket = %conn.input_socket_name,
                        "ignoring extra data connection into an already-bound input"
                    );
                    continue;
                }
                data_in.insert(
                    key,
                    (conn.output_node_id.clone(), conn.output_socket_name.clone()),
                );
            }
        }

        Ok(Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            nodes: node_map,
            exec_out,
            data_in,
            definitions,
            instances: DashMap::new(),
            created: DashSet::new(),
            pending_streams: Mutex::new(HashMap::new()),
            storage,
            services,
            types,
            gate,
            bus,
            options,
            cancel,
            call_depth: AtomicUsize::new(0),
        }))
    }

    fn shared(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("runtime owner dropped mid-dispatch")
    }

    /// The run's storage
    pub fn storage(&self) -> &Arc<RuntimeStorage> {
        &self.storage
    }

    /// The run's service container
    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    /// The run's socket type registry
    pub fn types(&self) -> &Arc<SocketTypeRegistry> {
        &self.types
    }

    /// The run's event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The run's gate
    pub fn gate(&self) -> &Arc<ExecutionGate> {
        &self.gate
    }

    /// The run's cancellation token
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Configured options
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// A node known to this run, by id
    pub fn node(&self, node_id: &str) -> Option<&NodeData> {
        self.nodes.get(node_id)
    }

    /// Execute one node by id, as a fresh dispatch root
    pub async fn execute_node_by_id(&self, node_id: &str) -> Result<()> {
        self.dispatch(node_id.to_string(), Vec::new()).await
    }

    /// Boxed recursion point shared by triggers and lazy data resolution
    fn dispatch(&self, node_id: String, resolve_path: Vec<String>) -> BoxFuture<'static, Result<()>> {
        let runtime = self.shared();
        Box::pin(async move { runtime.dispatch_inner(node_id, resolve_path).await })
    }

    async fn dispatch_inner(&self, node_id: String, resolve_path: Vec<String>) -> Result<()> {
        let Some(node) = self.nodes.get(&node_id).cloned() else {
            // Unknown targets are skipped, not failed; validation reports them.
            return Ok(());
        };

        // Data-cycle defense: revisiting a node mid-resolution is the back edge.
        if resolve_path.contains(&node_id) {
            let mut path = resolve_path;
            path.push(node_id);
            return Err(EngineError::DataCycle { path });
        }

        // At-most-once claim for non-callable nodes; the atomic insert is the
        // idempotency check and the mark in one step.
        if !node.callable && !self.storage.mark_executed(&node_id) {
            return Ok(());
        }

        let depth = self.call_depth.fetch_add(1, Ordering::SeqCst) + 1;
        let _depth_guard = DepthGuard(&self.call_depth);
        if depth > self.options.max_call_depth {
            return Err(EngineError::ExecDepthExceeded {
                node: node.name.clone(),
                limit: self.options.max_call_depth,
            });
        }

        trace!(node = %node.name, depth, "dispatching node");
        self.bus.publish(EngineEvent::NodeStarted {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
        });

        let result = self.run_node(&node, resolve_path).await;
        match &result {
            Ok(()) => self.bus.publish(EngineEvent::NodeCompleted {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
            }),
            Err(err) => self.bus.publish(EngineEvent::NodeFailed {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
        result
    }

    async fn run_node(&self, node: &NodeData, resolve_path: Vec<String>) -> Result<()> {
        let mut path = resolve_path;
        path.push(node.id.clone());
        self.resolve_inputs(node, &path).await?;

        match variables::recognize(&node.definition_id) {
            Some(SpecialNode::VariableGet(variable_id)) => {
                if let Some(value) = self.storage.get_variable(variable_id) {
                    self.storage.set(&node.id, VALUE_SOCKET, value);
                }
                Ok(())
            }
            Some(SpecialNode::VariableSet(variable_id)) => {
                // The flat store keys input and output `Value` identically,
                // so the write-through below doubles as the pass-through
                // mirror read by downstream data edges.
                if let Some(value) = self.storage.get(&node.id, VALUE_SOCKET) {
                    self.storage.set_variable(variable_id, value);
                }
                self.trigger_exec_output(&node.id, EXIT_SOCKET).await
            }
            Some(SpecialNode::EventTrigger(event_id)) => {
                self.bus.fire(event_id).await;
                self.trigger_exec_output(&node.id, EXIT_SOCKET).await
            }
            Some(SpecialNode::EventListener(_)) => {
                // Reached as an initiator: the bus drives its Exit path.
                Ok(())
            }
            None => self.run_defined_node(node).await,
        }
    }

    async fn run_defined_node(&self, node: &NodeData) -> Result<()> {
        let definition = self
            .definitions
            .get(&node.id)
            .cloned()
            .ok_or_else(|| EngineError::definition_missing(&node.name, &node.definition_id))?;

        let ctx = NodeContext::new(
            self.shared(),
            node.id.clone(),
            node.name.clone(),
            definition.clone(),
        );
        match definition
            .executor
            .as_ref()
            .ok_or_else(|| EngineError::NoImplementation(definition.id.clone()))?
        {
            NodeExecutorKind::Inline(executor) => executor(ctx, self.cancel.clone()).await,
            NodeExecutorKind::Class(_) => {
                let instance = self.instance(&node.id)?;
                if self.created.insert(node.id.clone()) {
                    instance.on_created(&self.services).await?;
                }
                instance.execute(&ctx, &self.cancel).await
            }
        }
    }

    /// Fetch or lazily create the instance for a class node
    pub(crate) fn instance(&self, node_id: &str) -> Result<Arc<dyn GraphNode>> {
        if let Some(existing) = self.instances.get(node_id) {
            return Ok(existing.clone());
        }
        let definition = self
            .definitions
            .get(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
        match definition.executor.as_ref() {
            Some(NodeExecutorKind::Class(factory)) => Ok(self
                .instances
                .entry(node_id.to_string())
                .or_insert_with(|| factory())
                .clone()),
            _ => Err(EngineError::NoImplementation(definition.id.clone())),
        }
    }

    /// Pre-instantiate every class node and run `on_created` once
    pub(crate) async fn create_instances(&self) -> Result<()> {
        let class_nodes: Vec<String> = self
            .definitions
            .iter()
            .filter(|(_, d)| matches!(d.executor, Some(NodeExecutorKind::Class(_))))
            .map(|(id, _)| id.clone())
            .collect();
        for node_id in class_nodes {
            let instance = self.instance(&node_id)?;
            if self.created.insert(node_id.clone()) {
                instance.on_created(&self.services).await?;
            }
        }
        Ok(())
    }

    /// Drop all instances and abort unjoined stream handles
    pub(crate) fn dispose(&self) {
        self.instances.clear();
        self.created.clear();
        let mut pending = self.pending_streams.lock().expect("stream map poisoned");
        for (_, handles) in pending.drain() {
            for handle in handles {
                handle.abort();
            }
        }
    }

    // ---- data resolution -------------------------------------------------

    /// Resolve every non-execution input of a node before its executor runs
    async fn resolve_inputs(&self, node: &NodeData, path: &[String]) -> Result<()> {
        for socket in node.data_inputs() {
            if !node.callable && self.storage.contains(&node.id, &socket.name) {
                continue;
            }
            self.resolve_input(node, socket, path).await?;
        }
        Ok(())
    }

    /// Resolve a single input, trying in order: storage hit, lazy upstream
    /// pull, template default, unset
    pub(crate) async fn resolve_input(
        &self,
        node: &NodeData,
        socket: &SocketData,
        path: &[String],
    ) -> Result<()> {
        let key = (node.id.clone(), socket.name.clone());
        if let Some((source, source_socket)) = self.data_in.get(&key).cloned() {
            if let Some(source_node) = self.nodes.get(&source) {
                if !source_node.callable && !self.storage.is_executed(&source) {
                    self.dispatch(source.clone(), path.to_vec()).await?;
                }
            }
            if let Some(value) = self.storage.get(&source, &source_socket) {
                self.storage.set(&node.id, &socket.name, value);
                return Ok(());
            }
        }
        if self.storage.contains(&node.id, &socket.name) {
            return Ok(());
        }
        if let Some(default) = &socket.value {
            self.storage.set(&node.id, &socket.name, default.clone());
        }
        Ok(())
    }

    // ---- control flow ----------------------------------------------------

    /// Dispatch all targets of an execution output, in connection insertion
    /// order
    ///
    /// Observes cancellation and the gate once per target. If the socket is
    /// a stream's `completed` socket, detached item tasks join first.
    pub(crate) async fn trigger_exec_output(&self, node_id: &str, socket: &str) -> Result<()> {
        self.join_pending_streams(node_id, socket).await;

        let targets = self
            .exec_out
            .get(&(node_id.to_string(), socket.to_string()))
            .cloned()
            .unwrap_or_default();
        for (target, _enter_socket) in targets {
            self.gate.wait(&self.cancel).await?;
            self.dispatch(target, Vec::new()).await?;
        }
        Ok(())
    }

    /// Emit one stream item from a producer node
    pub(crate) async fn emit_stream_item(
        &self,
        node_id: &str,
        node_name: &str,
        stream: &StreamSocketInfo,
        value: SocketValue,
    ) -> Result<()> {
        self.storage.set(node_id, &stream.item_data_socket, value);

        match stream.mode {
            StreamMode::Sequential => {
                self.trigger_exec_output(node_id, &stream.on_item_exec_socket)
                    .await
            }
            StreamMode::FireAndForget => {
                let runtime = self.shared();
                let node_id_owned = node_id.to_string();
                let node_name = node_name.to_string();
                let socket = stream.on_item_exec_socket.clone();
                let handle = tokio::spawn(async move {
                    match runtime.trigger_exec_output(&node_id_owned, &socket).await {
                        Ok(()) | Err(EngineError::Cancelled) => {}
                        Err(err) => {
                            // Detached faults cannot fail the producer; they
                            // surface as feedback only.
                            runtime.publish_feedback(
                                &node_id_owned,
                                FeedbackSeverity::Error,
                                format!("stream item from '{node_name}' failed: {err}"),
                                Some("stream".into()),
                            );
                        }
                    }
                });

                if let Some(completed) = &stream.completed_exec_socket {
                    self.pending_streams
                        .lock()
                        .expect("stream map poisoned")
                        .entry((node_id.to_string(), completed.clone()))
                        .or_default()
                        .push(handle);
                }
                Ok(())
            }
        }
    }

    /// Await every detached item task recorded for `(node, socket)`
    async fn join_pending_streams(&self, node_id: &str, socket: &str) {
        let handles = self
            .pending_streams
            .lock()
            .expect("stream map poisoned")
            .remove(&(node_id.to_string(), socket.to_string()));
        let Some(handles) = handles else { return };

        debug!(node = %node_id, socket = %socket, tasks = handles.len(), "joining stream items");
        for handle in handles {
            // Item tasks swallow their own faults; a join error here is a
            // panic inside user code, surfaced as feedback.
            if let Err(err) = handle.await {
                self.publish_feedback(
                    node_id,
                    FeedbackSeverity::Error,
                    format!("stream item task aborted: {err}"),
                    Some("stream".into()),
                );
            }
        }
    }

    /// Publish a feedback message on the bus
    pub(crate) fn publish_feedback(
        &self,
        node_id: &str,
        severity: FeedbackSeverity,
        text: String,
        tag: Option<String>,
    ) {
        self.bus.publish(EngineEvent::Feedback(FeedbackMessage {
            node_id: node_id.to_string(),
            severity,
            text,
            tag,
            timestamp: chrono::Utc::now(),
        }));
    }
}

impl std::fmt::Debug for ExecutionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRuntime")
            .field("nodes", &self.nodes.len())
            .field("exec_edges", &self.exec_out.len())
            .field("data_edges", &self.data_in.len())
            .field("call_depth", &self.call_depth.load(Ordering::SeqCst))
            .finish()
    }
}
