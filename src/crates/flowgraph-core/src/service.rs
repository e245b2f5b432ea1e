//! Run entry point
//!
//! [`ExecutionService::execute`] owns the lifecycle of one run: construct
//! the runtime, seed variables, wire event listeners, pre-instantiate class
//! nodes, drive every initiator, and fold the outcome into a [`RunResult`].
//!
//! The graph handed in must already have passed validation; the service
//! only enforces the fail-fast checks that need the registry (definition
//! resolution, executor presence).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use uuid::Uuid;

use crate::convert::SocketTypeRegistry;
use crate::error::{EngineError, ErrorKind};
use crate::events::{EngineEvent, EventBus, FeedbackMessage};
use crate::gate::ExecutionGate;
use crate::model::GraphData;
use crate::node::ServiceContainer;
use crate::registry::NodeRegistry;
use crate::runtime::{ExecutionOptions, ExecutionRuntime};
use crate::storage::RuntimeStorage;
use crate::variables::{self, SpecialNode};
use tokio_util::sync::CancellationToken;

/// Everything a run shares: storage, services, gate, bus, options, token
///
/// Callers keep clones of the gate (pause/step), the bus (subscribe), and
/// the token (cancel) to steer the run from outside.
#[derive(Clone, Debug)]
pub struct RunParams {
    pub storage: Arc<RuntimeStorage>,
    pub services: Arc<ServiceContainer>,
    pub gate: Arc<ExecutionGate>,
    pub bus: Arc<EventBus>,
    pub options: ExecutionOptions,
    pub cancel: CancellationToken,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            storage: Arc::new(RuntimeStorage::new()),
            services: Arc::new(ServiceContainer::new()),
            gate: Arc::new(ExecutionGate::new()),
            bus: Arc::new(EventBus::new()),
            options: ExecutionOptions::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// First fatal error of a run
#[derive(Debug, Clone)]
pub struct RunFailure {
    /// Stable error kind
    pub kind: ErrorKind,
    /// Rendered message
    pub message: String,
}

impl RunFailure {
    fn from_error(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Unique run id
    pub run_id: String,
    /// First fatal error, if the run failed
    pub error: Option<RunFailure>,
    /// All feedback messages emitted during the run
    pub messages: Vec<FeedbackMessage>,
    /// Run start time
    pub started_at: DateTime<Utc>,
    /// Run end time
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Whether the run completed without a fatal error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Stateless run driver over a frozen registry and type registry
pub struct ExecutionService {
    registry: Arc<NodeRegistry>,
    types: Arc<SocketTypeRegistry>,
}

impl ExecutionService {
    /// Create a service over the given registries
    pub fn new(registry: Arc<NodeRegistry>, types: Arc<SocketTypeRegistry>) -> Self {
        Self { registry, types }
    }

    /// The node registry this service resolves against
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Execute a graph to completion
    #[tracing::instrument(skip_all, fields(nodes = graph.nodes.len(), connections = graph.connections.len()))]
    pub async fn execute(&self, graph: &GraphData, params: RunParams) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run = %run_id, "starting graph run");

        // Collect feedback for the result while the run progresses.
        let mut feedback_rx = params.bus.subscribe();
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        let collector = tokio::spawn(async move {
            let mut messages = Vec::new();
            loop {
                tokio::select! {
                    event = feedback_rx.recv() => match event {
                        Ok(EngineEvent::Feedback(message)) => messages.push(message),
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                    _ = &mut stop_rx => {
                        while let Ok(event) = feedback_rx.try_recv() {
                            if let EngineEvent::Feedback(message) = event {
                                messages.push(message);
                            }
                        }
                        break;
                    }
                }
            }
            messages
        });

        let error = self.drive(graph, &params).await.err();

        let _ = stop_tx.send(());
        let messages = collector.await.unwrap_or_default();
        let finished_at = Utc::now();

        match &error {
            None => info!(run = %run_id, "graph run completed"),
            Some(err) => info!(run = %run_id, error = %err, "graph run failed"),
        }
        RunResult {
            run_id,
            error: error.as_ref().map(RunFailure::from_error),
            messages,
            started_at,
            finished_at,
        }
    }

    async fn drive(&self, graph: &GraphData, params: &RunParams) -> crate::error::Result<()> {
        let runtime = ExecutionRuntime::new(
            &graph.nodes,
            &graph.connections,
            params.storage.clone(),
            params.services.clone(),
            &self.registry,
            params.gate.clone(),
            params.bus.clone(),
            self.types.clone(),
            params.options.clone(),
            params.cancel.clone(),
        )?;

        // Seed declared variables before anything executes.
        for variable in &graph.variables {
            if let Some(default) = &variable.default_value {
                params.storage.set_variable(&variable.id, default.clone());
            }
        }

        // Wire event listeners: the bus drives each listener's Exit path
        // under this run's gate and token.
        for node in &graph.nodes {
            if let Some(SpecialNode::EventListener(event_id)) =
                variables::recognize(&node.definition_id)
            {
                let runtime = runtime.clone();
                let node_id = node.id.clone();
                let event_id = event_id.to_string();
                debug!(node = %node.name, event = %event_id, "registering event listener");
                params.bus.register_handler(
                    event_id,
                    Arc::new(move || {
                        let runtime = runtime.clone();
                        let node_id = node_id.clone();
                        Box::pin(async move {
                            if runtime.cancel_token().is_cancelled() {
                                return;
                            }
                            if let Err(err) = runtime
                                .trigger_exec_output(&node_id, crate::model::EXIT_SOCKET)
                                .await
                            {
                                runtime.publish_feedback(
                                    &node_id,
                                    crate::events::FeedbackSeverity::Error,
                                    format!("event listener failed: {err}"),
                                    Some("event".into()),
                                );
                            }
                        })
                    }),
                );
            }
        }

        runtime.create_instances().await?;

        let initiators: Vec<&crate::model::NodeData> = graph.initiators().collect();
        let result = if params.options.max_parallelism > 1 && initiators.len() > 1 {
            let mut in_flight = FuturesUnordered::new();
            let mut queue = initiators.into_iter();
            let mut first_error = None;

            loop {
                while in_flight.len() < params.options.max_parallelism {
                    let Some(node) = queue.next() else { break };
                    let runtime = runtime.clone();
                    let node_id = node.id.clone();
                    in_flight.push(async move {
                        runtime.gate().wait(runtime.cancel_token()).await?;
                        runtime.execute_node_by_id(&node_id).await
                    });
                }
                let Some(done) = in_flight.next().await else { break };
                if let Err(err) = done {
                    if first_error.is_none() {
                        // Fail the run with the first fault; peers unwind
                        // through the shared token.
                        params.cancel.cancel();
                        first_error = Some(err);
                    }
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        } else {
            let mut outcome = Ok(());
            for node in initiators {
                if let Err(err) = runtime.gate().wait(runtime.cancel_token()).await {
                    outcome = Err(err);
                    break;
                }
                if let Err(err) = runtime.execute_node_by_id(&node.id).await {
                    outcome = Err(err);
                    break;
                }
            }
            outcome
        };

        params.bus.clear_handlers();
        runtime.dispose();
        result
    }
}
