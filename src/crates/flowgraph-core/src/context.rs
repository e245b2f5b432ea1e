//! Per-node execution façade
//!
//! A [`NodeContext`] is created for each dispatch of a class or inline node
//! and is the only surface node code talks to: typed socket access, trigger
//! dispatch, stream emission, variables, and feedback. It is cheap to clone
//! and safe to move into spawned tasks; everything behind it is the run's
//! shared [`ExecutionRuntime`](crate::runtime::ExecutionRuntime).

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::builder::NodeDefinition;
use crate::convert::type_name_of;
use crate::error::{EngineError, Result};
use crate::events::FeedbackSeverity;
use crate::model::SocketValue;
use crate::node::ServiceContainer;
use crate::runtime::ExecutionRuntime;

/// Execution context handed to a node's `execute`
#[derive(Clone)]
pub struct NodeContext {
    runtime: Arc<ExecutionRuntime>,
    node_id: String,
    node_name: String,
    definition: Arc<NodeDefinition>,
}

impl NodeContext {
    pub(crate) fn new(
        runtime: Arc<ExecutionRuntime>,
        node_id: String,
        node_name: String,
        definition: Arc<NodeDefinition>,
    ) -> Self {
        Self {
            runtime,
            node_id,
            node_name,
            definition,
        }
    }

    /// Id of the node this context belongs to
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Display name of the node
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The node's definition
    pub fn definition(&self) -> &NodeDefinition {
        &self.definition
    }

    /// Injected services
    pub fn services(&self) -> &ServiceContainer {
        self.runtime.services()
    }

    /// Read a typed input
    ///
    /// Resolves the input lazily if it is not yet in storage, then coerces:
    /// exact/JSON-compatible deserialization first, a registered converter
    /// for the `(stored, requested)` type pair second, and the type's
    /// default last.
    pub async fn get_input<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        if !self.runtime.storage().contains(&self.node_id, name) {
            if let Some(node) = self.runtime.node(&self.node_id) {
                if let Some(socket) = node.input(name) {
                    let path = vec![self.node_id.clone()];
                    self.runtime.resolve_input(node, socket, &path).await?;
                }
            }
        }

        let Some(stored) = self.runtime.storage().get(&self.node_id, name) else {
            return Ok(T::default());
        };
        Ok(self.coerce(name, stored))
    }

    fn coerce<T: DeserializeOwned + Default>(&self, name: &str, stored: SocketValue) -> T {
        let requested = type_name_of::<T>();
        match serde_json::from_value::<T>(stored.value.clone()) {
            Ok(value) => value,
            Err(_) => {
                if let Some(converted) = self
                    .runtime
                    .types()
                    .convert(&stored.type_name, &requested, &stored.value)
                {
                    if let Ok(value) = serde_json::from_value::<T>(converted) {
                        return value;
                    }
                }
                warn!(
                    node = %self.node_name,
                    socket = %name,
                    stored = %stored.type_name,
                    requested = %requested,
                    "input not coercible; using default"
                );
                T::default()
            }
        }
    }

    /// Write a typed output
    pub fn set_output<T: Serialize>(&self, name: &str, value: T) -> Result<()> {
        let payload = serde_json::to_value(value)?;
        self.runtime.storage().set(
            &self.node_id,
            name,
            SocketValue::new(type_name_of::<T>(), payload),
        );
        Ok(())
    }

    /// Dispatch all targets of an execution output, in connection insertion
    /// order, suspending until the whole subtree completes
    ///
    /// If `name` is a stream's `completed` socket, every detached item task
    /// of that stream joins before the first target dispatches. Downstream
    /// faults propagate to the caller.
    pub async fn trigger(&self, name: &str) -> Result<()> {
        self.runtime.trigger_exec_output(&self.node_id, name).await
    }

    /// Emit one item on a declared stream
    ///
    /// Writes the item to the stream's data output, then drives the
    /// `on_item` path according to the stream's mode: `Sequential` awaits
    /// the subtree, `FireAndForget` detaches it.
    pub async fn emit<T: Serialize>(&self, item_socket: &str, item: T) -> Result<()> {
        let stream = self
            .definition
            .stream_by_item(item_socket)
            .cloned()
            .ok_or_else(|| {
                EngineError::node(
                    &self.node_name,
                    format!("'{item_socket}' is not a declared stream output"),
                )
            })?;
        let payload = serde_json::to_value(item)?;
        self.runtime
            .emit_stream_item(
                &self.node_id,
                &self.node_name,
                &stream,
                SocketValue::new(type_name_of::<T>(), payload),
            )
            .await
    }

    /// Read a graph variable
    pub fn get_variable<T: DeserializeOwned + Default>(&self, variable_id: &str) -> T {
        self.runtime
            .storage()
            .get_variable(variable_id)
            .and_then(|stored| serde_json::from_value(stored.value).ok())
            .unwrap_or_default()
    }

    /// Write a graph variable
    pub fn set_variable<T: Serialize>(&self, variable_id: &str, value: T) -> Result<()> {
        let payload = serde_json::to_value(value)?;
        self.runtime
            .storage()
            .set_variable(variable_id, SocketValue::new(type_name_of::<T>(), payload));
        Ok(())
    }

    /// Publish a feedback message; never affects control flow
    pub fn emit_feedback(
        &self,
        severity: FeedbackSeverity,
        text: impl Into<String>,
        tag: Option<String>,
    ) {
        self.runtime
            .publish_feedback(&self.node_id, severity, text.into(), tag);
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_id", &self.node_id)
            .field("node_name", &self.node_name)
            .field("definition", &self.definition.id)
            .finish()
    }
}
