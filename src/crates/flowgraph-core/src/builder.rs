//! Fluent construction of node definitions
//!
//! A [`NodeDefinition`] is the process-lifetime description of a node kind:
//! metadata, socket templates, stream declarations, and an executor variant.
//! Definitions are built through [`NodeBuilder`], either inside a class
//! node's `configure` or standalone with [`NodeBuilder::on_execute`] for
//! inline nodes.
//!
//! ```rust,no_run
//! use flowgraph_core::builder::NodeBuilder;
//!
//! let definition = NodeBuilder::new("math.add")
//!     .name("Add")
//!     .category("Math")
//!     .description("Sum two numbers")
//!     .input::<f64>("A")
//!     .input::<f64>("B")
//!     .output::<f64>("Sum")
//!     .on_execute(|ctx, _cancel| {
//!         Box::pin(async move {
//!             let a: f64 = ctx.get_input("A").await?;
//!             let b: f64 = ctx.get_input("B").await?;
//!             ctx.set_output("Sum", a + b)?;
//!             Ok(())
//!         })
//!     })
//!     .build();
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::context::NodeContext;
use crate::convert::type_name_of;
use crate::error::Result;
use crate::model::{NodeData, SocketData, SocketValue, ENTER_SOCKET, EXIT_SOCKET};
use crate::node::GraphNode;

/// How stream emissions drive the downstream subgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// `emit` awaits the item subtree before returning
    #[default]
    Sequential,
    /// `emit` detaches the item subtree; detached tasks join at the
    /// stream's `completed` socket
    FireAndForget,
}

/// Sockets participating in one stream declared by `stream_output`
#[derive(Debug, Clone)]
pub struct StreamSocketInfo {
    /// Data output receiving each emitted item
    pub item_data_socket: String,
    /// Execution output triggered per item
    pub on_item_exec_socket: String,
    /// Execution output where detached item tasks join before dispatch.
    /// Streams without one are never joined; fire-and-forget faults on such
    /// streams are only visible as feedback.
    pub completed_exec_socket: Option<String>,
    /// Emission mode for this stream
    pub mode: StreamMode,
}

/// Inline executor closure for definition-only nodes
pub type InlineExecutor =
    Arc<dyn Fn(NodeContext, CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Factory producing one shared instance per (run, node)
pub type InstanceFactory = Arc<dyn Fn() -> Arc<dyn GraphNode> + Send + Sync>;

/// Executor variant of a definition
#[derive(Clone)]
pub enum NodeExecutorKind {
    /// Instantiate a class node and call its `execute`
    Class(InstanceFactory),
    /// Call the captured closure directly
    Inline(InlineExecutor),
}

impl std::fmt::Debug for NodeExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Class(_) => f.write_str("Class(<factory>)"),
            Self::Inline(_) => f.write_str("Inline(<closure>)"),
        }
    }
}

/// Process-lifetime description of a node kind
///
/// Owned by the registry after discovery and shared via `Arc` into runs.
#[derive(Debug, Clone)]
pub struct NodeDefinition {
    /// Stable definition id, unique per module
    pub id: String,
    /// Display name
    pub name: String,
    /// Palette category
    pub category: String,
    /// Human description
    pub description: String,
    /// Whether instances carry control sockets
    pub callable: bool,
    /// Whether instances root control flow (no Enter socket)
    pub exec_init: bool,
    /// Input socket templates
    pub inputs: Vec<SocketData>,
    /// Output socket templates
    pub outputs: Vec<SocketData>,
    /// Declared streams
    pub stream_sockets: Vec<StreamSocketInfo>,
    /// Executor variant; `None` marks a load-time placeholder
    pub executor: Option<NodeExecutorKind>,
}

impl NodeDefinition {
    /// Build a definition from a class node type
    pub fn of<T: GraphNode + Default>(id: impl Into<String>) -> Self {
        let mut builder = T::configure(NodeBuilder::new(id));
        builder.executor = Some(NodeExecutorKind::Class(Arc::new(|| {
            Arc::new(T::default()) as Arc<dyn GraphNode>
        })));
        builder.build()
    }

    /// Non-executable placeholder for an unknown definition id
    pub fn placeholder(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            id: id.clone(),
            name: name.into(),
            category: "Unresolved".into(),
            description: format!("placeholder for unknown definition '{id}'"),
            callable: false,
            exec_init: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            stream_sockets: Vec::new(),
            executor: None,
        }
    }

    /// Stamp out a fresh node from the socket templates
    ///
    /// The node gets a newly generated unique id; templates are cloned as-is,
    /// including defaults.
    pub fn create_node(&self) -> NodeData {
        NodeData {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name.clone(),
            definition_id: self.id.clone(),
            callable: self.callable,
            exec_init: self.exec_init,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    /// Find an input socket template by name
    pub fn input(&self, name: &str) -> Option<&SocketData> {
        self.inputs.iter().find(|s| s.name == name)
    }

    /// Find an output socket template by name
    pub fn output(&self, name: &str) -> Option<&SocketData> {
        self.outputs.iter().find(|s| s.name == name)
    }

    /// The stream owning the given `completed` socket, if any
    pub fn stream_by_completed(&self, socket: &str) -> Option<&StreamSocketInfo> {
        self.stream_sockets
            .iter()
            .find(|s| s.completed_exec_socket.as_deref() == Some(socket))
    }

    /// The stream owning the given item data socket, if any
    pub fn stream_by_item(&self, socket: &str) -> Option<&StreamSocketInfo> {
        self.stream_sockets
            .iter()
            .find(|s| s.item_data_socket == socket)
    }
}

/// Fluent builder for [`NodeDefinition`]
#[derive(Debug)]
pub struct NodeBuilder {
    id: String,
    name: String,
    category: String,
    description: String,
    callable: bool,
    exec_init: bool,
    inputs: Vec<SocketData>,
    outputs: Vec<SocketData>,
    stream_sockets: Vec<StreamSocketInfo>,
    executor: Option<NodeExecutorKind>,
}

impl NodeBuilder {
    /// Start a definition with the given id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: String::new(),
            description: String::new(),
            callable: false,
            exec_init: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            stream_sockets: Vec::new(),
            executor: None,
        }
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the palette category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark callable: adds the Enter execution input and Exit execution output
    pub fn callable(mut self) -> Self {
        self.callable = true;
        self.push_socket(SocketData::execution(ENTER_SOCKET, true));
        self.push_socket(SocketData::execution(EXIT_SOCKET, false));
        self
    }

    /// Mark as an execution initiator: adds only the Exit execution output
    pub fn execution_initiator(mut self) -> Self {
        self.callable = true;
        self.exec_init = true;
        self.push_socket(SocketData::execution(EXIT_SOCKET, false));
        self
    }

    /// Add a named execution input
    pub fn execution_input(mut self, name: impl Into<String>) -> Self {
        self.callable = true;
        self.push_socket(SocketData::execution(name, true));
        self
    }

    /// Add a named execution output
    pub fn execution_output(mut self, name: impl Into<String>) -> Self {
        self.callable = true;
        self.push_socket(SocketData::execution(name, false));
        self
    }

    /// Add a typed data input
    pub fn input<T>(mut self, name: impl Into<String>) -> Self {
        self.push_socket(SocketData::data(name, type_name_of::<T>(), true));
        self
    }

    /// Add a typed data input with a default value
    ///
    /// The default is serialized into the socket template and used whenever
    /// the input is unconnected at run time.
    pub fn input_default<T: Serialize>(mut self, name: impl Into<String>, default: T) -> Self {
        let type_name = type_name_of::<T>();
        let mut socket = SocketData::data(name, type_name.clone(), true);
        if let Ok(value) = serde_json::to_value(default) {
            socket.value = Some(SocketValue::new(type_name, value));
        }
        self.push_socket(socket);
        self
    }

    /// Add a typed data input with an editor hint
    pub fn input_hinted<T>(mut self, name: impl Into<String>, hint: impl Into<String>) -> Self {
        let mut socket = SocketData::data(name, type_name_of::<T>(), true);
        socket.editor_hint = Some(hint.into());
        self.push_socket(socket);
        self
    }

    /// Add a typed data output
    pub fn output<T>(mut self, name: impl Into<String>) -> Self {
        self.push_socket(SocketData::data(name, type_name_of::<T>(), false));
        self
    }

    /// Declare a sequential stream: item data output plus per-item execution
    /// output
    pub fn stream_output<T>(
        self,
        item: impl Into<String>,
        on_item: impl Into<String>,
    ) -> Self {
        self.stream_output_with::<T>(item, on_item, None::<String>, StreamMode::Sequential)
    }

    /// Declare a stream with an explicit completion socket and mode
    ///
    /// Adds the item data output, the per-item execution output, and (when
    /// given) the completion execution output where detached item tasks join.
    pub fn stream_output_with<T>(
        mut self,
        item: impl Into<String>,
        on_item: impl Into<String>,
        completed: Option<impl Into<String>>,
        mode: StreamMode,
    ) -> Self {
        let item = item.into();
        let on_item = on_item.into();
        let completed = completed.map(Into::into);

        self.push_socket(SocketData::data(item.clone(), type_name_of::<T>(), false));
        self.push_socket(SocketData::execution(on_item.clone(), false));
        if let Some(completed) = &completed {
            self.push_socket(SocketData::execution(completed.clone(), false));
        }
        self.callable = true;
        self.stream_sockets.push(StreamSocketInfo {
            item_data_socket: item,
            on_item_exec_socket: on_item,
            completed_exec_socket: completed,
            mode,
        });
        self
    }

    /// Attach an inline executor closure
    pub fn on_execute<F>(mut self, executor: F) -> Self
    where
        F: Fn(NodeContext, CancellationToken) -> BoxFuture<'static, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.executor = Some(NodeExecutorKind::Inline(Arc::new(executor)));
        self
    }

    /// Finish the definition
    pub fn build(self) -> NodeDefinition {
        NodeDefinition {
            id: self.id,
            name: self.name,
            category: self.category,
            description: self.description,
            callable: self.callable,
            exec_init: self.exec_init,
            inputs: self.inputs,
            outputs: self.outputs,
            stream_sockets: self.stream_sockets,
            executor: self.executor,
        }
    }

    /// Idempotent socket add: duplicate `(name, is_input)` is a no-op
    fn push_socket(&mut self, socket: SocketData) {
        let target = if socket.is_input {
            &mut self.inputs
        } else {
            &mut self.outputs
        };
        if target.iter().any(|s| s.name == socket.name) {
            return;
        }
        target.push(socket);
    }
}
