//! Immutable graph data model
//!
//! The structures here are the wire-and-editor representation of a graph:
//! nodes, sockets, connections, variables, and custom events. The engine
//! receives them by reference and never mutates them; per-run state lives in
//! [`RuntimeStorage`](crate::storage::RuntimeStorage).
//!
//! Two edge families share one connection type, distinguished by
//! [`ConnectionData::is_execution`]: data edges propagate values, execution
//! edges sequence control flow. Execution sockets use the sentinel type name
//! [`EXEC_TYPE`] and never carry a value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel type name for execution sockets
pub const EXEC_TYPE: &str = "<exec>";

/// Canonical socket names added by `callable()` on the builder
pub const ENTER_SOCKET: &str = "Enter";
/// Exit socket name shared by callable and initiator nodes
pub const EXIT_SOCKET: &str = "Exit";

/// A typed value cell: type name plus serialized payload
///
/// Payloads round-trip through `serde_json::Value` and are deserialized
/// lazily on the first typed read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketValue {
    /// Type name as registered with the socket type registry
    pub type_name: String,
    /// Serialized payload
    pub value: Value,
}

impl SocketValue {
    /// Create a socket value from a type name and JSON payload
    pub fn new(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }
}

/// One input or output socket on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketData {
    /// Socket name, unique per node per direction
    pub name: String,
    /// Value type name; [`EXEC_TYPE`] for execution sockets
    pub type_name: String,
    /// Input (true) or output (false)
    pub is_input: bool,
    /// Execution socket (control flow) vs data socket
    pub is_execution: bool,
    /// Default value used when a data input is unconnected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SocketValue>,
    /// Editor hint (widget kind); opaque to the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_hint: Option<String>,
}

impl SocketData {
    /// Create a data socket
    pub fn data(name: impl Into<String>, type_name: impl Into<String>, is_input: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_input,
            is_execution: false,
            value: None,
            editor_hint: None,
        }
    }

    /// Create an execution socket
    pub fn execution(name: impl Into<String>, is_input: bool) -> Self {
        Self {
            name: name.into(),
            type_name: EXEC_TYPE.to_string(),
            is_input,
            is_execution: true,
            value: None,
            editor_hint: None,
        }
    }
}

/// A node as placed on the canvas
///
/// `callable` nodes own control sockets and are re-entrant per trigger;
/// `exec_init` nodes have no Enter socket and root a control-flow chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    /// Unique id within the graph
    pub id: String,
    /// Display name
    pub name: String,
    /// Id of the registered definition this node instantiates
    pub definition_id: String,
    /// Whether the node has control sockets
    #[serde(default)]
    pub callable: bool,
    /// Whether the node roots a control-flow chain (no Enter socket)
    #[serde(default)]
    pub exec_init: bool,
    /// Ordered input sockets
    #[serde(default)]
    pub inputs: Vec<SocketData>,
    /// Ordered output sockets
    #[serde(default)]
    pub outputs: Vec<SocketData>,
}

impl NodeData {
    /// Find an input socket by name
    pub fn input(&self, name: &str) -> Option<&SocketData> {
        self.inputs.iter().find(|s| s.name == name)
    }

    /// Find an output socket by name
    pub fn output(&self, name: &str) -> Option<&SocketData> {
        self.outputs.iter().find(|s| s.name == name)
    }

    /// Non-execution input sockets, in declaration order
    pub fn data_inputs(&self) -> impl Iterator<Item = &SocketData> {
        self.inputs.iter().filter(|s| !s.is_execution)
    }

    /// Check the per-node socket invariant: `(name, is_input)` unique
    pub fn sockets_unique(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .all(|s| seen.insert((s.name.as_str(), s.is_input)))
    }
}

/// A directed connection between two sockets
///
/// `is_execution` must match the flag of both endpoints. Each data input
/// accepts at most one incoming connection; execution inputs and all outputs
/// fan in/out freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    /// Source node id
    pub output_node_id: String,
    /// Source socket name
    pub output_socket_name: String,
    /// Target node id
    pub input_node_id: String,
    /// Target socket name
    pub input_socket_name: String,
    /// Execution edge (control flow) vs data edge
    #[serde(default)]
    pub is_execution: bool,
}

impl ConnectionData {
    /// Create an execution edge
    pub fn execution(
        from: impl Into<String>,
        from_socket: impl Into<String>,
        to: impl Into<String>,
        to_socket: impl Into<String>,
    ) -> Self {
        Self {
            output_node_id: from.into(),
            output_socket_name: from_socket.into(),
            input_node_id: to.into(),
            input_socket_name: to_socket.into(),
            is_execution: true,
        }
    }

    /// Create a data edge
    pub fn data(
        from: impl Into<String>,
        from_socket: impl Into<String>,
        to: impl Into<String>,
        to_socket: impl Into<String>,
    ) -> Self {
        Self {
            output_node_id: from.into(),
            output_socket_name: from_socket.into(),
            input_node_id: to.into(),
            input_socket_name: to_socket.into(),
            is_execution: false,
        }
    }
}

/// A graph-scoped variable
///
/// Each variable induces two synthetic definitions: `variable.get.<id>`
/// (pure data output) and `variable.set.<id>` (callable with pass-through).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphVariable {
    /// Unique variable id
    pub id: String,
    /// Display name
    pub name: String,
    /// Value type name
    pub type_name: String,
    /// Seeded into run storage before the first initiator executes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<SocketValue>,
}

/// A graph-scoped custom event
///
/// Induces `event.listener.<id>` (execution initiator) and
/// `event.trigger.<id>` (callable) definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEvent {
    /// Unique event id
    pub id: String,
    /// Display name
    pub name: String,
}

/// The executable projection of a graph: what the runtime consumes
///
/// Editor concerns (positions, sizes, overlays) live on the persisted
/// [`GraphDocument`](crate::document::GraphDocument) and are stripped here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    /// All nodes, in insertion order
    pub nodes: Vec<NodeData>,
    /// All connections, in insertion order
    pub connections: Vec<ConnectionData>,
    /// Declared variables
    #[serde(default)]
    pub variables: Vec<GraphVariable>,
    /// Declared custom events
    #[serde(default)]
    pub events: Vec<GraphEvent>,
}

impl GraphData {
    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&NodeData> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All execution initiators, in insertion order
    pub fn initiators(&self) -> impl Iterator<Item = &NodeData> {
        self.nodes.iter().filter(|n| n.exec_init)
    }
}
